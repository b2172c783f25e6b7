//! Error types for the telemetry facade.
//!
//! None of these errors ever reach widget code: [`Telemetry::init`](super::Telemetry::init)
//! logs them as warnings and substitutes a working fallback.

use opentelemetry::metrics::MetricsError;
use opentelemetry::trace::TraceError;
use opentelemetry::ExportError;
use thiserror::Error;

/// Errors that can occur while building or driving the telemetry pipeline.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The collector endpoint could not be parsed.
    #[error("Invalid exporter endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// The HTTP client used by the exporter failed.
    #[error("Exporter HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The collector answered with a non-success status.
    #[error("Export failed with status {0}")]
    ExportStatus(u16),

    /// An instrument name does not follow the naming rules.
    #[error("Invalid instrument name: {0}")]
    InvalidInstrumentName(String),

    /// The requested auto-instrumentation is not known.
    #[error("Unknown instrumentation: {0}")]
    UnknownInstrumentation(String),

    #[error("Trace pipeline error: {0}")]
    Trace(#[from] TraceError),

    #[error("Metrics pipeline error: {0}")]
    Metrics(#[from] MetricsError),

    /// The span pipeline was already shut down.
    #[error("Telemetry already shut down")]
    AlreadyShutdown,

    /// A blocking flush task panicked or was cancelled.
    #[error("Telemetry task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Lets exporter failures travel through the SDK as [`TraceError::ExportFailed`].
impl ExportError for TelemetryError {
    fn exporter_name(&self) -> &'static str {
        "otlp_http"
    }
}
