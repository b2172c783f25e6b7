//! # Telemetry Facade
//!
//! A [`Telemetry`] value bundles every observability handle the widgets use:
//! a [`Tracer`], a [`Logger`], the [`CheckoutMetrics`] instruments and the
//! [`Meter`] that records them. It is built once at startup and cloned into
//! each widget; there is no global state.
//!
//! ## Initialization
//!
//! The tracer and meter are the OpenTelemetry SDK's: a [`TracerProvider`]
//! with a batch span processor in front of the exporter, and an
//! [`SdkMeterProvider`](opentelemetry_sdk::metrics::SdkMeterProvider) for the
//! instruments. [`Telemetry::init`] never fails. Each stage checks its
//! capability first and falls back on its own:
//!
//! | Stage | Failure | Fallback |
//! |-------|---------|----------|
//! | exporter | bad endpoint, HTTP client error | [`ConsoleExporter`] |
//! | span processor | no Tokio runtime | simple processor, console exporter |
//! | instruments | invalid instrument name | [`CheckoutMetrics::mock`] |
//! | auto-instrumentation | unknown name | skipped |
//!
//! Every fallback is logged with `warn!` and callers never branch on which
//! variant is active.

pub mod config;
pub mod error;
pub mod exporter;
pub mod logger;
pub mod metrics;
pub mod span;

pub use config::{ExporterConfig, TelemetryConfig};
pub use error::TelemetryError;
pub use exporter::{ConsoleExporter, InMemoryExporter, OtlpHttpExporter, SpanDataExt};
pub use logger::Logger;
pub use metrics::{CheckoutMetrics, Counter, Histogram, HistogramData, Meter};
pub use opentelemetry::{KeyValue, Value as AttributeValue};
pub use opentelemetry_sdk::export::trace::{SpanData, SpanExporter};
pub use span::{Span, Tracer};

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::runtime::TokioCurrentThread;
use opentelemetry_sdk::trace::{self as sdktrace, BatchConfigBuilder, BatchSpanProcessor, TracerProvider};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

use exporter::CountingExporter;

/// Auto-instrumentations that can be registered at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instrumentation {
    /// Trace requests issued with the async HTTP client.
    Fetch,
}

impl FromStr for Instrumentation {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetch" | "@opentelemetry/instrumentation-fetch" => Ok(Instrumentation::Fetch),
            other => Err(TelemetryError::UnknownInstrumentation(other.to_string())),
        }
    }
}

/// Which span pipeline ended up active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanPipeline {
    /// Batch processor in front of the configured exporter.
    Batch,
    /// Batch processor in front of the console exporter; the configured one failed.
    ConsoleFallback,
    /// Spans logged synchronously; there is no runtime for the batch processor.
    Console,
    /// Spans are recorded but not exported.
    Disabled,
}

struct Inner {
    config: TelemetryConfig,
    provider: Mutex<Option<TracerProvider>>,
    exported: Arc<AtomicU64>,
    tracer: Tracer,
    logger: Logger,
    meter: Meter,
    metrics: CheckoutMetrics,
    pipeline: SpanPipeline,
    instrumentations: Vec<Instrumentation>,
}

/// The observability context shared by all widgets.
#[derive(Clone)]
pub struct Telemetry {
    inner: Arc<Inner>,
}

impl Telemetry {
    /// Builds the pipeline described by `config`.
    pub fn init(config: TelemetryConfig) -> Self {
        Self::init_with(config, exporter::build_exporter)
    }

    /// Builds the pipeline around a caller-provided exporter.
    pub fn with_exporter(config: TelemetryConfig, exporter: impl SpanExporter + 'static) -> Self {
        Self::init_with(config, move |_| {
            Ok(Some(Box::new(exporter) as Box<dyn SpanExporter>))
        })
    }

    /// Builds the pipeline, asking `exporter_factory` for the exporter.
    ///
    /// `Ok(None)` disables export; an error falls back to the console exporter.
    pub fn init_with<F>(config: TelemetryConfig, exporter_factory: F) -> Self
    where
        F: FnOnce(&TelemetryConfig) -> Result<Option<Box<dyn SpanExporter>>, TelemetryError>,
    {
        let exported = Arc::new(AtomicU64::new(0));
        let (provider, pipeline) = match exporter_factory(&config) {
            Ok(Some(exporter)) => span_pipeline(&config, exporter, SpanPipeline::Batch, &exported),
            Ok(None) => (provider_builder(&config).build(), SpanPipeline::Disabled),
            Err(e) => {
                warn!(error = %e, "Span exporter not available, using console exporter");
                span_pipeline(
                    &config,
                    Box::new(ConsoleExporter),
                    SpanPipeline::ConsoleFallback,
                    &exported,
                )
            }
        };

        let tracer = Tracer::new(provider.tracer(config.service_name.clone()));
        let logger = Logger::new(&config.service_name);
        let meter = Meter::new(&config.service_name, config.resource());
        let metrics = CheckoutMetrics::create(&meter, &config.metric_namespace).unwrap_or_else(|e| {
            warn!(error = %e, "Metrics creation failed, using mock metrics");
            CheckoutMetrics::mock(&config.metric_namespace)
        });
        let instrumentations = register_instrumentations(&config.instrumentations);

        info!(
            service = %config.service_name,
            ?pipeline,
            ?instrumentations,
            "Telemetry initialized"
        );

        Self {
            inner: Arc::new(Inner {
                config,
                provider: Mutex::new(Some(provider)),
                exported,
                tracer,
                logger,
                meter,
                metrics,
                pipeline,
                instrumentations,
            }),
        }
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.inner.config
    }

    pub fn tracer(&self) -> &Tracer {
        &self.inner.tracer
    }

    pub fn logger(&self) -> &Logger {
        &self.inner.logger
    }

    pub fn meter(&self) -> &Meter {
        &self.inner.meter
    }

    pub fn metrics(&self) -> &CheckoutMetrics {
        &self.inner.metrics
    }

    pub fn pipeline(&self) -> SpanPipeline {
        self.inner.pipeline
    }

    pub fn is_instrumented(&self, instrumentation: Instrumentation) -> bool {
        self.inner.instrumentations.contains(&instrumentation)
    }

    /// Exports every span closed so far. Returns the number exported.
    pub async fn force_flush(&self) -> Result<usize, TelemetryError> {
        let provider = self
            .inner
            .provider
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(TelemetryError::AlreadyShutdown)?;
        let before = self.inner.exported.load(Ordering::SeqCst);
        // The SDK flush blocks until the batch worker has exported.
        let results = tokio::task::spawn_blocking(move || provider.force_flush()).await?;
        for result in results {
            result?;
        }
        let after = self.inner.exported.load(Ordering::SeqCst);
        Ok(after.saturating_sub(before) as usize)
    }

    /// Flushes and stops the span pipeline. Spans closed afterwards are dropped.
    pub async fn shutdown(&self) -> Result<(), TelemetryError> {
        let provider = self
            .inner
            .provider
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TelemetryError::AlreadyShutdown)?;
        // Dropping the last provider handle shuts its span processors down.
        let results = tokio::task::spawn_blocking(move || {
            let results = provider.force_flush();
            drop(provider);
            results
        })
        .await?;
        for result in results {
            result?;
        }
        info!(
            exported = self.inner.exported.load(Ordering::SeqCst),
            "Telemetry shutdown complete"
        );
        Ok(())
    }
}

fn provider_builder(config: &TelemetryConfig) -> sdktrace::Builder {
    TracerProvider::builder().with_config(sdktrace::config().with_resource(config.resource()))
}

/// A batch processor when a Tokio runtime is running, synchronous console export otherwise.
fn span_pipeline(
    config: &TelemetryConfig,
    exporter: Box<dyn SpanExporter>,
    pipeline: SpanPipeline,
    exported: &Arc<AtomicU64>,
) -> (TracerProvider, SpanPipeline) {
    if let Err(e) = tokio::runtime::Handle::try_current() {
        warn!(error = %e, "Batch span processor unavailable, logging spans to console");
        let console = CountingExporter::new(Box::new(ConsoleExporter), exported.clone());
        let provider = provider_builder(config).with_simple_exporter(console).build();
        return (provider, SpanPipeline::Console);
    }

    let exporter = CountingExporter::new(exporter, exported.clone());
    let batch_config = BatchConfigBuilder::default()
        .with_max_queue_size(config.queue_capacity.max(1))
        .with_max_export_batch_size(config.max_batch_size.max(1))
        .with_scheduled_delay(config.flush_interval())
        .build();
    let processor = BatchSpanProcessor::builder(exporter, TokioCurrentThread)
        .with_batch_config(batch_config)
        .build();
    let provider = provider_builder(config).with_span_processor(processor).build();
    (provider, pipeline)
}

fn register_instrumentations(names: &[String]) -> Vec<Instrumentation> {
    let mut registered = Vec::new();
    for name in names {
        match name.parse::<Instrumentation>() {
            Ok(instrumentation) if !registered.contains(&instrumentation) => {
                registered.push(instrumentation)
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Auto-instrumentation not available"),
        }
    }
    registered
}
