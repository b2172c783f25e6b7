//! Telemetry configuration.
//!
//! Defaults describe the browser-side checkout service. [`TelemetryConfig::from_env`]
//! overlays the standard OpenTelemetry environment variables on top of them.

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_SERVICE_NAME: &str = "paypal-microfrontend-browser";
pub const DEFAULT_SERVICE_VERSION: &str = "1.0.0";
pub const DEFAULT_ENVIRONMENT: &str = "development";
pub const DEFAULT_METRIC_NAMESPACE: &str = "paypal";

/// Where finished spans go.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExporterConfig {
    /// Log every span through `tracing`.
    Console,
    /// POST OTLP/protobuf batches to `{endpoint}/v1/traces`.
    Otlp { endpoint: String },
    /// Drop spans after they are closed.
    Disabled,
}

/// Configuration for [`Telemetry::init`](super::Telemetry::init).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    pub exporter: ExporterConfig,
    /// Prefix of every checkout instrument name (`{namespace}_errors`, ...).
    pub metric_namespace: String,
    /// Spans exported per batch by the batch span processor.
    pub max_batch_size: usize,
    /// Spans the batch span processor buffers before new ones are dropped.
    pub queue_capacity: usize,
    pub flush_interval_ms: u64,
    /// Auto-instrumentations to register (`fetch`).
    pub instrumentations: Vec<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            service_version: DEFAULT_SERVICE_VERSION.to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            exporter: ExporterConfig::Console,
            metric_namespace: DEFAULT_METRIC_NAMESPACE.to_string(),
            max_batch_size: 512,
            queue_capacity: 2048,
            flush_interval_ms: 5_000,
            instrumentations: vec!["fetch".to_string()],
        }
    }
}

impl TelemetryConfig {
    /// Builds a configuration from the process environment.
    ///
    /// - `OTEL_EXPORTER_OTLP_ENDPOINT` selects the OTLP exporter
    /// - `OTEL_SERVICE_NAME` / `OTEL_SERVICE_VERSION` override the service identity
    /// - `DEPLOYMENT_ENVIRONMENT` overrides `deployment.environment`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(endpoint) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|v| !v.is_empty()) {
            config.exporter = ExporterConfig::Otlp { endpoint };
        }
        if let Some(name) = lookup("OTEL_SERVICE_NAME") {
            config.service_name = name;
        }
        if let Some(version) = lookup("OTEL_SERVICE_VERSION") {
            config.service_version = version;
        }
        if let Some(environment) = lookup("DEPLOYMENT_ENVIRONMENT") {
            config.environment = environment;
        }
        config
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    /// Resource attributes attached to every exported batch.
    pub fn resource_attributes(&self) -> Vec<KeyValue> {
        vec![
            KeyValue::new("service.name", self.service_name.clone()),
            KeyValue::new("service.version", self.service_version.clone()),
            KeyValue::new("deployment.environment", self.environment.clone()),
        ]
    }

    pub fn resource(&self) -> Resource {
        Resource::new(self.resource_attributes())
    }
}
