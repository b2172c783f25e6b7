//! Span exporters.
//!
//! Every exporter implements the SDK's [`SpanExporter`] and sits behind the
//! provider's span processor:
//!
//! - [`ConsoleExporter`]: logs every span (the fallback when nothing else works)
//! - [`OtlpHttpExporter`]: POSTs OTLP/protobuf batches to a collector
//! - [`InMemoryExporter`]: keeps spans in memory for inspection

use futures_util::future::BoxFuture;
use opentelemetry::trace::{SpanId, Status};
use opentelemetry::{KeyValue, Value};
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{
    any_value, AnyValue, InstrumentationScope, KeyValue as ProtoKeyValue,
};
use opentelemetry_proto::tonic::resource::v1::Resource as ProtoResource;
use opentelemetry_proto::tonic::trace::v1::{
    span::SpanKind, status::StatusCode, ResourceSpans, ScopeSpans, Span as ProtoSpan,
    Status as ProtoStatus,
};
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use prost::Message;
use reqwest::header::CONTENT_TYPE;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use super::config::{ExporterConfig, TelemetryConfig};
use super::error::TelemetryError;

/// Builds the exporter selected by `config.exporter`. `None` means spans are not exported.
pub fn build_exporter(
    config: &TelemetryConfig,
) -> Result<Option<Box<dyn SpanExporter>>, TelemetryError> {
    match &config.exporter {
        ExporterConfig::Console => Ok(Some(Box::new(ConsoleExporter))),
        ExporterConfig::Otlp { endpoint } => {
            let exporter = OtlpHttpExporter::new(endpoint, config)?;
            Ok(Some(Box::new(exporter)))
        }
        ExporterConfig::Disabled => Ok(None),
    }
}

/// Attribute lookup on finished spans.
pub trait SpanDataExt {
    /// The last value recorded under `key`.
    fn attribute(&self, key: &str) -> Option<&Value>;
}

impl SpanDataExt for SpanData {
    fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .rev()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }
}

#[derive(Debug, Default)]
pub struct ConsoleExporter;

impl SpanExporter for ConsoleExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        for span in &batch {
            info!(
                name = %span.name,
                trace_id = %span.span_context.trace_id(),
                span_id = %span.span_context.span_id(),
                attributes = ?span.attributes,
                status = ?span.status,
                "OpenTelemetry span"
            );
        }
        Box::pin(std::future::ready(Ok(())))
    }
}

/// Collects exported spans. Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct InMemoryExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
}

impl InMemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn spans_named(&self, name: &str) -> Vec<SpanData> {
        self.finished_spans()
            .into_iter()
            .filter(|span| span.name == name)
            .collect()
    }

    pub fn reset(&self) {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl SpanExporter for InMemoryExporter {
    fn export(&mut self, mut batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(&mut batch);
        Box::pin(std::future::ready(Ok(())))
    }
}

/// Counts the spans handed to the wrapped exporter, so a flush can report how many it exported.
#[derive(Debug)]
pub(crate) struct CountingExporter {
    inner: Box<dyn SpanExporter>,
    exported: Arc<AtomicU64>,
}

impl CountingExporter {
    pub(crate) fn new(inner: Box<dyn SpanExporter>, exported: Arc<AtomicU64>) -> Self {
        Self { inner, exported }
    }
}

impl SpanExporter for CountingExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        self.exported
            .fetch_add(batch.len() as u64, Ordering::SeqCst);
        self.inner.export(batch)
    }

    fn shutdown(&mut self) {
        self.inner.shutdown();
    }
}

/// Exports spans as OTLP/protobuf over HTTP.
#[derive(Debug, Clone)]
pub struct OtlpHttpExporter {
    client: reqwest::Client,
    url: reqwest::Url,
    resource: Vec<ProtoKeyValue>,
    scope: String,
}

impl OtlpHttpExporter {
    pub fn new(endpoint: &str, config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let raw = format!("{}/v1/traces", endpoint.trim_end_matches('/'));
        let url = reqwest::Url::parse(&raw).map_err(|e| TelemetryError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TelemetryError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            url,
            resource: config
                .resource_attributes()
                .iter()
                .map(proto_key_value)
                .collect(),
            scope: config.service_name.clone(),
        })
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }

    /// The protobuf request body for one batch.
    pub fn to_export_request(&self, batch: &[SpanData]) -> ExportTraceServiceRequest {
        ExportTraceServiceRequest {
            resource_spans: vec![ResourceSpans {
                resource: Some(ProtoResource {
                    attributes: self.resource.clone(),
                    dropped_attributes_count: 0,
                }),
                scope_spans: vec![ScopeSpans {
                    scope: Some(InstrumentationScope {
                        name: self.scope.clone(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                        ..Default::default()
                    }),
                    spans: batch.iter().map(proto_span).collect(),
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        }
    }
}

impl SpanExporter for OtlpHttpExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let body = self.to_export_request(&batch).encode_to_vec();
        let client = self.client.clone();
        let url = self.url.clone();
        let spans = batch.len();

        Box::pin(async move {
            debug!(%url, spans, bytes = body.len(), "Exporting OTLP traces");
            let response = client
                .post(url)
                .header(CONTENT_TYPE, "application/x-protobuf")
                .body(body)
                .send()
                .await
                .map_err(TelemetryError::from)?;
            if !response.status().is_success() {
                let status = response.status();
                warn!(%status, "OTLP export failed");
                return Err(TelemetryError::ExportStatus(status.as_u16()).into());
            }
            Ok(())
        })
    }
}

fn proto_span(span: &SpanData) -> ProtoSpan {
    let parent_span_id = if span.parent_span_id == SpanId::INVALID {
        Vec::new()
    } else {
        span.parent_span_id.to_bytes().to_vec()
    };
    ProtoSpan {
        trace_id: span.span_context.trace_id().to_bytes().to_vec(),
        span_id: span.span_context.span_id().to_bytes().to_vec(),
        parent_span_id,
        name: span.name.to_string(),
        kind: SpanKind::Internal as i32,
        start_time_unix_nano: unix_nanos(span.start_time),
        end_time_unix_nano: unix_nanos(span.end_time),
        attributes: span.attributes.iter().map(proto_key_value).collect(),
        status: Some(proto_status(&span.status)),
        ..Default::default()
    }
}

fn proto_status(status: &Status) -> ProtoStatus {
    match status {
        Status::Unset => ProtoStatus {
            code: StatusCode::Unset as i32,
            message: String::new(),
        },
        Status::Ok => ProtoStatus {
            code: StatusCode::Ok as i32,
            message: String::new(),
        },
        Status::Error { description } => ProtoStatus {
            code: StatusCode::Error as i32,
            message: description.to_string(),
        },
    }
}

fn proto_key_value(kv: &KeyValue) -> ProtoKeyValue {
    let value = match &kv.value {
        Value::Bool(b) => any_value::Value::BoolValue(*b),
        Value::I64(i) => any_value::Value::IntValue(*i),
        Value::F64(f) => any_value::Value::DoubleValue(*f),
        other => any_value::Value::StringValue(other.as_str().into_owned()),
    };
    ProtoKeyValue {
        key: kv.key.as_str().to_string(),
        value: Some(AnyValue { value: Some(value) }),
    }
}

fn unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::span::Tracer;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::trace::TracerProvider;

    fn finished(exporter: &InMemoryExporter, record: impl FnOnce(&Tracer)) -> Vec<SpanData> {
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        record(&Tracer::new(provider.tracer("test")));
        provider.force_flush();
        exporter.finished_spans()
    }

    #[test]
    fn test_otlp_rejects_bad_endpoint() {
        let config = TelemetryConfig::default();
        assert!(matches!(
            OtlpHttpExporter::new("not a url", &config),
            Err(TelemetryError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            OtlpHttpExporter::new("ftp://collector", &config),
            Err(TelemetryError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_otlp_url_and_payload() {
        let config = TelemetryConfig::default();
        let exporter = OtlpHttpExporter::new("http://localhost:4318/", &config).unwrap();
        assert_eq!(exporter.url().as_str(), "http://localhost:4318/v1/traces");

        let batch = finished(&InMemoryExporter::new(), |tracer| {
            let mut span = tracer.start_span("paypal_create_order");
            span.set_attribute(KeyValue::new("paypal.order.id", "ORDER1"));
            span.set_attribute(KeyValue::new("http.status_code", 422i64));
            span.record_error("boom");
            span.end();
        });

        let request = exporter.to_export_request(&batch);
        let decoded = ExportTraceServiceRequest::decode(request.encode_to_vec().as_slice()).unwrap();
        let resource_spans = &decoded.resource_spans[0];
        let span = &resource_spans.scope_spans[0].spans[0];

        assert_eq!(span.name, "paypal_create_order");
        assert_eq!(span.trace_id.len(), 16);
        assert_eq!(span.span_id.len(), 8);
        assert!(span.parent_span_id.is_empty());
        assert_eq!(span.status.as_ref().unwrap().code, StatusCode::Error as i32);
        assert_eq!(span.status.as_ref().unwrap().message, "boom");

        let status_code = span
            .attributes
            .iter()
            .find(|kv| kv.key == "http.status_code")
            .and_then(|kv| kv.value.clone())
            .and_then(|v| v.value);
        assert_eq!(status_code, Some(any_value::Value::IntValue(422)));

        let service = &resource_spans.resource.as_ref().unwrap().attributes[0];
        assert_eq!(service.key, "service.name");
        assert_eq!(
            service.value.as_ref().and_then(|v| v.value.clone()),
            Some(any_value::Value::StringValue(
                "paypal-microfrontend-browser".into()
            ))
        );
    }

    #[test]
    fn test_in_memory_exporter_shares_buffer() {
        let exporter = InMemoryExporter::new();
        let handle = exporter.clone();
        finished(&handle, |tracer| tracer.start_span("a").end());

        assert_eq!(exporter.spans_named("a").len(), 1);
        exporter.reset();
        assert!(handle.finished_spans().is_empty());
    }

    #[test]
    fn test_counting_exporter_counts_batches() {
        let exported = Arc::new(AtomicU64::new(0));
        let sink = InMemoryExporter::new();
        let mut counting = CountingExporter::new(Box::new(sink.clone()), exported.clone());

        let batch = finished(&InMemoryExporter::new(), |tracer| {
            tracer.start_span("a").end();
            tracer.start_span("b").end();
        });
        futures_util::FutureExt::now_or_never(counting.export(batch))
            .unwrap()
            .unwrap();

        assert_eq!(exported.load(Ordering::SeqCst), 2);
        assert_eq!(sink.finished_spans().len(), 2);
    }
}
