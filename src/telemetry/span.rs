//! Spans and the tracer that opens them.
//!
//! [`Tracer`] wraps the SDK tracer; the [`Span`] it hands out is a guard over
//! an SDK span and is closed exactly once, either by an explicit
//! [`Span::end`] or when it is dropped. Closing hands the span to the
//! provider's span processor.

use opentelemetry::trace::{Span as _, Status, Tracer as _};
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace as sdktrace;
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Default)]
struct SpanStats {
    started: AtomicU64,
    ended: AtomicU64,
}

/// One traced operation.
pub struct Span {
    inner: sdktrace::Span,
    name: Cow<'static, str>,
    started_at: Instant,
    ended: bool,
    stats: Arc<SpanStats>,
}

impl Span {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Milliseconds since the span was opened.
    pub fn elapsed_ms(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64() * 1000.0
    }

    pub fn set_attribute(&mut self, attribute: KeyValue) {
        if self.ended {
            debug!(span = %self.name, key = attribute.key.as_str(), "Attribute set on ended span");
            return;
        }
        self.inner.set_attribute(attribute);
    }

    pub fn set_attributes(&mut self, attributes: impl IntoIterator<Item = KeyValue>) {
        for attribute in attributes {
            self.set_attribute(attribute);
        }
    }

    /// Tags the span as failed: `error = true`, `error.message`, error status.
    pub fn record_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.set_attributes([
            KeyValue::new("error", true),
            KeyValue::new("error.message", message.clone()),
        ]);
        if !self.ended {
            self.inner.set_status(Status::error(message));
        }
    }

    /// Closes the span. Later calls are no-ops.
    pub fn end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.inner.end();
        self.stats.ended.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        self.end();
    }
}

/// Opens spans and counts how many were opened and closed.
#[derive(Clone)]
pub struct Tracer {
    inner: sdktrace::Tracer,
    stats: Arc<SpanStats>,
}

impl Tracer {
    pub fn new(inner: sdktrace::Tracer) -> Self {
        Self {
            inner,
            stats: Arc::new(SpanStats::default()),
        }
    }

    pub fn start_span(&self, name: impl Into<Cow<'static, str>>) -> Span {
        let name = name.into();
        self.stats.started.fetch_add(1, Ordering::SeqCst);
        debug!(span = %name, "Span started");
        Span {
            inner: self.inner.start(name.clone()),
            name,
            started_at: Instant::now(),
            ended: false,
            stats: self.stats.clone(),
        }
    }

    pub fn spans_started(&self) -> u64 {
        self.stats.started.load(Ordering::SeqCst)
    }

    pub fn spans_ended(&self) -> u64 {
        self.stats.ended.load(Ordering::SeqCst)
    }

    /// Spans opened but not yet closed.
    ///
    /// `ended` is read first: a span is counted as started before it can be
    /// counted as ended, so the later `started` read is never smaller.
    pub fn open_spans(&self) -> u64 {
        let ended = self.spans_ended();
        self.spans_started().saturating_sub(ended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::exporter::{InMemoryExporter, SpanDataExt};
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::Value;

    fn tracer_for(exporter: &InMemoryExporter) -> (sdktrace::TracerProvider, Tracer) {
        let provider = sdktrace::TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let tracer = Tracer::new(provider.tracer("test"));
        (provider, tracer)
    }

    #[test]
    fn test_span_closes_exactly_once() {
        let exporter = InMemoryExporter::new();
        let (provider, tracer) = tracer_for(&exporter);

        let mut span = tracer.start_span("op");
        span.set_attribute(KeyValue::new("k", "v"));
        span.end();
        span.end();
        drop(span);
        provider.force_flush();

        assert_eq!(tracer.spans_started(), 1);
        assert_eq!(tracer.spans_ended(), 1);
        let spans = exporter.finished_spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].attribute("k"), Some(&Value::from("v")));
        assert!(spans[0].end_time >= spans[0].start_time);
    }

    #[test]
    fn test_drop_closes_span() {
        let exporter = InMemoryExporter::new();
        let (provider, tracer) = tracer_for(&exporter);

        {
            let _span = tracer.start_span("early_return");
        }
        provider.force_flush();

        assert_eq!(tracer.open_spans(), 0);
        assert_eq!(exporter.finished_spans()[0].name, "early_return");
    }

    #[test]
    fn test_record_error_sets_status() {
        let exporter = InMemoryExporter::new();
        let (provider, tracer) = tracer_for(&exporter);

        let mut span = tracer.start_span("op");
        span.record_error("boom");
        span.end();
        span.set_attribute(KeyValue::new("late", true));
        provider.force_flush();

        let spans = exporter.finished_spans();
        assert_eq!(spans[0].attribute("error"), Some(&Value::Bool(true)));
        assert_eq!(spans[0].attribute("error.message"), Some(&Value::from("boom")));
        assert_eq!(spans[0].status, Status::error("boom"));
        assert!(spans[0].attribute("late").is_none());
    }

    #[test]
    fn test_open_spans_under_concurrent_close() {
        let exporter = InMemoryExporter::new();
        let (_provider, tracer) = tracer_for(&exporter);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let tracer = tracer.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        tracer.start_span("busy").end();
                    }
                })
            })
            .collect();

        // Reading while other threads open and close spans must never wrap around.
        while workers.iter().any(|worker| !worker.is_finished()) {
            assert!(tracer.open_spans() <= tracer.spans_started());
        }
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(tracer.spans_started(), 1000);
        assert_eq!(tracer.open_spans(), 0);
    }
}
