//! Counters and histograms.
//!
//! A [`Meter`] wraps an SDK meter provider with a [`ManualReader`] attached,
//! so recorded values can be read back with [`Meter::counter_value`] and
//! [`Meter::histogram`]. When instrument creation fails the checkout code gets
//! [`CheckoutMetrics::mock`] instead: same interface, values are only logged.

use opentelemetry::metrics::{MeterProvider as _, Unit};
use opentelemetry::{Key, KeyValue, Value};
use opentelemetry_sdk::metrics::data::{self, ResourceMetrics, Temporality};
use opentelemetry_sdk::metrics::reader::{AggregationSelector, MetricReader, TemporalitySelector};
use opentelemetry_sdk::metrics::{
    Aggregation, InstrumentKind, ManualReader, Pipeline, SdkMeterProvider,
};
use opentelemetry_sdk::Resource;
use serde::Serialize;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

use super::error::TelemetryError;

/// Aggregated histogram samples for one label set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramData {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

/// A [`ManualReader`] shared by the meter provider and the [`Meter`] that reads it back.
#[derive(Debug, Clone)]
struct SharedReader(Arc<ManualReader>);

impl TemporalitySelector for SharedReader {
    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.0.temporality(kind)
    }
}

impl AggregationSelector for SharedReader {
    fn aggregation(&self, kind: InstrumentKind) -> Aggregation {
        self.0.aggregation(kind)
    }
}

impl MetricReader for SharedReader {
    fn register_pipeline(&self, pipeline: Weak<Pipeline>) {
        self.0.register_pipeline(pipeline)
    }

    fn collect(&self, rm: &mut ResourceMetrics) -> opentelemetry::metrics::Result<()> {
        self.0.collect(rm)
    }

    fn force_flush(&self) -> opentelemetry::metrics::Result<()> {
        self.0.force_flush()
    }

    fn shutdown(&self) -> opentelemetry::metrics::Result<()> {
        self.0.shutdown()
    }
}

/// Creates instruments and reads back what they recorded.
#[derive(Clone)]
pub struct Meter {
    scope: Arc<str>,
    _provider: SdkMeterProvider,
    meter: opentelemetry::metrics::Meter,
    reader: SharedReader,
}

impl Meter {
    pub fn new(scope: &str, resource: Resource) -> Self {
        let reader = SharedReader(Arc::new(ManualReader::builder().build()));
        let provider = SdkMeterProvider::builder()
            .with_resource(resource)
            .with_reader(reader.clone())
            .build();
        let meter = provider.meter(scope.to_string());
        Self {
            scope: Arc::from(scope),
            _provider: provider,
            meter,
            reader,
        }
    }

    pub fn create_counter(&self, name: &str, description: &str) -> Result<Counter, TelemetryError> {
        validate_instrument_name(name)?;
        let counter = self
            .meter
            .u64_counter(name.to_string())
            .with_description(description.to_string())
            .try_init()?;
        debug!(scope = %self.scope, name, description, "Counter created");
        Ok(Counter {
            name: Arc::from(name),
            inner: Some(counter),
        })
    }

    pub fn create_histogram(
        &self,
        name: &str,
        description: &str,
        unit: &str,
    ) -> Result<Histogram, TelemetryError> {
        validate_instrument_name(name)?;
        let histogram = self
            .meter
            .f64_histogram(name.to_string())
            .with_description(description.to_string())
            .with_unit(Unit::new(unit.to_string()))
            .try_init()?;
        debug!(scope = %self.scope, name, description, unit, "Histogram created");
        Ok(Histogram {
            name: Arc::from(name),
            inner: Some(histogram),
        })
    }

    /// Sum of `name` over every label set that includes `labels`.
    pub fn counter_value(&self, name: &str, labels: &[KeyValue]) -> u64 {
        let metrics = self.collect();
        metrics
            .scope_metrics
            .iter()
            .flat_map(|scope| &scope.metrics)
            .filter(|metric| metric.name == name)
            .filter_map(|metric| metric.data.as_any().downcast_ref::<data::Sum<u64>>())
            .flat_map(|sum| &sum.data_points)
            .filter(|point| has_labels(point.attributes.iter(), labels, false))
            .map(|point| point.value)
            .sum()
    }

    /// Histogram data recorded under exactly `labels`.
    pub fn histogram(&self, name: &str, labels: &[KeyValue]) -> Option<HistogramData> {
        let metrics = self.collect();
        let point = metrics
            .scope_metrics
            .iter()
            .flat_map(|scope| &scope.metrics)
            .filter(|metric| metric.name == name)
            .filter_map(|metric| metric.data.as_any().downcast_ref::<data::Histogram<f64>>())
            .flat_map(|histogram| &histogram.data_points)
            .find(|point| has_labels(point.attributes.iter(), labels, true))?;
        Some(HistogramData {
            count: point.count,
            sum: point.sum,
            min: point.min.unwrap_or(point.sum),
            max: point.max.unwrap_or(point.sum),
        })
    }

    /// Total samples recorded by histogram `name` across all label sets.
    pub fn histogram_count(&self, name: &str) -> u64 {
        let metrics = self.collect();
        metrics
            .scope_metrics
            .iter()
            .flat_map(|scope| &scope.metrics)
            .filter(|metric| metric.name == name)
            .filter_map(|metric| metric.data.as_any().downcast_ref::<data::Histogram<f64>>())
            .flat_map(|histogram| &histogram.data_points)
            .map(|point| point.count)
            .sum()
    }

    fn collect(&self) -> ResourceMetrics {
        let mut metrics = ResourceMetrics {
            resource: Resource::empty(),
            scope_metrics: Vec::new(),
        };
        if let Err(e) = self.reader.collect(&mut metrics) {
            debug!(scope = %self.scope, error = %e, "Metric collection failed");
        }
        metrics
    }
}

/// True when every label is present; with `exact`, no other attribute is either.
fn has_labels<'a>(
    attributes: impl Iterator<Item = (&'a Key, &'a Value)>,
    labels: &[KeyValue],
    exact: bool,
) -> bool {
    let attributes: Vec<(&Key, &Value)> = attributes.collect();
    (!exact || attributes.len() == labels.len())
        && labels
            .iter()
            .all(|label| attributes.iter().any(|(k, v)| **k == label.key && **v == label.value))
}

/// Instrument names: ASCII letter first, then letters, digits, `_`, `.`, `-`; at most 255 chars.
fn validate_instrument_name(name: &str) -> Result<(), TelemetryError> {
    let mut chars = name.chars();
    let valid = name.len() <= 255
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(TelemetryError::InvalidInstrumentName(name.to_string()))
    }
}

/// Monotonic counter. Without an SDK instrument it only logs.
#[derive(Clone)]
pub struct Counter {
    name: Arc<str>,
    inner: Option<opentelemetry::metrics::Counter<u64>>,
}

impl Counter {
    pub fn mock(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            inner: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&self, delta: u64, labels: &[KeyValue]) {
        match &self.inner {
            Some(counter) => counter.add(delta, labels),
            None => info!(metric = %self.name, value = delta, attributes = ?labels, "Mock metric"),
        }
    }
}

/// Distribution of recorded values. Without an SDK instrument it only logs.
#[derive(Clone)]
pub struct Histogram {
    name: Arc<str>,
    inner: Option<opentelemetry::metrics::Histogram<f64>>,
}

impl Histogram {
    pub fn mock(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            inner: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record(&self, value: f64, labels: &[KeyValue]) {
        match &self.inner {
            Some(histogram) => histogram.record(value, labels),
            None => info!(metric = %self.name, value, attributes = ?labels, "Mock histogram"),
        }
    }
}

/// Instrument names used by the checkout widget, without namespace.
pub mod names {
    pub const BUTTON_CLICKS: &str = "button_clicks";
    pub const ORDER_CREATIONS: &str = "order_creations";
    pub const ORDER_CAPTURES: &str = "order_captures";
    pub const ERRORS: &str = "errors";
    pub const TRANSACTION_DURATION: &str = "transaction_duration";
}

/// The checkout instruments.
#[derive(Clone)]
pub struct CheckoutMetrics {
    pub button_clicks: Counter,
    pub order_creations: Counter,
    pub order_captures: Counter,
    pub errors: Counter,
    pub transaction_duration: Histogram,
}

impl CheckoutMetrics {
    pub fn create(meter: &Meter, namespace: &str) -> Result<Self, TelemetryError> {
        let name = |suffix: &str| format!("{namespace}_{suffix}");
        Ok(Self {
            button_clicks: meter
                .create_counter(&name(names::BUTTON_CLICKS), "Number of PayPal button clicks")?,
            order_creations: meter
                .create_counter(&name(names::ORDER_CREATIONS), "Number of PayPal order creations")?,
            order_captures: meter
                .create_counter(&name(names::ORDER_CAPTURES), "Number of PayPal order captures")?,
            errors: meter.create_counter(&name(names::ERRORS), "Number of PayPal errors")?,
            transaction_duration: meter.create_histogram(
                &name(names::TRANSACTION_DURATION),
                "Duration of PayPal transactions",
                "ms",
            )?,
        })
    }

    /// Logging-only instruments with the same names.
    pub fn mock(namespace: &str) -> Self {
        let name = |suffix: &str| format!("{namespace}_{suffix}");
        Self {
            button_clicks: Counter::mock(&name(names::BUTTON_CLICKS)),
            order_creations: Counter::mock(&name(names::ORDER_CREATIONS)),
            order_captures: Counter::mock(&name(names::ORDER_CAPTURES)),
            errors: Counter::mock(&name(names::ERRORS)),
            transaction_duration: Histogram::mock(&name(names::TRANSACTION_DURATION)),
        }
    }

    pub fn record_error(&self, error_type: &'static str) {
        self.errors.add(1, &[KeyValue::new("error_type", error_type)]);
    }

    pub fn record_duration(&self, duration_ms: f64, operation: &'static str, status: &'static str) {
        self.transaction_duration.record(
            duration_ms,
            &[
                KeyValue::new("operation", operation),
                KeyValue::new("status", status),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_accumulates_per_label_set() {
        let meter = Meter::new("test", Resource::empty());
        let errors = meter.create_counter("paypal_errors", "").unwrap();

        errors.add(1, &[KeyValue::new("error_type", "capture_failed")]);
        errors.add(2, &[KeyValue::new("error_type", "capture_failed")]);
        errors.add(1, &[KeyValue::new("error_type", "sdk_load_failure")]);

        assert_eq!(
            meter.counter_value("paypal_errors", &[KeyValue::new("error_type", "capture_failed")]),
            3
        );
        assert_eq!(meter.counter_value("paypal_errors", &[]), 4);
        assert_eq!(meter.counter_value("missing", &[]), 0);
    }

    #[test]
    fn test_histogram_aggregates() {
        let meter = Meter::new("test", Resource::empty());
        let duration = meter.create_histogram("duration", "", "ms").unwrap();
        let labels = [KeyValue::new("status", "success"), KeyValue::new("operation", "x")];

        duration.record(5.0, &labels);
        duration.record(15.0, &labels);

        // Label order does not matter.
        let data = meter
            .histogram("duration", &[KeyValue::new("operation", "x"), KeyValue::new("status", "success")])
            .unwrap();
        assert_eq!(data.count, 2);
        assert_eq!(data.sum, 20.0);
        assert_eq!(data.min, 5.0);
        assert_eq!(data.max, 15.0);
        assert_eq!(meter.histogram_count("duration"), 2);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let meter = Meter::new("test", Resource::empty());
        for name in ["", "1abc", "has space", "bad/slash"] {
            assert!(matches!(
                meter.create_counter(name, ""),
                Err(TelemetryError::InvalidInstrumentName(_))
            ));
        }
        assert!(meter.create_counter("a.b-c_d", "").is_ok());
        assert!(CheckoutMetrics::create(&meter, "bad namespace").is_err());
    }

    #[test]
    fn test_mock_instruments_do_not_record() {
        let meter = Meter::new("test", Resource::empty());
        let metrics = CheckoutMetrics::mock("paypal");
        metrics.record_error("capture_failed");
        metrics.record_duration(1.0, "create_order", "success");
        assert_eq!(metrics.errors.name(), "paypal_errors");
        assert_eq!(meter.counter_value("paypal_errors", &[]), 0);
    }
}
