//! The checkout backend: client id, order creation and order capture.
//!
//! Responses are kept as raw JSON. The widget inspects them the way the
//! payment provider shapes them (`id`, `details[0]`, `purchase_units[0]`),
//! and anything it cannot interpret is reported with the serialized body.
//!
//! [`HttpBackend`] resolves every endpoint as a sibling of the widget's own
//! module URL: `https://shop/static/index.js` → `https://shop/static/orders`.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::model::{ClientCredential, OrderId, Transaction};
use crate::telemetry::{Instrumentation, KeyValue, Telemetry};
use crate::widget::config::WidgetConfig;

/// Issue code the provider uses for a recoverable funding failure.
pub const INSTRUMENT_DECLINED: &str = "INSTRUMENT_DECLINED";

const PLACEHOLDER_PRODUCT_ID: &str = "YOUR_PRODUCT_ID";
const PLACEHOLDER_QUANTITY: &str = "YOUR_PRODUCT_QUANTITY";

/// Errors talking to the backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BackendError::Decode(e.to_string())
        } else {
            BackendError::Network(e.to_string())
        }
    }
}

/// One line of the cart sent with create-order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartItem {
    pub id: String,
    pub quantity: String,
    pub amount: Option<String>,
    pub currency: Option<String>,
}

/// Body of `POST orders`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateOrderRequest {
    pub cart: Vec<CartItem>,
}

impl CreateOrderRequest {
    /// Fixed cart shape carrying the live amount and currency, unvalidated.
    pub fn for_config(config: &WidgetConfig) -> Self {
        Self {
            cart: vec![CartItem {
                id: PLACEHOLDER_PRODUCT_ID.to_string(),
                quantity: PLACEHOLDER_QUANTITY.to_string(),
                amount: config.amount.clone(),
                currency: config.currency.clone(),
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClientIdResponse {
    clientid: String,
}

/// Decodes `{ "clientid": "..." }`.
pub fn parse_client_id(value: Value) -> Result<ClientCredential, BackendError> {
    let response: ClientIdResponse =
        serde_json::from_value(value).map_err(|e| BackendError::Decode(e.to_string()))?;
    Ok(ClientCredential {
        client_id: response.clientid,
    })
}

/// First entry of a `details` array in an error response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub issue: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ErrorDetail {
    pub fn is_instrument_declined(&self) -> bool {
        self.issue.as_deref() == Some(INSTRUMENT_DECLINED)
    }
}

/// `null`, `false`, `0` and `""` count as absent, the way the provider's
/// reference client tests response fields.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    }
}

fn present<'v>(raw: &'v Value, pointer: &str) -> Option<&'v Value> {
    raw.pointer(pointer).filter(|value| is_present(value))
}

fn first_error_detail(raw: &Value) -> Option<ErrorDetail> {
    let detail = present(raw, "/details/0")?;
    Some(serde_json::from_value(detail.clone()).unwrap_or_default())
}

/// Field of a transaction record as text; absent fields read as empty.
fn record_field(record: &Value, key: &str) -> String {
    match record.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn debug_id(raw: &Value) -> String {
    match raw.get("debug_id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// A create-order response.
#[derive(Debug, Clone)]
pub struct OrderResponse<'a> {
    raw: &'a Value,
}

impl<'a> OrderResponse<'a> {
    pub fn new(raw: &'a Value) -> Self {
        Self { raw }
    }

    /// The order id, when present and non-empty.
    pub fn order_id(&self) -> Option<OrderId> {
        match self.raw.get("id")? {
            Value::String(s) if !s.is_empty() => Some(OrderId::new(s.clone())),
            Value::Number(n) => Some(OrderId::new(n.to_string())),
            _ => None,
        }
    }

    /// `issue description (debug_id)` from the first error detail, or the whole body.
    pub fn error_message(&self) -> String {
        match first_error_detail(self.raw) {
            Some(detail) => format!(
                "{} {} ({})",
                detail.issue.unwrap_or_default(),
                detail.description.unwrap_or_default(),
                debug_id(self.raw)
            ),
            None => self.raw.to_string(),
        }
    }
}

/// A capture response.
#[derive(Debug, Clone)]
pub struct CaptureResponse<'a> {
    raw: &'a Value,
}

impl<'a> CaptureResponse<'a> {
    pub fn new(raw: &'a Value) -> Self {
        Self { raw }
    }

    pub fn error_detail(&self) -> Option<ErrorDetail> {
        first_error_detail(self.raw)
    }

    /// `description (debug_id)` for a reported capture error.
    pub fn failure_reason(&self, detail: &ErrorDetail) -> String {
        format!(
            "{} ({})",
            detail.description.clone().unwrap_or_default(),
            debug_id(self.raw)
        )
    }

    pub fn has_purchase_units(&self) -> bool {
        present(self.raw, "/purchase_units").is_some()
    }

    /// The capture record of the first purchase unit, else its authorization record.
    ///
    /// The record is picked by presence alone; `id` and `status` are read
    /// from whichever record won, even when they are missing.
    pub fn transaction(&self) -> Option<Transaction> {
        let record = present(self.raw, "/purchase_units/0/payments/captures/0")
            .or_else(|| present(self.raw, "/purchase_units/0/payments/authorizations/0"))?;
        Some(Transaction {
            id: record_field(record, "id"),
            status: record_field(record, "status"),
        })
    }
}

/// The three backend endpoints the checkout widget calls.
#[async_trait]
pub trait CheckoutBackend: Send + Sync {
    /// `GET clientid`
    async fn client_id(&self) -> Result<ClientCredential, BackendError>;

    /// `POST orders`; returns the raw response body.
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<Value, BackendError>;

    /// `POST capture/{orderId}`; returns the raw response body.
    async fn capture_order(&self, order_id: &OrderId) -> Result<Value, BackendError>;
}

/// [`CheckoutBackend`] over HTTP.
///
/// No timeouts and no retries: a failed request is reported once.
/// Non-success statuses are not errors, the JSON body is returned as-is.
pub struct HttpBackend {
    client: reqwest::Client,
    module_url: Url,
    telemetry: Telemetry,
}

impl HttpBackend {
    pub fn new(module_url: &str, telemetry: Telemetry) -> Result<Self, BackendError> {
        let module_url =
            Url::parse(module_url).map_err(|e| BackendError::InvalidUrl(format!("{module_url}: {e}")))?;
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            module_url,
            telemetry,
        })
    }

    /// Resolves `path` next to the module URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.module_url
            .join(path)
            .map_err(|e| BackendError::InvalidUrl(format!("{path}: {e}")))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&CreateOrderRequest>,
    ) -> Result<Value, BackendError> {
        let url = self.endpoint(path)?;
        let mut span = self
            .telemetry
            .is_instrumented(Instrumentation::Fetch)
            .then(|| {
                let mut span = self.telemetry.tracer().start_span(format!("HTTP {method}"));
                span.set_attributes([
                    KeyValue::new("http.method", method.to_string()),
                    KeyValue::new("http.url", url.to_string()),
                ]);
                span
            });

        let mut request = self
            .client
            .request(method, url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let result = async {
            let response = request.send().await?;
            if let Some(span) = span.as_mut() {
                span.set_attribute(KeyValue::new("http.status_code", i64::from(response.status().as_u16())));
            }
            debug!(status = %response.status(), "Backend responded");
            Ok::<Value, BackendError>(response.json::<Value>().await?)
        }
        .await;

        if let (Some(span), Err(e)) = (span.as_mut(), &result) {
            span.record_error(e.to_string());
        }
        if let Some(mut span) = span {
            span.end();
        }
        result
    }
}

#[async_trait]
impl CheckoutBackend for HttpBackend {
    #[instrument(skip(self))]
    async fn client_id(&self) -> Result<ClientCredential, BackendError> {
        let value = self.send(Method::GET, "clientid", None).await?;
        parse_client_id(value)
    }

    #[instrument(skip(self, request))]
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<Value, BackendError> {
        self.send(Method::POST, "orders", Some(request)).await
    }

    #[instrument(skip(self))]
    async fn capture_order(&self, order_id: &OrderId) -> Result<Value, BackendError> {
        self.send(Method::POST, &format!("capture/{order_id}"), None).await
    }
}
