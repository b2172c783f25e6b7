//! `<x-paypal>`: the checkout button group.
//!
//! Mounting fetches the client id, loads the SDK and renders the buttons.
//! The buttons then call back into an [`OrderFlow`], which talks to the
//! backend. Every step is logged, traced and counted through the widget's
//! [`Telemetry`], and every failure is reported where it happens: nothing
//! escapes [`CheckoutWidget::connected`] or the hooks.
//!
//! | Span | Opened by | Success attributes |
//! |------|-----------|--------------------|
//! | `paypal_component_init` | mount | |
//! | `paypal_create_order` | create-order hook | `paypal.order.{id,amount,currency,duration_ms}` |
//! | `paypal_capture_order` | approve hook | `paypal.order.id`, `paypal.transaction.{id,status,duration_ms}` |
//!
//! Failed spans carry `error = true` and `error.message`.

use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use super::config::{Attributes, WidgetConfig, OBSERVED_ATTRIBUTES};
use super::dom::Element;
use super::state::{StateCell, WidgetState};
use crate::backend::{CaptureResponse, CheckoutBackend, CreateOrderRequest, OrderResponse};
use crate::error::{error_type, CheckoutError};
use crate::model::{CaptureOutcome, OrderId, Transaction};
use crate::sdk::{
    ApproveActions, ApproveData, ButtonMessage, ButtonStyle, ButtonsOptions, CheckoutHooks, CheckoutSdk,
    SdkError, SdkOptions,
};
use crate::telemetry::{KeyValue, Telemetry};

pub mod span_names {
    pub const COMPONENT_INIT: &str = "paypal_component_init";
    pub const CREATE_ORDER: &str = "paypal_create_order";
    pub const CAPTURE_ORDER: &str = "paypal_capture_order";
}

pub const BUTTON_CONTAINER_ID: &str = "paypal-button-container";
pub const RESULT_MESSAGE_ID: &str = "result-message";

const SKELETON: &str = r#"
<div id="paypal-button-container"></div>

<p id="result-message"></p>
"#;

/// The checkout widget.
pub struct CheckoutWidget {
    telemetry: Telemetry,
    backend: Arc<dyn CheckoutBackend>,
    sdk: Arc<dyn CheckoutSdk>,
    attributes: Mutex<Attributes>,
    state: Arc<StateCell>,
}

impl CheckoutWidget {
    pub const TAG: &'static str = "x-paypal";

    pub fn new(
        telemetry: Telemetry,
        backend: Arc<dyn CheckoutBackend>,
        sdk: Arc<dyn CheckoutSdk>,
        attributes: Attributes,
    ) -> Self {
        Self {
            telemetry,
            backend,
            sdk,
            attributes: Mutex::new(attributes),
            state: Arc::new(StateCell::new()),
        }
    }

    pub fn observed_attributes() -> &'static [&'static str] {
        OBSERVED_ATTRIBUTES
    }

    /// Records a new attribute value. The rendered buttons keep the values
    /// they were mounted with; the change applies on the next mount.
    pub fn attribute_changed(&self, name: &str, old_value: Option<&str>, new_value: Option<&str>) {
        {
            let mut attributes = self.attributes.lock().unwrap_or_else(PoisonError::into_inner);
            match new_value {
                Some(value) => attributes.insert(name.to_string(), value.to_string()),
                None => attributes.remove(name),
            };
        }
        self.telemetry.logger().info(
            "PayPal attribute changed",
            json!({ "name": name, "oldValue": old_value, "newValue": new_value }),
        );
    }

    pub fn config(&self) -> WidgetConfig {
        WidgetConfig::from_attributes(&self.attributes.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn state(&self) -> WidgetState {
        self.state.current()
    }

    pub fn history(&self) -> Vec<WidgetState> {
        self.state.history()
    }

    /// Attach callback. Mount failures are already reported, so they stop here.
    pub async fn connected(&self, host: Arc<dyn Element>) {
        if let Err(e) = self.mount(host).await {
            debug!(error = %e, "PayPal component not mounted");
        }
    }

    /// Runs the mount under the `paypal_component_init` span.
    pub async fn mount(&self, host: Arc<dyn Element>) -> Result<(), CheckoutError> {
        let config = self.config();
        let logger = self.telemetry.logger();

        self.state.transition(WidgetState::Initializing);
        let mut span = self.telemetry.tracer().start_span(span_names::COMPONENT_INIT);
        logger.info(
            "Initializing PayPal component",
            json!({ "amount": config.amount, "currency": config.currency }),
        );

        let result = self.initialize(&config, host).await;
        if let Err(e) = &result {
            let message = match e {
                CheckoutError::SdkLoad(_) => "Failed to load PayPal SDK",
                CheckoutError::ButtonRender(_) => "Failed to render PayPal buttons",
                _ => "Failed to initialize PayPal component",
            };
            if let Some(error_type) = e.error_type() {
                self.telemetry.metrics().record_error(error_type);
            }
            logger.error(message, json!({ "error": e.to_string() }));
            span.record_error(e.to_string());
            self.state.transition(WidgetState::MountFailed);
        }
        span.end();
        result
    }

    async fn initialize(&self, config: &WidgetConfig, host: Arc<dyn Element>) -> Result<(), CheckoutError> {
        let logger = self.telemetry.logger();

        let credential = self.backend.client_id().await.map_err(CheckoutError::ConfigFetch)?;
        host.set_inner_html(SKELETON);

        let options = SdkOptions {
            client_id: credential.client_id,
            currency: config.currency.clone(),
        };
        let sdk = self.sdk.load(&options).await.map_err(CheckoutError::SdkLoad)?;
        self.state.transition(WidgetState::SdkLoaded);
        logger.info(
            "PayPal SDK loaded successfully",
            json!({ "clientId": options.client_id, "currency": options.currency }),
        );

        let container = host.child(BUTTON_CONTAINER_ID).ok_or_else(|| {
            CheckoutError::ButtonRender(SdkError::new(format!("#{BUTTON_CONTAINER_ID} not found")))
        })?;
        let flow = Arc::new(OrderFlow {
            telemetry: self.telemetry.clone(),
            backend: self.backend.clone(),
            config: config.clone(),
            state: self.state.clone(),
            result_message: host.child(RESULT_MESSAGE_ID),
        });
        let buttons = ButtonsOptions {
            style: ButtonStyle::default(),
            message: ButtonMessage {
                amount: config.amount.clone(),
            },
        };
        sdk.render_buttons(buttons, flow, container)
            .await
            .map_err(CheckoutError::ButtonRender)?;

        self.state.transition(WidgetState::ButtonRendered);
        logger.info("PayPal buttons rendered", json!({ "container": BUTTON_CONTAINER_ID }));
        Ok(())
    }
}

/// The create-order and approve hooks of one mounted button group.
pub struct OrderFlow {
    telemetry: Telemetry,
    backend: Arc<dyn CheckoutBackend>,
    config: WidgetConfig,
    state: Arc<StateCell>,
    result_message: Option<Arc<dyn Element>>,
}

impl OrderFlow {
    fn show_result(&self, html: &str) {
        match &self.result_message {
            Some(element) => element.set_inner_html(html),
            None => warn!(message = html, "Result message element missing"),
        }
    }

    async fn request_order(&self) -> Result<OrderId, CheckoutError> {
        let raw = self
            .backend
            .create_order(&CreateOrderRequest::for_config(&self.config))
            .await?;
        let response = OrderResponse::new(&raw);
        match response.order_id() {
            Some(order_id) => Ok(order_id),
            None => Err(CheckoutError::OrderCreation {
                message: response.error_message(),
                response: raw.clone(),
            }),
        }
    }

    async fn capture(&self, order_id: &OrderId) -> Result<Transaction, CheckoutError> {
        let raw = self.backend.capture_order(order_id).await?;
        debug!(response = %raw, "Capture result");
        let response = CaptureResponse::new(&raw);

        if let Some(detail) = response.error_detail() {
            if detail.is_instrument_declined() {
                return Err(CheckoutError::CaptureDeclined {
                    order_id: order_id.clone(),
                    detail,
                });
            }
            return Err(CheckoutError::CaptureFailed {
                reason: response.failure_reason(&detail),
                detail,
            });
        }
        if !response.has_purchase_units() {
            return Err(CheckoutError::CaptureResponseShape { response: raw.clone() });
        }
        response
            .transaction()
            .ok_or_else(|| CheckoutError::CaptureResponseShape { response: raw.clone() })
    }

    fn order_attributes(&self, order_id: &OrderId, duration_ms: f64) -> Vec<KeyValue> {
        let mut attributes = vec![KeyValue::new("paypal.order.id", order_id.to_string())];
        if let Some(amount) = &self.config.amount {
            attributes.push(KeyValue::new("paypal.order.amount", amount.clone()));
        }
        if let Some(currency) = &self.config.currency {
            attributes.push(KeyValue::new("paypal.order.currency", currency.clone()));
        }
        attributes.push(KeyValue::new("paypal.order.duration_ms", duration_ms));
        attributes
    }
}

#[async_trait]
impl CheckoutHooks for OrderFlow {
    async fn create_order(&self) -> Result<OrderId, CheckoutError> {
        let metrics = self.telemetry.metrics();
        let logger = self.telemetry.logger();

        self.state.transition(WidgetState::OrderPending);
        let mut span = self.telemetry.tracer().start_span(span_names::CREATE_ORDER);
        logger.info(
            "Creating PayPal order",
            json!({ "amount": self.config.amount, "currency": self.config.currency }),
        );
        metrics.button_clicks.add(1, &[KeyValue::new("action", "create_order")]);

        let result = self.request_order().await;
        let duration = span.elapsed_ms();

        match &result {
            Ok(order_id) => {
                metrics.order_creations.add(1, &[KeyValue::new("status", "success")]);
                logger.info(
                    "PayPal order created successfully",
                    json!({
                        "orderId": order_id,
                        "amount": self.config.amount,
                        "currency": self.config.currency,
                    }),
                );
                metrics.record_duration(duration, "create_order", "success");
                span.set_attributes(self.order_attributes(order_id, duration));
                self.state.transition(WidgetState::AwaitingApproval);
            }
            Err(e) => {
                metrics.record_error(e.error_type().unwrap_or(error_type::ORDER_CREATION_EXCEPTION));
                match e {
                    CheckoutError::OrderCreation { response, .. } => logger.error(
                        "PayPal order creation failed",
                        json!({ "error": e.to_string(), "orderData": response }),
                    ),
                    _ => logger.error(
                        "Exception during PayPal order creation",
                        json!({ "error": e.to_string() }),
                    ),
                }
                metrics.record_duration(duration, "create_order", "error");
                span.record_error(e.to_string());
                span.set_attribute(KeyValue::new("paypal.order.duration_ms", duration));
                self.show_result(&format!("Could not initiate PayPal Checkout...<br><br>{e}"));
                self.state.transition(WidgetState::Failed);
            }
        }

        span.end();
        result
    }

    async fn on_approve(&self, data: ApproveData, actions: &dyn ApproveActions) -> CaptureOutcome {
        let metrics = self.telemetry.metrics();
        let logger = self.telemetry.logger();
        let order_id = data.order_id;

        self.state.transition(WidgetState::Capturing);
        let mut span = self.telemetry.tracer().start_span(span_names::CAPTURE_ORDER);
        logger.info("Capturing PayPal order", json!({ "orderId": order_id }));
        metrics.button_clicks.add(1, &[KeyValue::new("action", "capture_order")]);

        let result = self.capture(&order_id).await;
        let duration = span.elapsed_ms();

        let outcome = match result {
            Ok(transaction) => {
                metrics.order_captures.add(1, &[KeyValue::new("status", "success")]);
                logger.info(
                    "PayPal transaction completed successfully",
                    json!({
                        "orderId": order_id,
                        "transactionId": transaction.id,
                        "status": transaction.status,
                    }),
                );
                metrics.record_duration(duration, "capture_order", "success");
                span.set_attributes([
                    KeyValue::new("paypal.order.id", order_id.to_string()),
                    KeyValue::new("paypal.transaction.id", transaction.id.clone()),
                    KeyValue::new("paypal.transaction.status", transaction.status.clone()),
                    KeyValue::new("paypal.transaction.duration_ms", duration),
                ]);
                self.show_result(&format!(
                    "Transaction {}: {}<br><br>See console for all available details",
                    transaction.status, transaction.id
                ));
                self.state.transition(WidgetState::Settled);
                CaptureOutcome::Captured {
                    transaction_id: transaction.id,
                    status: transaction.status,
                }
            }
            Err(CheckoutError::CaptureDeclined { detail, .. }) => {
                logger.warn(
                    "PayPal instrument declined, restarting",
                    json!({ "orderId": order_id, "error": detail }),
                );
                self.state.transition(WidgetState::Declined);
                actions.restart().await;
                CaptureOutcome::Declined { recoverable: true }
            }
            Err(e) => {
                metrics.record_error(e.error_type().unwrap_or(error_type::CAPTURE_EXCEPTION));
                match &e {
                    CheckoutError::CaptureFailed { detail, .. } => logger.error(
                        "PayPal capture failed",
                        json!({ "orderId": order_id, "error": detail }),
                    ),
                    CheckoutError::CaptureResponseShape { response } => logger.error(
                        "Invalid PayPal capture response",
                        json!({ "orderId": order_id, "orderData": response }),
                    ),
                    _ => logger.error(
                        "Exception during PayPal capture",
                        json!({ "orderId": order_id, "error": e.to_string() }),
                    ),
                }
                metrics.record_duration(duration, "capture_order", "error");
                span.record_error(e.to_string());
                span.set_attributes([
                    KeyValue::new("paypal.order.id", order_id.to_string()),
                    KeyValue::new("paypal.transaction.duration_ms", duration),
                ]);
                self.show_result(&format!(
                    "Sorry, your transaction could not be processed...<br><br>{e}"
                ));
                self.state.transition(WidgetState::Failed);
                CaptureOutcome::Failed { reason: e.to_string() }
            }
        };

        span.end();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, MockSdk};
    use crate::telemetry::{InMemoryExporter, TelemetryConfig};

    #[tokio::test]
    async fn test_attribute_change_applies_to_next_mount() {
        let telemetry = Telemetry::with_exporter(TelemetryConfig::default(), InMemoryExporter::new());
        let widget = CheckoutWidget::new(
            telemetry,
            Arc::new(MockBackend::new()),
            Arc::new(MockSdk::new()),
            Attributes::from([("amount".to_string(), "10.00".to_string())]),
        );

        assert_eq!(CheckoutWidget::observed_attributes(), &["amount"]);
        widget.attribute_changed("amount", Some("10.00"), Some("25.00"));
        assert_eq!(widget.config().amount.as_deref(), Some("25.00"));

        widget.attribute_changed("amount", Some("25.00"), None);
        assert_eq!(widget.config().amount, None);
        assert_eq!(widget.state(), WidgetState::Idle);
    }

    #[tokio::test]
    async fn test_missing_container_is_a_render_failure() {
        struct Bare;
        impl Element for Bare {
            fn set_inner_html(&self, _html: &str) {}
            fn inner_html(&self) -> String {
                String::new()
            }
            fn child(&self, _id: &str) -> Option<Arc<dyn Element>> {
                None
            }
        }

        let telemetry = Telemetry::with_exporter(TelemetryConfig::default(), InMemoryExporter::new());
        let backend = MockBackend::new();
        backend.expect_client_id().return_json(json!({ "clientid": "abc" }));
        let sdk = MockSdk::new();
        let widget = CheckoutWidget::new(
            telemetry.clone(),
            Arc::new(backend.clone()),
            Arc::new(sdk.clone()),
            Attributes::new(),
        );

        let err = widget.mount(Arc::new(Bare)).await.unwrap_err();
        assert!(matches!(err, CheckoutError::ButtonRender(_)));
        assert_eq!(widget.state(), WidgetState::MountFailed);
        assert!(!sdk.is_rendered());
        assert_eq!(
            telemetry
                .meter()
                .counter_value("paypal_errors", &[KeyValue::new("error_type", "button_render_failure")]),
            1
        );
        backend.verify();
    }
}
