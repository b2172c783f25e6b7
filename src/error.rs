//! Error types for the checkout widget.

use serde_json::Value;
use thiserror::Error;

use crate::backend::{BackendError, ErrorDetail};
use crate::model::OrderId;
use crate::sdk::SdkError;

/// Values of the `error_type` label on the errors counter.
pub mod error_type {
    pub const COMPONENT_INIT_FAILURE: &str = "component_init_failure";
    pub const SDK_LOAD_FAILURE: &str = "sdk_load_failure";
    pub const BUTTON_RENDER_FAILURE: &str = "button_render_failure";
    pub const ORDER_CREATION_FAILED: &str = "order_creation_failed";
    pub const ORDER_CREATION_EXCEPTION: &str = "order_creation_exception";
    pub const CAPTURE_FAILED: &str = "capture_failed";
    pub const INVALID_CAPTURE_RESPONSE: &str = "invalid_capture_response";
    pub const CAPTURE_EXCEPTION: &str = "capture_exception";
}

/// Everything that can go wrong between mounting the widget and settling a payment.
#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    /// The client id could not be fetched or decoded. Fatal for the mount.
    #[error("Failed to fetch client configuration: {0}")]
    ConfigFetch(#[source] BackendError),

    /// The checkout SDK did not load. Fatal for the mount.
    #[error("Failed to load the PayPal JS SDK script: {0}")]
    SdkLoad(#[source] SdkError),

    /// The button group did not render. Fatal for the mount.
    #[error("Failed to render the PayPal Buttons: {0}")]
    ButtonRender(#[source] SdkError),

    /// The backend answered create-order without an order id. The user may click again.
    #[error("{message}")]
    OrderCreation { message: String, response: Value },

    /// Recoverable decline (`INSTRUMENT_DECLINED`); the flow is restarted, not reported.
    #[error("Instrument declined for order {order_id}")]
    CaptureDeclined { order_id: OrderId, detail: ErrorDetail },

    /// The backend reported a capture error.
    #[error("{reason}")]
    CaptureFailed { reason: String, detail: ErrorDetail },

    /// The capture response had no purchase unit with a transaction record.
    #[error("{response}")]
    CaptureResponseShape { response: Value },

    /// Transport or decode failure talking to the backend.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl CheckoutError {
    /// The `error_type` label for this error, if it has a fixed one.
    ///
    /// [`CheckoutError::Backend`] depends on the operation that failed and
    /// [`CheckoutError::CaptureDeclined`] is not counted as an error.
    pub fn error_type(&self) -> Option<&'static str> {
        match self {
            CheckoutError::ConfigFetch(_) => Some(error_type::COMPONENT_INIT_FAILURE),
            CheckoutError::SdkLoad(_) => Some(error_type::SDK_LOAD_FAILURE),
            CheckoutError::ButtonRender(_) => Some(error_type::BUTTON_RENDER_FAILURE),
            CheckoutError::OrderCreation { .. } => Some(error_type::ORDER_CREATION_FAILED),
            CheckoutError::CaptureFailed { .. } => Some(error_type::CAPTURE_FAILED),
            CheckoutError::CaptureResponseShape { .. } => Some(error_type::INVALID_CAPTURE_RESPONSE),
            CheckoutError::CaptureDeclined { .. } | CheckoutError::Backend(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_type_labels() {
        let shape = CheckoutError::CaptureResponseShape {
            response: json!({"status": "weird"}),
        };
        assert_eq!(shape.error_type(), Some("invalid_capture_response"));
        assert_eq!(shape.to_string(), r#"{"status":"weird"}"#);

        let network = CheckoutError::from(BackendError::Network("connection refused".into()));
        assert_eq!(network.error_type(), None);
        assert_eq!(network.to_string(), "Request failed: connection refused");

        let sdk = CheckoutError::SdkLoad(SdkError::new("blocked"));
        assert_eq!(sdk.error_type(), Some("sdk_load_failure"));
    }
}
