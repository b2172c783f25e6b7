//! The external checkout SDK, seen through the traits the widget drives.
//!
//! The SDK is loaded with a client id, renders a button group into a
//! container and calls back into the widget through [`CheckoutHooks`]:
//! `create_order` when the buyer clicks, `on_approve` once the buyer has
//! approved the order at the provider.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::error::CheckoutError;
use crate::model::{CaptureOutcome, OrderId};
use crate::widget::dom::Element;

/// Failure reported by the SDK while loading or rendering.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct SdkError(String);

impl SdkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Options the SDK is loaded with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SdkOptions {
    pub client_id: String,
    pub currency: Option<String>,
}

/// Presentation of the button group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ButtonStyle {
    pub shape: String,
    pub layout: String,
    pub color: String,
    pub label: String,
}

impl Default for ButtonStyle {
    fn default() -> Self {
        Self {
            shape: "rect".to_string(),
            layout: "vertical".to_string(),
            color: "gold".to_string(),
            label: "paypal".to_string(),
        }
    }
}

/// Pay-later message shown under the buttons.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ButtonMessage {
    pub amount: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ButtonsOptions {
    pub style: ButtonStyle,
    pub message: ButtonMessage,
}

/// Payload of the approve callback.
#[derive(Debug, Clone, PartialEq)]
pub struct ApproveData {
    pub order_id: OrderId,
}

/// Actions available to the approve hook.
#[async_trait]
pub trait ApproveActions: Send + Sync {
    /// Sends the buyer back to pick another funding source.
    async fn restart(&self);
}

/// The two callbacks handed to the button group.
///
/// Both are catch boundaries: every failure is reported by the widget before
/// returning, so the SDK only learns whether to continue.
#[async_trait]
pub trait CheckoutHooks: Send + Sync {
    /// Creates an order. `Err` aborts the checkout attempt.
    async fn create_order(&self) -> Result<OrderId, CheckoutError>;

    /// Captures an approved order.
    async fn on_approve(&self, data: ApproveData, actions: &dyn ApproveActions) -> CaptureOutcome;
}

/// Entry point: loads the SDK for a client id.
#[async_trait]
pub trait CheckoutSdk: Send + Sync {
    async fn load(&self, options: &SdkOptions) -> Result<Arc<dyn SdkInstance>, SdkError>;
}

/// A loaded SDK.
#[async_trait]
pub trait SdkInstance: Send + Sync {
    /// Renders a button group into `container`; the SDK keeps `hooks` for later clicks.
    async fn render_buttons(
        &self,
        options: ButtonsOptions,
        hooks: Arc<dyn CheckoutHooks>,
        container: Arc<dyn Element>,
    ) -> Result<(), SdkError>;
}
