//! # Mock Collaborators
//!
//! Test doubles for the two things a checkout widget talks to.
//!
//! [`MockBackend`] answers from a queue of expectations, in order. Each
//! expectation names the request it is for and the response to give back;
//! a request that does not match the next expectation panics. Finish with
//! [`MockBackend::verify`] to check nothing was left over.
//!
//! [`MockSdk`] loads and renders instantly, keeps the hooks it was given and
//! lets a test play the buyer: [`MockSdk::click`], [`MockSdk::approve`],
//! [`MockSdk::checkout`].
//!
//! ```ignore
//! let backend = MockBackend::new();
//! backend.expect_client_id().return_json(json!({ "clientid": "abc" }));
//! backend.expect_create_order().return_json(json!({ "id": "ORDER1" }));
//!
//! let sdk = MockSdk::new();
//! let widget = CheckoutWidget::new(telemetry, Arc::new(backend.clone()), Arc::new(sdk.clone()), attrs);
//! widget.connected(host).await;
//! assert_eq!(sdk.click().await?, OrderId::new("ORDER1"));
//! backend.verify();
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::backend::{parse_client_id, BackendError, CheckoutBackend, CreateOrderRequest};
use crate::error::CheckoutError;
use crate::model::{CaptureOutcome, ClientCredential, OrderId};
use crate::sdk::{
    ApproveActions, ApproveData, ButtonsOptions, CheckoutHooks, CheckoutSdk, SdkError, SdkInstance, SdkOptions,
};
use crate::widget::dom::Element;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// BACKEND
// =============================================================================

/// A request the backend received.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedRequest {
    ClientId,
    CreateOrder(CreateOrderRequest),
    Capture(OrderId),
}

#[derive(Debug, Clone, PartialEq)]
enum ExpectedRequest {
    ClientId,
    CreateOrder,
    Capture(OrderId),
}

impl ExpectedRequest {
    fn matches(&self, request: &RecordedRequest) -> bool {
        match (self, request) {
            (ExpectedRequest::ClientId, RecordedRequest::ClientId) => true,
            (ExpectedRequest::CreateOrder, RecordedRequest::CreateOrder(_)) => true,
            (ExpectedRequest::Capture(expected), RecordedRequest::Capture(actual)) => expected == actual,
            _ => false,
        }
    }
}

struct Expectation {
    request: ExpectedRequest,
    response: Result<Value, BackendError>,
}

/// Scripted [`CheckoutBackend`]. Clones share the same queue and request log.
#[derive(Clone, Default)]
pub struct MockBackend {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects `GET clientid`.
    pub fn expect_client_id(&self) -> ExpectationBuilder {
        self.builder(ExpectedRequest::ClientId)
    }

    /// Expects `POST orders`.
    pub fn expect_create_order(&self) -> ExpectationBuilder {
        self.builder(ExpectedRequest::CreateOrder)
    }

    /// Expects `POST capture/{order_id}`.
    pub fn expect_capture(&self, order_id: impl Into<OrderId>) -> ExpectationBuilder {
        self.builder(ExpectedRequest::Capture(order_id.into()))
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    /// Panics if any expectation was not consumed.
    pub fn verify(&self) {
        let remaining = lock(&self.expectations).len();
        if remaining != 0 {
            panic!("Not all expectations were met. {remaining} remaining");
        }
    }

    fn builder(&self, request: ExpectedRequest) -> ExpectationBuilder {
        ExpectationBuilder {
            request,
            expectations: self.expectations.clone(),
        }
    }

    fn respond(&self, request: RecordedRequest) -> Result<Value, BackendError> {
        let expectation = lock(&self.expectations).pop_front();
        lock(&self.requests).push(request.clone());
        match expectation {
            Some(expectation) if expectation.request.matches(&request) => expectation.response,
            Some(expectation) => panic!(
                "Unexpected request {request:?}, expected {:?}",
                expectation.request
            ),
            None => panic!("Unexpected request {request:?}, no expectations left"),
        }
    }
}

/// Sets the response of one expected request.
pub struct ExpectationBuilder {
    request: ExpectedRequest,
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
}

impl ExpectationBuilder {
    pub fn return_json(self, body: Value) {
        self.push(Ok(body));
    }

    pub fn return_err(self, error: BackendError) {
        self.push(Err(error));
    }

    fn push(self, response: Result<Value, BackendError>) {
        lock(&self.expectations).push_back(Expectation {
            request: self.request,
            response,
        });
    }
}

#[async_trait]
impl CheckoutBackend for MockBackend {
    async fn client_id(&self) -> Result<ClientCredential, BackendError> {
        parse_client_id(self.respond(RecordedRequest::ClientId)?)
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> Result<Value, BackendError> {
        self.respond(RecordedRequest::CreateOrder(request.clone()))
    }

    async fn capture_order(&self, order_id: &OrderId) -> Result<Value, BackendError> {
        self.respond(RecordedRequest::Capture(order_id.clone()))
    }
}

// =============================================================================
// SDK
// =============================================================================

/// Counts [`ApproveActions::restart`] calls.
#[derive(Default)]
pub struct MockActions {
    restarts: AtomicUsize,
}

impl MockActions {
    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApproveActions for MockActions {
    async fn restart(&self) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }
}

struct Rendered {
    options: ButtonsOptions,
    hooks: Arc<dyn CheckoutHooks>,
}

#[derive(Default)]
struct SdkState {
    fail_load: Option<SdkError>,
    fail_render: Option<SdkError>,
    loads: Vec<SdkOptions>,
    rendered: Option<Rendered>,
}

/// Scripted [`CheckoutSdk`]. Clones share state, so a test keeps one and hands
/// the other to the widget.
#[derive(Clone, Default)]
pub struct MockSdk {
    state: Arc<Mutex<SdkState>>,
}

impl MockSdk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later `load` fail.
    pub fn fail_load(&self, message: &str) {
        lock(&self.state).fail_load = Some(SdkError::new(message));
    }

    /// Makes every later `render_buttons` fail.
    pub fn fail_render(&self, message: &str) {
        lock(&self.state).fail_render = Some(SdkError::new(message));
    }

    /// Options of every `load` call.
    pub fn loads(&self) -> Vec<SdkOptions> {
        lock(&self.state).loads.clone()
    }

    pub fn is_rendered(&self) -> bool {
        lock(&self.state).rendered.is_some()
    }

    pub fn button_options(&self) -> Option<ButtonsOptions> {
        lock(&self.state).rendered.as_ref().map(|r| r.options.clone())
    }

    /// Clicks the button: runs the create-order hook.
    pub async fn click(&self) -> Result<OrderId, CheckoutError> {
        self.hooks().create_order().await
    }

    /// Approves `order_id`: runs the approve hook. Also returns how many times it restarted the flow.
    pub async fn approve(&self, order_id: impl Into<OrderId>) -> (CaptureOutcome, usize) {
        let actions = MockActions::default();
        let data = ApproveData {
            order_id: order_id.into(),
        };
        let outcome = self.hooks().on_approve(data, &actions).await;
        (outcome, actions.restarts())
    }

    /// Click, then approve the order that click created.
    pub async fn checkout(&self) -> Result<(CaptureOutcome, usize), CheckoutError> {
        let order_id = self.click().await?;
        Ok(self.approve(order_id).await)
    }

    fn hooks(&self) -> Arc<dyn CheckoutHooks> {
        match &lock(&self.state).rendered {
            Some(rendered) => rendered.hooks.clone(),
            None => panic!("Buttons were never rendered"),
        }
    }
}

#[async_trait]
impl CheckoutSdk for MockSdk {
    async fn load(&self, options: &SdkOptions) -> Result<Arc<dyn SdkInstance>, SdkError> {
        let mut state = lock(&self.state);
        state.loads.push(options.clone());
        if let Some(e) = &state.fail_load {
            return Err(e.clone());
        }
        Ok(Arc::new(self.clone()) as Arc<dyn SdkInstance>)
    }
}

#[async_trait]
impl SdkInstance for MockSdk {
    async fn render_buttons(
        &self,
        options: ButtonsOptions,
        hooks: Arc<dyn CheckoutHooks>,
        container: Arc<dyn Element>,
    ) -> Result<(), SdkError> {
        {
            let mut state = lock(&self.state);
            if let Some(e) = &state.fail_render {
                return Err(e.clone());
            }
            state.rendered = Some(Rendered { options, hooks });
        }
        container.set_inner_html(r#"<div class="paypal-buttons"></div>"#);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_backend_answers_in_order() {
        let backend = MockBackend::new();
        backend.expect_client_id().return_json(json!({ "clientid": "abc" }));
        backend
            .expect_capture("ORDER1")
            .return_err(BackendError::Network("reset".into()));

        assert_eq!(backend.client_id().await.unwrap().client_id, "abc");
        assert_eq!(
            backend.capture_order(&OrderId::new("ORDER1")).await,
            Err(BackendError::Network("reset".into()))
        );
        assert_eq!(
            backend.requests(),
            vec![RecordedRequest::ClientId, RecordedRequest::Capture(OrderId::new("ORDER1"))]
        );
        backend.verify();
    }

    #[tokio::test]
    #[should_panic(expected = "Unexpected request")]
    async fn test_backend_rejects_mismatch() {
        let backend = MockBackend::new();
        backend.expect_capture("ORDER1").return_json(json!({}));
        let _ = backend.capture_order(&OrderId::new("ORDER2")).await;
    }

    #[test]
    #[should_panic(expected = "1 remaining")]
    fn test_verify_reports_leftovers() {
        let backend = MockBackend::new();
        backend.expect_create_order().return_json(json!({}));
        backend.verify();
    }
}
