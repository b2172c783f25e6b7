//! # Checkout Widgets
//!
//! > **Embeddable PayPal checkout buttons with traces, metrics and logs on every step.**
//!
//! This crate provides two page widgets and the observability context they report into:
//!
//! - **`<x-date>`** ([`YearBadge`](widget::YearBadge)) writes the current year.
//! - **`<x-paypal>`** ([`CheckoutWidget`](widget::CheckoutWidget)) fetches a client id,
//!   loads the checkout SDK, renders the button group and drives order creation and capture
//!   against the shop backend.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### Telemetry that cannot break checkout
//! [`Telemetry`](telemetry::Telemetry) is built once, explicitly, and cloned into each widget.
//! Every piece of it (exporter, span processor, instruments, auto-instrumentation) checks
//! its capability at startup and falls back to a console or logging-only variant on failure.
//! The widget code never branches on which variant it got.
//!
//! ### Every hook is a catch boundary
//! The SDK calls back into [`OrderFlow`](widget::OrderFlow). Each hook opens a span, counts
//! the click, calls the backend, then reports the result exactly once: one success or error
//! counter, one duration sample, one result message, one closed span. Failures are typed
//! ([`CheckoutError`](error::CheckoutError)) and carry the `error_type` label they are
//! counted under.
//!
//! ### Collaborators behind traits
//! The backend ([`CheckoutBackend`](backend::CheckoutBackend)), the SDK
//! ([`CheckoutSdk`](sdk::CheckoutSdk)) and the page ([`Element`](widget::Element)) are traits.
//! Production uses [`HttpBackend`](backend::HttpBackend); tests use the scripted doubles in
//! [`mock`].
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. Observability ([`telemetry`])
//! - **Role**: OpenTelemetry SDK tracer and meter behind a span guard, exporters, instruments, structured logger.
//! - **Key items**: [`Telemetry`](telemetry::Telemetry), [`Span`](telemetry::Span),
//!   [`CheckoutMetrics`](telemetry::CheckoutMetrics).
//!
//! ### 2. The Widgets ([`widget`])
//! - **Role**: Mount flow, lifecycle state machine, order hooks.
//! - **Key items**: [`CheckoutWidget`](widget::CheckoutWidget), [`WidgetState`](widget::WidgetState).
//!
//! ### 3. The Collaborators ([`backend`], [`sdk`])
//! - **Role**: Wire types and the traits the widget drives.
//!
//! ### 4. The Orchestrator ([`lifecycle`])
//! - **Role**: Owns the shared context, defines the custom elements, mounts widgets by tag.
//! - **Key items**: [`WidgetHost`](lifecycle::WidgetHost), [`setup_tracing`](lifecycle::setup_tracing).
//!
//! ## 🚀 Quick Start
//!
//! ```ignore
//! lifecycle::setup_tracing();
//! let host = WidgetHost::from_env("https://shop.example/static/index.js", sdk)?;
//! host.mount("x-paypal", attributes, page).await?;
//! ```
//!
//! ### Running Tests
//!
//! ```bash
//! RUST_LOG=debug cargo test
//! ```

pub mod backend;
pub mod error;
pub mod lifecycle;
pub mod mock;
pub mod model;
pub mod sdk;
pub mod telemetry;
pub mod widget;
