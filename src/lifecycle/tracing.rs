//! # Log Output
//!
//! [`setup_tracing`] installs the `tracing` subscriber every widget and the
//! telemetry pipeline log through.
//!
//! - Level filter from `RUST_LOG` (`info` when unset)
//! - Compact format, no module paths (`with_target(false)`)
//!
//! ```bash
//! RUST_LOG=info   # mount, order and capture events, telemetry fallbacks
//! RUST_LOG=debug  # plus state transitions, span starts and raw capture responses
//! ```
//!
//! Checkout events are emitted through [`Logger`](crate::telemetry::Logger), so
//! each line carries the message plus a `fields` JSON object:
//!
//! ```text
//! INFO Creating PayPal order scope="paypal-microfrontend-browser" fields={"amount":"10.00","currency":"USD"}
//! INFO PayPal order created successfully scope="paypal-microfrontend-browser" fields={"amount":"10.00","currency":"USD","orderId":"ORDER1"}
//! ```

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. A second call leaves the first one in place.
pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
