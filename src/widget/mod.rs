//! The two embeddable widgets and the surface they render into.
//!
//! - [`YearBadge`] (`x-date`)
//! - [`CheckoutWidget`] (`x-paypal`)

pub mod checkout;
pub mod config;
pub mod dom;
pub mod state;
pub mod year;

pub use checkout::{CheckoutWidget, OrderFlow};
pub use config::{Attributes, WidgetConfig};
pub use dom::{Element, MemoryElement};
pub use state::{StateCell, WidgetState};
pub use year::YearBadge;
