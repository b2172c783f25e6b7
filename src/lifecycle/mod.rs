//! Page-level wiring.
//!
//! - [`WidgetHost`] - owns telemetry, the backend and the SDK, mounts widgets by tag
//! - [`ElementRegistry`] - which tag mounts which widget
//! - [`setup_tracing`] - installs the log subscriber

pub mod host;
pub mod registry;
pub mod tracing;

pub use host::*;
pub use registry::*;
pub use self::tracing::setup_tracing;
