use std::sync::Arc;
use tracing::{info, warn};

use super::registry::{ElementRegistry, RegistryError, WidgetKind};
use crate::backend::{BackendError, CheckoutBackend, HttpBackend};
use crate::sdk::CheckoutSdk;
use crate::telemetry::{Telemetry, TelemetryConfig, TelemetryError};
use crate::widget::{Attributes, CheckoutWidget, Element, YearBadge};

/// The page-side runtime that owns everything widgets share.
///
/// `WidgetHost` is responsible for:
/// - **Telemetry**: one [`Telemetry`] context, cloned into every widget
/// - **Collaborators**: the backend and the checkout SDK
/// - **Element definitions**: which tag mounts which widget
///
/// # Example
///
/// ```ignore
/// let host = WidgetHost::from_env("https://shop.example/static/index.js", sdk)?;
///
/// let page = MemoryElement::new();
/// let attributes = Attributes::from([("amount".into(), "10.00".into()), ("currency".into(), "USD".into())]);
/// host.mount("x-paypal", attributes, page.clone()).await?;
///
/// host.shutdown().await?;
/// ```
pub struct WidgetHost {
    telemetry: Telemetry,
    backend: Arc<dyn CheckoutBackend>,
    sdk: Arc<dyn CheckoutSdk>,
    registry: ElementRegistry,
}

/// A widget attached to the page.
pub enum MountedWidget {
    Year(YearBadge),
    Checkout(Arc<CheckoutWidget>),
}

impl MountedWidget {
    pub fn as_checkout(&self) -> Option<&Arc<CheckoutWidget>> {
        match self {
            MountedWidget::Checkout(widget) => Some(widget),
            MountedWidget::Year(_) => None,
        }
    }
}

impl WidgetHost {
    pub fn new(telemetry: Telemetry, backend: Arc<dyn CheckoutBackend>, sdk: Arc<dyn CheckoutSdk>) -> Self {
        Self {
            telemetry,
            backend,
            sdk,
            registry: ElementRegistry::with_defaults(),
        }
    }

    /// Telemetry from the environment and an HTTP backend next to `module_url`.
    pub fn from_env(module_url: &str, sdk: Arc<dyn CheckoutSdk>) -> Result<Self, BackendError> {
        let telemetry = Telemetry::init(TelemetryConfig::from_env());
        let backend = HttpBackend::new(module_url, telemetry.clone())?;
        Ok(Self::new(telemetry, Arc::new(backend), sdk))
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn registry_mut(&mut self) -> &mut ElementRegistry {
        &mut self.registry
    }

    /// Creates the widget defined for `tag` and attaches it to `host`.
    ///
    /// Only an unknown tag is an error; widget failures are reported by the widget.
    pub async fn mount(
        &self,
        tag: &str,
        attributes: Attributes,
        host: Arc<dyn Element>,
    ) -> Result<MountedWidget, RegistryError> {
        match self.registry.get(tag)? {
            WidgetKind::YearBadge => {
                let badge = YearBadge::new();
                badge.connected(host.as_ref());
                Ok(MountedWidget::Year(badge))
            }
            WidgetKind::Checkout => {
                let widget = Arc::new(CheckoutWidget::new(
                    self.telemetry.clone(),
                    self.backend.clone(),
                    self.sdk.clone(),
                    attributes,
                ));
                widget.connected(host).await;
                info!(tag, state = %widget.state(), "Widget mounted");
                Ok(MountedWidget::Checkout(widget))
            }
        }
    }

    /// Flushes and stops telemetry.
    pub async fn shutdown(self) -> Result<(), TelemetryError> {
        info!("Shutting down widget host...");
        if let Err(e) = self.telemetry.force_flush().await {
            warn!(error = %e, "Final span flush failed");
        }
        self.telemetry.shutdown().await
    }
}
