//! Custom element definitions: which widget a tag name mounts.

use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use crate::widget::{CheckoutWidget, YearBadge};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    YearBadge,
    Checkout,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("'{0}' is not a valid custom element name")]
    InvalidName(String),

    #[error("'{0}' has already been defined as a custom element")]
    AlreadyDefined(String),

    #[error("No custom element defined for '{0}'")]
    Undefined(String),
}

/// Tag name → widget kind. A name can be defined once.
#[derive(Debug, Default)]
pub struct ElementRegistry {
    definitions: BTreeMap<String, WidgetKind>,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `x-date` and `x-paypal`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (tag, kind) in [
            (YearBadge::TAG, WidgetKind::YearBadge),
            (CheckoutWidget::TAG, WidgetKind::Checkout),
        ] {
            registry.definitions.insert(tag.to_string(), kind);
        }
        registry
    }

    pub fn define(&mut self, name: &str, kind: WidgetKind) -> Result<(), RegistryError> {
        if !is_valid_name(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if self.definitions.contains_key(name) {
            return Err(RegistryError::AlreadyDefined(name.to_string()));
        }
        debug!(name, ?kind, "Custom element defined");
        self.definitions.insert(name.to_string(), kind);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<WidgetKind, RegistryError> {
        self.definitions
            .get(name)
            .copied()
            .ok_or_else(|| RegistryError::Undefined(name.to_string()))
    }
}

/// Lowercase ASCII letter first, at least one hyphen, no uppercase or whitespace.
fn is_valid_name(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_lowercase())
        && name.contains('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '.' | '_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let registry = ElementRegistry::with_defaults();
        assert_eq!(registry.get("x-date"), Ok(WidgetKind::YearBadge));
        assert_eq!(registry.get("x-paypal"), Ok(WidgetKind::Checkout));
        assert_eq!(
            registry.get("x-cart"),
            Err(RegistryError::Undefined("x-cart".into()))
        );
    }

    #[test]
    fn test_define_once() {
        let mut registry = ElementRegistry::with_defaults();
        assert_eq!(
            registry.define("x-paypal", WidgetKind::Checkout),
            Err(RegistryError::AlreadyDefined("x-paypal".into()))
        );
        registry.define("shop-checkout", WidgetKind::Checkout).unwrap();
        assert_eq!(registry.get("shop-checkout"), Ok(WidgetKind::Checkout));
    }

    #[test]
    fn test_names_need_a_hyphen() {
        let mut registry = ElementRegistry::new();
        for name in ["paypal", "X-Paypal", "1-date", "x date"] {
            assert_eq!(
                registry.define(name, WidgetKind::YearBadge),
                Err(RegistryError::InvalidName(name.into()))
            );
        }
    }
}
