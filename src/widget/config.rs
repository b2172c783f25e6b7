//! Widget configuration read from host attributes.

use serde::Serialize;
use std::collections::BTreeMap;

/// Host attributes by name.
pub type Attributes = BTreeMap<String, String>;

/// Attributes whose changes the checkout widget is notified about.
pub const OBSERVED_ATTRIBUTES: &[&str] = &["amount"];

/// Amount and currency, passed through to the SDK and the backend unvalidated.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WidgetConfig {
    pub amount: Option<String>,
    pub currency: Option<String>,
}

impl WidgetConfig {
    pub fn from_attributes(attributes: &Attributes) -> Self {
        Self {
            amount: attributes.get("amount").cloned(),
            currency: attributes.get("currency").cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_attributes() {
        let attributes = Attributes::from([
            ("amount".to_string(), "10.00".to_string()),
            ("data-extra".to_string(), "x".to_string()),
        ]);
        assert_eq!(
            WidgetConfig::from_attributes(&attributes),
            WidgetConfig {
                amount: Some("10.00".into()),
                currency: None,
            }
        );
    }
}
