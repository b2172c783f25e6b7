//! Request-scoped data passed between the widget, the backend and the SDK.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Client id used to load the checkout SDK. Fetched once per mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredential {
    pub client_id: String,
}

/// Order identifier issued by the backend; lives from create-order until capture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A capture or authorization record from a successful capture response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: String,
    pub status: String,
}

/// How an approve/capture attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured { transaction_id: String, status: String },
    /// The funding source was declined; the SDK was asked to restart the flow.
    Declined { recoverable: bool },
    Failed { reason: String },
}
