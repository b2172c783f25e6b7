//! Structured logger: a message plus a JSON object of fields, emitted as a `tracing` event.

use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct Logger {
    scope: Arc<str>,
}

impl Logger {
    pub fn new(scope: &str) -> Self {
        Self {
            scope: Arc::from(scope),
        }
    }

    pub fn info(&self, message: &str, fields: Value) {
        info!(scope = %self.scope, fields = %fields, "{message}");
    }

    pub fn warn(&self, message: &str, fields: Value) {
        warn!(scope = %self.scope, fields = %fields, "{message}");
    }

    pub fn error(&self, message: &str, fields: Value) {
        error!(scope = %self.scope, fields = %fields, "{message}");
    }
}
