//! Lifecycle of a checkout widget.
//!
//! ```text
//! Idle → Initializing → SdkLoaded → ButtonRendered → OrderPending → AwaitingApproval → Capturing
//!             │              │                          ▲                                  │
//!             └──────────────┴──→ MountFailed           └── Settled | Declined | Failed ←──┘
//! ```
//!
//! `Settled`, `Declined` and `Failed` end one checkout attempt; the buttons stay
//! usable so the next click goes back to `OrderPending`. `MountFailed` leaves no
//! buttons behind.

use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetState {
    Idle,
    Initializing,
    SdkLoaded,
    ButtonRendered,
    OrderPending,
    AwaitingApproval,
    Capturing,
    Settled,
    Declined,
    Failed,
    MountFailed,
}

impl WidgetState {
    pub fn can_transition_to(self, next: WidgetState) -> bool {
        use WidgetState::*;
        match (self, next) {
            // Attaching again restarts the mount from scratch.
            (_, Initializing) => true,
            (Initializing, SdkLoaded | MountFailed) => true,
            (SdkLoaded, ButtonRendered | MountFailed) => true,
            (ButtonRendered | AwaitingApproval | Settled | Declined | Failed, OrderPending) => true,
            (OrderPending, AwaitingApproval | Failed) => true,
            (AwaitingApproval, Capturing) => true,
            (Capturing, Settled | Declined | Failed) => true,
            _ => false,
        }
    }

    /// True once a button group is on the page.
    pub fn has_buttons(self) -> bool {
        !matches!(
            self,
            WidgetState::Idle | WidgetState::Initializing | WidgetState::SdkLoaded | WidgetState::MountFailed
        )
    }
}

impl fmt::Display for WidgetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

struct Inner {
    current: WidgetState,
    history: Vec<WidgetState>,
}

/// Current state plus every state entered so far.
///
/// Transitions outside the lifecycle graph are applied anyway and logged:
/// checkout attempts are driven by the buyer and are not serialized here.
pub struct StateCell {
    inner: Mutex<Inner>,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                current: WidgetState::Idle,
                history: vec![WidgetState::Idle],
            }),
        }
    }

    pub fn current(&self) -> WidgetState {
        self.lock().current
    }

    pub fn history(&self) -> Vec<WidgetState> {
        self.lock().history.clone()
    }

    /// Moves to `next` and returns the previous state.
    pub fn transition(&self, next: WidgetState) -> WidgetState {
        let mut inner = self.lock();
        let previous = inner.current;
        if previous.can_transition_to(next) {
            debug!(from = %previous, to = %next, "Widget state");
        } else {
            warn!(from = %previous, to = %next, "Unexpected widget state transition");
        }
        inner.current = next;
        inner.history.push(next);
        previous
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
