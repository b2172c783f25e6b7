//! `<x-date>`: prints the current year.

use chrono::{DateTime, Datelike, Local};
use std::sync::Arc;

use super::dom::Element;

pub type Clock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

pub struct YearBadge {
    clock: Clock,
}

impl YearBadge {
    pub const TAG: &'static str = "x-date";

    pub fn new() -> Self {
        Self::with_clock(Arc::new(Local::now))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self { clock }
    }

    pub fn current_year(&self) -> i32 {
        (self.clock)().year()
    }

    /// Replaces the host content with the year. Read fresh on every attach.
    pub fn connected(&self, host: &dyn Element) {
        host.set_inner_html(&self.current_year().to_string());
    }
}

impl Default for YearBadge {
    fn default() -> Self {
        Self::new()
    }
}
