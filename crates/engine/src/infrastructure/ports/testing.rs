//! Testability ports for injecting time and the autosave timer.

use std::time::Duration;

use chrono::{DateTime, Utc};

// =============================================================================
// Testability Ports
// =============================================================================

#[cfg_attr(test, mockall::automock)]
pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Repeating autosave timer.
///
/// Arming restarts the countdown from zero; ticks are delivered by the
/// implementation (a channel for the tokio scheduler, `advance` for the
/// manual one).
#[cfg_attr(test, mockall::automock)]
pub trait AutosaveScheduler: Send + Sync {
    fn arm(&self, interval: Duration);
    fn disarm(&self);
    fn is_armed(&self) -> bool;
}
