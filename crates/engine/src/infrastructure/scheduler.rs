//! Autosave timer implementations.
//!
//! `TokioScheduler` drives real sessions: a background task emits
//! [`AutosaveTick`]s on a channel until disarmed. `ManualScheduler` keeps
//! virtual time so tests advance the clock explicitly.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::ports::AutosaveScheduler;

/// One elapsed autosave interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveTick {
    pub at: Instant,
}

// =============================================================================
// Tokio-backed scheduler
// =============================================================================

struct Armed {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<AutosaveTick>,
    armed: Mutex<Option<Armed>>,
}

impl TokioScheduler {
    /// Create the scheduler and the receiver its ticks arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AutosaveTick>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            tx,
            armed: Mutex::new(None),
        };
        (scheduler, rx)
    }

    fn take_armed(&self) -> Option<Armed> {
        self.armed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
    }
}

impl AutosaveScheduler for TokioScheduler {
    /// Must be called from within a tokio runtime.
    fn arm(&self, interval: Duration) {
        if let Some(previous) = self.take_armed() {
            previous.cancel_token.cancel();
        }

        let cancel_token = CancellationToken::new();
        let task_token = cancel_token.clone();
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => {
                        tracing::debug!("Autosave timer disarmed");
                        break;
                    }
                    at = ticker.tick() => {
                        if tx.send(AutosaveTick { at }).is_err() {
                            tracing::debug!("Autosave receiver dropped, stopping timer");
                            break;
                        }
                    }
                }
            }
        });

        tracing::debug!(interval_secs = interval.as_secs(), "Autosave timer armed");
        *self.armed.lock().unwrap_or_else(|p| p.into_inner()) = Some(Armed {
            cancel_token,
            handle,
        });
    }

    fn disarm(&self) {
        if let Some(armed) = self.take_armed() {
            armed.cancel_token.cancel();
        }
    }

    fn is_armed(&self) -> bool {
        self.armed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .is_some_and(|a| !a.cancel_token.is_cancelled() && !a.handle.is_finished())
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}

// =============================================================================
// Virtual-time scheduler
// =============================================================================

#[derive(Debug, Default)]
struct ManualState {
    interval: Option<Duration>,
    elapsed: Duration,
    arm_count: usize,
}

/// Scheduler whose time only moves when [`advance`](Self::advance) is called.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move virtual time forward. Returns how many intervals elapsed.
    pub fn advance(&self, by: Duration) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let Some(interval) = state.interval.filter(|i| !i.is_zero()) else {
            return 0;
        };
        let total = state.elapsed + by;
        let ticks = total.as_nanos() / interval.as_nanos();
        let remainder = total.as_nanos() % interval.as_nanos();
        state.elapsed = Duration::from_nanos(u64::try_from(remainder).unwrap_or(u64::MAX));
        usize::try_from(ticks).unwrap_or(usize::MAX)
    }

    /// Time since the timer was last armed, modulo the interval.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).elapsed
    }

    /// How many times `arm` has been called.
    pub fn arm_count(&self) -> usize {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).arm_count
    }
}

impl AutosaveScheduler for ManualScheduler {
    fn arm(&self, interval: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.interval = Some(interval);
        state.elapsed = Duration::ZERO;
        state.arm_count += 1;
    }

    fn disarm(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.interval = None;
        state.elapsed = Duration::ZERO;
    }

    fn is_armed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .interval
            .is_some()
    }
}
