//! Wait Mechanisms
//!
//! Bounded poll-until-condition primitives. Every suspension in the engine
//! goes through [`poll_until`] or [`settle`], both driven by `tokio::time` so
//! tests can run them on a paused clock.

use crate::result::PriceWatchResult;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for wait operations (30 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Default polling interval (100ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

// =============================================================================
// LOAD STATE
// =============================================================================

/// Page load states a navigation may wait for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    /// Wait for the `load` event to fire
    #[default]
    Load,
    /// Wait for `DOMContentLoaded` event
    DomContentLoaded,
    /// Wait for the document to report `complete` and the network to go quiet
    NetworkIdle,
}

impl LoadState {
    /// Get the JavaScript event name for this load state
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::DomContentLoaded => "DOMContentLoaded",
            Self::NetworkIdle => "networkidle",
        }
    }

    /// Whether a `document.readyState` value satisfies this load state
    #[must_use]
    pub fn is_reached_by(&self, ready_state: &str) -> bool {
        match self {
            Self::DomContentLoaded => matches!(ready_state, "interactive" | "complete"),
            Self::Load | Self::NetworkIdle => ready_state == "complete",
        }
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.event_name())
    }
}

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration. Never zero, so a loop always yields.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

// =============================================================================
// POLL OUTCOME
// =============================================================================

/// Outcome of a bounded poll
#[derive(Debug, Clone, PartialEq)]
pub enum Polled<T> {
    /// The check produced a value before the deadline
    Ready {
        /// Value the check returned
        value: T,
        /// Time spent waiting
        elapsed: Duration,
        /// Number of checks issued
        attempts: u32,
    },
    /// The deadline passed without a value
    TimedOut {
        /// Time spent waiting
        elapsed: Duration,
        /// Number of checks issued
        attempts: u32,
        /// Last error a check returned, if any
        last_error: Option<String>,
    },
}

impl<T> Polled<T> {
    /// Whether the check succeeded
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    /// Convert into the ready value, dropping timing information
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Ready { value, .. } => Some(value),
            Self::TimedOut { .. } => None,
        }
    }

    /// Time spent waiting
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        match self {
            Self::Ready { elapsed, .. } | Self::TimedOut { elapsed, .. } => *elapsed,
        }
    }
}

// =============================================================================
// POLLING
// =============================================================================

/// Repeatedly run `check` until it yields `Some`, or the timeout elapses.
///
/// The check always runs at least once. A check error counts as "not yet"
/// and is kept for the timeout report. Each check is itself bounded by the
/// remaining time (or one poll interval, whichever is larger).
pub async fn poll_until<T, F, Fut>(options: &WaitOptions, mut check: F) -> Polled<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PriceWatchResult<Option<T>>>,
{
    let start = Instant::now();
    let deadline = start + options.timeout();
    let mut attempts = 0_u32;
    let mut last_error = None;

    loop {
        attempts += 1;
        let budget = deadline
            .saturating_duration_since(Instant::now())
            .max(options.poll_interval());

        match tokio::time::timeout(budget, check()).await {
            Ok(Ok(Some(value))) => {
                return Polled::Ready {
                    value,
                    elapsed: start.elapsed(),
                    attempts,
                };
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                debug!(error = %e, attempts, "check failed, polling again");
                last_error = Some(e.to_string());
            }
            Err(_) => {
                debug!(budget_ms = budget.as_millis() as u64, "check exceeded its budget");
                last_error = Some(format!("check did not answer within {}ms", budget.as_millis()));
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Polled::TimedOut {
                elapsed: start.elapsed(),
                attempts,
                last_error,
            };
        }
        tokio::time::sleep(options.poll_interval().min(deadline - now)).await;
    }
}

/// Bounded pause that lets a reactive page process synthesized events
pub async fn settle(delay: Duration) {
    trace!(delay_ms = delay.as_millis() as u64, "settling");
    tokio::time::sleep(delay).await;
}

// =============================================================================
// TESTS
// =============================================================================
