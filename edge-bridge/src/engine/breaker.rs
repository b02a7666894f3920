//! Circuit breaker gating all engine traffic
//!
//! ```text
//!   closed ──(failure_count >= threshold)──▶ open
//!     ▲                                        │
//!     └──────(elapsed >= recovery_time)────────┘  (checked in can_proceed)
//! ```
//!
//! There is no half-open probe limit: once the recovery window has elapsed,
//! every caller that reaches `can_proceed` is let through.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Breaker settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Engine feature flag; when off no call may proceed
    pub enabled: bool,
    pub failure_threshold: u32,
    pub recovery_time: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            recovery_time: Duration::from_secs(30),
        }
    }
}

/// Snapshot of the breaker counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BreakerState {
    pub failure_count: u32,
    pub open: bool,
    /// Set whenever `open` is true
    pub opened_at: Option<Instant>,
}

/// Process-wide breaker, shared by handle between the client and the router
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Whether a remote call may be attempted right now
    pub fn can_proceed(&self) -> bool {
        if !self.config.enabled {
            return false;
        }

        let mut state = self.state.lock();
        if !state.open {
            return true;
        }

        let recovered = state
            .opened_at
            .is_some_and(|at| at.elapsed() >= self.config.recovery_time);
        if recovered {
            state.open = false;
            state.opened_at = None;
            state.failure_count = 0;
            tracing::info!("Engine circuit breaker recovered, allowing traffic");
            return true;
        }

        false
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.failure_count = state.failure_count.saturating_add(1);

        if state.failure_count >= self.config.failure_threshold.max(1) {
            if !state.open {
                tracing::error!(
                    failures = state.failure_count,
                    recovery_ms = self.config.recovery_time.as_millis() as u64,
                    "Engine circuit breaker opened"
                );
            }
            state.open = true;
            state.opened_at = Some(Instant::now());
        } else {
            tracing::warn!(
                failures = state.failure_count,
                threshold = self.config.failure_threshold,
                "Engine call failed"
            );
        }
    }

    /// Resets the failure counter; `open` is only cleared by the recovery check
    pub fn record_success(&self) {
        self.state.lock().failure_count = 0;
    }

    pub fn state(&self) -> BreakerState {
        *self.state.lock()
    }
}
