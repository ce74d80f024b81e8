//! Retry/Timeout Orchestrator: wraps one remote call with a hard per-attempt
//! deadline and bounded retry-with-backoff.
//!
//! A single call moves through:
//!
//! ```text
//! Attempting ──► Succeeded                       (terminal: cache write, sync trigger)
//!     │
//!     ├──► TimedOut / Errored ──(attempts left)──► backoff ──► Attempting
//!     │
//!     └──► TimedOut / Errored ──(none left)──────► Exhausted  (terminal: fallback)
//! ```
//!
//! Exhaustion is a signal, not a crash: callers catch `ResilienceError` and take
//! their local fallback path. A timed-out attempt's future is dropped, so its
//! eventual result is discarded; a request already on the wire may still reach
//! the server, which is why replayed mutations must be idempotent.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

pub mod events;
pub mod policy;

pub use events::{ConnectivityBus, ConnectivityEvent};
pub use policy::RetryPolicy;

/// Why a single attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    TimedOut { after: Duration },
    Errored(String),
}

impl Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptFailure::TimedOut { after } => {
                write!(f, "timed out after {}ms", after.as_millis())
            }
            AttemptFailure::Errored(message) => write!(f, "{message}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ResilienceError {
    #[error("'{label}' exhausted {attempts} attempt(s); last failure: {last}")]
    Exhausted {
        label: String,
        attempts: u32,
        last: AttemptFailure,
    },
}

impl ResilienceError {
    pub fn attempts(&self) -> u32 {
        match self {
            ResilienceError::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn last_failure(&self) -> &AttemptFailure {
        match self {
            ResilienceError::Exhausted { last, .. } => last,
        }
    }
}

/// Runs `operation` under `policy`. Each attempt races the operation against
/// the per-attempt deadline; failures are retried after the policy's backoff
/// until attempts run out.
pub async fn call_with_resilience<T, E, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, ResilienceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.attempts();
    let mut last = AttemptFailure::Errored("no attempt made".to_string());

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            let delay = policy.backoff_for(attempt - 1);
            warn!(
                "{} attempt {}/{} failed ({}), retrying after {}ms...",
                label,
                attempt - 1,
                max_attempts,
                last,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        match tokio::time::timeout(policy.per_attempt_timeout, operation()).await {
            Ok(Ok(value)) => {
                debug!("{} succeeded on attempt {}/{}", label, attempt, max_attempts);
                return Ok(value);
            }
            Ok(Err(e)) => {
                last = AttemptFailure::Errored(e.to_string());
            }
            Err(_) => {
                last = AttemptFailure::TimedOut {
                    after: policy.per_attempt_timeout,
                };
            }
        }
    }

    warn!(
        "{} exhausted {} attempt(s), last failure: {}",
        label, max_attempts, last
    );
    Err(ResilienceError::Exhausted {
        label: label.to_string(),
        attempts: max_attempts,
        last,
    })
}

/// `call_with_resilience` plus connectivity bookkeeping: publishes `Healthy`
/// after a success and `Degraded` after exhaustion, and tracks whether the
/// app should show the offline/degraded advisory.
#[derive(Debug, Default)]
pub struct Orchestrator {
    bus: ConnectivityBus,
    degraded: AtomicBool,
}

impl Orchestrator {
    pub fn new(bus: ConnectivityBus) -> Self {
        Self {
            bus,
            degraded: AtomicBool::new(false),
        }
    }

    pub fn bus(&self) -> &ConnectivityBus {
        &self.bus
    }

    /// True after the most recent resilient call exhausted its attempts.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub async fn call<T, E, F, Fut>(
        &self,
        label: &str,
        policy: &RetryPolicy,
        operation: F,
    ) -> Result<T, ResilienceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let result = call_with_resilience(label, policy, operation).await;

        match &result {
            Ok(_) => {
                self.degraded.store(false, Ordering::SeqCst);
                self.bus.publish(ConnectivityEvent::Healthy {
                    label: label.to_string(),
                });
            }
            Err(_) => {
                self.degraded.store(true, Ordering::SeqCst);
                self.bus.publish(ConnectivityEvent::Degraded {
                    label: label.to_string(),
                });
            }
        }

        result
    }
}
