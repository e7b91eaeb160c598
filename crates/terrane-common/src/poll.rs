//! Bounded polling for asynchronous backend convergence.
//!
//! Workload readiness, external IP assignment and load-balancer release all
//! use [`poll_until`]. Running out of attempts is reported as
//! [`PollOutcome::TimedOut`], not as an error: the caller decides whether to
//! warn and continue.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Result type for polling check functions.
///
/// - `Ok(Some(value))` - Condition met, return the value
/// - `Ok(None)` - Condition not met yet, keep polling
/// - `Err(e)` - Fatal error, stop polling immediately
pub type PollResult<T> = std::result::Result<Option<T>, String>;

/// How often and how long to poll
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PollPolicy {
    /// Delay after the first unsuccessful attempt
    pub interval: Duration,
    /// Attempts before giving up (at least one attempt is always made)
    pub max_attempts: u32,
    /// Multiplier applied to the delay after each attempt
    pub backoff_multiplier: f64,
    /// Upper bound for the delay
    pub max_interval: Duration,
}

impl PollPolicy {
    /// Fixed interval, no backoff
    pub const fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            backoff_multiplier: 1.0,
            max_interval: interval,
        }
    }

    /// Exponential backoff capped at `max_interval`
    pub fn with_backoff(mut self, multiplier: f64, max_interval: Duration) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self.max_interval = max_interval.max(self.interval);
        self
    }

    /// Pods of the application report Running
    pub const WORKLOAD_READY: PollPolicy = PollPolicy::fixed(Duration::from_secs(5), 60);
    /// The LoadBalancer service receives an ingress IP
    pub const EXTERNAL_IP: PollPolicy = PollPolicy::fixed(Duration::from_secs(10), 30);
    /// LoadBalancer services disappear after the release is uninstalled
    pub const LOAD_BALANCER_RELEASE: PollPolicy = PollPolicy::fixed(Duration::from_secs(5), 6);

    fn next_delay(&self, current: Duration) -> Duration {
        let next = current.as_secs_f64() * self.backoff_multiplier;
        Duration::try_from_secs_f64(next.min(self.max_interval.as_secs_f64()))
            .unwrap_or(self.max_interval)
    }
}

/// Tri-state result of a poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut { attempts: u32 },
    Failed(String),
}

impl<T> PollOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            PollOutcome::Ready(value) => Some(value),
            _ => None,
        }
    }
}

/// Poll `check_fn` until it yields a value, fails, or attempts run out.
///
/// Sleeps between attempts only; the last unsuccessful attempt returns
/// immediately.
pub async fn poll_until<T, F, Fut>(
    policy: &PollPolicy,
    description: &str,
    mut check_fn: F,
) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PollResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.interval;

    for attempt in 1..=max_attempts {
        match check_fn().await {
            Ok(Some(value)) => {
                debug!(attempt, "{} ready", description);
                return PollOutcome::Ready(value);
            }
            Ok(None) => {
                debug!(attempt, max_attempts, "Waiting for {}...", description);
                if attempt < max_attempts {
                    tokio::time::sleep(delay).await;
                    delay = policy.next_delay(delay);
                }
            }
            Err(e) => return PollOutcome::Failed(format!("{}: {}", description, e)),
        }
    }

    PollOutcome::TimedOut {
        attempts: max_attempts,
    }
}
