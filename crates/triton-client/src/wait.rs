//! Bounded polling for asynchronous CloudAPI operations
//!
//! Provisioning and deletion return before the instance reaches its terminal
//! state. [`poll_until`] re-checks at a fixed interval until the check reports
//! convergence, the timeout elapses, or the cancellation token fires. The loop
//! keeps its own tick count and elapsed time so both bounds are observable in
//! tests (run with a paused Tokio clock).

use crate::error::TritonError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default interval between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default bound for provisioning and deletion waits
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Poll cadence and bound for one kind of wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// Time between checks
    pub interval: Duration,
    /// Give up once this much time has passed
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

impl WaitConfig {
    /// Default interval with a custom timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

/// How a successful wait went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitReport {
    /// Number of checks performed, including the successful one
    pub ticks: u32,
    /// Time from the first check to convergence
    pub elapsed: Duration,
}

/// Poll `check` until it returns `Ok(true)`
///
/// Cancellation is checked before every tick and while sleeping. Errors from
/// `check` end the wait immediately.
///
/// # Arguments
/// * `operation` - What is being waited for, used in errors ("provision", "delete")
/// * `name` - Instance name, used in errors
/// * `config` - Interval and timeout
/// * `cancel` - Aborts the wait with [`TritonError::Cancelled`]
/// * `check` - Returns whether the operation has converged
pub async fn poll_until<F, Fut>(
    operation: &'static str,
    name: &str,
    config: WaitConfig,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<WaitReport, TritonError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, TritonError>>,
{
    let started = Instant::now();
    let mut ticks: u32 = 0;

    loop {
        let elapsed = started.elapsed();
        if cancel.is_cancelled() {
            return Err(TritonError::Cancelled {
                operation,
                name: name.to_string(),
                elapsed,
            });
        }

        ticks += 1;
        if check().await? {
            debug!(
                "Load balancer {} finished {} after {} checks ({:?})",
                name, operation, ticks, elapsed
            );
            return Ok(WaitReport {
                ticks,
                elapsed: started.elapsed(),
            });
        }

        let elapsed = started.elapsed();
        if elapsed >= config.timeout {
            return Err(TritonError::WaitTimeout {
                operation,
                name: name.to_string(),
                elapsed,
            });
        }

        debug!(
            "Waiting for load balancer {} to {} (check {}, {:?} elapsed)",
            name, operation, ticks, elapsed
        );

        let nap = config.interval.min(config.timeout - elapsed);
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(TritonError::Cancelled {
                    operation,
                    name: name.to_string(),
                    elapsed: started.elapsed(),
                });
            }
            _ = tokio::time::sleep(nap) => {}
        }
    }
}
