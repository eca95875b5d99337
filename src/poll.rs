//! Status polling for sandbox lifecycle waits.
//!
//! [`wait_until`] re-fetches a sandbox descriptor until a caller-supplied
//! predicate holds, the sandbox dies, or a deadline passes. The predicate is
//! checked before the failure check, so waiting *for* a terminal state (for
//! example waiting for termination to complete) works without tripping the
//! failure path.

use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, trace};

use crate::client::SandboxClient;
use crate::error::{FailureKind, Result, SandboxError};
use crate::models::Sandbox;

/// Knobs for a lifecycle wait.
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Overall deadline. Measured from the first poll.
    pub timeout: Duration,
    /// Base delay between polls.
    pub interval: Duration,
    /// Random jitter fraction applied to each interval, to spread out
    /// polls from concurrent waiters. 0.1 means ±10%.
    pub jitter: f64,
}

impl WaitOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: Duration::from_secs(1),
            jitter: 0.1,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

/// Poll `sandbox_id` until `predicate` holds for its descriptor.
///
/// The first check happens immediately, so a predicate that is already
/// satisfied returns without sleeping. Errors:
/// - [`SandboxError::ResourceFailed`] if the sandbox enters a failed state
///   the predicate does not accept, with the failure classified from the
///   descriptor's error fields;
/// - [`SandboxError::Timeout`] carrying the last observed status once the
///   deadline passes.
pub(crate) async fn wait_until<P>(
    client: &SandboxClient,
    sandbox_id: &str,
    predicate: P,
    options: WaitOptions,
) -> Result<Sandbox>
where
    P: Fn(&Sandbox) -> bool,
{
    let started = Instant::now();
    let mut last_status = None;

    loop {
        let sandbox = client.get(sandbox_id).await?;
        last_status = Some(sandbox.status);
        trace!(id = %sandbox_id, status = %sandbox.status, "polled sandbox");

        if predicate(&sandbox) {
            debug!(
                id = %sandbox_id,
                status = %sandbox.status,
                waited_ms = started.elapsed().as_millis() as u64,
                "wait condition satisfied"
            );
            return Ok(sandbox);
        }

        if sandbox.status.is_failed() {
            return Err(SandboxError::ResourceFailed {
                id: sandbox.id,
                status: sandbox.status,
                kind: FailureKind::from_error_type(sandbox.error_type.as_deref()),
                message: sandbox
                    .error_message
                    .unwrap_or_else(|| format!("sandbox entered {} state", sandbox.status)),
            });
        }

        if started.elapsed() >= options.timeout {
            return Err(SandboxError::Timeout {
                waited: started.elapsed(),
                last_status,
            });
        }

        tokio::time::sleep(jittered(options.interval, options.jitter)).await;
    }
}

/// Poll a background job until it completes.
///
/// Same loop shape as [`wait_until`], parameterized over job completion
/// instead of a descriptor predicate. `last_status` is `None` on timeout:
/// jobs have no lifecycle status of their own, only completed-or-not.
pub(crate) async fn wait_for_job(
    client: &SandboxClient,
    handle: &crate::models::JobHandle,
    options: WaitOptions,
) -> Result<crate::models::JobStatus> {
    let started = Instant::now();
    loop {
        let status = client.get_background_job(handle).await?;
        if status.completed {
            debug!(
                job_id = %handle.job_id,
                waited_ms = started.elapsed().as_millis() as u64,
                "background job completed"
            );
            return Ok(status);
        }
        if started.elapsed() >= options.timeout {
            return Err(SandboxError::Timeout {
                waited: started.elapsed(),
                last_status: None,
            });
        }
        tokio::time::sleep(jittered(options.interval, options.jitter)).await;
    }
}

/// Apply symmetric random jitter to an interval.
fn jittered(interval: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return interval;
    }
    let factor = rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter);
    interval.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let j = jittered(base, 0.1);
            assert!(j >= Duration::from_millis(900), "{j:?}");
            assert!(j <= Duration::from_millis(1100), "{j:?}");
        }
    }

    #[test]
    fn zero_jitter_is_identity() {
        let base = Duration::from_millis(250);
        assert_eq!(jittered(base, 0.0), base);
    }
}
