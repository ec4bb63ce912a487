//! Polling and best-effort policies
//!
//! Eventual-consistency waits (instance activation, SSH reachability) are the
//! only operations that retry; everything else is attempted once.

use crate::error::{CloudError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Fixed-interval polling with an overall deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two checks
    pub interval: Duration,

    /// Give up once this much time has elapsed
    pub timeout: Duration,
}

impl PollPolicy {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Instance activation: every 5s for up to 300s
    pub const fn activation() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(300))
    }

    /// SSH reachability: every 5s for up to 300s
    pub const fn ssh() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(300))
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::activation()
    }
}

/// Run `check` until it yields a value or the policy's timeout elapses.
///
/// `Ok(None)` from the check means "not ready yet". A check error aborts the
/// wait immediately; callers that want to tolerate transient errors map them
/// to `Ok(None)` themselves.
pub async fn poll_until<T, F, Fut>(policy: PollPolicy, resource: &str, mut check: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let start = Instant::now();
    loop {
        if let Some(value) = check().await? {
            return Ok(value);
        }

        if start.elapsed() + policy.interval > policy.timeout {
            return Err(CloudError::ProvisioningTimeout {
                resource: resource.to_string(),
                seconds: policy.timeout.as_secs(),
            });
        }

        tracing::debug!("{} not ready, retrying in {:?}", resource, policy.interval);
        sleep(policy.interval).await;
    }
}

/// Swallow the error of a cleanup step after logging it.
///
/// Used where a failure must not abort the surrounding command, e.g. deleting
/// an ephemeral VM after a build or removing local working directories.
pub fn best_effort<T, E: std::fmt::Display>(
    operation: &str,
    result: std::result::Result<T, E>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("{} failed (ignored): {}", operation, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_poll_returns_when_ready() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = poll_until(PollPolicy::activation(), "droplet 1", || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(if n == 3 { Some("active") } else { None })
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "active");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out() {
        let policy = PollPolicy::new(Duration::from_secs(5), Duration::from_secs(20));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = poll_until::<(), _, _>(policy, "droplet 42", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        })
        .await
        .unwrap_err();

        match err {
            CloudError::ProvisioningTimeout { resource, seconds } => {
                assert_eq!(resource, "droplet 42");
                assert_eq!(seconds, 20);
            }
            other => panic!("unexpected error: {other}"),
        }
        // checks at 0s, 5s, 10s, 15s and 20s
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_propagates_check_error() {
        let result = poll_until::<(), _, _>(PollPolicy::ssh(), "host", || async {
            Err(CloudError::Api {
                status: 500,
                body: "boom".into(),
            })
        })
        .await;
        assert!(matches!(result, Err(CloudError::Api { status: 500, .. })));
    }

    #[test]
    fn test_best_effort() {
        let ok: std::result::Result<u32, String> = Ok(1);
        assert_eq!(best_effort("noop", ok), Some(1));

        let err: std::result::Result<u32, String> = Err("gone".into());
        assert_eq!(best_effort("delete droplet", err), None);
    }
}
