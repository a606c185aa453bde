//! Duration-bounded readiness polling.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ProvisionError;

/// Delay before retrying after a transient probe error.
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Outcome of one probe invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness<T> {
    /// The condition holds; polling stops with this value.
    Ready(T),
    /// Not yet; probe again after the given delay.
    NotReady(Duration),
}

/// Invoke `probe` until it reports [`Readiness::Ready`] or `timeout` elapses.
///
/// There is no attempt limit. Transient probe errors are logged and retried;
/// any other error aborts polling immediately. The sleep before the last
/// attempt is shortened so the final probe lands on the deadline.
///
/// # Errors
/// Returns [`ProvisionError::Timeout`] (carrying the last transient error, if
/// any) once the elapsed time reaches `timeout`, or the first non-transient
/// probe error.
pub async fn wait_for<T, F, Fut>(
    stage: &'static str,
    timeout: Duration,
    mut probe: F,
) -> Result<T, ProvisionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Readiness<T>, ProvisionError>>,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;
    let mut last_error = None;

    loop {
        attempt += 1;
        let delay = match probe().await {
            Ok(Readiness::Ready(value)) => {
                debug!(stage, attempt, elapsed = ?started.elapsed(), "Readiness stage satisfied");
                return Ok(value);
            }
            Ok(Readiness::NotReady(delay)) => {
                debug!(stage, attempt, "Not ready yet");
                delay
            }
            Err(e) if e.is_transient() => {
                warn!(stage, attempt, error = %e, "Probe failed, retrying");
                last_error = Some(e.to_string());
                TRANSIENT_RETRY_DELAY
            }
            Err(e) => return Err(e),
        };

        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(ProvisionError::Timeout {
                stage,
                timeout_secs: timeout.as_secs(),
                last_error,
            });
        }
        tokio::time::sleep(delay.min(timeout - elapsed)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_returns_first_ready_value() {
        let calls = AtomicU32::new(0);
        let replies = ["not supported", "not supported", "xYz123"];

        let password = wait_for("default password", Duration::from_secs(900), || {
            let call = calls.fetch_add(1, Ordering::SeqCst) as usize;
            let reply = replies[call];
            async move {
                if reply == "not supported" {
                    Ok(Readiness::NotReady(Duration::from_secs(1)))
                } else {
                    Ok(Readiness::Ready(reply.to_string()))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(password, "xYz123");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_budget() {
        let started = Instant::now();
        let calls = AtomicU32::new(0);

        let err = wait_for::<(), _, _>("server state ok", Duration::from_secs(10), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(Readiness::NotReady(Duration::from_secs(3))) }
        })
        .await
        .unwrap_err();

        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(matches!(err, ProvisionError::Timeout { timeout_secs: 10, .. }));
        // t = 0, 3, 6, 9, 10
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicU32::new(0);

        let value = wait_for("network address", Duration::from_secs(60), || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call < 2 {
                    Err(ProvisionError::Transport("connection reset".into()))
                } else {
                    Ok(Readiness::Ready("203.0.113.10"))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "203.0.113.10");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_last_transient_error() {
        let err = wait_for::<(), _, _>("status active", Duration::from_secs(2), || async {
            Err(ProvisionError::Transport("connection reset".into()))
        })
        .await
        .unwrap_err();

        match err {
            ProvisionError::Timeout { last_error, .. } => {
                assert!(last_error.unwrap().contains("connection reset"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_error_aborts() {
        let calls = AtomicU32::new(0);

        let err = wait_for::<(), _, _>("status active", Duration::from_secs(60), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ProvisionError::ProviderRejected {
                    status: 403,
                    message: "Invalid API key".into(),
                })
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ProvisionError::ProviderRejected { status: 403, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
