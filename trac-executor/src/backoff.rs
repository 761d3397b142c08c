//! Bounded exponential backoff with jitter for the executor's network
//! path (spec.md §4.6: base 1s, cap 30s, max 5 retries per poll cycle).
//! The doubling shape is `dog-queue::adapter::QueueAdapter::calculate_retry_time`'s
//! `base * 2^(attempt-1)` capped at a ceiling, with jitter added since a
//! poll cycle retries in a tight loop rather than being rescheduled.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base: Duration,
    pub cap: Duration,
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            max_retries: 5,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry `attempt` (1-indexed), with up to 20% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base.as_millis().saturating_mul(1u128 << attempt.saturating_sub(1).min(20));
        let capped = exp.min(self.cap.as_millis());
        let jitter_frac = rand::thread_rng().gen_range(0.0..0.2);
        let jittered = (capped as f64 * (1.0 + jitter_frac)) as u128;
        Duration::from_millis(jittered.min(u64::MAX as u128) as u64)
    }
}

/// Call `poll_once` up to `config.max_retries` times, retrying only on
/// `TracErrorKind::ExecutorTransient`; any other error (including the
/// final transient one) is returned as-is.
pub async fn poll_with_retry<F, Fut, T>(config: &BackoffConfig, mut poll_once: F) -> Result<T, trac_core::TracError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, trac_core::TracError>>,
{
    let mut attempt = 0;
    loop {
        match poll_once().await {
            Ok(v) => return Ok(v),
            Err(e) if matches!(e.kind, trac_core::TracErrorKind::ExecutorTransient) && attempt < config.max_retries => {
                attempt += 1;
                tokio::time::sleep(config.delay_for(attempt)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_until_cap() {
        let cfg = BackoffConfig { base: Duration::from_secs(1), cap: Duration::from_secs(30), max_retries: 5 };
        assert!(cfg.delay_for(1).as_millis() >= 1000 && cfg.delay_for(1).as_millis() < 1300);
        assert!(cfg.delay_for(5) <= Duration::from_millis((30_000_f64 * 1.2) as u64));
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let cfg = BackoffConfig { base: Duration::from_millis(1), cap: Duration::from_millis(5), max_retries: 3 };
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = poll_with_retry(&cfg, || {
            let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(trac_core::TracError::executor_transient("not ready"))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let cfg = BackoffConfig::default();
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let err = poll_with_retry(&cfg, || {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err::<(), _>(trac_core::TracError::executor_fatal("boom")) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err.kind, trac_core::TracErrorKind::ExecutorFatal));
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausting_retries_returns_last_transient_error() {
        let cfg = BackoffConfig { base: Duration::from_millis(1), cap: Duration::from_millis(2), max_retries: 2 };
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let err = poll_with_retry(&cfg, || {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err::<(), _>(trac_core::TracError::executor_transient("still down")) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err.kind, trac_core::TracErrorKind::ExecutorTransient));
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
