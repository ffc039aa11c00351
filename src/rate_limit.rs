use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum-interval rate limiter for oracle calls.
///
/// The oracle's quota contract is a minimum spacing between requests, so the
/// limiter is the only path to the oracle: callers `acquire()` before every
/// call and cannot skip the wait. The handle is shared via `Arc`, one handle
/// process-wide or one per session; either way every caller of a given
/// handle observes at least `min_interval` between grants, because the slot
/// is held (async mutex) across the wait.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_grant: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the next request slot opens, then claim it.
    ///
    /// The first acquisition is immediate; each subsequent one waits out the
    /// remainder of `min_interval` since the previous grant.
    pub async fn acquire(&self) {
        let mut last_grant = self.last_grant.lock().await;
        if let Some(prev) = *last_grant {
            let due = prev + self.min_interval;
            if due > Instant::now() {
                tokio::time::sleep_until(due).await;
            }
        }
        *last_grant = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_acquire_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn acquisitions_are_spaced_by_min_interval() {
        let limiter = RateLimiter::new(Duration::from_secs(1));

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        assert!(Instant::now() - start >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_cannot_collapse_the_interval() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(100)));
        let start = Instant::now();

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();
        for task in tasks {
            task.await.expect("task panicked");
        }

        // 4 grants need at least 3 full intervals between them.
        assert!(Instant::now() - start >= Duration::from_millis(300));
    }
}
