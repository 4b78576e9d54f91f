use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{Duration, Instant, sleep_until};
use tracing::debug;

/// Per-instance pacing state
///
/// Owns the start time of the previous delivery. Holding a
/// [`ThrottlePermit`] serializes deliveries through one instance.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_start: Mutex<Option<Instant>>,
}

/// Proof that the throttle interval has elapsed; the next caller waits
/// until this is dropped.
#[derive(Debug)]
pub struct ThrottlePermit<'a> {
    _guard: MutexGuard<'a, Option<Instant>>,
    started: Instant,
    waited: Duration,
}

impl ThrottlePermit<'_> {
    /// When this delivery was allowed to start
    pub fn started(&self) -> Instant {
        self.started
    }

    /// Time spent waiting for the interval
    pub fn waited(&self) -> Duration {
        self.waited
    }
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_start: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for the previous delivery to finish and for the interval since
    /// its start to elapse.
    pub async fn acquire(&self) -> ThrottlePermit<'_> {
        let mut guard = self.last_start.lock().await;
        let mut waited = Duration::ZERO;

        if let Some(last) = *guard {
            let ready = last + self.interval;
            let now = Instant::now();
            if ready > now {
                waited = ready - now;
                debug!(wait_ms = waited.as_millis() as u64, "Throttling delivery");
                sleep_until(ready).await;
            }
        }

        let started = Instant::now();
        *guard = Some(started);
        ThrottlePermit {
            _guard: guard,
            started,
            waited,
        }
    }

    /// Like [`acquire`](Self::acquire) but gives up instead of waiting.
    pub fn try_acquire(&self) -> Option<ThrottlePermit<'_>> {
        let mut guard = self.last_start.try_lock().ok()?;

        if let Some(last) = *guard {
            if last + self.interval > Instant::now() {
                return None;
            }
        }

        let started = Instant::now();
        *guard = Some(started);
        Some(ThrottlePermit {
            _guard: guard,
            started,
            waited: Duration::ZERO,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_does_not_wait() {
        let throttle = Throttle::new(Duration::from_secs(1));
        let permit = throttle.acquire().await;
        assert_eq!(permit.waited(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_acquire_waits_for_interval() {
        let throttle = Throttle::new(Duration::from_secs(1));
        let first = throttle.acquire().await.started();
        let second = throttle.acquire().await.started();
        assert!(second - first >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_interval_does_not_wait() {
        let throttle = Throttle::new(Duration::from_secs(1));
        drop(throttle.acquire().await);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(throttle.acquire().await.waited(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_refuses_early_call() {
        let throttle = Throttle::new(Duration::from_secs(1));
        assert!(throttle.try_acquire().is_some());
        assert!(throttle.try_acquire().is_none());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(throttle.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_try_acquire_refuses_while_held() {
        let throttle = Throttle::new(Duration::ZERO);
        let held = throttle.acquire().await;
        assert!(throttle.try_acquire().is_none());
        drop(held);
        assert!(throttle.try_acquire().is_some());
    }
}
