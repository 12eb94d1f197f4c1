use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Global throttle enforcing a minimum spacing between dispatch attempts.
///
/// Waiters queue on a fair mutex, so turns are granted in arrival order.
/// This is not a token bucket: there is no burst capacity.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_permitted: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_permitted: Mutex::new(None),
        }
    }

    /// Wait until at least `min_interval` has passed since the previous
    /// turn was granted.
    pub async fn await_turn(&self) {
        let mut last = self.last_permitted.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if Instant::now() < ready_at {
                sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
