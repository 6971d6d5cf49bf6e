//! Token-bucket rate limiting per indexer.
//!
//! A refilling bucket sized by `rateLimitRequests` over
//! `rateLimitWindow`.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use foliofox_model::error::DomainError;

/// A token bucket that refills continuously: one token every
/// `window / capacity`, capped at `capacity` tokens banked.
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(requests: u32, window: Duration) -> Self {
        let capacity = requests.max(1) as f64;
        let refill_per_sec = capacity / window.as_secs_f64().max(0.001);
        Self {
            capacity,
            refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Acquire a token, waiting until either one is available or
    /// `deadline` is reached. Returns `IndexerRateLimited` when waiting
    /// would exceed the deadline.
    pub async fn acquire(&self, deadline: Instant) -> Result<(), DomainError> {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return Ok(());
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec)
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(DomainError::IndexerRateLimited {
                    retry_after_secs: Some(wait.as_secs().max(1)),
                });
            }
            let remaining = deadline.saturating_duration_since(now);
            if wait > remaining {
                return Err(DomainError::IndexerRateLimited {
                    retry_after_secs: Some(wait.as_secs().max(1)),
                });
            }
            tokio::time::sleep(wait.min(remaining)).await;
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exhausts_then_refills() {
        let limiter = RateLimiter::new(1, Duration::from_millis(50));
        let deadline = Instant::now() + Duration::from_secs(1);
        limiter.acquire(deadline).await.unwrap();
        // Second token isn't available instantly but refills within the window.
        limiter.acquire(deadline).await.unwrap();
    }

    #[tokio::test]
    async fn fails_when_deadline_too_tight() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let deadline = Instant::now() + Duration::from_millis(10);
        limiter.acquire(deadline).await.unwrap();
        let result = limiter.acquire(deadline).await;
        assert!(matches!(
            result,
            Err(DomainError::IndexerRateLimited { .. })
        ));
    }
}
