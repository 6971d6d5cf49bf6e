//! Retry backoff: `backoff(n) = min(2^n·baseDelay + jitter, maxDelay)`,
//! `jitter ∈ [0, 0.3·baseDelay]`.

use std::time::Duration;

use rand::Rng;

pub fn compute(attempts: u32, base_delay: Duration, max_delay: Duration) -> Duration {
    let exponential = 2f64.powi(attempts.min(32) as i32) * base_delay.as_secs_f64();
    let jitter_ceiling = 0.3 * base_delay.as_secs_f64();
    let jitter = if jitter_ceiling > 0.0 {
        rand::rng().random_range(0.0..=jitter_ceiling)
    } else {
        0.0
    };
    let total = (exponential + jitter).min(max_delay.as_secs_f64());
    Duration::from_secs_f64(total.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially_then_caps() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);
        let d1 = compute(1, base, max);
        let d2 = compute(2, base, max);
        assert!(d1.as_secs_f64() >= 10.0 && d1.as_secs_f64() <= 10.0 + 1.5);
        assert!(d2 > d1);
        let d_large = compute(10, base, max);
        assert!(d_large <= max);
    }

    #[test]
    fn never_exceeds_max_delay() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);
        for attempts in 0..20 {
            assert!(compute(attempts, base, max) <= max);
        }
    }
}
