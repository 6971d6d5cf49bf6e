//! Sliding window of the last N probe/outcome samples.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub success: bool,
    pub latency_ms: Option<u32>,
}

#[derive(Debug)]
pub struct SlidingWindow {
    capacity: usize,
    samples: VecDeque<Sample>,
}

impl SlidingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, sample: Sample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn successes(&self) -> usize {
        self.samples.iter().filter(|s| s.success).count()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Nearest-rank 95th percentile latency over successful samples
    /// that reported one. `None` when no latency data is available
    /// (e.g. the window holds only passive outcome reports).
    pub fn latency_p95_ms(&self) -> Option<u32> {
        let mut latencies: Vec<u32> = self.samples.iter().filter_map(|s| s.latency_ms).collect();
        if latencies.is_empty() {
            return None;
        }
        latencies.sort_unstable();
        let rank = ((latencies.len() as f64) * 0.95).ceil() as usize;
        let index = rank.saturating_sub(1).min(latencies.len() - 1);
        Some(latencies[index])
    }

    pub fn most_recent_latency_ms(&self) -> Option<u32> {
        self.samples.back().and_then(|s| s.latency_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_sample_past_capacity() {
        let mut window = SlidingWindow::new(3);
        window.push(Sample { success: true, latency_ms: Some(1) });
        window.push(Sample { success: true, latency_ms: Some(2) });
        window.push(Sample { success: true, latency_ms: Some(3) });
        window.push(Sample { success: false, latency_ms: None });
        assert_eq!(window.sample_count(), 3);
        assert_eq!(window.successes(), 2);
    }

    #[test]
    fn p95_over_ten_samples() {
        let mut window = SlidingWindow::new(10);
        for ms in 1..=10u32 {
            window.push(Sample { success: true, latency_ms: Some(ms * 100) });
        }
        assert_eq!(window.latency_p95_ms(), Some(1000));
    }

    #[test]
    fn p95_ignores_failures_without_latency() {
        let mut window = SlidingWindow::new(10);
        window.push(Sample { success: false, latency_ms: None });
        assert_eq!(window.latency_p95_ms(), None);
    }
}
