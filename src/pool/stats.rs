use std::collections::VecDeque;

/// Rolling window size for acquire-latency samples.
const ACQUIRE_WINDOW: usize = 100;

/// Snapshot of a pool's state and lifetime counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolStats {
    pub total_connections: usize,
    pub active_connections: usize,
    pub idle_connections: usize,
    pub waiting_clients: usize,
    pub total_created: u64,
    pub total_destroyed: u64,
    pub total_acquired: u64,
    pub total_released: u64,
    pub total_errors: u64,
    /// Mean over the last 100 acquire latencies, in milliseconds.
    pub average_acquire_time_ms: f64,
    /// Result-cache hits over hits plus misses; 0 when never consulted.
    pub cache_hit_rate: f64,
}

/// Lifetime counters, updated under the pool's state lock.
#[derive(Debug, Default)]
pub(super) struct StatsCounters {
    pub created: u64,
    pub destroyed: u64,
    pub acquired: u64,
    pub released: u64,
    pub errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    acquire_samples_ms: VecDeque<f64>,
}

impl StatsCounters {
    pub(super) fn record_acquire_latency(&mut self, millis: f64) {
        if self.acquire_samples_ms.len() >= ACQUIRE_WINDOW {
            self.acquire_samples_ms.pop_front();
        }
        self.acquire_samples_ms.push_back(millis);
    }

    pub(super) fn average_acquire_time_ms(&self) -> f64 {
        if self.acquire_samples_ms.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let count = self.acquire_samples_ms.len() as f64;
        self.acquire_samples_ms.iter().sum::<f64>() / count
    }

    pub(super) fn cache_hit_rate(&self) -> f64 {
        let consulted = self.cache_hits + self.cache_misses;
        if consulted == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.cache_hits as f64 / consulted as f64;
        rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_window_is_bounded() {
        let mut counters = StatsCounters::default();
        for i in 0..150 {
            counters.record_acquire_latency(f64::from(i));
        }
        assert_eq!(counters.acquire_samples_ms.len(), ACQUIRE_WINDOW);
        // Samples 50..150 remain; mean is 99.5.
        assert!((counters.average_acquire_time_ms() - 99.5).abs() < 1e-9);
    }

    #[test]
    fn hit_rate_counts_only_consultations() {
        let mut counters = StatsCounters::default();
        assert_eq!(counters.cache_hit_rate(), 0.0);
        counters.cache_hits = 3;
        counters.cache_misses = 1;
        assert!((counters.cache_hit_rate() - 0.75).abs() < 1e-9);
    }
}
