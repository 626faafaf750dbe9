//! In-process pipeline counters. Observability only; never drives control flow.

use std::{
    sync::{Mutex, MutexGuard},
    time::Duration,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub attempts: u64,
    /// Attempts that reached an outcome (cache hit, translation or failure).
    pub finished: u64,
    pub cache_hits: u64,
    pub backend_calls: u64,
    pub total_time: Duration,
    pub cache_lookup_time: Duration,
    pub backend_time: Duration,
}

impl MetricsSnapshot {
    pub fn cache_hit_percent(&self) -> u64 {
        if self.attempts == 0 {
            return 0;
        }
        (self.cache_hits * 100 + self.attempts / 2) / self.attempts
    }

    pub fn avg_total_ms(&self) -> u128 {
        avg_ms(self.total_time, self.finished)
    }

    pub fn avg_cache_lookup_ms(&self) -> u128 {
        avg_ms(self.cache_lookup_time, self.attempts)
    }

    pub fn avg_backend_ms(&self) -> u128 {
        avg_ms(self.backend_time, self.backend_calls)
    }
}

fn avg_ms(total: Duration, n: u64) -> u128 {
    if n == 0 {
        return 0;
    }
    total.as_millis() / u128::from(n)
}

/// Counters shared by all pipeline tasks.
#[derive(Debug)]
pub struct PipelineMetrics {
    log_every: u64,
    inner: Mutex<MetricsSnapshot>,
}

impl PipelineMetrics {
    pub fn new(log_every: u64) -> Self {
        Self {
            log_every: log_every.max(1),
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    /// A translation attempt passed the detection gate.
    pub fn record_attempt(&self, cache_lookup: Duration) {
        let mut m = self.lock();
        m.attempts += 1;
        m.cache_lookup_time += cache_lookup;
    }

    pub fn record_cache_hit(&self) {
        self.lock().cache_hits += 1;
    }

    pub fn record_backend_call(&self, elapsed: Duration) {
        let mut m = self.lock();
        m.backend_calls += 1;
        m.backend_time += elapsed;
    }

    /// Close out an attempt whatever its outcome; logs a summary every
    /// `log_every` finished attempts.
    pub fn finish_attempt(&self, total: Duration) {
        let snapshot = {
            let mut m = self.lock();
            m.finished += 1;
            m.total_time += total;
            *m
        };
        if snapshot.finished % self.log_every == 0 {
            tracing::info!(
                total = snapshot.finished,
                cached = snapshot.cache_hits,
                cached_pct = snapshot.cache_hit_percent(),
                avg_ms = snapshot.avg_total_ms() as u64,
                avg_cache_lookup_ms = snapshot.avg_cache_lookup_ms() as u64,
                avg_backend_ms = snapshot.avg_backend_ms() as u64,
                "Translation performance metrics"
            );
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, MetricsSnapshot> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new(50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_and_hit_rate() {
        let m = PipelineMetrics::new(50);
        m.record_attempt(Duration::from_millis(2));
        m.record_cache_hit();
        m.finish_attempt(Duration::from_millis(10));
        m.record_attempt(Duration::from_millis(4));
        m.record_backend_call(Duration::from_millis(300));
        m.finish_attempt(Duration::from_millis(310));

        let s = m.snapshot();
        assert_eq!(s.attempts, 2);
        assert_eq!(s.finished, 2);
        assert_eq!(s.cache_hits, 1);
        assert_eq!(s.backend_calls, 1);
        assert_eq!(s.cache_hit_percent(), 50);
        assert_eq!(s.avg_cache_lookup_ms(), 3);
        assert_eq!(s.avg_backend_ms(), 300);
        assert_eq!(s.avg_total_ms(), 160);
    }

    #[test]
    fn cache_hits_count_toward_total_time() {
        let m = PipelineMetrics::new(2);
        m.record_attempt(Duration::ZERO);
        m.record_backend_call(Duration::from_millis(40));
        m.finish_attempt(Duration::from_millis(50));

        m.record_attempt(Duration::ZERO);
        m.record_cache_hit();
        m.finish_attempt(Duration::from_millis(6));

        let s = m.snapshot();
        assert_eq!(s.finished, 2);
        assert_eq!(s.backend_calls, 1);
        assert_eq!(s.avg_total_ms(), 28);
    }

    #[test]
    fn empty_snapshot_has_zero_averages() {
        let s = PipelineMetrics::default().snapshot();
        assert_eq!(s.cache_hit_percent(), 0);
        assert_eq!(s.avg_backend_ms(), 0);
    }
}
