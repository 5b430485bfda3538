//! Adaptive concurrency control for external queries.
//!
//! Vulnerability lookups are independent across packages and fan out
//! concurrently; this module bounds that fan-out with an AIMD (additive
//! increase, multiplicative decrease) limit, the congestion-control scheme:
//! grow the limit slowly while queries succeed with acceptable latency,
//! cut it sharply on failures or slow responses.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

/// Configuration for the adaptive query limiter.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Starting concurrency limit
    pub initial_limit: usize,

    /// Floor the limit never drops below
    pub min_limit: usize,

    /// Ceiling the limit never grows past
    pub max_limit: usize,

    /// Additive step applied on success
    pub additive_increase: usize,

    /// Multiplicative factor applied on failure (0.5 = halve)
    pub backoff_factor: f64,

    /// Average latency above which the limit is cut proactively
    pub latency_threshold: Duration,

    /// Number of latency samples in the averaging window
    pub sample_window: usize,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            initial_limit: 8,
            min_limit: 1,
            max_limit: 64,
            additive_increase: 1,
            backoff_factor: 0.5,
            latency_threshold: Duration::from_millis(1000),
            sample_window: 20,
        }
    }
}

/// Counters exposed by the limiter.
#[derive(Debug, Default)]
pub struct LimiterStats {
    pub successes: AtomicU64,
    pub failures: AtomicU64,
    pub increases: AtomicU64,
    pub decreases: AtomicU64,
}

/// AIMD-based concurrency limiter for external queries.
pub struct QueryLimiter {
    limit: AtomicUsize,
    in_flight: AtomicUsize,
    config: LimiterConfig,
    latency_samples: parking_lot::Mutex<Vec<u64>>,
    sample_pos: AtomicUsize,
    stats: LimiterStats,
}

impl QueryLimiter {
    /// Create a limiter with the given configuration.
    pub fn new(config: LimiterConfig) -> Self {
        let sample_window = config.sample_window.max(1);
        Self {
            limit: AtomicUsize::new(config.initial_limit.max(config.min_limit)),
            in_flight: AtomicUsize::new(0),
            latency_samples: parking_lot::Mutex::new(vec![0; sample_window]),
            sample_pos: AtomicUsize::new(0),
            stats: LimiterStats::default(),
            config,
        }
    }

    /// Current concurrency limit.
    pub fn limit(&self) -> usize {
        self.limit.load(Ordering::Relaxed)
    }

    /// Queries currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Limiter counters.
    pub fn stats(&self) -> &LimiterStats {
        &self.stats
    }

    /// Try to take a permit without waiting.
    pub fn try_acquire(&self) -> Option<QueryPermit<'_>> {
        let current = self.in_flight.load(Ordering::Relaxed);
        if current < self.limit.load(Ordering::Relaxed)
            && self
                .in_flight
                .compare_exchange(current, current + 1, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
        {
            return Some(QueryPermit {
                limiter: self,
                started: Instant::now(),
                done: false,
            });
        }
        None
    }

    /// Wait until a permit is available.
    pub async fn acquire(&self) -> QueryPermit<'_> {
        loop {
            if let Some(permit) = self.try_acquire() {
                return permit;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    fn on_success(&self, latency_ms: u64) {
        self.stats.successes.fetch_add(1, Ordering::Relaxed);

        let window = self.config.sample_window.max(1);
        let pos = self.sample_pos.fetch_add(1, Ordering::Relaxed) % window;
        let avg = {
            let mut samples = self.latency_samples.lock();
            samples[pos] = latency_ms;
            samples.iter().sum::<u64>() / samples.len() as u64
        };

        if avg > self.config.latency_threshold.as_millis() as u64 {
            self.decrease();
            debug!(
                "Query limiter: proactive decrease, avg latency {}ms over threshold",
                avg
            );
        } else {
            self.increase();
        }
    }

    fn on_failure(&self) {
        self.stats.failures.fetch_add(1, Ordering::Relaxed);
        self.decrease();
    }

    fn increase(&self) {
        let current = self.limit.load(Ordering::Relaxed);
        let next = (current + self.config.additive_increase).min(self.config.max_limit);
        if next > current {
            self.limit.store(next, Ordering::Relaxed);
            self.stats.increases.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn decrease(&self) {
        let current = self.limit.load(Ordering::Relaxed);
        let next =
            ((current as f64 * self.config.backoff_factor) as usize).max(self.config.min_limit);
        if next < current {
            self.limit.store(next, Ordering::Relaxed);
            self.stats.decreases.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// A held concurrency slot.
///
/// Call [`QueryPermit::success`] or [`QueryPermit::failure`] when the query
/// completes; a permit dropped without either counts as a failure so an
/// early-returning caller still releases its slot and backs the limit off.
pub struct QueryPermit<'a> {
    limiter: &'a QueryLimiter,
    started: Instant,
    done: bool,
}

impl QueryPermit<'_> {
    /// Complete the query successfully.
    pub fn success(mut self) {
        self.finish(true);
    }

    /// Complete the query as failed.
    pub fn failure(mut self) {
        self.finish(false);
    }

    fn finish(&mut self, ok: bool) {
        if self.done {
            return;
        }
        self.done = true;
        self.limiter.in_flight.fetch_sub(1, Ordering::Release);
        if ok {
            let latency = self.started.elapsed().as_millis() as u64;
            self.limiter.on_success(latency);
        } else {
            self.limiter.on_failure();
        }
    }
}

impl Drop for QueryPermit<'_> {
    fn drop(&mut self) {
        self.finish(false);
    }
}
