//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries for signal-handling latency (microseconds)
/// Buckets: ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, >25600
const BUCKET_BOUNDS: [u64; 10] = [50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600];
const NUM_BUCKETS: usize = 11;

/// Upper bound per bucket for percentile estimation (last is 2x the previous)
const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
    [50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];

/// Number of latency buckets exposed in summaries
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps interval counters to get a
/// consistent snapshot.
pub struct Metrics {
    /// Total signals ever processed by the monitor (monotonic)
    signals_total: AtomicU64,
    /// Signals since last report (reset on report)
    signals_since_report: AtomicU64,
    /// Sum of signal-handling latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max signal-handling latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Signal-handling latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Enter notifications dispatched (monotonic)
    enters_dispatched: AtomicU64,
    /// Exit notifications dispatched (monotonic)
    exits_dispatched: AtomicU64,
    /// Location updates dispatched (monotonic)
    locations_dispatched: AtomicU64,
    /// Crossing signals suppressed as duplicates (monotonic)
    duplicates_suppressed: AtomicU64,
    /// Crossing signals for unmonitored places (monotonic)
    unmonitored_dropped: AtomicU64,
    /// Dispatches dropped because no live observer was registered (monotonic)
    no_observer_dropped: AtomicU64,
    /// Feed signals received by the MQTT client (monotonic)
    feed_signals_received: AtomicU64,
    /// Feed signals dropped due to channel full (monotonic)
    feed_signals_dropped: AtomicU64,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            signals_total: AtomicU64::new(0),
            signals_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            enters_dispatched: AtomicU64::new(0),
            exits_dispatched: AtomicU64::new(0),
            locations_dispatched: AtomicU64::new(0),
            duplicates_suppressed: AtomicU64::new(0),
            unmonitored_dropped: AtomicU64::new(0),
            no_observer_dropped: AtomicU64::new(0),
            feed_signals_received: AtomicU64::new(0),
            feed_signals_dropped: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a signal was processed with given latency (lock-free)
    #[inline]
    pub fn record_signal_processed(&self, latency_us: u64) {
        self.signals_total.fetch_add(1, Ordering::Relaxed);
        self.signals_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_enter_dispatched(&self) {
        self.enters_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_exit_dispatched(&self) {
        self.exits_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_location_dispatched(&self) {
        self.locations_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_duplicate_suppressed(&self) {
        self.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_unmonitored_dropped(&self) {
        self.unmonitored_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_no_observer(&self) {
        self.no_observer_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_feed_signal_received(&self) {
        self.feed_signals_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_feed_signal_dropped(&self) {
        self.feed_signals_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total signals processed
    #[inline]
    pub fn signals_total(&self) -> u64 {
        self.signals_total.load(Ordering::Relaxed)
    }

    /// Produce a snapshot of the current interval and reset interval counters
    pub fn report(&self, monitored_places: usize) -> MetricsSummary {
        let mut last_report = self.last_report_time.lock();
        let elapsed = last_report.elapsed();
        *last_report = Instant::now();
        drop(last_report);

        let interval_signals = self.signals_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.latency_max_us.swap(0, Ordering::Relaxed);
        let buckets = swap_buckets(&self.latency_buckets);

        let avg_latency_us =
            if interval_signals > 0 { latency_sum / interval_signals } else { 0 };
        let signals_per_sec = if elapsed.as_secs_f64() > 0.0 {
            interval_signals as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            signals_total: self.signals_total.load(Ordering::Relaxed),
            signals_per_sec,
            avg_latency_us,
            max_latency_us: latency_max,
            lat_buckets: buckets,
            lat_p50_us: percentile_from_buckets(&buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&buckets, 0.99),
            enters_dispatched: self.enters_dispatched.load(Ordering::Relaxed),
            exits_dispatched: self.exits_dispatched.load(Ordering::Relaxed),
            locations_dispatched: self.locations_dispatched.load(Ordering::Relaxed),
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
            unmonitored_dropped: self.unmonitored_dropped.load(Ordering::Relaxed),
            no_observer_dropped: self.no_observer_dropped.load(Ordering::Relaxed),
            feed_signals_received: self.feed_signals_received.load(Ordering::Relaxed),
            feed_signals_dropped: self.feed_signals_dropped.load(Ordering::Relaxed),
            monitored_places,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Consistent snapshot of one reporting interval
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub signals_total: u64,
    pub signals_per_sec: f64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    pub lat_buckets: [u64; METRICS_NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub enters_dispatched: u64,
    pub exits_dispatched: u64,
    pub locations_dispatched: u64,
    pub duplicates_suppressed: u64,
    pub unmonitored_dropped: u64,
    pub no_observer_dropped: u64,
    pub feed_signals_received: u64,
    pub feed_signals_dropped: u64,
    pub monitored_places: usize,
}

impl MetricsSummary {
    /// Log the summary as a single structured line
    pub fn log(&self) {
        info!(
            signals_total = %self.signals_total,
            signals_per_sec = %format!("{:.1}", self.signals_per_sec),
            avg_latency_us = %self.avg_latency_us,
            max_latency_us = %self.max_latency_us,
            lat_p50_us = %self.lat_p50_us,
            lat_p95_us = %self.lat_p95_us,
            lat_p99_us = %self.lat_p99_us,
            enters = %self.enters_dispatched,
            exits = %self.exits_dispatched,
            locations = %self.locations_dispatched,
            duplicates_suppressed = %self.duplicates_suppressed,
            unmonitored_dropped = %self.unmonitored_dropped,
            no_observer_dropped = %self.no_observer_dropped,
            feed_received = %self.feed_signals_received,
            feed_dropped = %self.feed_signals_dropped,
            monitored_places = %self.monitored_places,
            "metrics_report"
        );
    }
}
