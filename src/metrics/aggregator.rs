use crate::item::{Outcome, WorkItem};
use crate::metrics::snapshot::{Progress, RankedEntry, Summary};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Process-wide outcome counters. All mutation goes through atomics or the
/// ranking mutex, so any number of tasks may record concurrently.
pub struct Aggregator {
    target: AtomicU64,
    success: AtomicU64,
    failure: AtomicU64,
    active_workers: AtomicU64,
    total_latency_us: AtomicU64,
    ranking_enabled: AtomicBool,
    ranked: Mutex<Vec<RankedEntry>>,
    clock: Mutex<RunClock>,
}

struct RunClock {
    started_at: DateTime<Utc>,
    started: Instant,
    finished: Option<Instant>,
}

impl RunClock {
    fn now() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            finished: None,
        }
    }

    fn elapsed(&self) -> Duration {
        match self.finished {
            Some(end) => end.duration_since(self.started),
            None => self.started.elapsed(),
        }
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            target: AtomicU64::new(0),
            success: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            active_workers: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            ranking_enabled: AtomicBool::new(false),
            ranked: Mutex::new(Vec::new()),
            clock: Mutex::new(RunClock::now()),
        }
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the counters and starts the clock for a new run.
    pub fn begin(&self, target: u64, rank: bool) {
        self.target.store(target, Ordering::SeqCst);
        self.success.store(0, Ordering::SeqCst);
        self.failure.store(0, Ordering::SeqCst);
        self.total_latency_us.store(0, Ordering::SeqCst);
        self.ranking_enabled.store(rank, Ordering::SeqCst);
        self.ranked.lock().clear();
        *self.clock.lock() = RunClock::now();
    }

    /// Freezes the elapsed time used by [`Aggregator::summarize`].
    pub fn finish(&self) {
        let mut clock = self.clock.lock();
        if clock.finished.is_none() {
            clock.finished = Some(Instant::now());
        }
    }

    /// Records one final outcome and returns the completed count after it.
    pub fn record(&self, item: &WorkItem, outcome: &Outcome) -> u64 {
        match outcome {
            Outcome::Success { latency, .. } => {
                let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
                self.total_latency_us.fetch_add(micros, Ordering::SeqCst);
                if self.ranking_enabled.load(Ordering::SeqCst) {
                    self.ranked
                        .lock()
                        .push(RankedEntry::new(item.seq(), item.endpoint(), *latency));
                }
                self.success.fetch_add(1, Ordering::SeqCst);
            }
            Outcome::Failure { .. } => {
                self.failure.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.completed()
    }

    pub fn increment_active_workers(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement_active_workers(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn completed(&self) -> u64 {
        self.success.load(Ordering::SeqCst) + self.failure.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> Progress {
        let success = self.success.load(Ordering::SeqCst);
        let failure = self.failure.load(Ordering::SeqCst);
        let completed = success + failure;
        let elapsed = self.clock.lock().elapsed().as_secs_f64();

        Progress {
            target: self.target.load(Ordering::SeqCst),
            completed,
            success,
            failure,
            active_workers: self.active_workers.load(Ordering::SeqCst),
            success_rate: ratio(success, completed),
            requests_per_second: per_second(completed, elapsed),
            elapsed_seconds: elapsed,
        }
    }

    pub fn summarize(&self) -> Summary {
        let success = self.success.load(Ordering::SeqCst);
        let failure = self.failure.load(Ordering::SeqCst);
        let completed = success + failure;
        let (started_at, elapsed) = {
            let clock = self.clock.lock();
            (clock.started_at, clock.elapsed().as_secs_f64())
        };

        let avg_latency_ms = if success > 0 {
            self.total_latency_us.load(Ordering::SeqCst) / success / 1000
        } else {
            0
        };

        Summary {
            started_at: started_at.to_rfc3339(),
            target: self.target.load(Ordering::SeqCst),
            completed,
            success,
            failure,
            elapsed_seconds: elapsed,
            success_rate: ratio(success, completed),
            throughput: per_second(completed, elapsed),
            avg_latency_ms,
        }
    }

    /// Successful items ordered by ascending latency. Equal latencies keep
    /// the order in which the source handed the items out.
    pub fn rank(&self) -> Vec<RankedEntry> {
        let mut ranked = self.ranked.lock().clone();
        ranked.sort_by_key(|entry| (entry.latency, entry.seq));
        ranked
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn per_second(count: u64, elapsed_seconds: f64) -> f64 {
    if elapsed_seconds > 0.0 {
        count as f64 / elapsed_seconds
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RequestError;
    use url::Url;

    fn proxy_item(seq: u64, endpoint: &str) -> WorkItem {
        WorkItem::via_proxy(seq, Url::parse("http://example.com/ip").unwrap(), endpoint)
    }

    fn ok(ms: u64) -> Outcome {
        Outcome::Success {
            latency: Duration::from_millis(ms),
            attempts: 1,
        }
    }

    #[test]
    fn rank_orders_by_latency() {
        let agg = Aggregator::new();
        agg.begin(3, true);
        agg.record(&proxy_item(0, "a:1"), &ok(500));
        agg.record(&proxy_item(1, "b:1"), &ok(100));
        agg.record(&proxy_item(2, "c:1"), &ok(300));

        let latencies: Vec<Duration> = agg.rank().iter().map(|e| e.latency).collect();
        assert_eq!(
            latencies,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(300),
                Duration::from_millis(500)
            ]
        );
        assert_eq!(agg.rank()[0].endpoint, "b:1");
    }

    #[test]
    fn rank_ties_keep_source_order() {
        let agg = Aggregator::new();
        agg.begin(3, true);
        agg.record(&proxy_item(2, "late:1"), &ok(50));
        agg.record(&proxy_item(0, "early:1"), &ok(50));
        agg.record(&proxy_item(1, "mid:1"), &ok(50));

        let endpoints: Vec<String> = agg.rank().into_iter().map(|e| e.endpoint).collect();
        assert_eq!(endpoints, vec!["early:1", "mid:1", "late:1"]);
    }

    #[test]
    fn ranking_disabled_keeps_no_entries() {
        let agg = Aggregator::new();
        agg.begin(1, false);
        agg.record(&proxy_item(0, "a:1"), &ok(10));
        assert!(agg.rank().is_empty());
        assert_eq!(agg.summarize().success, 1);
    }

    #[test]
    fn summarize_with_nothing_completed_has_zero_rate() {
        let agg = Aggregator::new();
        agg.begin(10, false);
        agg.finish();
        let summary = agg.summarize();
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.success_rate, 0.0);
        assert!(!summary.success_rate.is_nan());
        assert!(summary.throughput.is_finite());
        assert_eq!(summary.avg_latency_ms, 0);
    }

    #[test]
    fn record_splits_success_and_failure() {
        let agg = Aggregator::new();
        agg.begin(4, false);
        let failure = Outcome::Failure {
            error: RequestError::Status(500),
            attempts: 4,
        };
        agg.record(&proxy_item(0, "a:1"), &ok(20));
        agg.record(&proxy_item(1, "a:1"), &failure);
        agg.record(&proxy_item(2, "a:1"), &ok(40));
        assert_eq!(agg.record(&proxy_item(3, "a:1"), &failure), 4);

        let progress = agg.progress();
        assert_eq!((progress.completed, progress.target), (4, 4));
        assert_eq!((progress.success, progress.failure), (2, 2));

        let summary = agg.summarize();
        assert_eq!(summary.success_rate, 0.5);
        assert_eq!(summary.avg_latency_ms, 30);
    }

    #[test]
    fn begin_resets_previous_run() {
        let agg = Aggregator::new();
        agg.begin(1, true);
        agg.record(&proxy_item(0, "a:1"), &ok(1));
        agg.begin(5, true);
        assert_eq!(agg.completed(), 0);
        assert!(agg.rank().is_empty());
        assert_eq!(agg.progress().target, 5);
    }
}
