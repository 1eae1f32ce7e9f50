use crate::client::HttpClient;
use crate::error::{Error, Result};
use crate::item::{Outcome, WorkItem};
use crate::metrics::{Aggregator, Progress, RankedEntry, Summary};
use crate::retry::RetryPolicy;
use crate::signal::{StopHandle, stop_channel};
use crate::source::{DispatchMode, EndpointSource};
use futures::stream::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Running,
    Stopping,
    Finished,
}

/// Runs work items from an [`EndpointSource`] through a fixed pool of
/// workers, at most `concurrency` of them executing at once.
pub struct Dispatcher {
    client: Arc<dyn HttpClient>,
    policy: RetryPolicy,
    concurrency: usize,
    progress_every: u64,
    aggregator: Arc<Aggregator>,
    stop: StopHandle,
    state_watcher: Arc<watch::Sender<DispatchState>>,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn HttpClient>, policy: RetryPolicy, concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(Error::ZeroConcurrency);
        }
        let (state_tx, _) = watch::channel(DispatchState::Idle);
        let (stop, _) = stop_channel();

        Ok(Self {
            client,
            policy,
            concurrency,
            progress_every: 1000,
            aggregator: Arc::new(Aggregator::new()),
            stop,
            state_watcher: Arc::new(state_tx),
        })
    }

    /// Emit a progress log line every `every` completed items. `0` disables it.
    pub fn with_progress_every(mut self, every: u64) -> Self {
        self.progress_every = every;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Handle for raising the stop signal from outside, e.g. a ctrl-c task.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> DispatchState {
        *self.state_watcher.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<DispatchState> {
        self.state_watcher.subscribe()
    }

    /// Workers spawned for a source of `total` items: never more than there
    /// are items to hand out.
    pub fn worker_count(&self, total: u64) -> usize {
        usize::try_from(total).map_or(self.concurrency, |total| total.min(self.concurrency))
    }

    /// Drains `source` and returns the run's summary.
    ///
    /// Per-request errors never surface here; they are folded into the
    /// failure count. Raising the stop signal lets in-flight attempts finish
    /// and prevents any new one from starting. A stop raised during a previous
    /// run is cleared when the next run starts.
    pub async fn run(&self, source: Arc<dyn EndpointSource>) -> Result<Summary> {
        if self.state() == DispatchState::Finished {
            self.stop.reset();
        }
        let mode = source.mode();
        let total = source.total();
        let worker_count = self.worker_count(total);
        self.aggregator.begin(total, mode == DispatchMode::Exhaustion);
        self.set_state(DispatchState::Running);
        log::info!(
            "Dispatching {} items ({:?} mode) with {} workers",
            total,
            mode,
            worker_count
        );

        let (outcomes_tx, outcomes_rx) =
            mpsc::channel::<(WorkItem, Outcome)>(worker_count.max(1) * 2);

        // Single writer for the aggregate state.
        let aggregator = self.aggregator.clone();
        let progress_every = self.progress_every;
        let recorder = tokio::spawn(async move {
            let mut outcomes = tokio_stream::wrappers::ReceiverStream::new(outcomes_rx);
            while let Some((item, outcome)) = outcomes.next().await {
                let completed = aggregator.record(&item, &outcome);
                if progress_every > 0 && completed % progress_every == 0 {
                    let progress = aggregator.progress();
                    log::info!(
                        "Progress: {}/{} Success: {} Failed: {}",
                        progress.completed,
                        progress.target,
                        progress.success,
                        progress.failure
                    );
                }
            }
        });

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            let source = source.clone();
            let client = self.client.clone();
            let policy = self.policy;
            let stop = self.stop.subscribe();
            let outcomes_tx = outcomes_tx.clone();
            let aggregator = self.aggregator.clone();

            workers.spawn(async move {
                let mut handled = 0u64;
                while !stop.is_raised() {
                    let Some(item) = source.next_item() else {
                        break;
                    };
                    aggregator.increment_active_workers();
                    let outcome = policy.execute(client.as_ref(), &item, &stop).await;
                    aggregator.decrement_active_workers();
                    handled += 1;
                    if outcomes_tx.send((item, outcome)).await.is_err() {
                        break;
                    }
                }
                log::debug!("Worker {} exiting after {} items", worker_id, handled);
            });
        }
        drop(outcomes_tx);

        let stop_signal = self.stop.subscribe();
        let state_watcher = self.state_watcher.clone();
        let stopping = tokio::spawn(async move {
            stop_signal.raised().await;
            log::info!("Stop requested, waiting for in-flight requests");
            state_watcher.send_replace(DispatchState::Stopping);
        });

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                log::error!("Worker task failed: {}", e);
            }
        }
        stopping.abort();

        recorder
            .await
            .map_err(|e| Error::Internal(format!("outcome recorder failed: {}", e)))?;
        self.aggregator.finish();
        self.set_state(DispatchState::Finished);

        let summary = self.aggregator.summarize();
        log::info!(
            "Completed {} requests in {:.2} seconds",
            summary.completed,
            summary.elapsed_seconds
        );
        log::info!("Success rate: {:.2}%", summary.success_rate * 100.0);
        log::info!("Requests per second: {:.2}", summary.throughput);
        Ok(summary)
    }

    pub fn progress(&self) -> Progress {
        self.aggregator.progress()
    }

    pub fn summarize(&self) -> Summary {
        self.aggregator.summarize()
    }

    /// Successful items by ascending latency; only populated in exhaustion mode.
    pub fn rank(&self) -> Vec<RankedEntry> {
        self.aggregator.rank()
    }

    pub fn watch_progress(&self) -> watch::Receiver<Progress> {
        let (tx, rx) = watch::channel(self.aggregator.progress());
        let aggregator = self.aggregator.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(500));
            loop {
                interval.tick().await;
                if tx.send(aggregator.progress()).is_err() {
                    break;
                }
            }
        });
        rx
    }

    fn set_state(&self, state: DispatchState) {
        self.state_watcher.send_replace(state);
    }
}
