//! The poll loop that turns the newest dataset into gauge values.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tigowatch_exporter::{MetricsState, Slot};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::duration::format_duration;
use crate::error::CollectError;
use crate::source::{
    dataset_modified, decode_row, locate_newest_csv, read_last_row, ChangeTracker, Observation,
    DEFAULT_STALE_AFTER,
};

/// Default time between poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default consecutive-failure count at which a slot is reported in the log.
pub const DEFAULT_MAX_FAIL_COUNT: u64 = 35;

/// Result of one successful poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No `.csv` file under the watched directory.
    NoDataset,
    /// The dataset has not changed since it was last parsed.
    Unchanged,
    /// The dataset went stale; `removed` tells whether any series were cleared.
    Cleared { removed: bool },
    /// The dataset has a header but no data rows yet.
    Empty,
    /// The last row was applied to the metrics state.
    Updated {
        path: PathBuf,
        devices: usize,
        failed_slots: usize,
    },
}

/// Polls a data directory and feeds the shared [`MetricsState`].
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tigowatch::Collector;
/// use tigowatch_exporter::MetricsState;
///
/// #[tokio::main]
/// async fn main() {
///     let state = Arc::new(MetricsState::new());
///     let collector = Collector::builder("/mnt/ffs/data/daqs")
///         .state(state.clone())
///         .interval(Duration::from_secs(10))
///         .build();
///
///     // Start the background loop
///     let handle = collector.start();
///
///     // ... serve `state` ...
///
///     handle.stop();
/// }
/// ```
#[derive(Debug)]
pub struct Collector {
    data_dir: PathBuf,
    state: Arc<MetricsState>,
    tracker: ChangeTracker,
    interval: Duration,
    max_fail_count: u64,
}

impl Collector {
    /// Create a builder for a collector watching `data_dir`.
    pub fn builder(data_dir: impl Into<PathBuf>) -> CollectorBuilder {
        CollectorBuilder::new(data_dir)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn state(&self) -> &Arc<MetricsState> {
        &self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one poll cycle now.
    pub fn poll_once(&mut self) -> Result<CycleOutcome, CollectError> {
        self.poll_at(SystemTime::now())
    }

    /// Run one poll cycle, measuring staleness against `now`.
    ///
    /// All file I/O happens before the state lock is taken.
    pub fn poll_at(&mut self, now: SystemTime) -> Result<CycleOutcome, CollectError> {
        let Some(path) = locate_newest_csv(&self.data_dir)? else {
            debug!(dir = %self.data_dir.display(), "No dataset found");
            return Ok(CycleOutcome::NoDataset);
        };

        let modified = dataset_modified(&path)?;

        match self.tracker.observe(&path, modified, now) {
            Observation::Unchanged => {
                debug!(path = %path.display(), "Dataset unchanged");
                return Ok(CycleOutcome::Unchanged);
            }
            Observation::Stale => {
                let removed = self.state.clear_devices();
                if removed {
                    info!(
                        path = %path.display(),
                        "No new data for over {}, clearing device metrics",
                        format_duration(self.tracker.stale_after())
                    );
                }
                return Ok(CycleOutcome::Cleared { removed });
            }
            Observation::Changed { new_dataset } => {
                if new_dataset {
                    info!(path = %path.display(), "Reading dataset");
                }
            }
        }

        let Some(last) = read_last_row(&path)? else {
            debug!(path = %path.display(), "Dataset has no rows yet");
            return Ok(CycleOutcome::Empty);
        };

        let reading = decode_row(last.layout, &last.record);
        let report = self.state.apply(&reading);

        for slot in reached_fail_limit(&report.failures, self.max_fail_count) {
            warn!(
                device = slot.device,
                field = %slot.kind,
                "Field failed to decode {} times in a row",
                self.max_fail_count
            );
        }

        debug!(
            path = %path.display(),
            rows = last.rows,
            devices = report.devices,
            failed = report.failures.len(),
            "Applied reading"
        );

        Ok(CycleOutcome::Updated {
            path,
            devices: report.devices,
            failed_slots: report.failures.len(),
        })
    }

    /// Start the poll loop on a background task.
    ///
    /// The first cycle runs immediately; later cycles follow the interval.
    /// Each cycle runs on the blocking thread pool. A failed or panicking
    /// cycle is logged and the loop carries on.
    ///
    /// Returns a handle that stops the loop when stopped or dropped.
    pub fn start(self) -> CollectorHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let interval = self.interval;

        let task = tokio::spawn(async move {
            let mut collector = self;
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = timer.tick() => {}
                    _ = stop_rx.changed() => break,
                }

                let cycle = tokio::task::spawn_blocking(move || {
                    let result = catch_cycle_panic(|| collector.poll_once());
                    (collector, result)
                })
                .await;

                let result = match cycle {
                    Ok((returned, result)) => {
                        collector = returned;
                        result
                    }
                    Err(e) => {
                        error!("Poll cycle aborted, metrics will no longer update: {}", e);
                        break;
                    }
                };

                if let Some(Err(e)) = result {
                    warn!("Poll cycle failed: {}", e);
                }
            }

            debug!("Collector stopped");
        });

        CollectorHandle { stop_tx, task }
    }
}

/// Slots whose consecutive-failure count has just reached `limit`.
///
/// Counts past the limit are not reported again.
fn reached_fail_limit(failures: &[(Slot, u64)], limit: u64) -> impl Iterator<Item = &Slot> + '_ {
    failures
        .iter()
        .filter(move |(_, count)| *count == limit)
        .map(|(slot, _)| slot)
}

/// Run one cycle, turning a panic into an error log.
fn catch_cycle_panic<T>(cycle: impl FnOnce() -> T) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(cycle)) {
        Ok(value) => Some(value),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("Poll cycle panicked: {}", message);
            None
        }
    }
}

/// Builder for configuring a Collector.
#[derive(Debug)]
pub struct CollectorBuilder {
    data_dir: PathBuf,
    state: Option<Arc<MetricsState>>,
    interval: Option<Duration>,
    stale_after: Option<Duration>,
    max_fail_count: Option<u64>,
}

impl CollectorBuilder {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            state: None,
            interval: None,
            stale_after: None,
            max_fail_count: None,
        }
    }

    /// Share an existing metrics state (e.g. with the exporter).
    pub fn state(mut self, state: Arc<MetricsState>) -> Self {
        self.state = Some(state);
        self
    }

    /// Set the poll interval. Defaults to 10 seconds.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Set how old an unchanged dataset may get before device metrics are
    /// cleared. Defaults to 10 minutes.
    pub fn stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = Some(stale_after);
        self
    }

    /// Set the consecutive-failure count that gets logged. Defaults to 35.
    pub fn max_fail_count(mut self, count: u64) -> Self {
        self.max_fail_count = Some(count);
        self
    }

    /// Build the collector.
    pub fn build(self) -> Collector {
        Collector {
            data_dir: self.data_dir,
            state: self.state.unwrap_or_default(),
            tracker: ChangeTracker::new(self.stale_after.unwrap_or(DEFAULT_STALE_AFTER)),
            interval: self.interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            max_fail_count: self.max_fail_count.unwrap_or(DEFAULT_MAX_FAIL_COUNT),
        }
    }
}

/// Handle for controlling the background poll loop.
///
/// Drop this handle to stop the loop, or call `stop()` explicitly.
#[derive(Debug)]
pub struct CollectorHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CollectorHandle {
    /// Ask the loop to stop after the current cycle.
    pub fn stop(self) {
        let _ = self.stop_tx.send(true);
    }

    /// Stop the loop and wait for it to finish.
    ///
    /// ```rust
    /// # tokio_test::block_on(async {
    /// use tigowatch::Collector;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let handle = Collector::builder(dir.path()).build().start();
    /// handle.shutdown().await;
    /// # });
    /// ```
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            error!("Collector task failed: {}", e);
        }
    }
}
