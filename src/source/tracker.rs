//! Change and staleness detection for the current dataset.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Default age after which an unchanged dataset is considered stale.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(10 * 60);

/// Outcome of observing the current dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// New data since the last observation; the dataset should be parsed.
    Changed {
        /// The dataset path differs from the previous one (or is the first seen).
        new_dataset: bool,
    },
    /// Same path and modification time as last time.
    Unchanged,
    /// Unchanged, and the modification time is older than the staleness threshold.
    Stale,
}

/// Remembers the last dataset seen and decides whether to re-parse it.
///
/// The recorded state is only updated on `Changed`, before the dataset is
/// parsed. A dataset that then fails to parse is not retried until it
/// changes again.
#[derive(Debug, Clone)]
pub struct ChangeTracker {
    stale_after: Duration,
    last_seen: Option<(PathBuf, SystemTime)>,
}

impl ChangeTracker {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            stale_after,
            last_seen: None,
        }
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// The path and modification time recorded by the last `Changed` observation.
    pub fn last_seen(&self) -> Option<(&Path, SystemTime)> {
        self.last_seen
            .as_ref()
            .map(|(path, modified)| (path.as_path(), *modified))
    }

    /// Compare `path`/`modified` against the last observation.
    ///
    /// Staleness is measured from the file's modification time to `now`; a
    /// modification time in the future never counts as stale.
    pub fn observe(&mut self, path: &Path, modified: SystemTime, now: SystemTime) -> Observation {
        match &self.last_seen {
            Some((last_path, last_modified)) if last_path == path && *last_modified == modified => {
                let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
                if age > self.stale_after {
                    Observation::Stale
                } else {
                    Observation::Unchanged
                }
            }
            last => {
                let new_dataset = last.as_ref().map_or(true, |(last_path, _)| last_path != path);
                self.last_seen = Some((path.to_path_buf(), modified));
                Observation::Changed { new_dataset }
            }
        }
    }
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER)
    }
}
