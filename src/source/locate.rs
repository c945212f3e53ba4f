//! Dataset discovery.
//!
//! The data-acquisition unit starts a new CSV log periodically and appends
//! to it; the most recently modified `.csv` anywhere under the watched root
//! is the current dataset.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::CollectError;

/// Find the most recently modified `.csv` file under `root`, recursively.
///
/// Returns `Ok(None)` if the tree holds no CSV file. Any directory that
/// cannot be read fails the whole scan. Symbolic links are not followed.
/// On equal modification times the first file in traversal order (sorted
/// by name within each directory) wins.
pub fn locate_newest_csv(root: &Path) -> Result<Option<PathBuf>, CollectError> {
    let mut newest = None;
    walk(root, &mut newest).map_err(|source| CollectError::Scan {
        root: root.to_path_buf(),
        source,
    })?;
    Ok(newest.map(|(path, _)| path))
}

/// Modification time of the dataset at `path`.
pub fn dataset_modified(path: &Path) -> Result<SystemTime, CollectError> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|source| CollectError::Stat {
            path: path.to_path_buf(),
            source,
        })
}

fn walk(dir: &Path, newest: &mut Option<(PathBuf, SystemTime)>) -> io::Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let file_type = entry.file_type()?;
        let path = entry.path();

        if file_type.is_dir() {
            walk(&path, newest)?;
        } else if file_type.is_file() && is_csv(&path) {
            let modified = entry.metadata()?.modified()?;
            let is_newer = match newest {
                Some((_, current)) => modified > *current,
                None => true,
            };
            if is_newer {
                *newest = Some((path, modified));
            }
        }
    }

    Ok(())
}

fn is_csv(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "csv")
}
