use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;

use tracing::{debug, error, info, warn};

use crate::core::config::RetryPolicy;
use crate::core::error::CleanupFailure;

pub const TEMP_EXTENSION: &str = "tmp";

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub deleted: Vec<PathBuf>,
    pub failed: Vec<CleanupFailure>,
}

#[derive(Debug, Default)]
pub struct CleanupHandle {
    workers: Vec<thread::JoinHandle<Result<PathBuf, CleanupFailure>>>,
}

impl CleanupHandle {
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn wait(self) -> CleanupReport {
        let mut report = CleanupReport::default();
        for worker in self.workers {
            match worker.join() {
                Ok(Ok(path)) => report.deleted.push(path),
                Ok(Err(failure)) => report.failed.push(failure),
                Err(_) => error!("temp file deletion thread panicked"),
            }
        }
        report
    }
}

pub fn temp_files_for(dir: &Path, plot_id: &str) -> Vec<PathBuf> {
    if plot_id.trim().is_empty() {
        return Vec::new();
    }
    list_temp_files(dir)
        .into_iter()
        .filter(|path| file_name_contains(path, plot_id))
        .collect()
}

/// Starts deleting every scratch file of `plot_id` in `dir`. Each file is
/// retried independently according to `policy`.
pub fn delete_temp_files(dir: &Path, plot_id: &str, policy: RetryPolicy) -> CleanupHandle {
    let files = temp_files_for(dir, plot_id);
    debug!(dir = %dir.display(), plot_id, count = files.len(), "cleaning temp files");
    spawn_deletions(files, policy)
}

pub fn clear_orphans(dirs: &[PathBuf], active_ids: &[String], policy: RetryPolicy) -> CleanupHandle {
    let mut seen = Vec::new();
    let mut files = Vec::new();
    for dir in dirs {
        if seen.contains(dir) {
            continue;
        }
        seen.push(dir.clone());
        files.extend(list_temp_files(dir).into_iter().filter(|path| {
            !active_ids
                .iter()
                .filter(|id| !id.trim().is_empty())
                .any(|id| file_name_contains(path, id))
        }));
    }
    info!(count = files.len(), "clearing orphaned temp files");
    spawn_deletions(files, policy)
}

fn spawn_deletions(files: Vec<PathBuf>, policy: RetryPolicy) -> CleanupHandle {
    let workers = files
        .into_iter()
        .map(|path| thread::spawn(move || delete_with_retry(path, policy)))
        .collect();
    CleanupHandle { workers }
}

fn list_temp_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "cannot list temp directory");
            return Vec::new();
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some(TEMP_EXTENSION))
        .collect()
}

fn file_name_contains(path: &Path, needle: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.contains(needle))
        .unwrap_or(false)
}

fn delete_with_retry(path: PathBuf, policy: RetryPolicy) -> Result<PathBuf, CleanupFailure> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "deleted temp file");
                return Ok(path);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(path),
            Err(err) => {
                if attempt == attempts {
                    break;
                }
                if attempt > 1 {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        retry_in_ms = policy.backoff.as_millis() as u64,
                        "could not delete temp file, retrying"
                    );
                }
                thread::sleep(policy.backoff);
            }
        }
    }

    let failure = CleanupFailure { path, attempts };
    error!("{failure}");
    Err(failure)
}
