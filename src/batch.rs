//! Batch driver & progress (§4.7): directory walking, per-file error policy,
//! rate-limited progress callbacks and cooperative cancellation.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnError {
    /// The first per-file error propagates out immediately.
    Raise,
    /// The failure is recorded and processing continues.
    Skip,
    /// Same as `Skip` for the current file, but the batch stops afterward.
    Abort,
}

#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// 1-based index of the file just processed.
    pub current: u64,
    pub total: u64,
    /// `current / total`, in `[0, 1]`.
    pub progress: f64,
    pub current_file: String,
    pub bytes_done: u64,
    /// Bytes/sec over a short moving window.
    pub rate: f64,
    /// Estimated seconds remaining, given `rate`.
    pub eta: f64,
}

#[derive(Debug, Clone)]
pub struct FailedFile {
    pub path: String,
    pub error_kind: &'static str,
    pub detail: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub success_count: u64,
    pub failed_count: u64,
    pub failed_files: Vec<FailedFile>,
    pub total_bytes: u64,
    pub elapsed_time: Duration,
}

/// At most this many updates per second, whichever bound is hit first against
/// `PROGRESS_EVERY_N`.
const PROGRESS_MIN_INTERVAL: Duration = Duration::from_millis(100);
const PROGRESS_EVERY_N: u64 = 25;

struct ProgressTracker<'a> {
    total: u64,
    started: Instant,
    last_emit_at: Instant,
    last_emit_count: u64,
    bytes_done: u64,
    callback: Option<&'a mut dyn FnMut(ProgressInfo)>,
}

impl<'a> ProgressTracker<'a> {
    fn new(total: u64, callback: Option<&'a mut dyn FnMut(ProgressInfo)>) -> Self {
        let now = Instant::now();
        ProgressTracker {
            total,
            started: now,
            last_emit_at: now,
            last_emit_count: 0,
            bytes_done: 0,
            callback,
        }
    }

    fn record(&mut self, current: u64, current_file: &str, bytes: u64) {
        self.bytes_done += bytes;
        let now = Instant::now();
        let due_by_time = now.duration_since(self.last_emit_at) >= PROGRESS_MIN_INTERVAL;
        let due_by_count = current - self.last_emit_count >= PROGRESS_EVERY_N;
        let is_last = current == self.total;
        if !(due_by_time || due_by_count || is_last) {
            return;
        }
        if let Some(cb) = self.callback.as_deref_mut() {
            let elapsed = now.duration_since(self.started).as_secs_f64();
            let rate = if elapsed > 0.0 {
                self.bytes_done as f64 / elapsed
            } else {
                0.0
            };
            let progress = if self.total > 0 {
                current as f64 / self.total as f64
            } else {
                1.0
            };
            let eta = if rate > 0.0 && progress < 1.0 {
                (self.bytes_done as f64 / progress.max(f64::EPSILON) - self.bytes_done as f64)
                    .max(0.0)
                    / rate
            } else {
                0.0
            };
            cb(ProgressInfo {
                current,
                total: self.total,
                progress,
                current_file: current_file.to_string(),
                bytes_done: self.bytes_done,
                rate,
                eta,
            });
        }
        self.last_emit_at = now;
        self.last_emit_count = current;
    }
}

/// Drives `op` over `items` under the §4.7 error and cancellation policy.
/// `op` returns the number of bytes it processed for accounting purposes.
pub fn run_batch<T, F>(
    items: &[T],
    on_error: OnError,
    cancel: Option<&dyn Fn() -> bool>,
    progress: Option<&mut dyn FnMut(ProgressInfo)>,
    label: impl Fn(&T) -> String,
    mut op: F,
) -> Result<BatchResult>
where
    F: FnMut(&T) -> Result<u64>,
{
    let started = Instant::now();
    let total = items.len() as u64;
    let mut tracker = ProgressTracker::new(total, progress);
    let mut result = BatchResult::default();

    for (i, item) in items.iter().enumerate() {
        if let Some(cancel) = cancel {
            if cancel() {
                // Cancellation stops at the next file boundary and returns the
                // partial result, like `OnError::Abort` (§5) — the accumulated
                // accounting is not worth discarding behind a bare error.
                result.elapsed_time = started.elapsed();
                return Ok(result);
            }
        }

        let current = i as u64 + 1;
        let file_label = label(item);
        match op(item) {
            Ok(bytes) => {
                result.success_count += 1;
                result.total_bytes += bytes;
                tracker.record(current, &file_label, bytes);
            }
            Err(err) => match on_error {
                OnError::Raise => {
                    result.elapsed_time = started.elapsed();
                    return Err(err);
                }
                OnError::Skip => {
                    result.failed_count += 1;
                    result.failed_files.push(FailedFile {
                        path: file_label.clone(),
                        error_kind: err.kind(),
                        detail: err.to_string(),
                    });
                    tracker.record(current, &file_label, 0);
                }
                OnError::Abort => {
                    result.failed_count += 1;
                    result.failed_files.push(FailedFile {
                        path: file_label,
                        error_kind: err.kind(),
                        detail: err.to_string(),
                    });
                    result.elapsed_time = started.elapsed();
                    return Ok(result);
                }
            },
        }
    }

    result.elapsed_time = started.elapsed();
    Ok(result)
}

/// Walk `root` recursively, yielding files in stable directory-walk order,
/// skipping any path matching one of the shell-style `exclude` globs
/// (relative to `root`).
pub fn walk_files(root: &Path, exclude: &[String]) -> Result<Vec<PathBuf>> {
    let mut builder = globset::GlobSetBuilder::new();
    for pattern in exclude {
        builder.add(
            globset::GlobBuilder::new(pattern)
                .case_insensitive(cfg!(any(target_os = "windows", target_os = "macos")))
                .build()
                .map_err(|e| Error::Other(format!("invalid exclude pattern {pattern:?}: {e}")))?,
        );
    }
    let set = builder
        .build()
        .map_err(|e| Error::Other(format!("invalid exclude set: {e}")))?;

    let mut files = vec![];
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            Error::LocalIoError {
                path: e.path().unwrap_or(root).to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();
        if set.is_match(&rel) {
            continue;
        }
        files.push(entry.path().to_path_buf());
    }
    Ok(files)
}
