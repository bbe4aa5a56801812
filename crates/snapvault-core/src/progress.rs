/// Trait for reporting verification and cleanup progress.
///
/// CLI implements with indicatif. All methods have default no-op
/// implementations so library callers can ignore the ones they don't need.
pub trait ProgressReporter: Send + Sync {
    fn on_verify_start(&self, _total_files: Option<usize>) {}
    fn on_verify_progress(&self, _files_done: usize, _total_files: Option<usize>) {}
    fn on_verify_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_cleanup_start(&self) {}
    fn on_cleanup_progress(&self, _files_done: usize) {}
    fn on_cleanup_complete(&self, _deleted: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
