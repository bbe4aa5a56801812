use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use snapvault_core::ProgressReporter;

/// CLI progress reporter using indicatif.
///
/// Totals are not always known upfront (entries are streamed), so both
/// phases use a spinner with a running count.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
    }

    fn spinner(message: &'static str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.set_message(message);
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        pb
    }
}

impl ProgressReporter for CliReporter {
    fn on_verify_start(&self, _total_files: Option<usize>) {
        self.set_bar(Self::spinner("Hashing and comparing..."));
    }

    fn on_verify_progress(&self, files_done: usize, total_files: Option<usize>) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            match total_files {
                Some(total) => pb.set_message(format!(
                    "Hashing and comparing... ({}/{})",
                    files_done, total
                )),
                None => pb.set_message(format!("Hashing and comparing... ({} files)", files_done)),
            }
        }
    }

    fn on_verify_complete(&self, total_files: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Verification complete: {} files in {:.2}s",
            total_files, duration_secs
        );
    }

    fn on_cleanup_start(&self) {
        self.set_bar(Self::spinner("Cleaning up..."));
    }

    fn on_cleanup_progress(&self, files_done: usize) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.set_message(format!("Cleaning up... ({} entries)", files_done));
        }
    }

    fn on_cleanup_complete(&self, deleted: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Cleanup complete: {} files in {:.2}s",
            deleted, duration_secs
        );
    }
}
