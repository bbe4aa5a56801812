use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::report::{ReportReader, VerifyEntry, VerifyStatus};

/// Deletes source files, and only source files, that a verification report
/// proves are safely duplicated at the destination.
///
/// Eligibility is recomputed against live filesystem state immediately before
/// each deletion; the report alone is never trusted.
pub struct Cleaner {
    dry_run: bool,
    allow_quick: bool,
    allowed_statuses: HashSet<VerifyStatus>,
}

impl Default for Cleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl Cleaner {
    pub fn new() -> Self {
        Cleaner {
            dry_run: true,
            allow_quick: false,
            allowed_statuses: [VerifyStatus::Ok, VerifyStatus::OkExistingDuplicate]
                .into_iter()
                .collect(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Cleaner::new()
            .with_dry_run(config.cleanup.dry_run_default)
            .allow_quick(config.verify.allow_cleanup_on_quick)
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn allow_quick(mut self, allow: bool) -> Self {
        self.allow_quick = allow;
        self
    }

    /// Narrow the allowed statuses. Only the verified-ok statuses can ever be
    /// allowed; anything else in `statuses` is discarded.
    pub fn with_status_filter(mut self, statuses: &[VerifyStatus]) -> Self {
        self.allowed_statuses = statuses
            .iter()
            .copied()
            .filter(|s| matches!(s, VerifyStatus::Ok | VerifyStatus::OkExistingDuplicate))
            .collect();
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Why an entry may not be deleted, or Ok if it may.
    ///
    /// The status match is exhaustive on purpose: a new status added to the
    /// report model forces an explicit deletion decision here rather than
    /// defaulting to deletable.
    fn check_eligible(&self, entry: &VerifyEntry) -> Result<(), String> {
        let verified_ok = match entry.status {
            VerifyStatus::Ok | VerifyStatus::OkExistingDuplicate => {
                self.allowed_statuses.contains(&entry.status)
            }
            VerifyStatus::Mismatch => false,
            VerifyStatus::MissingDestination => false,
            VerifyStatus::MissingSource => false,
            VerifyStatus::Error => false,
            VerifyStatus::Skipped => false,
        };
        if !verified_ok {
            return Err(format!("status '{}' is not eligible for deletion", entry.status));
        }

        if !entry.hash_algorithm.is_cleanup_eligible() && !self.allow_quick {
            return Err(format!(
                "verified with '{}' algorithm; sha256 required",
                entry.hash_algorithm
            ));
        }

        if !entry.source_path.exists() {
            return Err("source no longer exists".to_string());
        }

        match &entry.actual_destination_path {
            None => Err("no verified destination recorded".to_string()),
            Some(dest) if !dest.exists() => Err("destination no longer exists".to_string()),
            Some(_) => Ok(()),
        }
    }

    /// Count eligible entries and the bytes they would free, without
    /// deleting anything. Used to confirm before a live run.
    pub fn preview(&self, report_path: &Path) -> Result<(usize, u64), Error> {
        let reader = ReportReader::open(report_path)?;
        let mut eligible = 0usize;
        let mut bytes = 0u64;
        for entry in reader {
            let entry = entry?;
            if self.check_eligible(&entry).is_ok() {
                eligible += 1;
                bytes += fs::metadata(&entry.source_path).map(|m| m.len()).unwrap_or(0);
            }
        }
        Ok((eligible, bytes))
    }

    /// Delete the eligible subset of the report's sources, streaming entries.
    ///
    /// A failed deletion is recorded and processing continues; ineligible
    /// entries are left untouched with a per-entry reason. Destinations are
    /// never touched.
    pub fn cleanup(
        &self,
        report_path: &Path,
        reporter: &dyn ProgressReporter,
    ) -> Result<CleanupOutcome, Error> {
        let reader = ReportReader::open(report_path)?;
        let started = Instant::now();
        let mut outcome = CleanupOutcome::default();

        reporter.on_cleanup_start();
        let mut processed = 0usize;
        for entry in reader {
            let entry = entry?;
            self.process_entry(entry, &mut outcome);
            processed += 1;
            reporter.on_cleanup_progress(processed);
        }
        reporter.on_cleanup_complete(outcome.deleted, started.elapsed().as_secs_f64());

        info!(
            "Cleanup finished: {} deleted, {} skipped, {} failed{}",
            outcome.deleted,
            outcome.skipped,
            outcome.failed,
            if self.dry_run { " (dry run)" } else { "" },
        );
        Ok(outcome)
    }

    fn process_entry(&self, entry: VerifyEntry, outcome: &mut CleanupOutcome) {
        if let Err(reason) = self.check_eligible(&entry) {
            debug!("Skipping '{}': {}", entry.source_path.display(), reason);
            outcome.skipped += 1;
            outcome.skipped_paths.push((entry.source_path, reason));
            return;
        }

        outcome.total_eligible += 1;
        let size = fs::metadata(&entry.source_path).map(|m| m.len()).unwrap_or(0);

        if self.dry_run {
            debug!("Would delete: {}", entry.source_path.display());
            outcome.deleted += 1;
            outcome.bytes_freed += size;
            outcome.deleted_paths.push(entry.source_path);
            return;
        }

        match fs::remove_file(&entry.source_path) {
            Ok(()) => {
                info!("Deleted: {}", entry.source_path.display());
                outcome.deleted += 1;
                outcome.bytes_freed += size;
                outcome.deleted_paths.push(entry.source_path);
            }
            Err(e) => {
                warn!("Failed to delete '{}': {}", entry.source_path.display(), e);
                outcome.failed += 1;
                outcome.failed_paths.push((entry.source_path, e.to_string()));
            }
        }
    }
}

/// Result of a cleanup pass.
#[derive(Debug, Default)]
pub struct CleanupOutcome {
    pub total_eligible: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes_freed: u64,
    pub deleted_paths: Vec<PathBuf>,
    pub skipped_paths: Vec<(PathBuf, String)>,
    pub failed_paths: Vec<(PathBuf, String)>,
}

impl CleanupOutcome {
    pub fn success_rate(&self) -> f64 {
        if self.total_eligible == 0 {
            return 0.0;
        }
        (self.deleted as f64 / self.total_eligible as f64) * 100.0
    }
}

pub fn format_bytes(num_bytes: u64) -> String {
    let mut value = num_bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if value < 1024.0 {
            return format!("{:.1} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1} PB", value)
}
