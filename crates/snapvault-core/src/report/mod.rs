pub mod stream;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::HashAlgorithm;
use crate::error::Error;

pub use stream::{FinalizedReport, ReportReader, ReportWriter};

/// Version stamped into every persisted artifact. Schema evolution is
/// additive only: new optional fields, never repurposed ones.
pub const SCHEMA_VERSION: u32 = 1;

/// Per-file verification verdict. Closed set; every consumer matches
/// exhaustively so a new status forces an explicit decision everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyStatus {
    /// Hash match at the expected destination path.
    Ok,
    /// Hash match at a destination already claimed by another source.
    OkExistingDuplicate,
    /// Destination exists but content differs.
    Mismatch,
    /// No destination file found.
    MissingDestination,
    /// Source file no longer exists.
    MissingSource,
    /// I/O failure while verifying; cause in `error`.
    Error,
    /// The run itself chose not to copy this entry.
    Skipped,
}

impl std::fmt::Display for VerifyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            VerifyStatus::Ok => "ok",
            VerifyStatus::OkExistingDuplicate => "ok_existing_duplicate",
            VerifyStatus::Mismatch => "mismatch",
            VerifyStatus::MissingDestination => "missing_destination",
            VerifyStatus::MissingSource => "missing_source",
            VerifyStatus::Error => "error",
            VerifyStatus::Skipped => "skipped",
        };
        write!(f, "{}", label)
    }
}

/// How the verified destination was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    ExpectedPath,
    ContentSearch,
    Unknown,
}

/// Where the source→destination mapping came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    RunRecord,
    Reconstructed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyEntry {
    pub source_path: PathBuf,
    pub expected_destination_path: Option<PathBuf>,
    /// The destination actually verified; may differ from the expected path
    /// under content-search reconstruction.
    pub actual_destination_path: Option<PathBuf>,
    pub status: VerifyStatus,
    pub match_type: MatchType,
    pub hash_algorithm: HashAlgorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Status histogram for a verification pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifySummary {
    pub total: u64,
    pub ok: u64,
    pub ok_existing_duplicate: u64,
    pub mismatch: u64,
    pub missing_destination: u64,
    pub missing_source: u64,
    pub error: u64,
    pub skipped: u64,
}

impl VerifySummary {
    pub fn record(&mut self, status: VerifyStatus) {
        self.total += 1;
        match status {
            VerifyStatus::Ok => self.ok += 1,
            VerifyStatus::OkExistingDuplicate => self.ok_existing_duplicate += 1,
            VerifyStatus::Mismatch => self.mismatch += 1,
            VerifyStatus::MissingDestination => self.missing_destination += 1,
            VerifyStatus::MissingSource => self.missing_source += 1,
            VerifyStatus::Error => self.error += 1,
            VerifyStatus::Skipped => self.skipped += 1,
        }
    }

    pub fn count(&self, status: VerifyStatus) -> u64 {
        match status {
            VerifyStatus::Ok => self.ok,
            VerifyStatus::OkExistingDuplicate => self.ok_existing_duplicate,
            VerifyStatus::Mismatch => self.mismatch,
            VerifyStatus::MissingDestination => self.missing_destination,
            VerifyStatus::MissingSource => self.missing_source,
            VerifyStatus::Error => self.error,
            VerifyStatus::Skipped => self.skipped,
        }
    }

    /// Entries that may be deletable, before the live re-checks the cleaner
    /// performs at deletion time.
    pub fn cleanup_eligible(&self) -> u64 {
        self.ok + self.ok_existing_duplicate
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportHeader {
    pub schema_version: u32,
    pub verify_id: String,
    pub created_at: DateTime<Utc>,
    pub source_root: PathBuf,
    pub destination_root: PathBuf,
    pub input_source: InputSource,
    pub run_id: Option<String>,
    pub hash_algorithm: HashAlgorithm,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportFooter {
    pub summary: VerifySummary,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum ReportLine {
    Header(ReportHeader),
    Entry(VerifyEntry),
    Footer(ReportFooter),
}

/// A fully materialized verification report. Use [`ReportReader`] to stream
/// entries instead when the report may be large.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub header: ReportHeader,
    pub entries: Vec<VerifyEntry>,
    pub summary: VerifySummary,
    pub duration_seconds: f64,
    pub finalized: bool,
}

impl VerificationReport {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let mut reader = ReportReader::open(path)?;
        let mut entries = Vec::new();
        for entry in reader.by_ref() {
            entries.push(entry?);
        }

        let (header, footer) = reader.into_parts();
        let (summary, duration_seconds, finalized) = match footer {
            Some(f) => (f.summary, f.duration_seconds, true),
            None => {
                let mut summary = VerifySummary::default();
                for entry in &entries {
                    summary.record(entry.status);
                }
                (summary, 0.0, false)
            }
        };

        Ok(VerificationReport {
            header,
            entries,
            summary,
            duration_seconds,
            finalized,
        })
    }
}

/// Verify ids use the same sortable timestamp-plus-suffix shape as run ids.
pub fn generate_verify_id() -> String {
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    format!("{}_{:04x}", ts, rand::random::<u16>())
}

pub fn report_filename(verify_id: &str) -> String {
    format!("{}_verify.jsonl", verify_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_records_every_status() {
        let mut summary = VerifySummary::default();
        for status in [
            VerifyStatus::Ok,
            VerifyStatus::OkExistingDuplicate,
            VerifyStatus::Mismatch,
            VerifyStatus::MissingDestination,
            VerifyStatus::MissingSource,
            VerifyStatus::Error,
            VerifyStatus::Skipped,
        ] {
            summary.record(status);
            assert_eq!(summary.count(status), 1);
        }
        assert_eq!(summary.total, 7);
        assert_eq!(summary.cleanup_eligible(), 2);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&VerifyStatus::OkExistingDuplicate).unwrap();
        assert_eq!(json, "\"ok_existing_duplicate\"");
        let json = serde_json::to_string(&VerifyStatus::MissingDestination).unwrap();
        assert_eq!(json, "\"missing_destination\"");
    }
}
