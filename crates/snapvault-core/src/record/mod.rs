pub mod stream;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Error;

pub use stream::{RunRecordReader, RunRecordWriter};

/// Mode of the organizing run that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    DryRun,
    LiveCopy,
    LiveMove,
}

impl RunMode {
    pub fn is_dry_run(self) -> bool {
        matches!(self, RunMode::DryRun)
    }

    pub fn describe(self) -> &'static str {
        match self {
            RunMode::DryRun => "dry-run",
            RunMode::LiveCopy => "copy",
            RunMode::LiveMove => "move",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Copy,
    Move,
    Skip,
}

/// One realized file operation. Destination is absent for skipped entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEntry {
    pub source_path: PathBuf,
    pub destination_path: Option<PathBuf>,
    pub operation: Operation,
    #[serde(default)]
    pub reason: Option<String>,
}

/// The organizing-run settings that determine the source→destination mapping.
/// Stored verbatim in every run record so later runs can detect rule drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSignature {
    pub folder_structure: String,
    pub renaming_enabled: bool,
    pub renaming_pattern: String,
    pub folder_tags_enabled: bool,
    pub on_collision: String,
}

impl ConfigSignature {
    /// Opaque short fingerprint for display and discovery filtering.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let digest = format!("{:x}", Sha256::digest(json.as_bytes()));
        digest[..12].to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHeader {
    pub schema_version: u32,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub source_root: PathBuf,
    pub destination_root: PathBuf,
    pub mode: RunMode,
    pub config_signature: ConfigSignature,
}

/// Per-operation counts, written into the footer on finalize and recomputed
/// from entries when the footer is missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub total_files: u64,
    pub copied_files: u64,
    pub moved_files: u64,
    pub skipped_files: u64,
    pub error_files: u64,
}

impl RunCounts {
    pub fn record(&mut self, operation: Operation) {
        self.total_files += 1;
        match operation {
            Operation::Copy => self.copied_files += 1,
            Operation::Move => self.moved_files += 1,
            Operation::Skip => self.skipped_files += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunFooter {
    pub summary: RunCounts,
    pub duration_seconds: f64,
}

/// One line of a persisted run record file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum RunLine {
    Header(RunHeader),
    Entry(RunEntry),
    Footer(RunFooter),
}

/// A fully materialized run record. Use [`RunRecordReader`] instead when
/// entries should be streamed.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub header: RunHeader,
    pub entries: Vec<RunEntry>,
    pub summary: RunCounts,
    pub duration_seconds: f64,
    /// False for records whose run crashed before `finalize`. Such partial
    /// records are still valid verification input.
    pub finalized: bool,
}

impl RunRecord {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let mut reader = RunRecordReader::open(path)?;
        let mut entries = Vec::new();
        for entry in reader.by_ref() {
            entries.push(entry?);
        }

        let (header, footer) = reader.into_parts();
        let (summary, duration_seconds, finalized) = match footer {
            Some(f) => (f.summary, f.duration_seconds, true),
            None => {
                let mut counts = RunCounts::default();
                for entry in &entries {
                    counts.record(entry.operation);
                }
                (counts, 0.0, false)
            }
        };

        Ok(RunRecord {
            header,
            entries,
            summary,
            duration_seconds,
            finalized,
        })
    }

    /// Entries a verifier can hash-compare: copies with a destination.
    pub fn verifiable_entries(&self) -> impl Iterator<Item = &RunEntry> {
        self.entries
            .iter()
            .filter(|e| e.operation == Operation::Copy && e.destination_path.is_some())
    }
}

/// Run ids sort chronologically; the random suffix keeps two runs started in
/// the same second distinguishable.
pub fn generate_run_id() -> String {
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    format!("{}_{:04x}", ts, rand::random::<u16>())
}

pub fn run_filename(run_id: &str, mode: RunMode) -> String {
    if mode.is_dry_run() {
        format!("{}_apply_dryrun.jsonl", run_id)
    } else {
        format!("{}_apply.jsonl", run_id)
    }
}
