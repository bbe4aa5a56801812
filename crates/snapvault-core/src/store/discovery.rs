use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use glob::Pattern;
use tracing::warn;

use super::Store;
use crate::error::Error;
use crate::record::{run_filename, RunMode, RunRecordReader};
use crate::report::{report_filename, InputSource, ReportReader, VerifySummary};

/// Default cap on listed candidates, newest first.
pub const DISCOVERY_LIMIT: usize = 20;

/// Constraints narrowing which artifacts discovery may return. Root and
/// fingerprint filters are hard filters, never ranking signals.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryFilter {
    pub source_root: Option<PathBuf>,
    pub destination_root: Option<PathBuf>,
    pub config_fingerprint: Option<String>,
    pub include_dry_runs: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub source_root: PathBuf,
    pub destination_root: PathBuf,
    pub mode: RunMode,
    pub total_files: u64,
    pub finalized: bool,
    pub config_fingerprint: String,
}

impl RunSummary {
    pub fn age_description(&self) -> String {
        describe_age(self.created_at)
    }
}

#[derive(Debug, Clone)]
pub struct ReportSummary {
    pub verify_id: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub source_root: PathBuf,
    pub destination_root: PathBuf,
    pub input_source: InputSource,
    pub run_id: Option<String>,
    pub summary: VerifySummary,
    pub finalized: bool,
}

impl ReportSummary {
    pub fn age_description(&self) -> String {
        describe_age(self.created_at)
    }
}

fn describe_age(created_at: DateTime<Utc>) -> String {
    let delta = Utc::now().signed_duration_since(created_at);
    if delta.num_days() > 0 {
        format!("{} day(s) ago", delta.num_days())
    } else if delta.num_hours() > 0 {
        format!("{} hour(s) ago", delta.num_hours())
    } else if delta.num_minutes() > 0 {
        format!("{} minute(s) ago", delta.num_minutes())
    } else {
        "just now".to_string()
    }
}

fn matching_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, Error> {
    let pattern = Pattern::new(pattern).map_err(|e| Error::Other(e.to_string()))?;
    let mut paths = Vec::new();
    if !dir.exists() {
        return Ok(paths);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = match path.file_name() {
            Some(n) => n.to_string_lossy().into_owned(),
            None => continue,
        };
        if path.is_file() && pattern.matches(&name) {
            paths.push(path);
        }
    }
    Ok(paths)
}

fn summarize_run(path: &Path) -> Result<RunSummary, Error> {
    let mut reader = RunRecordReader::open(path)?;
    let mut entry_count: u64 = 0;
    for entry in reader.by_ref() {
        entry?;
        entry_count += 1;
    }
    let (header, footer) = reader.into_parts();
    let (total_files, finalized) = match &footer {
        Some(f) => (f.summary.total_files, true),
        None => (entry_count, false),
    };

    Ok(RunSummary {
        run_id: header.run_id,
        path: path.to_path_buf(),
        created_at: header.created_at,
        source_root: header.source_root,
        destination_root: header.destination_root,
        mode: header.mode,
        total_files,
        finalized,
        config_fingerprint: header.config_signature.fingerprint(),
    })
}

fn summarize_report(path: &Path) -> Result<ReportSummary, Error> {
    let mut reader = ReportReader::open(path)?;
    let mut recomputed = VerifySummary::default();
    for entry in reader.by_ref() {
        recomputed.record(entry?.status);
    }
    let (header, footer) = reader.into_parts();
    let (summary, finalized) = match footer {
        Some(f) => (f.summary, true),
        None => (recomputed, false),
    };

    Ok(ReportSummary {
        verify_id: header.verify_id,
        path: path.to_path_buf(),
        created_at: header.created_at,
        source_root: header.source_root,
        destination_root: header.destination_root,
        input_source: header.input_source,
        run_id: header.run_id,
        summary,
        finalized,
    })
}

/// List run records matching the filter, newest first. Unreadable or
/// corrupt artifacts are logged and skipped; they never abort discovery.
pub fn discover_runs(store: &Store, filter: &DiscoveryFilter) -> Result<Vec<RunSummary>, Error> {
    let mut summaries = Vec::new();

    for path in matching_files(&store.runs_dir(), "*_apply*.jsonl")? {
        let summary = match summarize_run(&path) {
            Ok(s) => s,
            Err(e) => {
                warn!("Could not parse run record {}: {}", path.display(), e);
                continue;
            }
        };
        if summary.mode.is_dry_run() && !filter.include_dry_runs {
            continue;
        }
        if let Some(src) = &filter.source_root {
            if !summary.source_root.starts_with(src) {
                continue;
            }
        }
        if let Some(dst) = &filter.destination_root {
            if !summary.destination_root.starts_with(dst) {
                continue;
            }
        }
        if let Some(fp) = &filter.config_fingerprint {
            if &summary.config_fingerprint != fp {
                continue;
            }
        }
        summaries.push(summary);
    }

    summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    summaries.truncate(filter.limit.unwrap_or(DISCOVERY_LIMIT));
    Ok(summaries)
}

/// List verification reports matching the filter, newest first.
pub fn discover_reports(
    store: &Store,
    filter: &DiscoveryFilter,
) -> Result<Vec<ReportSummary>, Error> {
    let mut summaries = Vec::new();

    for path in matching_files(&store.verifications_dir(), "*_verify.jsonl")? {
        let summary = match summarize_report(&path) {
            Ok(s) => s,
            Err(e) => {
                warn!(
                    "Could not parse verification report {}: {}",
                    path.display(),
                    e
                );
                continue;
            }
        };
        if let Some(src) = &filter.source_root {
            if !summary.source_root.starts_with(src) {
                continue;
            }
        }
        if let Some(dst) = &filter.destination_root {
            if !summary.destination_root.starts_with(dst) {
                continue;
            }
        }
        summaries.push(summary);
    }

    summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    summaries.truncate(filter.limit.unwrap_or(DISCOVERY_LIMIT));
    Ok(summaries)
}

/// Locate a run record by id: filename fast path, then header scan.
pub fn find_run_by_id(store: &Store, run_id: &str) -> Result<Option<PathBuf>, Error> {
    let runs_dir = store.runs_dir();
    for mode in [RunMode::LiveCopy, RunMode::DryRun] {
        let path = runs_dir.join(run_filename(run_id, mode));
        if path.exists() {
            return Ok(Some(path));
        }
    }

    for path in matching_files(&runs_dir, "*_apply*.jsonl")? {
        match RunRecordReader::open(&path) {
            Ok(reader) if reader.header().run_id == run_id => return Ok(Some(path)),
            Ok(_) => {}
            Err(e) => warn!("Could not parse run record {}: {}", path.display(), e),
        }
    }
    Ok(None)
}

/// Locate a verification report by id: filename fast path, then header scan.
pub fn find_report_by_id(store: &Store, verify_id: &str) -> Result<Option<PathBuf>, Error> {
    let reports_dir = store.verifications_dir();
    let path = reports_dir.join(report_filename(verify_id));
    if path.exists() {
        return Ok(Some(path));
    }

    for path in matching_files(&reports_dir, "*_verify.jsonl")? {
        match ReportReader::open(&path) {
            Ok(reader) if reader.header().verify_id == verify_id => return Ok(Some(path)),
            Ok(_) => {}
            Err(e) => warn!(
                "Could not parse verification report {}: {}",
                path.display(),
                e
            ),
        }
    }
    Ok(None)
}

/// How a single artifact is chosen from the candidates discovery returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionMode {
    /// Present multiple candidates for explicit choice.
    Interactive,
    /// Pick the newest without confirmation.
    Last,
    /// Use the artifact with exactly this id.
    ById(String),
    /// Scripted use: fail rather than guess among several candidates.
    RequireExplicit,
}

#[derive(Debug)]
pub enum Selection<T> {
    Chosen(T),
    /// Interactive mode found several candidates; the caller must prompt.
    NeedsChoice(Vec<T>),
}

pub fn select_run(
    store: &Store,
    filter: &DiscoveryFilter,
    mode: &SelectionMode,
) -> Result<Selection<RunSummary>, Error> {
    if let SelectionMode::ById(id) = mode {
        let path = find_run_by_id(store, id)?.ok_or(Error::NoCandidates("run record"))?;
        return Ok(Selection::Chosen(summarize_run(&path)?));
    }
    let candidates = discover_runs(store, filter)?;
    select_from(candidates, mode, "run record")
}

pub fn select_report(
    store: &Store,
    filter: &DiscoveryFilter,
    mode: &SelectionMode,
) -> Result<Selection<ReportSummary>, Error> {
    if let SelectionMode::ById(id) = mode {
        let path =
            find_report_by_id(store, id)?.ok_or(Error::NoCandidates("verification report"))?;
        return Ok(Selection::Chosen(summarize_report(&path)?));
    }
    let candidates = discover_reports(store, filter)?;
    select_from(candidates, mode, "verification report")
}

fn select_from<T>(
    mut candidates: Vec<T>,
    mode: &SelectionMode,
    kind: &'static str,
) -> Result<Selection<T>, Error> {
    match candidates.len() {
        0 => Err(Error::NoCandidates(kind)),
        1 => Ok(Selection::Chosen(candidates.remove(0))),
        count => match mode {
            SelectionMode::Interactive => Ok(Selection::NeedsChoice(candidates)),
            SelectionMode::Last => Ok(Selection::Chosen(candidates.remove(0))),
            SelectionMode::RequireExplicit => Err(Error::AmbiguousSelection { kind, count }),
            // Resolved above; by-id selection never reaches the list path.
            SelectionMode::ById(_) => Err(Error::Other(
                "by-id selection cannot be applied to a candidate list".to_string(),
            )),
        },
    }
}
