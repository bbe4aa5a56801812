use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::AppConfig;
use crate::error::Error;

/// Recomputes the destination a file was organized to.
///
/// Reconstruction is only defined when the implementation applies the exact
/// rules the organizing run used; it is injected rather than read from a
/// global config so verification stays testable in isolation.
pub trait DestinationMapper {
    fn expected_destination(&self, source: &Path) -> Result<PathBuf, Error>;
}

/// Date-based destination folder layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderStructure {
    Year,
    YearMonth,
    YearMonthDay,
}

impl FolderStructure {
    /// Parse "YYYY", "YYYY/MM" or "YYYY/MM/DD", falling back to "YYYY/MM"
    /// with a warning for unknown values.
    pub fn parse(value: &str) -> Self {
        match value {
            "YYYY" => FolderStructure::Year,
            "YYYY/MM" => FolderStructure::YearMonth,
            "YYYY/MM/DD" => FolderStructure::YearMonthDay,
            other => {
                warn!("Unknown folder structure '{}', using 'YYYY/MM'", other);
                FolderStructure::YearMonth
            }
        }
    }

    pub fn folder_for(self, date: &NaiveDateTime) -> PathBuf {
        let mut folder = PathBuf::from(format!("{:04}", date.year()));
        if matches!(self, FolderStructure::YearMonth | FolderStructure::YearMonthDay) {
            folder.push(format!("{:02}", date.month()));
        }
        if matches!(self, FolderStructure::YearMonthDay) {
            folder.push(format!("{:02}", date.day()));
        }
        folder
    }
}

#[derive(Debug, Clone)]
struct RenameRule {
    pattern: String,
    date_format: String,
    time_format: String,
}

impl RenameRule {
    fn render(&self, source: &Path, date: &NaiveDateTime) -> String {
        let name = self
            .pattern
            .replace("{date}", &date.format(&self.date_format).to_string())
            .replace("{time}", &date.format(&self.time_format).to_string());
        match source.extension() {
            Some(ext) => format!("{}.{}", name, ext.to_string_lossy().to_lowercase()),
            None => name,
        }
    }
}

/// Production [`DestinationMapper`]: capture date from the filename when it
/// carries one, else the file modification time, then the configured folder
/// structure and optional rename pattern.
#[derive(Debug, Clone)]
pub struct DateMapper {
    destination_root: PathBuf,
    structure: FolderStructure,
    rename: Option<RenameRule>,
}

impl DateMapper {
    pub fn new(destination_root: &Path, structure: FolderStructure) -> Self {
        DateMapper {
            destination_root: destination_root.to_path_buf(),
            structure,
            rename: None,
        }
    }

    pub fn with_rename(mut self, pattern: &str, date_format: &str, time_format: &str) -> Self {
        self.rename = Some(RenameRule {
            pattern: pattern.to_string(),
            date_format: date_format.to_string(),
            time_format: time_format.to_string(),
        });
        self
    }

    pub fn from_config(config: &AppConfig, destination_root: &Path) -> Self {
        let mapper = DateMapper::new(
            destination_root,
            FolderStructure::parse(&config.mapping.folder_structure),
        );
        if config.mapping.renaming_enabled {
            mapper.with_rename(
                &config.mapping.renaming_pattern,
                &config.mapping.date_format,
                &config.mapping.time_format,
            )
        } else {
            mapper
        }
    }

    fn capture_date(&self, source: &Path) -> Result<NaiveDateTime, Error> {
        if let Some(stem) = source.file_stem().map(|s| s.to_string_lossy().into_owned()) {
            if let Some(date) = date_from_filename(&stem) {
                return Ok(date);
            }
        }

        let metadata = fs::metadata(source).map_err(|e| Error::Reconstruction {
            path: source.display().to_string(),
            reason: format!("cannot read metadata: {}", e),
        })?;
        let modified = metadata.modified().map_err(|e| Error::Reconstruction {
            path: source.display().to_string(),
            reason: format!("no modification time: {}", e),
        })?;
        Ok(DateTime::<Local>::from(modified).naive_local())
    }
}

impl DestinationMapper for DateMapper {
    fn expected_destination(&self, source: &Path) -> Result<PathBuf, Error> {
        let date = self.capture_date(source)?;
        let folder = self.destination_root.join(self.structure.folder_for(&date));

        let file_name = match &self.rename {
            Some(rule) => rule.render(source, &date),
            None => source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::Reconstruction {
                    path: source.display().to_string(),
                    reason: "source path has no file name".to_string(),
                })?,
        };

        Ok(folder.join(file_name))
    }
}

/// Extract a capture date from a filename stem.
/// Recognizes `YYYYMMDD_HHMMSS`, `YYYY-MM-DD` and `YYYYMMDD` prefixes.
fn date_from_filename(stem: &str) -> Option<NaiveDateTime> {
    if let Some(s) = stem.get(..15) {
        if is_digits(&s[..8]) && s.as_bytes()[8] == b'_' && is_digits(&s[9..]) {
            if let Some(date) = build_date(
                &s[..4],
                &s[4..6],
                &s[6..8],
                (&s[9..11], &s[11..13], &s[13..15]),
            ) {
                return Some(date);
            }
        }
    }
    if let Some(s) = stem.get(..10) {
        if is_digits(&s[..4])
            && &s[4..5] == "-"
            && is_digits(&s[5..7])
            && &s[7..8] == "-"
            && is_digits(&s[8..10])
        {
            if let Some(date) = build_date(&s[..4], &s[5..7], &s[8..10], ("0", "0", "0")) {
                return Some(date);
            }
        }
    }
    if let Some(s) = stem.get(..8) {
        if is_digits(s) {
            if let Some(date) = build_date(&s[..4], &s[4..6], &s[6..8], ("0", "0", "0")) {
                return Some(date);
            }
        }
    }
    None
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn build_date(year: &str, month: &str, day: &str, hms: (&str, &str, &str)) -> Option<NaiveDateTime> {
    let year: i32 = year.parse().ok()?;
    // Sanity window: digit runs outside it are counters, not capture dates.
    if !(1970..=2100).contains(&year) {
        return None;
    }
    let date = NaiveDate::from_ymd_opt(year, month.parse().ok()?, day.parse().ok()?)?;
    date.and_hms_opt(hms.0.parse().ok()?, hms.1.parse().ok()?, hms.2.parse().ok()?)
}

/// File filters applied when scanning a source tree for reconstruction.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Lowercased extensions with leading dot, e.g. ".jpg".
    pub extensions: HashSet<String>,
    pub ignore_hidden: bool,
}

impl ScanOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        ScanOptions {
            extensions: config.all_extensions(),
            ignore_hidden: config.scan.ignore_hidden_files,
        }
    }
}

/// Walk `root` yielding media files, lazily, in directory order.
/// Unreadable paths are logged and skipped.
pub fn media_files(root: &Path, options: &ScanOptions) -> impl Iterator<Item = PathBuf> {
    let ignore_hidden = options.ignore_hidden;
    let extensions = options.extensions.clone();

    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(move |entry| entry.depth() == 0 || !(ignore_hidden && is_hidden(entry)))
        .filter_map(move |result| {
            let entry = match result {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable path during scan: {}", e);
                    return None;
                }
            };
            if !entry.file_type().is_file() {
                return None;
            }
            let ext = entry
                .path()
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))?;
            if extensions.contains(&ext) {
                Some(entry.into_path())
            } else {
                None
            }
        })
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}
