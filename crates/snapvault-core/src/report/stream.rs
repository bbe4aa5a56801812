use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, LineWriter, Lines, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};

use super::{
    generate_verify_id, report_filename, InputSource, ReportFooter, ReportHeader, ReportLine,
    VerifyEntry, VerifySummary, SCHEMA_VERSION,
};
use crate::digest::HashAlgorithm;
use crate::error::Error;
use crate::store::Store;

/// A finalized verification pass: where the report landed and what it found.
#[derive(Debug, Clone)]
pub struct FinalizedReport {
    pub verify_id: String,
    pub path: PathBuf,
    pub summary: VerifySummary,
    pub duration_seconds: f64,
}

/// Streams verification entries to disk as they are produced.
///
/// Same JSONL layout as run records: header line, entry lines, footer on
/// finalize. An interrupted verification leaves the in-progress entry absent,
/// which is safe: absence is never treated as verified.
pub struct ReportWriter {
    verify_id: String,
    path: PathBuf,
    out: LineWriter<File>,
    summary: VerifySummary,
    started: Instant,
}

impl ReportWriter {
    pub fn create(
        store: &Store,
        source_root: &Path,
        destination_root: &Path,
        input_source: InputSource,
        run_id: Option<String>,
        hash_algorithm: HashAlgorithm,
    ) -> Result<Self, Error> {
        let reports_dir = store.ensure_verifications_dir()?;
        let verify_id = generate_verify_id();
        let path = reports_dir.join(report_filename(&verify_id));

        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        let mut out = LineWriter::new(file);

        let header = ReportHeader {
            schema_version: SCHEMA_VERSION,
            verify_id: verify_id.clone(),
            created_at: Utc::now(),
            source_root: source_root.to_path_buf(),
            destination_root: destination_root.to_path_buf(),
            input_source,
            run_id,
            hash_algorithm,
        };
        write_line(&mut out, &ReportLine::Header(header))?;
        debug!("Verification report started at {}", path.display());

        Ok(Self {
            verify_id,
            path,
            out,
            summary: VerifySummary::default(),
            started: Instant::now(),
        })
    }

    pub fn verify_id(&self) -> &str {
        &self.verify_id
    }

    pub fn summary(&self) -> &VerifySummary {
        &self.summary
    }

    pub fn append(&mut self, entry: &VerifyEntry) -> Result<(), Error> {
        self.summary.record(entry.status);
        write_line(&mut self.out, &ReportLine::Entry(entry.clone()))
    }

    pub fn finalize(mut self) -> Result<FinalizedReport, Error> {
        let duration_seconds = self.started.elapsed().as_secs_f64();
        let footer = ReportFooter {
            summary: self.summary,
            duration_seconds,
        };
        write_line(&mut self.out, &ReportLine::Footer(footer))?;
        self.out.flush()?;
        info!("Verification report written to {}", self.path.display());

        Ok(FinalizedReport {
            verify_id: self.verify_id,
            path: self.path,
            summary: self.summary,
            duration_seconds,
        })
    }
}

fn write_line<W: Write>(out: &mut W, line: &ReportLine) -> Result<(), Error> {
    serde_json::to_writer(&mut *out, line)?;
    out.write_all(b"\n")?;
    Ok(())
}

/// Streaming reader over a verification report file.
pub struct ReportReader {
    header: ReportHeader,
    lines: Lines<BufReader<File>>,
    footer: Option<ReportFooter>,
    path: PathBuf,
}

impl ReportReader {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = File::open(path)?;
        let mut lines = BufReader::new(file).lines();

        let first = lines.next().ok_or_else(|| {
            Error::Artifact(format!("{}: empty verification report", path.display()))
        })??;
        let header = match serde_json::from_str::<ReportLine>(&first)? {
            ReportLine::Header(h) => h,
            _ => {
                return Err(Error::Artifact(format!(
                    "{}: first line is not a report header",
                    path.display()
                )))
            }
        };
        if header.schema_version != SCHEMA_VERSION {
            return Err(Error::SchemaVersion {
                path: path.display().to_string(),
                found: header.schema_version,
                expected: SCHEMA_VERSION,
            });
        }

        Ok(Self {
            header,
            lines,
            footer: None,
            path: path.to_path_buf(),
        })
    }

    pub fn header(&self) -> &ReportHeader {
        &self.header
    }

    pub fn footer(&self) -> Option<&ReportFooter> {
        self.footer.as_ref()
    }

    pub fn into_parts(self) -> (ReportHeader, Option<ReportFooter>) {
        (self.header, self.footer)
    }
}

impl Iterator for ReportReader {
    type Item = Result<VerifyEntry, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next() {
                None => return None,
                Some(Ok(l)) => l,
                Some(Err(e)) => return Some(Err(e.into())),
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ReportLine>(&line) {
                Ok(ReportLine::Entry(entry)) => return Some(Ok(entry)),
                Ok(ReportLine::Footer(footer)) => {
                    self.footer = Some(footer);
                    continue;
                }
                Ok(ReportLine::Header(_)) => {
                    return Some(Err(Error::Artifact(format!(
                        "{}: unexpected second header",
                        self.path.display()
                    ))))
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
