use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, LineWriter, Lines, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};

use super::{
    generate_run_id, run_filename, ConfigSignature, Operation, RunCounts, RunEntry, RunFooter,
    RunHeader, RunLine, RunMode,
};
use crate::error::Error;
use crate::report::SCHEMA_VERSION;
use crate::store::Store;

/// Appends run entries to disk as operations complete.
///
/// Each entry is one JSON line, flushed as it is written, so a crash mid-run
/// leaves a partial record that is still discoverable and verifiable. The
/// footer written by [`finalize`](RunRecordWriter::finalize) marks the record
/// complete.
pub struct RunRecordWriter {
    run_id: String,
    path: PathBuf,
    out: LineWriter<File>,
    summary: RunCounts,
    started: Instant,
}

impl RunRecordWriter {
    pub fn begin(
        store: &Store,
        source_root: &Path,
        destination_root: &Path,
        mode: RunMode,
        config_signature: ConfigSignature,
    ) -> Result<Self, Error> {
        let runs_dir = store.ensure_runs_dir()?;
        let run_id = generate_run_id();
        let path = runs_dir.join(run_filename(&run_id, mode));

        // Fresh ids must never overwrite prior history.
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        let mut out = LineWriter::new(file);

        let header = RunHeader {
            schema_version: SCHEMA_VERSION,
            run_id: run_id.clone(),
            created_at: Utc::now(),
            source_root: source_root.to_path_buf(),
            destination_root: destination_root.to_path_buf(),
            mode,
            config_signature,
        };
        write_line(&mut out, &RunLine::Header(header))?;
        debug!("Run record started at {}", path.display());

        Ok(Self {
            run_id,
            path,
            out,
            summary: RunCounts::default(),
            started: Instant::now(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record_copy(&mut self, source: &Path, destination: &Path) -> Result<(), Error> {
        self.append(RunEntry {
            source_path: source.to_path_buf(),
            destination_path: Some(destination.to_path_buf()),
            operation: Operation::Copy,
            reason: None,
        })
    }

    pub fn record_move(&mut self, source: &Path, destination: &Path) -> Result<(), Error> {
        self.append(RunEntry {
            source_path: source.to_path_buf(),
            destination_path: Some(destination.to_path_buf()),
            operation: Operation::Move,
            reason: None,
        })
    }

    pub fn record_skip(&mut self, source: &Path, reason: &str) -> Result<(), Error> {
        self.append(RunEntry {
            source_path: source.to_path_buf(),
            destination_path: None,
            operation: Operation::Skip,
            reason: Some(reason.to_string()),
        })
    }

    pub fn record_failure(&mut self) {
        self.summary.error_files += 1;
    }

    fn append(&mut self, entry: RunEntry) -> Result<(), Error> {
        self.summary.record(entry.operation);
        write_line(&mut self.out, &RunLine::Entry(entry))
    }

    /// Write the footer and close the record.
    pub fn finalize(mut self) -> Result<PathBuf, Error> {
        let footer = RunFooter {
            summary: self.summary,
            duration_seconds: self.started.elapsed().as_secs_f64(),
        };
        write_line(&mut self.out, &RunLine::Footer(footer))?;
        self.out.flush()?;
        info!("Run record written to {}", self.path.display());
        Ok(self.path)
    }
}

fn write_line<W: Write>(out: &mut W, line: &RunLine) -> Result<(), Error> {
    serde_json::to_writer(&mut *out, line)?;
    out.write_all(b"\n")?;
    Ok(())
}

/// Streaming reader over a run record file.
///
/// Yields entries one at a time so memory stays bounded on large libraries.
/// The footer, when present, is available after iteration.
pub struct RunRecordReader {
    header: RunHeader,
    lines: Lines<BufReader<File>>,
    footer: Option<RunFooter>,
    path: PathBuf,
}

impl RunRecordReader {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = File::open(path)?;
        let mut lines = BufReader::new(file).lines();

        let first = lines
            .next()
            .ok_or_else(|| Error::Artifact(format!("{}: empty run record", path.display())))??;
        let header = match serde_json::from_str::<RunLine>(&first)? {
            RunLine::Header(h) => h,
            _ => {
                return Err(Error::Artifact(format!(
                    "{}: first line is not a run header",
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

    pub fn header(&self) -> &RunHeader {
        &self.header
    }

    /// Present only on finalized records, and only after iteration reached
    /// the end of the file.
    pub fn footer(&self) -> Option<&RunFooter> {
        self.footer.as_ref()
    }

    pub fn into_parts(self) -> (RunHeader, Option<RunFooter>) {
        (self.header, self.footer)
    }
}

impl Iterator for RunRecordReader {
    type Item = Result<RunEntry, Error>;

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
            match serde_json::from_str::<RunLine>(&line) {
                Ok(RunLine::Entry(entry)) => return Some(Ok(entry)),
                Ok(RunLine::Footer(footer)) => {
                    self.footer = Some(footer);
                    continue;
                }
                Ok(RunLine::Header(_)) => {
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
