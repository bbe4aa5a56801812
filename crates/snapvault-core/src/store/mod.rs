pub mod discovery;

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::error::Error;

pub const RUNS_DIR: &str = "runs";
pub const VERIFICATIONS_DIR: &str = "verifications";

/// Append-only artifact store: run records under `runs/`, verification
/// reports under `verifications/`, both keyed by their sortable ids.
/// History is never edited, only superseded by newer artifacts.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Store { root: root.into() }
    }

    /// Relative state dirs resolve against the working directory, matching
    /// how the organizing run resolves them.
    pub fn from_config(config: &AppConfig) -> Self {
        Store::new(&config.state_dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join(RUNS_DIR)
    }

    pub fn verifications_dir(&self) -> PathBuf {
        self.root.join(VERIFICATIONS_DIR)
    }

    pub fn ensure_runs_dir(&self) -> Result<PathBuf, Error> {
        let dir = self.runs_dir();
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn ensure_verifications_dir(&self) -> Result<PathBuf, Error> {
        let dir = self.verifications_dir();
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn digest_cache_path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }
}
