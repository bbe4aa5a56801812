use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{path}: unsupported schema version {found} (expected {expected})")]
    SchemaVersion {
        path: String,
        found: u32,
        expected: u32,
    },

    #[error("malformed artifact: {0}")]
    Artifact(String),

    #[error("no matching {0} found")]
    NoCandidates(&'static str),

    #[error("{count} {kind}s match; select one explicitly or pass --last")]
    AmbiguousSelection { kind: &'static str, count: usize },

    #[error("cannot compute expected destination for '{path}': {reason}")]
    Reconstruction { path: String, reason: String },

    #[error("{0}")]
    Other(String),
}
