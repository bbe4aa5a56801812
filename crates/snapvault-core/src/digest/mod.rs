pub mod cache;

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Error;

/// Chunk size for streamed hashing. Files are never read whole.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// How source and destination content are compared.
///
/// `Quick` compares file sizes only. It answers "looks plausible", not
/// "is proven identical", and is excluded from cleanup eligibility unless
/// explicitly overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Quick,
}

impl HashAlgorithm {
    pub fn is_cleanup_eligible(self) -> bool {
        match self {
            HashAlgorithm::Sha256 => true,
            HashAlgorithm::Quick => false,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Sha256 => write!(f, "sha256"),
            HashAlgorithm::Quick => write!(f, "quick"),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "quick" => Ok(HashAlgorithm::Quick),
            other => Err(Error::Other(format!(
                "unsupported hash algorithm '{}' (use 'sha256' or 'quick')",
                other
            ))),
        }
    }
}

/// Compute the SHA-256 digest of a file by streaming it in fixed-size chunks.
///
/// An unreadable file (missing, permissions, vanished mid-read) is an explicit
/// I/O error, never a silent "no match".
pub fn compute_file_digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Scan `candidates` for a file whose content digest equals `source_digest`.
/// Returns the first match and its digest. Unreadable candidates are logged
/// and skipped so one bad file cannot mask a real match elsewhere.
pub fn find_content_match<I>(source_digest: &str, candidates: I) -> Option<(PathBuf, String)>
where
    I: IntoIterator<Item = PathBuf>,
{
    for candidate in candidates {
        match compute_file_digest(&candidate) {
            Ok(digest) if digest == source_digest => return Some((candidate, digest)),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Skipping unreadable candidate '{}': {}", candidate.display(), e);
            }
        }
    }
    None
}
