use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::AppConfig;
use crate::digest::{
    self,
    cache::{digest_with_cache, DigestCache},
    HashAlgorithm,
};
use crate::error::Error;
use crate::mapping::DestinationMapper;
use crate::progress::ProgressReporter;
use crate::record::{Operation, RunRecordReader};
use crate::report::{
    FinalizedReport, InputSource, MatchType, ReportWriter, VerifyEntry, VerifyStatus,
};
use crate::store::Store;

/// Outcome of a verification pass: report location plus status histogram.
pub type VerifyOutcome = FinalizedReport;

/// Proves or disproves, per source file, that a correct copy exists at the
/// destination. Per-file I/O problems become entry statuses; only structural
/// problems (unusable mapping, store failures) abort the pass.
pub struct Verifier {
    algorithm: HashAlgorithm,
    content_search: bool,
    cache: Option<DigestCache>,
}

impl Verifier {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Verifier {
            algorithm,
            content_search: false,
            cache: None,
        }
    }

    pub fn with_content_search(mut self, enabled: bool) -> Self {
        self.content_search = enabled;
        self
    }

    pub fn with_digest_cache(mut self, cache: DigestCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build a verifier from configuration, optionally overriding the
    /// configured hash algorithm (e.g. from a CLI flag).
    pub fn from_config(
        config: &AppConfig,
        store: &Store,
        algorithm_override: Option<HashAlgorithm>,
    ) -> Result<Self, Error> {
        let algorithm = match algorithm_override {
            Some(algorithm) => algorithm,
            None => config.verify.algorithm.parse()?,
        };
        let mut verifier =
            Verifier::new(algorithm).with_content_search(config.verify.content_search_on_reconstruct);
        if config.verify.enable_digest_cache {
            fs::create_dir_all(store.root())?;
            let cache_path = store.digest_cache_path(&config.verify.digest_cache_file);
            verifier = verifier.with_digest_cache(DigestCache::open(&cache_path)?);
        }
        Ok(verifier)
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn digest(&self, path: &Path) -> Result<String, Error> {
        match &self.cache {
            Some(cache) => digest_with_cache(cache, path),
            None => Ok(digest::compute_file_digest(path)?),
        }
    }

    /// Verify every entry of a run record, streaming the report to the store.
    ///
    /// Copies are hash-compared. Moves have no source left to compare and are
    /// recorded `missing_source`. Skips are carried through unchanged.
    pub fn verify_run(
        &self,
        store: &Store,
        mut reader: RunRecordReader,
        reporter: &dyn ProgressReporter,
    ) -> Result<VerifyOutcome, Error> {
        let header = reader.header().clone();
        let mut writer = ReportWriter::create(
            store,
            &header.source_root,
            &header.destination_root,
            InputSource::RunRecord,
            Some(header.run_id.clone()),
            self.algorithm,
        )?;

        info!("Verifying run {}", header.run_id);
        reporter.on_verify_start(None);

        let mut done = 0usize;
        for entry in reader.by_ref() {
            let entry = entry?;
            let verify_entry = match entry.operation {
                Operation::Copy => match &entry.destination_path {
                    Some(dest) => {
                        self.verify_pair(&entry.source_path, dest, MatchType::ExpectedPath)
                    }
                    None => VerifyEntry {
                        source_path: entry.source_path.clone(),
                        expected_destination_path: None,
                        actual_destination_path: None,
                        status: VerifyStatus::MissingDestination,
                        match_type: MatchType::Unknown,
                        hash_algorithm: self.algorithm,
                        source_hash: None,
                        destination_hash: None,
                        error: None,
                    },
                },
                Operation::Move => {
                    let actual = entry
                        .destination_path
                        .as_ref()
                        .filter(|dest| dest.exists())
                        .cloned();
                    VerifyEntry {
                        source_path: entry.source_path.clone(),
                        expected_destination_path: entry.destination_path.clone(),
                        actual_destination_path: actual,
                        status: VerifyStatus::MissingSource,
                        match_type: MatchType::ExpectedPath,
                        hash_algorithm: self.algorithm,
                        source_hash: None,
                        destination_hash: None,
                        error: None,
                    }
                }
                Operation::Skip => VerifyEntry {
                    source_path: entry.source_path.clone(),
                    expected_destination_path: None,
                    actual_destination_path: None,
                    status: VerifyStatus::Skipped,
                    match_type: MatchType::Unknown,
                    hash_algorithm: self.algorithm,
                    source_hash: None,
                    destination_hash: None,
                    error: None,
                },
            };
            writer.append(&verify_entry)?;
            done += 1;
            reporter.on_verify_progress(done, None);
        }

        let finalized = writer.finalize()?;
        reporter.on_verify_complete(finalized.summary.total as usize, finalized.duration_seconds);
        Ok(finalized)
    }

    /// Verify sources against a reconstructed mapping, streaming the report.
    ///
    /// Resolution per source: hash-compare at the expected destination when it
    /// exists; otherwise fall back to content search when enabled; otherwise
    /// `missing_destination`. A mapper failure aborts the pass; guessing a
    /// destination would undermine the integrity guarantee.
    pub fn verify_reconstructed<I>(
        &self,
        store: &Store,
        source_root: &Path,
        destination_root: &Path,
        mapper: &dyn DestinationMapper,
        sources: I,
        reporter: &dyn ProgressReporter,
    ) -> Result<VerifyOutcome, Error>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut writer = ReportWriter::create(
            store,
            source_root,
            destination_root,
            InputSource::Reconstructed,
            None,
            self.algorithm,
        )?;

        info!(
            "Verifying {} against {} (reconstructed mapping)",
            source_root.display(),
            destination_root.display()
        );
        reporter.on_verify_start(None);

        let mut claimed: HashSet<PathBuf> = HashSet::new();
        let mut index: Option<DestinationIndex> = None;
        let mut done = 0usize;

        for source in sources {
            let expected = mapper.expected_destination(&source)?;
            let verify_entry = self.verify_reconstructed_entry(
                &source,
                &expected,
                destination_root,
                &mut index,
                &mut claimed,
            );
            writer.append(&verify_entry)?;
            done += 1;
            reporter.on_verify_progress(done, None);
        }

        let finalized = writer.finalize()?;
        reporter.on_verify_complete(finalized.summary.total as usize, finalized.duration_seconds);
        Ok(finalized)
    }

    /// Verify one source/destination pair at its expected path.
    pub fn verify_single(&self, source: &Path, destination: &Path) -> VerifyEntry {
        self.verify_pair(source, destination, MatchType::ExpectedPath)
    }

    fn verify_pair(&self, source: &Path, expected: &Path, match_type: MatchType) -> VerifyEntry {
        let mut entry = VerifyEntry {
            source_path: source.to_path_buf(),
            expected_destination_path: Some(expected.to_path_buf()),
            actual_destination_path: None,
            status: VerifyStatus::Error,
            match_type,
            hash_algorithm: self.algorithm,
            source_hash: None,
            destination_hash: None,
            error: None,
        };

        if !source.exists() {
            entry.status = VerifyStatus::MissingSource;
            return entry;
        }
        if !expected.exists() {
            entry.status = VerifyStatus::MissingDestination;
            return entry;
        }

        match self.algorithm {
            HashAlgorithm::Quick => self.verify_quick(entry, source, expected),
            HashAlgorithm::Sha256 => self.verify_sha256(entry, source, expected),
        }
    }

    /// Quick mode compares sizes only. Timestamps shift during copies, so
    /// size equality is the whole check; it never proves content equality.
    fn verify_quick(&self, mut entry: VerifyEntry, source: &Path, expected: &Path) -> VerifyEntry {
        match (fs::metadata(source), fs::metadata(expected)) {
            (Ok(source_meta), Ok(dest_meta)) => {
                entry.actual_destination_path = Some(expected.to_path_buf());
                if source_meta.len() == dest_meta.len() {
                    entry.status = VerifyStatus::Ok;
                } else {
                    entry.status = VerifyStatus::Mismatch;
                    entry.error = Some("size mismatch".to_string());
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                entry.status = VerifyStatus::Error;
                entry.error = Some(e.to_string());
            }
        }
        entry
    }

    fn verify_sha256(&self, mut entry: VerifyEntry, source: &Path, expected: &Path) -> VerifyEntry {
        let source_hash = match self.digest(source) {
            Ok(hash) => hash,
            Err(e) => {
                warn!("Could not hash source '{}': {}", source.display(), e);
                entry.status = VerifyStatus::Error;
                entry.error = Some(format!("could not hash source: {}", e));
                return entry;
            }
        };
        entry.source_hash = Some(source_hash.clone());

        let dest_hash = match self.digest(expected) {
            Ok(hash) => hash,
            Err(e) => {
                warn!("Could not hash destination '{}': {}", expected.display(), e);
                entry.status = VerifyStatus::Error;
                entry.error = Some(format!("could not hash destination: {}", e));
                return entry;
            }
        };
        entry.destination_hash = Some(dest_hash.clone());
        entry.actual_destination_path = Some(expected.to_path_buf());

        entry.status = if source_hash == dest_hash {
            VerifyStatus::Ok
        } else {
            VerifyStatus::Mismatch
        };
        entry
    }

    fn verify_reconstructed_entry(
        &self,
        source: &Path,
        expected: &Path,
        destination_root: &Path,
        index: &mut Option<DestinationIndex>,
        claimed: &mut HashSet<PathBuf>,
    ) -> VerifyEntry {
        if expected.exists() {
            let mut entry = self.verify_pair(source, expected, MatchType::ExpectedPath);
            if entry.status == VerifyStatus::Ok && !claimed.insert(expected.to_path_buf()) {
                entry.status = VerifyStatus::OkExistingDuplicate;
            }
            return entry;
        }

        let mut entry = VerifyEntry {
            source_path: source.to_path_buf(),
            expected_destination_path: Some(expected.to_path_buf()),
            actual_destination_path: None,
            status: VerifyStatus::MissingDestination,
            match_type: MatchType::ExpectedPath,
            hash_algorithm: self.algorithm,
            source_hash: None,
            destination_hash: None,
            error: None,
        };

        if !source.exists() {
            entry.status = VerifyStatus::MissingSource;
            entry.match_type = MatchType::Unknown;
            return entry;
        }

        if !self.content_search {
            return entry;
        }

        if self.algorithm == HashAlgorithm::Quick {
            entry.error = Some("content search not supported with quick verification".to_string());
            return entry;
        }

        entry.match_type = MatchType::ContentSearch;

        let source_hash = match self.digest(source) {
            Ok(hash) => hash,
            Err(e) => {
                entry.status = VerifyStatus::Error;
                entry.error = Some(format!("could not hash source: {}", e));
                return entry;
            }
        };
        entry.source_hash = Some(source_hash.clone());

        let size = match fs::metadata(source) {
            Ok(meta) => meta.len(),
            Err(e) => {
                entry.status = VerifyStatus::Error;
                entry.error = Some(e.to_string());
                return entry;
            }
        };
        let ext = source
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let idx = index.get_or_insert_with(|| DestinationIndex::build(destination_root));
        let candidates = idx.candidates(&ext, size);

        match digest::find_content_match(&source_hash, candidates.iter().cloned()) {
            Some((path, dest_hash)) => {
                entry.destination_hash = Some(dest_hash);
                entry.actual_destination_path = Some(path.clone());
                entry.status = if claimed.insert(path) {
                    VerifyStatus::Ok
                } else {
                    VerifyStatus::OkExistingDuplicate
                };
            }
            None => {
                entry.status = VerifyStatus::MissingDestination;
            }
        }
        entry
    }
}

/// Cheap-attribute index of the destination tree: (extension, size) → paths.
/// Built once per pass, and only when content search first needs it, since
/// walking the whole destination per unmatched file does not scale.
struct DestinationIndex {
    by_key: HashMap<(String, u64), Vec<PathBuf>>,
}

impl DestinationIndex {
    fn build(root: &Path) -> Self {
        debug!("Indexing destination tree under {}", root.display());
        let mut by_key: HashMap<(String, u64), Vec<PathBuf>> = HashMap::new();

        for result in WalkDir::new(root).follow_links(false) {
            let entry = match result {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable destination path: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(e) => {
                    warn!(
                        "Skipping destination candidate '{}': {}",
                        entry.path().display(),
                        e
                    );
                    continue;
                }
            };
            let ext = entry
                .path()
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            by_key.entry((ext, size)).or_default().push(entry.into_path());
        }

        DestinationIndex { by_key }
    }

    fn candidates(&self, ext: &str, size: u64) -> &[PathBuf] {
        self.by_key
            .get(&(ext.to_string(), size))
            .map(|paths| paths.as_slice())
            .unwrap_or(&[])
    }
}
