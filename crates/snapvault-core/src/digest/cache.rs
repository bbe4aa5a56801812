use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, trace};

use crate::error::Error;

/// SQLite-backed digest cache.
///
/// Cache key is the canonical path plus the modification time at subsecond
/// precision, so a rewritten file never returns a stale digest.
pub struct DigestCache {
    conn: Connection,
}

impl DigestCache {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        let cache = DigestCache { conn };
        cache.init_schema()?;
        debug!("Digest cache opened at {}", path.display());
        Ok(cache)
    }

    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let cache = DigestCache { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             CREATE TABLE IF NOT EXISTS digest_cache (
                 path        TEXT NOT NULL,
                 mtime_secs  INTEGER NOT NULL,
                 mtime_nanos INTEGER NOT NULL,
                 digest      TEXT NOT NULL,
                 PRIMARY KEY (path, mtime_secs, mtime_nanos)
             );",
        )
    }

    fn get(&self, path: &str, secs: i64, nanos: i64) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT digest FROM digest_cache \
                 WHERE path = ?1 AND mtime_secs = ?2 AND mtime_nanos = ?3",
                params![path, secs, nanos],
                |row| row.get(0),
            )
            .optional()
    }

    fn put(&self, path: &str, secs: i64, nanos: i64, digest: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO digest_cache (path, mtime_secs, mtime_nanos, digest) \
             VALUES (?1, ?2, ?3, ?4)",
            params![path, secs, nanos, digest],
        )?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize, rusqlite::Error> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM digest_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, rusqlite::Error> {
        Ok(self.len()? == 0)
    }
}

/// Look up a file's digest in the cache, computing and storing it on a miss.
/// A failed cache write is logged and otherwise ignored; the digest itself is
/// still returned.
pub fn digest_with_cache(cache: &DigestCache, path: &Path) -> Result<String, Error> {
    let canonical = fs::canonicalize(path)?;
    let metadata = fs::metadata(path)?;
    let modified = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::Other(format!("modification time before epoch: {}", e)))?;

    let key = canonical.to_string_lossy().into_owned();
    let secs = modified.as_secs() as i64;
    let nanos = modified.subsec_nanos() as i64;

    if let Some(digest) = cache.get(&key, secs, nanos)? {
        trace!("Digest cache hit for {}", path.display());
        return Ok(digest);
    }

    let digest = super::compute_file_digest(path)?;
    if let Err(e) = cache.put(&key, secs, nanos, &digest) {
        debug!("Could not store digest for {}: {}", path.display(), e);
    }
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("photo.jpg");
        fs::write(&file, b"jpeg bytes").unwrap();

        let cache = DigestCache::open_in_memory().unwrap();
        assert!(cache.is_empty().unwrap());

        let first = digest_with_cache(&cache, &file).unwrap();
        assert_eq!(cache.len().unwrap(), 1);

        let second = digest_with_cache(&cache, &file).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn test_rewrite_invalidates_entry() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("photo.jpg");
        fs::write(&file, b"version one").unwrap();

        let cache = DigestCache::open_in_memory().unwrap();
        let first = digest_with_cache(&cache, &file).unwrap();

        // Rewrite with different content; mtime moves forward.
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(&file, b"version two").unwrap();

        let second = digest_with_cache(&cache, &file).unwrap();
        assert_ne!(first, second);
    }
}
