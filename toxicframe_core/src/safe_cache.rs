use crate::candidate::Candidate;
use crate::store::{BUSY_TIMEOUT, StoreError};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashSet;
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS safe_cache (
    digest     TEXT    NOT NULL,
    epoch      INTEGER NOT NULL,
    hex        TEXT    NOT NULL,
    length     INTEGER NOT NULL,
    created_at TEXT    NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (digest, epoch)
);
";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Digests held in the in-process set.
    pub memory: usize,
    /// Digests stored durably for the current epoch.
    pub durable: u64,
}

/// Two-tier cache of content digests confirmed SAFE.
///
/// Only SAFE verdicts ever enter the cache. Membership is answered from the
/// in-process set first; a miss falls through to the durable table and
/// promotes the digest on a hit. Entries belong to an epoch, and bumping
/// the epoch makes every older entry invisible without deleting it.
pub struct SafeCache {
    conn: Connection,
    memory: Mutex<HashSet<String>>,
    epoch: i64,
}

impl SafeCache {
    pub fn open(path: &Path, epoch: i64) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::with_connection(conn, epoch)
    }

    pub fn open_in_memory(epoch: i64) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, epoch)
    }

    fn with_connection(conn: Connection, epoch: i64) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            memory: Mutex::new(HashSet::new()),
            epoch,
        })
    }

    pub fn epoch(&self) -> i64 {
        self.epoch
    }

    pub fn is_cached(&self, digest: &str) -> Result<bool, StoreError> {
        if self.memory.lock().contains(digest) {
            return Ok(true);
        }
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM safe_cache WHERE digest = ?1 AND epoch = ?2",
                params![digest, self.epoch],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if found {
            self.memory.lock().insert(digest.to_string());
        }
        Ok(found)
    }

    pub fn add(&self, candidate: &Candidate) -> Result<(), StoreError> {
        let digest = candidate.digest();
        self.conn.execute(
            "INSERT OR IGNORE INTO safe_cache (digest, epoch, hex, length) VALUES (?1, ?2, ?3, ?4)",
            params![digest, self.epoch, candidate.to_hex(), candidate.len() as i64],
        )?;
        self.memory.lock().insert(digest);
        Ok(())
    }

    /// Adds every candidate in one transaction.
    pub fn add_batch(&self, candidates: &[Candidate]) -> Result<(), StoreError> {
        if candidates.is_empty() {
            return Ok(());
        }
        let digests: Vec<String> = candidates.iter().map(Candidate::digest).collect();
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO safe_cache (digest, epoch, hex, length) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (candidate, digest) in candidates.iter().zip(&digests) {
                stmt.execute(params![
                    digest,
                    self.epoch,
                    candidate.to_hex(),
                    candidate.len() as i64
                ])?;
            }
        }
        tx.commit()?;
        self.memory.lock().extend(digests);
        Ok(())
    }

    /// Loads up to `limit` current-epoch digests into memory and returns how
    /// many were new.
    pub fn warm(&self, limit: usize) -> Result<usize, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT digest FROM safe_cache WHERE epoch = ?1 LIMIT ?2")?;
        let digests = stmt
            .query_map(params![self.epoch, limit as i64], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut memory = self.memory.lock();
        let before = memory.len();
        memory.extend(digests);
        Ok(memory.len() - before)
    }

    /// Drops every entry of every epoch, in memory and on disk.
    pub fn invalidate(&self) -> Result<usize, StoreError> {
        let removed = self.conn.execute("DELETE FROM safe_cache", [])?;
        self.memory.lock().clear();
        tracing::info!(removed, "safe cache invalidated");
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CacheStats, StoreError> {
        let durable: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM safe_cache WHERE epoch = ?1",
            params![self.epoch],
            |row| row.get(0),
        )?;
        Ok(CacheStats {
            memory: self.memory.lock().len(),
            durable: durable as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn added_digest_is_cached() {
        let cache = SafeCache::open_in_memory(0).unwrap();
        let candidate = Candidate::from(vec![1, 2, 3]);
        assert!(!cache.is_cached(&candidate.digest()).unwrap());
        cache.add(&candidate).unwrap();
        assert!(cache.is_cached(&candidate.digest()).unwrap());
    }

    #[test]
    fn durable_tier_answers_after_reopen_and_warms_memory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let candidates: Vec<Candidate> = (0u8..5).map(|b| Candidate::from(vec![b; 3])).collect();
        {
            let cache = SafeCache::open(&path, 0).unwrap();
            cache.add_batch(&candidates).unwrap();
            cache.add_batch(&candidates).unwrap();
        }

        let cache = SafeCache::open(&path, 0).unwrap();
        assert_eq!(
            cache.stats().unwrap(),
            CacheStats {
                memory: 0,
                durable: 5
            }
        );
        assert!(cache.is_cached(&candidates[4].digest()).unwrap());
        assert_eq!(cache.stats().unwrap().memory, 1);
        assert_eq!(cache.warm(100).unwrap(), 4);
        assert_eq!(cache.stats().unwrap().memory, 5);
    }

    #[test]
    fn entries_from_other_epochs_are_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let candidate = Candidate::from(vec![7; 7]);
        SafeCache::open(&path, 1).unwrap().add(&candidate).unwrap();

        let next_epoch = SafeCache::open(&path, 2).unwrap();
        assert!(!next_epoch.is_cached(&candidate.digest()).unwrap());
        assert_eq!(next_epoch.warm(10).unwrap(), 0);
    }

    #[test]
    fn invalidate_clears_both_tiers() {
        let cache = SafeCache::open_in_memory(0).unwrap();
        let candidate = Candidate::from(vec![1]);
        cache.add(&candidate).unwrap();
        assert_eq!(cache.invalidate().unwrap(), 1);
        assert!(!cache.is_cached(&candidate.digest()).unwrap());
        assert_eq!(cache.stats().unwrap(), CacheStats::default());
    }
}
