//! Durable memo of every classification computed so far.
//!
//! One physical table holds two logical record kinds. [`TestKey`] is the
//! typed view: range records are addressed by their slice of the reference
//! corpus, pattern records by strategy label and content digest. Rows are
//! decoded back into the same variant, so no caller ever interprets nullable
//! columns by hand.

use crate::candidate::Candidate;
use crate::classification::{Classification, ClassificationResult};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

const RANGE_KIND: &str = "range";
const PATTERN_KIND: &str = "pattern";

pub(crate) const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS test_records (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    kind           TEXT    NOT NULL,
    label          TEXT,
    description    TEXT,
    start_pos      INTEGER,
    length         INTEGER NOT NULL,
    end_pos        INTEGER,
    digest         TEXT    NOT NULL,
    hex            TEXT    NOT NULL,
    successes      INTEGER NOT NULL,
    failures       INTEGER NOT NULL,
    probability    REAL    NOT NULL,
    classification TEXT    NOT NULL,
    created_at     TEXT    NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (kind, label, digest),
    UNIQUE (kind, start_pos, length)
);
CREATE INDEX IF NOT EXISTS idx_test_records_classification
    ON test_records (classification, length);
";

/// Address of one memoized classification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TestKey {
    /// Slice `[start, start + length)` of the reference corpus.
    Range { start: usize, length: usize },
    /// Candidate produced by the strategy named `label`.
    Pattern { label: String, digest: String },
}

impl TestKey {
    pub fn range(start: usize, length: usize) -> Self {
        TestKey::Range { start, length }
    }

    pub fn pattern(label: impl Into<String>, candidate: &Candidate) -> Self {
        TestKey::Pattern {
            label: label.into(),
            digest: candidate.digest(),
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            TestKey::Range { .. } => RecordKind::Range,
            TestKey::Pattern { .. } => RecordKind::Pattern,
        }
    }
}

impl fmt::Display for TestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestKey::Range { start, length } => {
                write!(f, "range[{start}..{}]", start + length)
            }
            TestKey::Pattern { label, digest } => {
                write!(f, "{label}:{}", &digest[..digest.len().min(12)])
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Range,
    Pattern,
}

impl RecordKind {
    fn as_str(self) -> &'static str {
        match self {
            RecordKind::Range => RANGE_KIND,
            RecordKind::Pattern => PATTERN_KIND,
        }
    }
}

/// One persisted classification, decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct TestRecord {
    pub id: i64,
    pub key: TestKey,
    pub description: Option<String>,
    pub length: usize,
    pub hex: String,
    pub result: ClassificationResult,
    pub created_at: String,
}

impl TestRecord {
    pub fn candidate(&self) -> Option<Candidate> {
        hex::decode(&self.hex).ok().map(Candidate::from)
    }
}

/// Classification counts over the whole store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreSummary {
    pub toxic: u64,
    pub safe: u64,
    pub maybe: u64,
}

impl StoreSummary {
    pub fn total(&self) -> u64 {
        self.toxic + self.safe + self.maybe
    }
}

pub struct ResultStore {
    conn: Connection,
}

impl ResultStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn lookup(&self, key: &TestKey) -> Result<Option<ClassificationResult>, StoreError> {
        let row = match key {
            TestKey::Range { start, length } => self
                .conn
                .query_row(
                    "SELECT id, successes, failures, classification FROM test_records
                     WHERE kind = ?1 AND start_pos = ?2 AND length = ?3",
                    params![RANGE_KIND, *start as i64, *length as i64],
                    counts_from_row,
                )
                .optional()?,
            TestKey::Pattern { label, digest } => self
                .conn
                .query_row(
                    "SELECT id, successes, failures, classification FROM test_records
                     WHERE kind = ?1 AND label = ?2 AND digest = ?3",
                    params![PATTERN_KIND, label, digest],
                    counts_from_row,
                )
                .optional()?,
        };
        row.map(|(id, s, f, c)| decode_result(id, s, f, &c)).transpose()
    }

    /// Upserts the classification of `candidate` under `key`, replacing any
    /// earlier record for the same key.
    pub fn record(
        &self,
        key: &TestKey,
        candidate: &Candidate,
        result: &ClassificationResult,
        description: Option<&str>,
    ) -> Result<(), StoreError> {
        let (label, start, end) = match key {
            TestKey::Range { start, length } => {
                (None, Some(*start as i64), Some((start + length) as i64))
            }
            TestKey::Pattern { label, .. } => (Some(label.as_str()), None, None),
        };
        let digest = match key {
            TestKey::Pattern { digest, .. } => digest.clone(),
            TestKey::Range { .. } => candidate.digest(),
        };
        self.conn.execute(
            "INSERT OR REPLACE INTO test_records
                (kind, label, description, start_pos, length, end_pos, digest, hex,
                 successes, failures, probability, classification)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                key.kind().as_str(),
                label,
                description,
                start,
                candidate.len() as i64,
                end,
                digest,
                candidate.to_hex(),
                result.successes,
                result.failures,
                result.probability(),
                result.classification.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Records of one kind, optionally restricted to one classification,
    /// shortest first.
    pub fn records(
        &self,
        kind: RecordKind,
        classification: Option<Classification>,
    ) -> Result<Vec<TestRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, label, description, start_pos, length, digest, hex,
                    successes, failures, classification, created_at
             FROM test_records
             WHERE kind = ?1 AND (?2 IS NULL OR classification = ?2)
             ORDER BY length, id",
        )?;
        let rows = stmt.query_map(
            params![kind.as_str(), classification.map(|c| c.as_str())],
            RawRecord::from_row,
        )?;
        let mut records = Vec::new();
        for raw in rows {
            records.push(raw?.decode()?);
        }
        Ok(records)
    }

    pub fn summary(&self) -> Result<StoreSummary, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT classification, COUNT(*) FROM test_records GROUP BY classification")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut summary = StoreSummary::default();
        for row in rows {
            let (classification, count) = row?;
            let count = count as u64;
            match classification.parse::<Classification>() {
                Ok(Classification::Toxic) => summary.toxic += count,
                Ok(Classification::Safe) => summary.safe += count,
                Ok(Classification::Maybe) => summary.maybe += count,
                Err(reason) => return Err(StoreError::Corrupt { id: 0, reason }),
            }
        }
        Ok(summary)
    }

    /// Shortest TOXIC record of any kind.
    pub fn smallest_toxic(&self) -> Result<Option<TestRecord>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, kind, label, description, start_pos, length, digest, hex,
                        successes, failures, classification, created_at
                 FROM test_records WHERE classification = 'TOXIC'
                 ORDER BY length, id LIMIT 1",
                [],
                RawRecord::from_row,
            )
            .optional()?
            .map(RawRecord::decode)
            .transpose()
    }
}

fn counts_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, u32, u32, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode_result(
    id: i64,
    successes: u32,
    failures: u32,
    classification: &str,
) -> Result<ClassificationResult, StoreError> {
    let stored: Classification = classification
        .parse()
        .map_err(|reason| StoreError::Corrupt { id, reason })?;
    let result = ClassificationResult::from_counts(successes, failures);
    if result.classification != stored {
        return Err(StoreError::Corrupt {
            id,
            reason: format!("classification {stored} disagrees with counts {successes}/{failures}"),
        });
    }
    Ok(result)
}

struct RawRecord {
    id: i64,
    kind: String,
    label: Option<String>,
    description: Option<String>,
    start: Option<i64>,
    length: i64,
    digest: String,
    hex: String,
    successes: u32,
    failures: u32,
    classification: String,
    created_at: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            label: row.get(2)?,
            description: row.get(3)?,
            start: row.get(4)?,
            length: row.get(5)?,
            digest: row.get(6)?,
            hex: row.get(7)?,
            successes: row.get(8)?,
            failures: row.get(9)?,
            classification: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    fn decode(self) -> Result<TestRecord, StoreError> {
        let corrupt = |reason: &str| StoreError::Corrupt {
            id: self.id,
            reason: reason.to_string(),
        };
        let length = usize::try_from(self.length).map_err(|_| corrupt("negative length"))?;
        let key = match self.kind.as_str() {
            RANGE_KIND => {
                let start = self
                    .start
                    .and_then(|s| usize::try_from(s).ok())
                    .ok_or_else(|| corrupt("range record without a start"))?;
                TestKey::Range { start, length }
            }
            PATTERN_KIND => TestKey::Pattern {
                label: self
                    .label
                    .clone()
                    .ok_or_else(|| corrupt("pattern record without a label"))?,
                digest: self.digest.clone(),
            },
            _ => return Err(corrupt("unknown record kind")),
        };
        let result = decode_result(self.id, self.successes, self.failures, &self.classification)?;
        Ok(TestRecord {
            id: self.id,
            key,
            description: self.description,
            length,
            hex: self.hex,
            result,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn toxic() -> ClassificationResult {
        ClassificationResult::from_counts(0, 3)
    }

    #[test]
    fn lookup_misses_then_hits_after_record() {
        let store = ResultStore::open_in_memory().unwrap();
        let key = TestKey::range(3, 8);
        assert_eq!(store.lookup(&key).unwrap(), None);

        store
            .record(&key, &Candidate::from(vec![0u8; 8]), &toxic(), None)
            .unwrap();
        assert_eq!(store.lookup(&key).unwrap(), Some(toxic()));
        assert_eq!(store.lookup(&TestKey::range(3, 7)).unwrap(), None);
    }

    #[test]
    fn record_is_an_idempotent_upsert() {
        let store = ResultStore::open_in_memory().unwrap();
        let candidate = Candidate::from(vec![1, 2, 3]);
        let key = TestKey::pattern("hill_climb", &candidate);

        store.record(&key, &candidate, &toxic(), Some("first")).unwrap();
        store.record(&key, &candidate, &toxic(), Some("first")).unwrap();
        let safe = ClassificationResult::from_counts(3, 0);
        store.record(&key, &candidate, &safe, Some("retest")).unwrap();

        assert_eq!(store.lookup(&key).unwrap(), Some(safe));
        let rows = store.records(RecordKind::Pattern, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description.as_deref(), Some("retest"));
        assert_eq!(rows[0].key, key);
    }

    #[test]
    fn pattern_keys_are_scoped_by_label() {
        let store = ResultStore::open_in_memory().unwrap();
        let candidate = Candidate::from(vec![9; 4]);
        store
            .record(&TestKey::pattern("brute", &candidate), &candidate, &toxic(), None)
            .unwrap();
        assert!(
            store
                .lookup(&TestKey::pattern("climb", &candidate))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn reporting_queries_decode_tagged_records() {
        let store = ResultStore::open_in_memory().unwrap();
        let long = Candidate::from(vec![0xaa; 10]);
        let short = Candidate::from(vec![0xbb; 2]);
        store.record(&TestKey::range(0, 10), &long, &toxic(), None).unwrap();
        store
            .record(&TestKey::pattern("length", &short), &short, &toxic(), Some("n=2"))
            .unwrap();
        store
            .record(
                &TestKey::range(0, 5),
                &Candidate::from(vec![0xaa; 5]),
                &ClassificationResult::from_counts(2, 1),
                None,
            )
            .unwrap();

        assert_eq!(
            store.summary().unwrap(),
            StoreSummary {
                toxic: 2,
                safe: 0,
                maybe: 1
            }
        );
        let smallest = store.smallest_toxic().unwrap().unwrap();
        assert_eq!(smallest.candidate(), Some(short));
        assert!(matches!(smallest.key, TestKey::Pattern { .. }));

        let ranges = store
            .records(RecordKind::Range, Some(Classification::Toxic))
            .unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].key, TestKey::range(0, 10));
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("results.db");
        {
            let store = ResultStore::open(&path).unwrap();
            store
                .record(&TestKey::range(1, 2), &Candidate::from(vec![1, 2]), &toxic(), None)
                .unwrap();
        }
        let store = ResultStore::open(&path).unwrap();
        assert_eq!(store.lookup(&TestKey::range(1, 2)).unwrap(), Some(toxic()));
    }
}
