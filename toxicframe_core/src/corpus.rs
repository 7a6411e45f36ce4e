use crate::candidate::Candidate;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while reading or slicing corpus data.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CorpusError {
    /// The requested slice does not lie inside the corpus, or is empty.
    #[error("Range [{start}, {start}+{length}) is outside the {size}-byte corpus")]
    OutOfBounds {
        start: usize,
        length: usize,
        size: usize,
    },

    /// The corpus or seed data does not have the expected shape.
    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    /// Reading corpus or seed files failed.
    #[error("Corpus I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CorpusError {
    fn from(err: std::io::Error) -> Self {
        CorpusError::Io(err.to_string())
    }
}

/// The fixed byte sequence that range searches slice into candidates.
///
/// A range record `(start, length)` is only meaningful relative to one
/// reference corpus, so the corpus is immutable once loaded.
#[derive(Debug, Clone)]
pub struct ReferenceCorpus {
    bytes: Arc<[u8]>,
}

impl ReferenceCorpus {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, CorpusError> {
        let bytes = fs::read(path)
            .map_err(|e| CorpusError::Io(format!("Failed to read corpus {path:?}: {e}")))?;
        if bytes.is_empty() {
            return Err(CorpusError::InvalidLayout(format!("corpus {path:?} is empty")));
        }
        Ok(Self::new(bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Candidate for `[start, start + length)`. Never truncates.
    pub fn slice(&self, start: usize, length: usize) -> Result<Candidate, CorpusError> {
        let end = start.checked_add(length);
        match end {
            Some(end) if length > 0 && end <= self.bytes.len() => {
                Ok(Candidate::from(&self.bytes[start..end]))
            }
            _ => Err(CorpusError::OutOfBounds {
                start,
                length,
                size: self.bytes.len(),
            }),
        }
    }
}

/// A sample split as `pattern × repeats ‖ suffix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternLayout {
    pub pattern: Vec<u8>,
    pub repeats: usize,
    pub suffix: Vec<u8>,
}

impl PatternLayout {
    /// Takes the first `pattern_len` bytes as the pattern, counts how many
    /// times it repeats back to back from the start, and keeps the rest as
    /// the suffix.
    pub fn analyze(data: &[u8], pattern_len: usize) -> Result<Self, CorpusError> {
        if pattern_len == 0 || pattern_len > data.len() {
            return Err(CorpusError::InvalidLayout(format!(
                "pattern length {pattern_len} does not fit a {}-byte sample",
                data.len()
            )));
        }
        let pattern = &data[..pattern_len];
        let repeats = data
            .chunks_exact(pattern_len)
            .take_while(|chunk| *chunk == pattern)
            .count();
        Ok(Self {
            pattern: pattern.to_vec(),
            repeats,
            suffix: data[repeats * pattern_len..].to_vec(),
        })
    }

    pub fn assemble(&self) -> Vec<u8> {
        let mut out = self.pattern.repeat(self.repeats);
        out.extend_from_slice(&self.suffix);
        out
    }

    pub fn len(&self) -> usize {
        self.pattern.len() * self.repeats + self.suffix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Loads raw seed files. A directory contributes every regular file directly
/// inside it; subdirectories are not traversed. Empty files are skipped.
pub fn load_seeds(paths: &[PathBuf]) -> Result<Vec<Candidate>, CorpusError> {
    let mut seeds = Vec::new();
    for path in paths {
        if path.is_file() {
            push_seed(&mut seeds, path)?;
        } else if path.is_dir() {
            let mut files: Vec<PathBuf> = fs::read_dir(path)
                .map_err(|e| CorpusError::Io(format!("Failed to read seed directory {path:?}: {e}")))?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<Result<_, _>>()?;
            files.sort();
            for file in files.iter().filter(|p| p.is_file()) {
                push_seed(&mut seeds, file)?;
            }
        } else {
            return Err(CorpusError::Io(format!("Seed path {path:?} does not exist")));
        }
    }
    Ok(seeds)
}

fn push_seed(seeds: &mut Vec<Candidate>, path: &Path) -> Result<(), CorpusError> {
    let bytes = fs::read(path)
        .map_err(|e| CorpusError::Io(format!("Failed to read seed file {path:?}: {e}")))?;
    if bytes.is_empty() {
        tracing::warn!(?path, "skipping empty seed file");
    } else {
        seeds.push(Candidate::from(bytes));
    }
    Ok(())
}
