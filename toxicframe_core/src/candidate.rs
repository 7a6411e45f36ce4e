use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Hex-encoded SHA-256 of `bytes`, used as the content address of a candidate.
pub fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// An immutable byte sequence under test.
///
/// Identity is the content: two candidates with the same bytes are equal and
/// share the same digest. Cloning is cheap, the bytes live behind an `Arc`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    bytes: Arc<[u8]>,
}

impl Candidate {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn digest(&self) -> String {
        content_digest(&self.bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Short hex rendering for log lines: at most `max_bytes` bytes, then `...`.
    pub fn preview(&self, max_bytes: usize) -> String {
        if self.bytes.len() <= max_bytes {
            self.to_hex()
        } else {
            format!("{}...", hex::encode(&self.bytes[..max_bytes]))
        }
    }
}

impl From<Vec<u8>> for Candidate {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for Candidate {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Candidate({} bytes, {})", self.len(), self.preview(16))
    }
}
