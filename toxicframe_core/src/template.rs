use crate::candidate::Candidate;

/// Fixed context around the variable part of a candidate:
/// `prefix ‖ part × repeat ‖ suffix`.
///
/// Content searches mutate only the part; the template puts it back into
/// the frame that is actually probed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub prefix: Vec<u8>,
    pub repeat: usize,
    pub suffix: Vec<u8>,
}

impl Default for Template {
    fn default() -> Self {
        Self::identity()
    }
}

impl Template {
    /// The part is the whole candidate.
    pub fn identity() -> Self {
        Self {
            prefix: Vec::new(),
            repeat: 1,
            suffix: Vec::new(),
        }
    }

    /// Varies the suffix that follows `pattern × repeats`.
    pub fn suffix_after(pattern: &[u8], repeats: usize) -> Self {
        Self {
            prefix: pattern.repeat(repeats),
            repeat: 1,
            suffix: Vec::new(),
        }
    }

    /// Varies the repeated pattern in front of a fixed `suffix`.
    pub fn pattern_before(repeats: usize, suffix: &[u8]) -> Self {
        Self {
            prefix: Vec::new(),
            repeat: repeats.max(1),
            suffix: suffix.to_vec(),
        }
    }

    /// Repeats the part `n` times with nothing around it.
    pub fn repeated(n: usize) -> Self {
        Self {
            prefix: Vec::new(),
            repeat: n.max(1),
            suffix: Vec::new(),
        }
    }

    pub fn rendered_len(&self, part_len: usize) -> usize {
        self.prefix.len() + part_len * self.repeat + self.suffix.len()
    }

    pub fn render(&self, part: &[u8]) -> Candidate {
        let mut bytes = Vec::with_capacity(self.rendered_len(part.len()));
        bytes.extend_from_slice(&self.prefix);
        for _ in 0..self.repeat {
            bytes.extend_from_slice(part);
        }
        bytes.extend_from_slice(&self.suffix);
        Candidate::from(bytes)
    }
}
