use rand_core::RngCore;
use std::collections::HashSet;

/// Working set of confirmed-toxic parts that seed further mutation.
///
/// Entries are kept in discovery order and deduplicated by content, using
/// an MD5 fingerprint as the membership key. The frontier only grows: a
/// hill-climbing run catalogues variants, it never evicts one.
#[derive(Debug, Default, Clone)]
pub struct Frontier {
    entries: Vec<Vec<u8>>,
    known: HashSet<[u8; 16]>,
}

impl Frontier {
    /// Creates a new, empty `Frontier`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a frontier from seeds, dropping duplicates and empty seeds.
    pub fn from_seeds<I>(seeds: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut frontier = Self::new();
        for seed in seeds {
            frontier.insert(seed);
        }
        frontier
    }

    /// Adds `part` unless an identical entry exists. Returns `true` if added.
    pub fn insert(&mut self, part: Vec<u8>) -> bool {
        if part.is_empty() {
            return false;
        }
        if self.known.insert(md5::compute(&part).0) {
            self.entries.push(part);
            true
        } else {
            false
        }
    }

    /// Returns the entry at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.entries.get(index).map(Vec::as_slice)
    }

    /// Picks an entry uniformly at random.
    ///
    /// Returns `None` if the frontier is empty.
    pub fn random_select(&self, rng: &mut dyn RngCore) -> Option<(usize, &[u8])> {
        if self.entries.is_empty() {
            return None;
        }
        let index = rng.next_u64() as usize % self.entries.len();
        self.get(index).map(|part| (index, part))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.iter().map(Vec::as_slice)
    }

    pub fn into_parts(self) -> Vec<Vec<u8>> {
        self.entries
    }
}
