use rand::seq::index;
use rand_core::RngCore;

/// Number of distinct values a byte can take.
const BYTE_VALUES: usize = 256;

/// Default number of replacement values tried per position.
pub const DEFAULT_SAMPLES_PER_POSITION: usize = 10;

/// A `Mutator` proposes the neighbours of a toxic part that the hill
/// climber tests next.
///
/// Every neighbour differs from `part`; deduplication against parts already
/// tested is left to the caller.
pub trait Mutator: Send {
    /// Short identifier used in logs and record descriptions.
    fn name(&self) -> &'static str;

    /// Generates the neighbours of `part`.
    ///
    /// # Arguments
    /// * `part`: The part to mutate. An empty part has no neighbours.
    /// * `rng`: Random source for mutators that sample.
    fn neighbours(&mut self, part: &[u8], rng: &mut dyn RngCore) -> Vec<Vec<u8>>;
}

/// Single-byte substitutions with a bounded random sample of replacement
/// values per position, instead of all 255 alternatives.
///
/// This bounds one iteration to `part.len() * samples_per_position`
/// neighbours.
#[derive(Debug, Clone, Copy)]
pub struct SampledSubstitutionMutator {
    samples_per_position: usize,
}

impl SampledSubstitutionMutator {
    pub fn new(samples_per_position: usize) -> Self {
        Self {
            samples_per_position: samples_per_position.clamp(1, BYTE_VALUES),
        }
    }
}

impl Default for SampledSubstitutionMutator {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLES_PER_POSITION)
    }
}

impl Mutator for SampledSubstitutionMutator {
    fn name(&self) -> &'static str {
        "substitute"
    }

    fn neighbours(&mut self, part: &[u8], rng: &mut dyn RngCore) -> Vec<Vec<u8>> {
        let mut out = Vec::with_capacity(part.len() * self.samples_per_position);
        for position in 0..part.len() {
            for value in index::sample(rng, BYTE_VALUES, self.samples_per_position) {
                let value = value as u8;
                if value == part[position] {
                    continue;
                }
                let mut neighbour = part.to_vec();
                neighbour[position] = value;
                out.push(neighbour);
            }
        }
        out
    }
}

/// Every single-bit flip of the part, in position order.
#[derive(Debug, Default, Clone, Copy)]
pub struct BitFlipMutator;

impl Mutator for BitFlipMutator {
    fn name(&self) -> &'static str {
        "bitflip"
    }

    fn neighbours(&mut self, part: &[u8], _rng: &mut dyn RngCore) -> Vec<Vec<u8>> {
        let mut out = Vec::with_capacity(part.len() * 8);
        for position in 0..part.len() {
            for bit in 0..8 {
                let mut neighbour = part.to_vec();
                neighbour[position] ^= 1 << bit;
                out.push(neighbour);
            }
        }
        out
    }
}
