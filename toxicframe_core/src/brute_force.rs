//! Exhaustive enumeration of small parts, dispatched in batches.
//!
//! Both enumerators are lazy, so a 256^k space is never materialised. An
//! interrupted scan resumes for free: every finished probe is in the store,
//! and re-enumerating only costs lookups.

use crate::candidate::Candidate;
use crate::classification::ClassificationResult;
use crate::context::RunContext;
use crate::error::SearchError;
use crate::probe::ProbeRequest;
use crate::store::TestKey;
use crate::template::Template;

/// Every byte string of a fixed length, in lexicographic order.
#[derive(Debug, Clone)]
pub struct CrossProduct {
    next: Option<Vec<u8>>,
}

impl CrossProduct {
    pub fn new(length: usize) -> Self {
        Self {
            next: (length > 0).then(|| vec![0u8; length]),
        }
    }

    /// Size of the space, saturating at `u128::MAX`.
    pub fn space(length: usize) -> u128 {
        256u128.checked_pow(length as u32).unwrap_or(u128::MAX)
    }
}

impl Iterator for CrossProduct {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        let current = self.next.take()?;
        let mut following = current.clone();
        for digit in following.iter_mut().rev() {
            let (value, overflow) = digit.overflowing_add(1);
            *digit = value;
            if !overflow {
                self.next = Some(following);
                break;
            }
        }
        Some(current)
    }
}

/// Every variant of `seed` that differs from it in exactly `distance`
/// positions. Each chosen position takes each of its 255 other values.
#[derive(Debug, Clone)]
pub struct EditVariants {
    seed: Vec<u8>,
    positions: Vec<usize>,
    digits: Vec<u8>,
    done: bool,
}

impl EditVariants {
    pub fn new(seed: &[u8], distance: usize) -> Result<Self, SearchError> {
        if distance == 0 || distance > seed.len() {
            return Err(SearchError::InvalidInput(format!(
                "edit distance {distance} is outside 1..={}",
                seed.len()
            )));
        }
        Ok(Self {
            seed: seed.to_vec(),
            positions: (0..distance).collect(),
            digits: vec![0; distance],
            done: false,
        })
    }

    /// `C(len, distance) × 255^distance`, saturating. Zero when `distance`
    /// exceeds `len`.
    pub fn space(len: usize, distance: usize) -> u128 {
        let mut combinations: u128 = 1;
        for i in 0..distance {
            let Some(remaining) = len.checked_sub(i) else {
                return 0;
            };
            combinations = combinations.saturating_mul(remaining as u128) / (i as u128 + 1);
        }
        combinations.saturating_mul(255u128.checked_pow(distance as u32).unwrap_or(u128::MAX))
    }

    fn render(&self) -> Vec<u8> {
        let mut variant = self.seed.clone();
        for (&position, &digit) in self.positions.iter().zip(&self.digits) {
            let original = self.seed[position];
            // Digits 0..=254 map onto the 255 values other than `original`.
            variant[position] = if digit < original { digit } else { digit + 1 };
        }
        variant
    }

    fn advance_digits(&mut self) -> bool {
        for digit in self.digits.iter_mut().rev() {
            if *digit < 254 {
                *digit += 1;
                return true;
            }
            *digit = 0;
        }
        false
    }

    fn advance_positions(&mut self) -> bool {
        let k = self.positions.len();
        let n = self.seed.len();
        for i in (0..k).rev() {
            if self.positions[i] < n - k + i {
                self.positions[i] += 1;
                for j in i + 1..k {
                    self.positions[j] = self.positions[j - 1] + 1;
                }
                return true;
            }
        }
        false
    }
}

impl Iterator for EditVariants {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        if self.done {
            return None;
        }
        let variant = self.render();
        if !self.advance_digits() && !self.advance_positions() {
            self.done = true;
        }
        Some(variant)
    }
}

/// Label prefix of 2-byte sweeps; the packet size completes it.
pub const TWO_BYTE_LABEL: &str = "two_byte_pattern";

/// A toxic candidate reported by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub part: Vec<u8>,
    pub candidate: Candidate,
    /// Full-trial verdict that made this a finding.
    pub result: ClassificationResult,
}

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub tested: usize,
    pub toxic: Vec<Finding>,
    pub maybe: usize,
    /// Batch hits that did not survive confirmation.
    pub unconfirmed: usize,
}

pub struct BruteForceEnumerator<'a> {
    ctx: &'a RunContext,
    template: Template,
    label: String,
    trials: u32,
}

impl<'a> BruteForceEnumerator<'a> {
    pub fn new(ctx: &'a RunContext, label: impl Into<String>, template: Template) -> Self {
        Self {
            ctx,
            template,
            label: label.into(),
            trials: ctx.settings().batch_trials,
        }
    }

    pub fn with_trials(mut self, trials: u32) -> Self {
        self.trials = trials;
        self
    }

    /// Probes every part from `parts`, rendered through the template, in
    /// batches of the run's batch size. Every TOXIC batch result is confirmed
    /// with the run's full trial count, and `on_toxic` sees each confirmed
    /// finding as soon as its batch resolves.
    pub fn scan(
        &self,
        parts: impl IntoIterator<Item = Vec<u8>>,
        on_toxic: impl FnMut(&Finding),
    ) -> Result<ScanReport, SearchError> {
        self.scan_rendered(parts, |part| self.template.render(part), on_toxic)
    }

    fn scan_rendered(
        &self,
        parts: impl IntoIterator<Item = Vec<u8>>,
        render: impl Fn(&[u8]) -> Candidate,
        mut on_toxic: impl FnMut(&Finding),
    ) -> Result<ScanReport, SearchError> {
        let batch_size = self.ctx.settings().batch_size.max(1);
        let mut report = ScanReport::default();
        let mut parts = parts.into_iter().peekable();

        while parts.peek().is_some() {
            self.ctx.cancel_token().check()?;
            let batch: Vec<Vec<u8>> = parts.by_ref().take(batch_size).collect();
            let requests: Vec<ProbeRequest> = batch
                .iter()
                .map(|part| {
                    let candidate = render(part.as_slice());
                    ProbeRequest::new(TestKey::pattern(&self.label, &candidate), candidate)
                        .describe(format!("part={}", hex::encode(part)))
                })
                .collect();

            let results = self.ctx.probe_batch(&requests, self.trials)?;
            report.tested += batch.len();
            for ((part, request), result) in batch.into_iter().zip(requests).zip(results) {
                if result.is_toxic() {
                    let confirmation = self.ctx.confirm(&request)?;
                    if !confirmation.is_toxic() {
                        tracing::debug!(label = %self.label, part = %hex::encode(&part), %confirmation, "hit did not confirm");
                        report.unconfirmed += 1;
                        continue;
                    }
                    let finding = Finding {
                        part,
                        candidate: request.candidate,
                        result: confirmation,
                    };
                    tracing::info!(label = %self.label, part = %hex::encode(&finding.part), "toxic candidate");
                    on_toxic(&finding);
                    report.toxic.push(finding);
                } else if result.is_maybe() {
                    report.maybe += 1;
                }
            }
        }
        tracing::info!(
            label = %self.label,
            tested = report.tested,
            toxic = report.toxic.len(),
            unconfirmed = report.unconfirmed,
            "scan finished"
        );
        Ok(report)
    }
}

/// `part` repeated to fill `packet_size` bytes; an odd size ends with the
/// part's first byte.
pub fn two_byte_candidate(part: &[u8], packet_size: usize) -> Candidate {
    let mut bytes = part.repeat(packet_size / 2);
    if packet_size % 2 == 1 {
        bytes.extend(part.first());
    }
    Candidate::from(bytes)
}

/// Sweeps every 2-byte pattern from `first` to `last` inclusive, each
/// repeated to fill a `packet_size`-byte candidate.
pub fn two_byte_sweep(
    ctx: &RunContext,
    packet_size: usize,
    first: u16,
    last: u16,
    on_toxic: impl FnMut(&Finding),
) -> Result<ScanReport, SearchError> {
    if packet_size < 2 || first > last {
        return Err(SearchError::InvalidInput(format!(
            "2-byte sweep needs at least 2 bytes and first <= last, got {packet_size} bytes and {first:#06x}..={last:#06x}"
        )));
    }
    let label = format!("{TWO_BYTE_LABEL}_{packet_size}");
    let parts = (first..=last).map(|pattern| pattern.to_be_bytes().to_vec());
    BruteForceEnumerator::new(ctx, label, Template::identity()).scan_rendered(
        parts,
        |part| two_byte_candidate(part, packet_size),
        on_toxic,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::TrialAggregator;
    use crate::context::RunSettings;
    use crate::safe_cache::SafeCache;
    use crate::store::ResultStore;
    use crate::testing::PredicateOracle;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    fn context(oracle: Arc<PredicateOracle>, store: ResultStore) -> RunContext {
        RunContext::with_parts(
            TrialAggregator::new(oracle, Duration::from_millis(1)),
            store,
            Some(SafeCache::open_in_memory(0).unwrap()),
            RunSettings {
                batch_size: 64,
                ..RunSettings::default()
            },
        )
    }

    #[test]
    fn cross_product_enumerates_in_order() {
        let all: Vec<Vec<u8>> = CrossProduct::new(2).collect();
        assert_eq!(all.len(), 65536);
        assert_eq!(all[0], vec![0, 0]);
        assert_eq!(all[1], vec![0, 1]);
        assert_eq!(all[256], vec![1, 0]);
        assert_eq!(all[65535], vec![255, 255]);
        assert_eq!(CrossProduct::new(0).count(), 0);
        assert_eq!(CrossProduct::space(3), 16_777_216);
    }

    #[test]
    fn edit_variants_are_distinct_and_exact() {
        let seed = [1u8, 2, 3];
        let variants: Vec<Vec<u8>> = EditVariants::new(&seed, 2).unwrap().collect();
        assert_eq!(variants.len() as u128, EditVariants::space(3, 2));
        assert_eq!(variants.len(), 3 * 255 * 255);
        let unique: HashSet<&Vec<u8>> = variants.iter().collect();
        assert_eq!(unique.len(), variants.len());
        for v in &variants {
            assert_eq!(v.iter().zip(&seed).filter(|(a, b)| a != b).count(), 2);
        }
        assert!(EditVariants::new(&seed, 0).is_err());
        assert!(EditVariants::new(&seed, 4).is_err());
    }

    #[test]
    fn edit_space_is_empty_past_the_seed_length() {
        assert_eq!(EditVariants::space(2, 2), 255 * 255);
        assert_eq!(EditVariants::space(2, 3), 0);
        assert_eq!(EditVariants::space(2, 4), 0);
        assert_eq!(EditVariants::space(0, 7), 0);
    }

    #[test]
    fn flaky_batch_hits_are_dropped_by_confirmation() {
        // Each candidate loses only its very first frame.
        let seen = Arc::new(Mutex::new(HashSet::new()));
        let oracle = Arc::new(PredicateOracle::with_outcomes(move |b, _| {
            !seen.lock().insert(b.to_vec())
        }));
        let ctx = context(oracle, ResultStore::open_in_memory().unwrap());
        let scan = BruteForceEnumerator::new(&ctx, "flaky", Template::identity());

        let mut surfaced = 0;
        let report = scan.scan(CrossProduct::new(1).take(8), |_| surfaced += 1).unwrap();
        assert_eq!(report.tested, 8);
        assert_eq!(report.unconfirmed, 8);
        assert!(report.toxic.is_empty());
        assert_eq!(surfaced, 0);
    }

    #[test]
    fn two_byte_sweep_fills_the_packet() {
        assert_eq!(two_byte_candidate(&[0xab, 0xcd], 5).as_bytes(), &[0xab, 0xcd, 0xab, 0xcd, 0xab]);

        let oracle = Arc::new(PredicateOracle::new(|b| b.len() == 9 && b.starts_with(&[0x4a, 0x07])));
        let ctx = context(oracle.clone(), ResultStore::open_in_memory().unwrap());
        let report = two_byte_sweep(&ctx, 9, 0x4a00, 0x4aff, |_| {}).unwrap();
        assert_eq!(report.tested, 256);
        assert_eq!(report.toxic.len(), 1);
        assert_eq!(report.toxic[0].part, vec![0x4a, 0x07]);
        assert_eq!(report.toxic[0].candidate.len(), 9);

        assert!(matches!(
            two_byte_sweep(&ctx, 1, 0, 1, |_| {}),
            Err(SearchError::InvalidInput(_))
        ));
    }

    #[test]
    fn scan_surfaces_toxic_parts_immediately() {
        let oracle = Arc::new(PredicateOracle::new(|b| b.ends_with(&[0x4a])));
        let ctx = context(oracle.clone(), ResultStore::open_in_memory().unwrap());
        let scan = BruteForceEnumerator::new(&ctx, "brute_suffix", Template::suffix_after(b"PP", 2));

        let mut surfaced = Vec::new();
        let report = scan
            .scan(CrossProduct::new(1), |f| surfaced.push(f.part.clone()))
            .unwrap();

        assert_eq!(report.tested, 256);
        assert_eq!(surfaced, vec![vec![0x4a]]);
        assert_eq!(report.toxic[0].candidate.as_bytes(), b"PPPP\x4a");
        assert_eq!(report.toxic[0].result.total(), 10);
        // One batch trial each, plus a 10-trial confirmation of the hit.
        assert_eq!(oracle.calls(), 256 + 10);
        assert_eq!(ctx.cache().unwrap().stats().unwrap().memory, 255);
    }

    #[test]
    fn interrupted_scan_resumes_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.db");
        let is_toxic = |b: &[u8]| b[0] == 0x10 && b[1] > 0xf0;

        let first = Arc::new(PredicateOracle::new(is_toxic));
        let ctx = context(first.clone(), ResultStore::open(&path).unwrap());
        let scan = BruteForceEnumerator::new(&ctx, "brute", Template::identity());
        scan.scan(CrossProduct::new(2).take(1000), |_| {}).unwrap();
        drop(ctx);

        let second = Arc::new(PredicateOracle::new(is_toxic));
        let ctx = context(second.clone(), ResultStore::open(&path).unwrap());
        let scan = BruteForceEnumerator::new(&ctx, "brute", Template::identity());
        let report = scan.scan(CrossProduct::new(2).take(5000), |_| {}).unwrap();

        assert_eq!(second.calls(), 4000 + 15 * 10);
        assert_eq!(report.toxic.len(), 15);
    }

    #[test]
    fn cancelled_scan_stops_before_next_batch() {
        let oracle = Arc::new(PredicateOracle::new(|_| false));
        let ctx = context(oracle.clone(), ResultStore::open_in_memory().unwrap());
        ctx.cancel_token().cancel();
        let scan = BruteForceEnumerator::new(&ctx, "brute", Template::identity());
        assert!(matches!(
            scan.scan(CrossProduct::new(1), |_| {}),
            Err(SearchError::Cancelled)
        ));
        assert_eq!(oracle.calls(), 0);
    }
}
