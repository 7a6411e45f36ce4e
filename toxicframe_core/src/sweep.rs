//! Fixed-grid measurements around a known toxic candidate.
//!
//! Unlike the boundary searches these do not narrow anything down. They
//! measure every point of a grid with the run's full trial count, so the
//! result shows how sharp a threshold is and whether position matters.

use crate::candidate::Candidate;
use crate::classification::{Classification, ClassificationResult};
use crate::context::RunContext;
use crate::error::SearchError;
use crate::probe::ProbeRequest;
use crate::store::TestKey;
use std::ops::RangeInclusive;

pub const LENGTH_HISTOGRAM_LABEL: &str = "length_histogram";
pub const EMBEDDED_LABEL: &str = "embedded";

/// Byte used around an embedded candidate unless told otherwise.
pub const DEFAULT_FILLER: u8 = 0x22;

/// Packet sizes an embedded scan covers by default.
pub const DEFAULT_PACKET_SIZES: [usize; 4] = [200, 300, 500, 794];

/// Verdict per run length of a single repeated byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthHistogram {
    pub byte: u8,
    pub rows: Vec<(usize, ClassificationResult)>,
}

impl LengthHistogram {
    pub fn lengths(&self, classification: Classification) -> Vec<usize> {
        self.rows
            .iter()
            .filter(|(_, r)| r.classification == classification)
            .map(|(n, _)| *n)
            .collect()
    }

    /// Smallest and largest length with `classification`.
    pub fn span(&self, classification: Classification) -> Option<(usize, usize)> {
        let lengths = self.lengths(classification);
        Some((*lengths.iter().min()?, *lengths.iter().max()?))
    }

    /// Largest SAFE length and smallest TOXIC length, when both were seen.
    pub fn transition(&self) -> Option<(usize, usize)> {
        let (_, safe) = self.span(Classification::Safe)?;
        let (toxic, _) = self.span(Classification::Toxic)?;
        Some((safe, toxic))
    }
}

/// Measures `byte × n` for every `n` in `lengths`.
pub fn length_histogram(
    ctx: &RunContext,
    byte: u8,
    lengths: RangeInclusive<usize>,
) -> Result<LengthHistogram, SearchError> {
    if *lengths.start() == 0 || lengths.is_empty() {
        return Err(SearchError::InvalidInput(format!(
            "histogram lengths {}..={} must be non-empty and start at 1 or more",
            lengths.start(),
            lengths.end()
        )));
    }
    let label = format!("{LENGTH_HISTOGRAM_LABEL}_{byte:02x}");
    let requests: Vec<ProbeRequest> = lengths
        .clone()
        .map(|n| {
            let candidate = Candidate::from(vec![byte; n]);
            ProbeRequest::new(TestKey::pattern(&label, &candidate), candidate)
                .describe(format!("n={n}"))
        })
        .collect();
    let results = ctx.probe_batch(&requests, ctx.settings().trials)?;

    let histogram = LengthHistogram {
        byte,
        rows: lengths.zip(results).collect(),
    };
    tracing::info!(
        byte,
        toxic = ?histogram.span(Classification::Toxic),
        safe = ?histogram.span(Classification::Safe),
        transition = ?histogram.transition(),
        "length histogram"
    );
    Ok(histogram)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedResult {
    pub packet_size: usize,
    pub offset: usize,
    pub result: ClassificationResult,
}

/// Offsets 0, 10, ... up to 100, plus the last three steps of 10 before the
/// end of a `packet_size` packet holding a `toxic_len`-byte candidate.
pub fn embedded_offsets(packet_size: usize, toxic_len: usize) -> Vec<usize> {
    let Some(max) = packet_size.checked_sub(toxic_len) else {
        return Vec::new();
    };
    let mut offsets: Vec<usize> = (0..=max.min(100)).step_by(10).collect();
    for tail in [max.checked_sub(20), max.checked_sub(10), Some(max)]
        .into_iter()
        .flatten()
    {
        if !offsets.contains(&tail) {
            offsets.push(tail);
        }
    }
    offsets.sort_unstable();
    offsets
}

/// `toxic` placed at `offset` inside `packet_size` bytes of `filler`.
pub fn embedded_candidate(toxic: &[u8], packet_size: usize, offset: usize, filler: u8) -> Candidate {
    let mut bytes = vec![filler; packet_size];
    bytes[offset..offset + toxic.len()].copy_from_slice(toxic);
    Candidate::from(bytes)
}

/// Measures `toxic` at every [`embedded_offsets`] position of every packet
/// size. Sizes too small to hold it are skipped.
pub fn embedded_scan(
    ctx: &RunContext,
    toxic: &[u8],
    packet_sizes: &[usize],
    filler: u8,
) -> Result<Vec<EmbeddedResult>, SearchError> {
    if toxic.is_empty() {
        return Err(SearchError::InvalidInput("embedded candidate is empty".to_string()));
    }
    let mut out = Vec::new();
    for &packet_size in packet_sizes {
        ctx.cancel_token().check()?;
        let offsets = embedded_offsets(packet_size, toxic.len());
        if offsets.is_empty() {
            tracing::warn!(packet_size, toxic_len = toxic.len(), "packet too small; skipped");
            continue;
        }
        let requests: Vec<ProbeRequest> = offsets
            .iter()
            .map(|&offset| {
                let candidate = embedded_candidate(toxic, packet_size, offset, filler);
                ProbeRequest::new(TestKey::pattern(EMBEDDED_LABEL, &candidate), candidate)
                    .describe(format!("size={packet_size} offset={offset}"))
            })
            .collect();
        let results = ctx.probe_batch(&requests, ctx.settings().trials)?;

        let toxic_at = offsets
            .iter()
            .zip(&results)
            .filter(|(_, r)| r.is_toxic())
            .count();
        tracing::info!(packet_size, positions = offsets.len(), toxic = toxic_at, "embedded scan");
        out.extend(offsets.into_iter().zip(results).map(|(offset, result)| EmbeddedResult {
            packet_size,
            offset,
            result,
        }));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::TrialAggregator;
    use crate::context::RunSettings;
    use crate::store::ResultStore;
    use crate::testing::PredicateOracle;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    fn context(oracle: Arc<PredicateOracle>) -> RunContext {
        RunContext::with_parts(
            TrialAggregator::new(oracle, Duration::from_millis(1)),
            ResultStore::open_in_memory().unwrap(),
            None,
            RunSettings {
                trials: 4,
                ..RunSettings::default()
            },
        )
    }

    #[test]
    fn histogram_shows_the_threshold() {
        // Lengths 118 and 119 drop every other frame, 120 and up drop them all.
        let sent = Mutex::new(HashMap::new());
        let oracle = Arc::new(PredicateOracle::with_outcomes(move |b, _| match b.len() {
            n if n >= 120 => false,
            n @ (118 | 119) => {
                let mut sent = sent.lock();
                let count = sent.entry(n).or_insert(0usize);
                *count += 1;
                *count % 2 == 0
            }
            _ => true,
        }));
        let ctx = context(oracle.clone());
        let histogram = length_histogram(&ctx, 0x4a, 110..=125).unwrap();

        assert_eq!(histogram.rows.len(), 16);
        assert!(histogram.rows.iter().all(|(_, r)| r.total() == 4));
        assert_eq!(histogram.span(Classification::Toxic), Some((120, 125)));
        assert_eq!(histogram.span(Classification::Safe), Some((110, 117)));
        assert_eq!(histogram.lengths(Classification::Maybe), vec![118, 119]);
        assert_eq!(histogram.transition(), Some((117, 120)));
        assert_eq!(oracle.calls(), 16 * 4);
    }

    #[test]
    fn histogram_rejects_zero_length() {
        let ctx = context(Arc::new(PredicateOracle::new(|_| true)));
        assert!(matches!(
            length_histogram(&ctx, 0, 0..=3),
            Err(SearchError::InvalidInput(_))
        ));
    }

    #[test]
    fn offsets_cover_the_start_and_the_tail() {
        assert_eq!(
            embedded_offsets(200, 120),
            vec![0, 10, 20, 30, 40, 50, 60, 70, 80]
        );
        assert_eq!(
            embedded_offsets(300, 120),
            vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100, 160, 170, 180]
        );
        assert_eq!(embedded_offsets(125, 120), vec![0, 5]);
        assert!(embedded_offsets(100, 120).is_empty());
    }

    #[test]
    fn embedded_scan_finds_position_dependence() {
        // Toxic only while the run of 0x4a starts within the first 40 bytes.
        let oracle = Arc::new(PredicateOracle::new(|b| {
            b.iter()
                .position(|&x| x == 0x4a)
                .is_some_and(|p| p <= 40 && b[p..].starts_with(&[0x4a; 8]))
        }));
        let ctx = context(oracle);
        let results = embedded_scan(&ctx, &[0x4a; 8], &[4, 60], DEFAULT_FILLER).unwrap();

        assert!(results.iter().all(|r| r.packet_size == 60));
        let toxic: Vec<usize> = results
            .iter()
            .filter(|r| r.result.is_toxic())
            .map(|r| r.offset)
            .collect();
        assert_eq!(toxic, vec![0, 10, 20, 30, 32, 40]);
        assert_eq!(
            embedded_candidate(&[1, 2], 6, 3, 0).as_bytes(),
            &[0, 0, 0, 1, 2, 0]
        );
    }
}
