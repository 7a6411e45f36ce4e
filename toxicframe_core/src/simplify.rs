use crate::candidate::Candidate;
use crate::classification::ClassificationResult;
use crate::context::RunContext;
use crate::error::SearchError;
use crate::probe::ProbeRequest;
use crate::store::TestKey;
use std::collections::HashSet;

pub const SIMPLIFY_LABEL: &str = "simplify";

/// Default cap on replacement rounds.
pub const DEFAULT_ROUNDS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Simplification {
    pub original: Candidate,
    pub simplified: Candidate,
    /// `(replaced, with)` byte pairs, in the order they were applied.
    pub steps: Vec<(u8, u8)>,
    pub confirmation: ClassificationResult,
    pub tested: usize,
}

/// Most frequent byte of `bytes`; ties go to the smaller value.
pub fn most_common_byte(bytes: &[u8]) -> Option<u8> {
    let mut counts = [0usize; 256];
    for &b in bytes {
        counts[b as usize] += 1;
    }
    (0..=255u8)
        .filter(|&b| counts[b as usize] > 0)
        .max_by(|&a, &b| counts[a as usize].cmp(&counts[b as usize]).then(b.cmp(&a)))
}

/// Distinct byte values in `bytes`, ascending.
pub fn distinct_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut seen = [false; 256];
    for &b in bytes {
        seen[b as usize] = true;
    }
    (0..=255u8).filter(|&b| seen[b as usize]).collect()
}

/// Reduces the alphabet of a toxic `pattern` by replacing every occurrence
/// of one byte value with the most common byte, keeping each replacement
/// that stays TOXIC.
///
/// Each round tries the other byte values in ascending order and applies
/// the first one that confirms; a round that applies nothing ends the
/// search. Returns `None` when `pattern` itself does not confirm as TOXIC.
pub fn simplify(
    ctx: &RunContext,
    pattern: &[u8],
    max_rounds: usize,
) -> Result<Option<Simplification>, SearchError> {
    let original = Candidate::from(pattern);
    let mut confirmation = ctx.confirm(&request(&original, "original"))?;
    if !confirmation.is_toxic() {
        tracing::info!(len = pattern.len(), result = %confirmation, "pattern is not toxic; nothing to simplify");
        return Ok(None);
    }

    let trials = ctx.settings().binary_search_trials;
    let mut current = pattern.to_vec();
    let mut tested: HashSet<Vec<u8>> = HashSet::from([current.clone()]);
    let mut steps = Vec::new();

    for round in 0..max_rounds {
        ctx.cancel_token().check()?;
        let Some(common) = most_common_byte(&current) else {
            break;
        };
        let mut applied = false;
        for byte in distinct_bytes(&current) {
            if byte == common {
                continue;
            }
            let replaced: Vec<u8> = current
                .iter()
                .map(|&b| if b == byte { common } else { b })
                .collect();
            if !tested.insert(replaced.clone()) {
                continue;
            }
            let candidate = Candidate::from(replaced.clone());
            let step = format!("round={} {byte:02x}->{common:02x}", round + 1);
            if !ctx.probe(&request(&candidate, &step), trials)?.is_toxic() {
                continue;
            }
            let confirmed = ctx.confirm(&request(&candidate, &step))?;
            if confirmed.is_toxic() {
                tracing::info!(
                    round = round + 1,
                    replaced = byte,
                    with = common,
                    distinct = distinct_bytes(&replaced).len(),
                    "simplified"
                );
                current = replaced;
                confirmation = confirmed;
                steps.push((byte, common));
                applied = true;
                break;
            }
        }
        if !applied {
            break;
        }
    }

    Ok(Some(Simplification {
        original,
        simplified: Candidate::from(current),
        steps,
        confirmation,
        tested: tested.len() - 1,
    }))
}

fn request(candidate: &Candidate, description: &str) -> ProbeRequest {
    ProbeRequest::new(TestKey::pattern(SIMPLIFY_LABEL, candidate), candidate.clone())
        .describe(description)
}
