use crate::candidate::Candidate;
use crate::classification::ClassificationResult;
use crate::context::RunContext;
use crate::corpus::PatternLayout;
use crate::error::SearchError;
use crate::probe::ProbeRequest;
use crate::store::TestKey;

pub const SUFFIX_LENGTH_LABEL: &str = "suffix_length";
pub const PATTERN_LENGTH_LABEL: &str = "pattern_length";
pub const SINGLE_BYTE_LABEL: &str = "single_byte_length";

/// Shortest toxic length found, with every toxic candidate seen on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthOutcome {
    pub length: usize,
    pub candidate: Candidate,
    /// Full-trial verdict for `candidate`.
    pub confirmation: ClassificationResult,
    pub toxic: Vec<(usize, Candidate)>,
}

/// Binary search for the smallest `n` in `[lo, hi]` whose candidate is
/// toxic, assuming toxicity is monotone non-decreasing in `n`.
///
/// `build(hi)` is confirmed with the run's full trial count before any
/// bisection; if it is not TOXIC the search returns `None` straight away.
/// The reported length is the shortest bisection hit that also survives
/// confirmation, falling back towards `hi` when a shorter hit was noise.
pub fn minimal_length(
    ctx: &RunContext,
    label: &str,
    lo: usize,
    hi: usize,
    build: impl Fn(usize) -> Candidate,
) -> Result<Option<LengthOutcome>, SearchError> {
    if lo == 0 || lo > hi {
        return Err(SearchError::InvalidInput(format!(
            "length range [{lo}, {hi}] is empty"
        )));
    }
    let request = |n: usize, candidate: &Candidate| {
        ProbeRequest::new(TestKey::pattern(label, candidate), candidate.clone())
            .describe(format!("n={n}"))
    };

    let top = build(hi);
    let top_result = ctx.confirm(&request(hi, &top))?;
    if !top_result.is_toxic() {
        tracing::info!(label, length = hi, result = %top_result, "upper length is not toxic");
        return Ok(None);
    }

    let trials = ctx.settings().binary_search_trials;
    let mut toxic = vec![(hi, top)];
    let (mut left, mut right) = (lo, hi - 1);
    while left <= right {
        let mid = left + (right - left) / 2;
        let candidate = build(mid);
        let result = ctx.probe(&request(mid, &candidate), trials)?;
        tracing::info!(label, length = mid, %result, "length probe");
        if result.is_toxic() {
            toxic.push((mid, candidate));
            right = mid - 1;
        } else {
            left = mid + 1;
        }
    }

    // Hits arrive in decreasing length; the last one is the shortest.
    let mut shortest = None;
    for (index, (length, candidate)) in toxic.iter().enumerate().rev() {
        let confirmation = if *length == hi {
            top_result
        } else {
            ctx.confirm(&request(*length, candidate))?
        };
        if confirmation.is_toxic() {
            shortest = Some((index, confirmation));
            break;
        }
        tracing::warn!(label, length = *length, result = %confirmation, "length hit did not confirm");
    }

    Ok(shortest.map(|(index, confirmation)| {
        let (length, candidate) = toxic[index].clone();
        LengthOutcome {
            length,
            candidate,
            confirmation,
            toxic,
        }
    }))
}

/// Shortest suffix prefix that keeps `pattern × repeats ‖ suffix[..n]` toxic.
pub fn suffix_length(
    ctx: &RunContext,
    layout: &PatternLayout,
) -> Result<Option<LengthOutcome>, SearchError> {
    if layout.suffix.is_empty() {
        return Err(SearchError::InvalidInput("layout has no suffix".to_string()));
    }
    let base = layout.pattern.repeat(layout.repeats);
    minimal_length(ctx, SUFFIX_LENGTH_LABEL, 1, layout.suffix.len(), |n| {
        let mut bytes = base.clone();
        bytes.extend_from_slice(&layout.suffix[..n]);
        Candidate::from(bytes)
    })
}

/// Repeat count that keeps `n`-byte patterns close to the original
/// repeated-pattern size.
pub fn rescaled_repeats(layout: &PatternLayout, n: usize) -> usize {
    ((layout.pattern.len() * layout.repeats) / n.max(1)).max(1)
}

/// Shortest pattern prefix that stays toxic when repeated in front of the
/// unchanged suffix, with the repeat count rescaled per length.
pub fn pattern_length(
    ctx: &RunContext,
    layout: &PatternLayout,
) -> Result<Option<LengthOutcome>, SearchError> {
    minimal_length(ctx, PATTERN_LENGTH_LABEL, 1, layout.pattern.len(), |n| {
        let mut bytes = layout.pattern[..n].repeat(rescaled_repeats(layout, n));
        bytes.extend_from_slice(&layout.suffix);
        Candidate::from(bytes)
    })
}

/// Shortest run of a single repeated `byte` that is toxic, up to `max_len`.
pub fn single_byte_length(
    ctx: &RunContext,
    byte: u8,
    max_len: usize,
) -> Result<Option<LengthOutcome>, SearchError> {
    let label = format!("{SINGLE_BYTE_LABEL}_{byte:02x}");
    minimal_length(ctx, &label, 1, max_len, |n| Candidate::from(vec![byte; n]))
}
