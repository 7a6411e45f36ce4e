//! Boundary search for the smallest toxic slice of a reference corpus.
//!
//! Three binary searches over inclusive ranges `[start, end]`:
//! 1. the minimal end `E` with `[0, E]` toxic,
//! 2. the maximal start `S` with `[S, E]` toxic,
//! 3. the minimal end again, from `S`, since moving the start can shrink it.
//!
//! Each probe branches towards "toxic" only on a TOXIC verdict. MAYBE takes
//! the not-toxic branch but is still recorded. The full corpus and the final
//! range are measured with the run's full trial count; the steps in between
//! use the cheaper binary-search count.

use crate::classification::ClassificationResult;
use crate::context::RunContext;
use crate::corpus::ReferenceCorpus;
use crate::error::SearchError;
use crate::probe::ProbeRequest;
use crate::store::TestKey;

/// Smallest toxic slice found, as an inclusive `[start, end]` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeOutcome {
    pub start: usize,
    pub end: usize,
    /// Full-trial verdict for the final slice.
    pub confirmation: ClassificationResult,
}

impl RangeOutcome {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

pub struct RangeBoundarySearch<'a> {
    ctx: &'a RunContext,
    corpus: &'a ReferenceCorpus,
    trials: u32,
}

impl<'a> RangeBoundarySearch<'a> {
    pub fn new(ctx: &'a RunContext, corpus: &'a ReferenceCorpus) -> Self {
        Self {
            ctx,
            corpus,
            trials: ctx.settings().binary_search_trials,
        }
    }

    pub fn with_trials(mut self, trials: u32) -> Self {
        self.trials = trials;
        self
    }

    /// Returns `None` if the whole corpus is not toxic, since the boundary
    /// searches assume it is.
    pub fn run(&self) -> Result<Option<RangeOutcome>, SearchError> {
        if self.corpus.is_empty() {
            return Err(SearchError::InvalidInput("reference corpus is empty".to_string()));
        }
        let last = self.corpus.len() - 1;

        let full = self.ctx.confirm(&self.request(0, last)?)?;
        if !full.is_toxic() {
            tracing::info!(len = self.corpus.len(), result = %full, "full corpus is not toxic; nothing to narrow");
            return Ok(None);
        }

        let end = self.minimal_end(0, last)?;
        tracing::info!(end, "phase 1: minimal end from 0");
        let start = self.maximal_start(end)?;
        tracing::info!(start, "phase 2: maximal start");
        let end = self.minimal_end(start, end)?;
        tracing::info!(start, end, len = end - start + 1, "phase 3: minimal end from start");

        let confirmation = self.ctx.confirm(&self.request(start, end)?)?;
        if !confirmation.is_toxic() {
            tracing::warn!(start, end, result = %confirmation, "narrowed range did not confirm");
        }
        Ok(Some(RangeOutcome {
            start,
            end,
            confirmation,
        }))
    }

    /// Smallest `e` in `[start, upper]` with `[start, e]` toxic, given that
    /// `[start, upper]` is.
    fn minimal_end(&self, start: usize, upper: usize) -> Result<usize, SearchError> {
        let (mut left, mut right) = (start, upper);
        let mut best = upper;
        while left <= right {
            let mid = left + (right - left) / 2;
            if self.is_toxic(start, mid)? {
                best = mid;
                if mid == start {
                    break;
                }
                right = mid - 1;
            } else {
                left = mid + 1;
            }
        }
        Ok(best)
    }

    /// Largest `s` in `[0, end]` with `[s, end]` toxic, given that `[0, end]` is.
    fn maximal_start(&self, end: usize) -> Result<usize, SearchError> {
        let (mut left, mut right) = (0, end);
        let mut best = 0;
        while left <= right {
            let mid = left + (right - left) / 2;
            if self.is_toxic(mid, end)? {
                best = mid;
                left = mid + 1;
            } else {
                if mid == 0 {
                    break;
                }
                right = mid - 1;
            }
        }
        Ok(best)
    }

    fn request(&self, start: usize, end: usize) -> Result<ProbeRequest, SearchError> {
        let length = end - start + 1;
        let candidate = self.corpus.slice(start, length)?;
        Ok(ProbeRequest::new(TestKey::range(start, length), candidate)
            .describe(format!("bytes {start}..={end}")))
    }

    fn is_toxic(&self, start: usize, end: usize) -> Result<bool, SearchError> {
        let request = self.request(start, end)?;
        Ok(self.ctx.probe(&request, self.trials)?.is_toxic())
    }
}
