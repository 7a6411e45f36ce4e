use crate::candidate::Candidate;
use crate::classification::ClassificationResult;
use crate::error::SearchError;
use crate::oracle::Oracle;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Shared flag that aborts a run between trials.
///
/// Checked before every trial, so a cancelled run never produces a
/// classification built from fewer trials than requested.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), SearchError> {
        if self.is_cancelled() {
            Err(SearchError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// What to do with a MAYBE verdict before callers branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaybePolicy {
    /// Keep the MAYBE as measured.
    Accept,
    /// Measure once more with `trials` trials and keep that result instead.
    Retest { trials: u32 },
}

/// Turns single noisy trials into a [`ClassificationResult`].
pub struct TrialAggregator {
    oracle: Arc<dyn Oracle>,
    timeout: Duration,
    maybe_policy: MaybePolicy,
    cancel: CancelToken,
}

impl TrialAggregator {
    pub fn new(oracle: Arc<dyn Oracle>, timeout: Duration) -> Self {
        Self {
            oracle,
            timeout,
            maybe_policy: MaybePolicy::Accept,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_maybe_policy(mut self, policy: MaybePolicy) -> Self {
        self.maybe_policy = policy;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn oracle(&self) -> &Arc<dyn Oracle> {
        &self.oracle
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Runs `trials` sequential trials against `candidate`.
    pub fn classify(
        &self,
        candidate: &Candidate,
        trials: u32,
    ) -> Result<ClassificationResult, SearchError> {
        let first = self.measure(candidate, trials)?;
        self.resolve_maybe(candidate, trials, first)
    }

    /// Classifies every candidate with `trials` rounds of batched trials.
    ///
    /// Each round is one `trial_batch` over the whole slice, so the wait cost
    /// is paid once per round rather than once per candidate.
    pub fn classify_batch(
        &self,
        candidates: &[Candidate],
        trials: u32,
    ) -> Result<Vec<ClassificationResult>, SearchError> {
        check_trials(trials)?;
        let mut successes = vec![0u32; candidates.len()];
        for _ in 0..trials {
            self.cancel.check()?;
            let arrived = self.oracle.trial_batch(candidates, self.timeout)?;
            for (count, arrived) in successes.iter_mut().zip(arrived) {
                *count += u32::from(arrived);
            }
        }
        self.cancel.check()?;

        candidates
            .iter()
            .zip(successes)
            .map(|(candidate, s)| {
                let result = ClassificationResult::from_counts(s, trials - s);
                self.resolve_maybe(candidate, trials, result)
            })
            .collect()
    }

    fn measure(
        &self,
        candidate: &Candidate,
        trials: u32,
    ) -> Result<ClassificationResult, SearchError> {
        check_trials(trials)?;
        let mut successes = 0;
        for _ in 0..trials {
            self.cancel.check()?;
            if self.oracle.trial(candidate, self.timeout)? {
                successes += 1;
            }
        }
        Ok(ClassificationResult::from_counts(successes, trials - successes))
    }

    fn resolve_maybe(
        &self,
        candidate: &Candidate,
        trials: u32,
        result: ClassificationResult,
    ) -> Result<ClassificationResult, SearchError> {
        if !result.is_maybe() {
            return Ok(result);
        }
        match self.maybe_policy {
            MaybePolicy::Retest { trials: retest } if retest > trials => {
                tracing::info!(
                    candidate = %candidate.preview(16),
                    first = %result,
                    retest,
                    "ambiguous result, retesting"
                );
                let escalated = self.measure(candidate, retest)?;
                if escalated.is_maybe() {
                    tracing::warn!(candidate = %candidate.preview(16), result = %escalated, "result stays ambiguous");
                }
                Ok(escalated)
            }
            _ => {
                tracing::warn!(candidate = %candidate.preview(16), %result, "ambiguous result");
                Ok(result)
            }
        }
    }
}

fn check_trials(trials: u32) -> Result<(), SearchError> {
    if trials == 0 {
        return Err(SearchError::InvalidInput(
            "trial count must be at least 1".to_string(),
        ));
    }
    Ok(())
}
