use crate::batch::{BatchDispatcher, BatchSettings, wait_for_arrivals};
use crate::candidate::Candidate;
use crate::capture::ArrivalTable;
use crate::frame::FrameLayout;
use crate::injector::Injector;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Empty candidates cannot be probed")]
    EmptyCandidate,
    #[error("Candidate of {len} bytes exceeds the {max}-byte frame payload budget")]
    Oversized { len: usize, max: usize },
    #[error("Failed to start injection workers: {0}")]
    Dispatch(#[from] io::Error),
}

/// An `Oracle` answers one question per trial: did a frame carrying this
/// candidate make it through the device under test?
///
/// A single trial is noisy. Callers that need a verdict go through the
/// [`TrialAggregator`](crate::aggregator::TrialAggregator), which repeats
/// trials and classifies the outcome.
pub trait Oracle: Send + Sync {
    /// Runs one trial and returns `true` if the candidate arrived before `timeout`.
    ///
    /// A failed injection is reported as a lost frame, not as an error.
    /// Errors are reserved for candidates that must never be transmitted.
    fn trial(&self, candidate: &Candidate, timeout: Duration) -> Result<bool, OracleError>;

    /// Runs one trial for each candidate. The result at index `i` belongs to
    /// `candidates[i]`.
    ///
    /// The default runs the trials one after another. Implementations with a
    /// real measurement channel override this with a concurrent dispatch and a
    /// single shared wait.
    fn trial_batch(
        &self,
        candidates: &[Candidate],
        timeout: Duration,
    ) -> Result<Vec<bool>, OracleError> {
        candidates.iter().map(|c| self.trial(c, timeout)).collect()
    }

    /// Largest candidate this oracle can transmit, if bounded.
    fn max_candidate_len(&self) -> Option<usize> {
        None
    }
}

impl<O: Oracle + ?Sized> Oracle for Arc<O> {
    fn trial(&self, candidate: &Candidate, timeout: Duration) -> Result<bool, OracleError> {
        (**self).trial(candidate, timeout)
    }

    fn trial_batch(
        &self,
        candidates: &[Candidate],
        timeout: Duration,
    ) -> Result<Vec<bool>, OracleError> {
        (**self).trial_batch(candidates, timeout)
    }

    fn max_candidate_len(&self) -> Option<usize> {
        (**self).max_candidate_len()
    }
}

/// Rejects candidates that could not be carried by one frame.
pub fn validate_candidate(candidate: &Candidate, max_len: usize) -> Result<(), OracleError> {
    if candidate.is_empty() {
        return Err(OracleError::EmptyCandidate);
    }
    if candidate.len() > max_len {
        return Err(OracleError::Oversized {
            len: candidate.len(),
            max: max_len,
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct OracleSettings {
    /// Delay between two reads of the arrival table while waiting.
    pub poll_interval: Duration,
    /// Copies of each frame the injector is asked to send.
    pub repeat: u32,
    pub batch: BatchSettings,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_micros(200),
            repeat: 1,
            batch: BatchSettings::default(),
        }
    }
}

/// Correlates injected frames with captured ones through a sequence number
/// prefixed to every candidate.
///
/// The oracle never reads the capture resource itself. It only polls the
/// [`ArrivalTable`] filled by the [`CaptureLoop`](crate::capture::CaptureLoop),
/// which is why sequential trials and batches can share one capture.
pub struct CorrelationOracle<I: Injector> {
    injector: Arc<I>,
    arrivals: Arc<ArrivalTable>,
    layout: FrameLayout,
    settings: OracleSettings,
    next_sequence: AtomicU32,
}

impl<I: Injector> CorrelationOracle<I> {
    pub fn new(
        injector: Arc<I>,
        arrivals: Arc<ArrivalTable>,
        layout: FrameLayout,
        settings: OracleSettings,
    ) -> Self {
        Self {
            injector,
            arrivals,
            layout,
            settings,
            next_sequence: AtomicU32::new(1),
        }
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    pub fn injector(&self) -> &Arc<I> {
        &self.injector
    }

    /// Reserves `n` consecutive sequence numbers. Wraps at `u32::MAX`.
    fn reserve_sequences(&self, n: usize) -> Vec<u32> {
        let first = self.next_sequence.fetch_add(n as u32, Ordering::Relaxed);
        (0..n as u32).map(|i| first.wrapping_add(i)).collect()
    }
}

impl<I: Injector> Oracle for CorrelationOracle<I> {
    fn trial(&self, candidate: &Candidate, timeout: Duration) -> Result<bool, OracleError> {
        validate_candidate(candidate, self.layout.max_candidate_len())?;

        self.arrivals.clear();
        let sequence = self.reserve_sequences(1)[0];
        let frame = self.layout.build(sequence, candidate.as_bytes());

        if let Err(e) = self.injector.send_raw(&frame, self.settings.repeat) {
            tracing::warn!(sequence, error = %e, "injection failed; counting trial as lost");
            return Ok(false);
        }

        let deadline = Instant::now() + timeout;
        let arrived = wait_for_arrivals(
            &self.arrivals,
            &[sequence],
            deadline,
            self.settings.poll_interval,
        ) == 1;
        tracing::trace!(sequence, arrived, len = candidate.len(), "trial finished");
        Ok(arrived)
    }

    fn trial_batch(
        &self,
        candidates: &[Candidate],
        timeout: Duration,
    ) -> Result<Vec<bool>, OracleError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let max_len = self.layout.max_candidate_len();
        for candidate in candidates {
            validate_candidate(candidate, max_len)?;
        }

        let sequences = self.reserve_sequences(candidates.len());
        let dispatcher = BatchDispatcher {
            injector: self.injector.as_ref(),
            arrivals: self.arrivals.as_ref(),
            layout: &self.layout,
            settings: &self.settings.batch,
            repeat: self.settings.repeat,
            poll_interval: self.settings.poll_interval,
        };
        dispatcher.dispatch(candidates, &sequences, timeout)
    }

    fn max_candidate_len(&self) -> Option<usize> {
        Some(self.layout.max_candidate_len())
    }
}
