//! Concurrent dispatch of many single-trial probes with one shared wait.
//!
//! Sequential trials pay the full timeout for every lost frame. A batch
//! injects all of its candidates through a small worker pool first and then
//! waits once, for all of them, which turns N timeouts into roughly one.

use crate::candidate::Candidate;
use crate::capture::ArrivalTable;
use crate::frame::FrameLayout;
use crate::injector::Injector;
use crate::oracle::OracleError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Maximum number of candidates per dispatch.
    pub size: usize,
    /// Injection workers; independent of the batch size.
    pub workers: usize,
    /// Extra wait granted per candidate on top of the trial timeout.
    pub per_candidate_wait: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            size: 256,
            workers: 4,
            per_candidate_wait: Duration::from_millis(2),
        }
    }
}

impl BatchSettings {
    /// Length of the shared wait phase for a batch of `n` candidates.
    pub fn wait_for(&self, n: usize, timeout: Duration) -> Duration {
        timeout + self.per_candidate_wait.saturating_mul(n as u32)
    }
}

/// Polls `arrivals` until every sequence in `sequences` is present or
/// `deadline` passes, and returns how many were seen.
pub fn wait_for_arrivals(
    arrivals: &ArrivalTable,
    sequences: &[u32],
    deadline: Instant,
    poll_interval: Duration,
) -> usize {
    loop {
        let present = arrivals.count_present(sequences);
        if present == sequences.len() || Instant::now() >= deadline {
            return present;
        }
        thread::sleep(poll_interval);
    }
}

/// One batch in flight. Borrowed from the oracle for the duration of a
/// single `dispatch`.
pub struct BatchDispatcher<'a, I: Injector> {
    pub injector: &'a I,
    pub arrivals: &'a ArrivalTable,
    pub layout: &'a FrameLayout,
    pub settings: &'a BatchSettings,
    pub repeat: u32,
    pub poll_interval: Duration,
}

impl<I: Injector> BatchDispatcher<'_, I> {
    /// Injects `candidates[i]` under `sequences[i]` and reports which arrived.
    ///
    /// Candidates go out in chunks of at most `settings.size`, each with its
    /// own shared wait. Sequence numbers must be unique within the batch.
    pub fn dispatch(
        &self,
        candidates: &[Candidate],
        sequences: &[u32],
        timeout: Duration,
    ) -> Result<Vec<bool>, OracleError> {
        debug_assert_eq!(candidates.len(), sequences.len());
        let size = self.settings.size.max(1);
        let mut arrived = Vec::with_capacity(candidates.len());
        for (chunk, chunk_sequences) in candidates.chunks(size).zip(sequences.chunks(size)) {
            arrived.extend(self.dispatch_chunk(chunk, chunk_sequences, timeout)?);
        }
        Ok(arrived)
    }

    /// One injection phase and one wait. The arrival table is cleared first
    /// so entries from earlier probes cannot be mistaken for this chunk's
    /// frames.
    fn dispatch_chunk(
        &self,
        candidates: &[Candidate],
        sequences: &[u32],
        timeout: Duration,
    ) -> Result<Vec<bool>, OracleError> {
        let n = candidates.len();
        if n == 0 {
            return Ok(Vec::new());
        }

        self.arrivals.clear();

        let failed: Vec<AtomicBool> = (0..n).map(|_| AtomicBool::new(false)).collect();
        let next = AtomicUsize::new(0);
        let workers = self.settings.workers.clamp(1, n);

        thread::scope(|scope| -> Result<(), OracleError> {
            for worker in 0..workers {
                let failed = &failed;
                let next = &next;
                thread::Builder::new()
                    .name(format!("toxicframe-inject-{worker}"))
                    .spawn_scoped(scope, move || {
                        loop {
                            let i = next.fetch_add(1, Ordering::Relaxed);
                            if i >= n {
                                break;
                            }
                            let frame = self.layout.build(sequences[i], candidates[i].as_bytes());
                            if let Err(e) = self.injector.send_raw(&frame, self.repeat) {
                                tracing::warn!(sequence = sequences[i], error = %e, "batch injection failed");
                                failed[i].store(true, Ordering::Relaxed);
                            }
                        }
                    })?;
            }
            Ok(())
        })?;

        let outstanding: Vec<u32> = sequences
            .iter()
            .zip(&failed)
            .filter(|(_, f)| !f.load(Ordering::Relaxed))
            .map(|(s, _)| *s)
            .collect();

        let deadline = Instant::now() + self.settings.wait_for(n, timeout);
        let seen = wait_for_arrivals(self.arrivals, &outstanding, deadline, self.poll_interval);
        tracing::debug!(
            batch = n,
            injected = outstanding.len(),
            arrived = seen,
            "batch wait finished"
        );

        Ok(sequences
            .iter()
            .zip(&failed)
            .map(|(seq, f)| !f.load(Ordering::Relaxed) && self.arrivals.contains(*seq))
            .collect())
    }
}
