use crate::candidate::Candidate;
use crate::classification::{Classification, ClassificationResult};
use crate::context::RunContext;
use crate::error::SearchError;
use crate::oracle::validate_candidate;
use crate::store::TestKey;

/// Where the answers of a run came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeStats {
    pub store_hits: u64,
    pub cache_hits: u64,
    pub classified: u64,
    pub toxic: u64,
    pub safe: u64,
    pub maybe: u64,
    /// Fresh measurements taken with the full trial count.
    pub confirmed: u64,
}

impl ProbeStats {
    fn count(&mut self, result: &ClassificationResult) {
        self.classified += 1;
        match result.classification {
            Classification::Toxic => self.toxic += 1,
            Classification::Safe => self.safe += 1,
            Classification::Maybe => self.maybe += 1,
        }
    }
}

/// One candidate to resolve under one key.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub key: TestKey,
    pub candidate: Candidate,
    pub description: Option<String>,
}

impl ProbeRequest {
    pub fn new(key: TestKey, candidate: Candidate) -> Self {
        Self {
            key,
            candidate,
            description: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl RunContext {
    /// Resolves `candidate` under `key`: stored result first, then the safe
    /// cache, then `trials` fresh trials. A fresh result is persisted before
    /// it is returned, and SAFE results are added to the cache.
    ///
    /// With `force_retest` set, stored and cached answers are ignored and the
    /// fresh result replaces the stored one.
    pub fn probe(
        &self,
        request: &ProbeRequest,
        trials: u32,
    ) -> Result<ClassificationResult, SearchError> {
        self.check_budget(&request.candidate)?;
        if let Some(known) = self.known(request)? {
            return Ok(known);
        }

        let result = self.aggregator.classify(&request.candidate, trials)?;
        self.persist(request, &result)?;
        if result.is_safe() {
            if let Some(cache) = &self.cache {
                cache.add(&request.candidate)?;
            }
        }
        self.stats.lock().count(&result);
        tracing::debug!(key = %request.key, %result, "probe");
        Ok(result)
    }

    /// Resolves many requests at once. Requests without a stored or cached
    /// answer are classified in batches of at most `batch_size` candidates.
    /// Results come back in request order.
    pub fn probe_batch(
        &self,
        requests: &[ProbeRequest],
        trials: u32,
    ) -> Result<Vec<ClassificationResult>, SearchError> {
        for request in requests {
            self.check_budget(&request.candidate)?;
        }

        let mut results: Vec<Option<ClassificationResult>> = Vec::with_capacity(requests.len());
        let mut pending = Vec::new();
        for (i, request) in requests.iter().enumerate() {
            let known = self.known(request)?;
            if known.is_none() {
                pending.push(i);
            }
            results.push(known);
        }

        for chunk in pending.chunks(self.settings.batch_size.max(1)) {
            let candidates: Vec<Candidate> =
                chunk.iter().map(|&i| requests[i].candidate.clone()).collect();
            let classified = self.aggregator.classify_batch(&candidates, trials)?;

            let mut safe = Vec::new();
            for (&i, result) in chunk.iter().zip(classified) {
                self.persist(&requests[i], &result)?;
                self.stats.lock().count(&result);
                if result.is_safe() {
                    safe.push(requests[i].candidate.clone());
                }
                results[i] = Some(result);
            }
            if let Some(cache) = &self.cache {
                cache.add_batch(&safe)?;
            }
            tracing::info!(batch = chunk.len(), safe = safe.len(), "batch classified");
        }

        results
            .into_iter()
            .map(|r| r.ok_or(SearchError::Cancelled))
            .collect()
    }

    /// Re-measures `request` with the run's full trial count.
    ///
    /// Search probes use fewer trials than a final verdict needs. A stored
    /// result already backed by at least `trials` trials is reused; anything
    /// weaker is measured again and replaces the stored record.
    pub fn confirm(&self, request: &ProbeRequest) -> Result<ClassificationResult, SearchError> {
        self.check_budget(&request.candidate)?;
        let trials = self.settings.trials;
        if !self.settings.force_retest {
            if let Some(stored) = self.store.lookup(&request.key)? {
                if stored.total() >= trials {
                    self.stats.lock().store_hits += 1;
                    return Ok(stored);
                }
            }
        }

        let result = self.aggregator.classify(&request.candidate, trials)?;
        self.persist(request, &result)?;
        if result.is_safe() {
            if let Some(cache) = &self.cache {
                cache.add(&request.candidate)?;
            }
        }
        {
            let mut stats = self.stats.lock();
            stats.count(&result);
            stats.confirmed += 1;
        }
        tracing::info!(key = %request.key, %result, "confirmation");
        Ok(result)
    }

    fn check_budget(&self, candidate: &Candidate) -> Result<(), SearchError> {
        let max = self
            .aggregator
            .oracle()
            .max_candidate_len()
            .unwrap_or(usize::MAX);
        validate_candidate(candidate, max)?;
        Ok(())
    }

    fn known(&self, request: &ProbeRequest) -> Result<Option<ClassificationResult>, SearchError> {
        if self.settings.force_retest {
            return Ok(None);
        }
        if let Some(stored) = self.store.lookup(&request.key)? {
            self.stats.lock().store_hits += 1;
            return Ok(Some(stored));
        }
        if let Some(cache) = &self.cache {
            if cache.is_cached(&request.candidate.digest())? {
                self.stats.lock().cache_hits += 1;
                return Ok(Some(ClassificationResult::cached_safe(
                    self.settings.trials,
                )));
            }
        }
        Ok(None)
    }

    fn persist(
        &self,
        request: &ProbeRequest,
        result: &ClassificationResult,
    ) -> Result<(), SearchError> {
        self.store.record(
            &request.key,
            &request.candidate,
            result,
            request.description.as_deref(),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::TrialAggregator;
    use crate::context::RunSettings;
    use crate::oracle::OracleError;
    use crate::safe_cache::SafeCache;
    use crate::store::ResultStore;
    use crate::testing::PredicateOracle;
    use std::sync::Arc;
    use std::time::Duration;

    fn context(oracle: Arc<PredicateOracle>, cache: bool, settings: RunSettings) -> RunContext {
        RunContext::with_parts(
            TrialAggregator::new(oracle, Duration::from_millis(1)),
            ResultStore::open_in_memory().unwrap(),
            cache.then(|| SafeCache::open_in_memory(0).unwrap()),
            settings,
        )
    }

    fn request(bytes: &[u8]) -> ProbeRequest {
        let candidate = Candidate::from(bytes);
        ProbeRequest::new(TestKey::pattern("probe", &candidate), candidate)
    }

    #[test]
    fn second_probe_is_answered_by_the_store() {
        let oracle = Arc::new(PredicateOracle::new(|b| b[0] == 0));
        let ctx = context(oracle.clone(), true, RunSettings::default());

        let first = ctx.probe(&request(&[0, 1]), 3).unwrap();
        assert!(first.is_toxic());
        assert_eq!(ctx.probe(&request(&[0, 1]), 3).unwrap(), first);
        assert_eq!(oracle.calls(), 3);
        assert_eq!(ctx.stats().store_hits, 1);
    }

    #[test]
    fn safe_results_short_circuit_other_keys() {
        let oracle = Arc::new(PredicateOracle::new(|_| false));
        let ctx = context(oracle.clone(), true, RunSettings::default());
        let candidate = Candidate::from(vec![5u8; 4]);

        ctx.probe(&ProbeRequest::new(TestKey::range(0, 4), candidate.clone()), 2)
            .unwrap();
        let cached = ctx
            .probe(&ProbeRequest::new(TestKey::pattern("other", &candidate), candidate), 2)
            .unwrap();

        assert!(cached.is_safe());
        assert_eq!(oracle.calls(), 2);
        assert_eq!(ctx.stats().cache_hits, 1);
    }

    #[test]
    fn toxic_results_are_never_cached() {
        let oracle = Arc::new(PredicateOracle::new(|_| true));
        let ctx = context(oracle.clone(), true, RunSettings::default());
        let r = request(&[1, 2, 3]);
        ctx.probe(&r, 1).unwrap();
        assert!(!ctx.cache().unwrap().is_cached(&r.candidate.digest()).unwrap());
    }

    #[test]
    fn force_retest_replaces_stored_result() {
        let oracle = Arc::new(PredicateOracle::with_outcomes(|_, i| i >= 2));
        let settings = RunSettings {
            force_retest: true,
            ..RunSettings::default()
        };
        let ctx = context(oracle.clone(), false, settings);
        let r = request(&[9]);

        assert!(ctx.probe(&r, 2).unwrap().is_toxic());
        assert!(ctx.probe(&r, 2).unwrap().is_safe());
        assert_eq!(ctx.store().lookup(&r.key).unwrap().unwrap().successes, 2);
        assert_eq!(oracle.calls(), 4);
    }

    #[test]
    fn oversized_candidates_are_rejected_before_any_trial() {
        let oracle = Arc::new(PredicateOracle::new(|_| true).with_max_len(4));
        let ctx = context(oracle.clone(), false, RunSettings::default());
        let err = ctx.probe(&request(&[0; 5]), 1).unwrap_err();
        assert!(matches!(
            err,
            SearchError::Oracle(OracleError::Oversized { len: 5, max: 4 })
        ));
        assert_eq!(oracle.calls(), 0);
        assert_eq!(ctx.store().summary().unwrap().total(), 0);
    }

    #[test]
    fn confirm_remeasures_weak_results_with_full_trial_count() {
        let oracle = Arc::new(PredicateOracle::new(|b| b[0] == 7));
        let settings = RunSettings {
            trials: 6,
            ..RunSettings::default()
        };
        let ctx = context(oracle.clone(), false, settings);
        let r = request(&[7, 7]);

        assert!(ctx.probe(&r, 1).unwrap().is_toxic());
        let confirmed = ctx.confirm(&r).unwrap();
        assert!(confirmed.is_toxic());
        assert_eq!(confirmed.total(), 6);
        assert_eq!(ctx.store().lookup(&r.key).unwrap().unwrap().total(), 6);
        assert_eq!(oracle.calls(), 1 + 6);

        // Already backed by enough trials.
        assert_eq!(ctx.confirm(&r).unwrap(), confirmed);
        assert_eq!(oracle.calls(), 7);
        assert_eq!(ctx.stats().confirmed, 1);
    }

    #[test]
    fn confirm_overturns_a_lucky_single_trial() {
        // Only the very first trial is lost.
        let oracle = Arc::new(PredicateOracle::with_outcomes(|_, i| i > 0));
        let ctx = context(oracle, false, RunSettings::default());
        let r = request(&[1]);
        assert!(ctx.probe(&r, 1).unwrap().is_toxic());
        assert!(ctx.confirm(&r).unwrap().is_safe());
    }

    #[test]
    fn batch_probe_mixes_known_and_fresh_results_in_order() {
        let oracle = Arc::new(PredicateOracle::new(|b| b[0] % 2 == 0));
        let settings = RunSettings {
            batch_size: 2,
            ..RunSettings::default()
        };
        let ctx = context(oracle.clone(), true, settings);
        ctx.probe(&request(&[1]), 1).unwrap();

        let requests: Vec<ProbeRequest> = (0u8..5).map(|b| request(&[b])).collect();
        let results = ctx.probe_batch(&requests, 1).unwrap();
        let toxic: Vec<bool> = results.iter().map(ClassificationResult::is_toxic).collect();
        assert_eq!(toxic, vec![true, false, true, false, true]);
        assert_eq!(oracle.calls(), 1 + 4);
        assert_eq!(ctx.store().summary().unwrap().total(), 5);
    }
}
