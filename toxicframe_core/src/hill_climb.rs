use crate::context::RunContext;
use crate::error::SearchError;
use crate::frontier::Frontier;
use crate::mutator::{Mutator, SampledSubstitutionMutator};
use crate::probe::ProbeRequest;
use crate::scheduler::{RandomScheduler, Scheduler};
use crate::store::TestKey;
use crate::template::Template;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct ClimbReport {
    /// Seeds followed by every toxic part discovered, in discovery order.
    pub frontier: Vec<Vec<u8>>,
    pub iterations: usize,
    pub tested: usize,
    /// TOXIC neighbours rejected by the full-trial confirmation.
    pub unconfirmed: usize,
}

impl ClimbReport {
    pub fn discovered(&self, seeds: usize) -> &[Vec<u8>] {
        &self.frontier[seeds.min(self.frontier.len())..]
    }
}

/// Breadth-preserving hill climbing over toxic parts.
///
/// Each iteration expands one frontier entry into its untested neighbours,
/// probes them as one batch, and adds every TOXIC neighbour that survives a
/// full-trial confirmation to the frontier. MAYBE and SAFE neighbours are
/// recorded but not expanded.
pub struct MutationHillClimber<'a> {
    ctx: &'a RunContext,
    template: Template,
    label: String,
    mutators: Vec<Box<dyn Mutator>>,
    scheduler: Box<dyn Scheduler>,
    rng: ChaCha8Rng,
    max_iterations: usize,
}

impl<'a> MutationHillClimber<'a> {
    pub fn new(ctx: &'a RunContext, label: impl Into<String>, template: Template) -> Self {
        Self {
            ctx,
            template,
            label: label.into(),
            mutators: vec![Box::new(SampledSubstitutionMutator::default())],
            scheduler: Box::new(RandomScheduler::new()),
            rng: ChaCha8Rng::seed_from_u64(0),
            max_iterations: 50,
        }
    }

    pub fn with_mutators(mut self, mutators: Vec<Box<dyn Mutator>>) -> Self {
        self.mutators = mutators;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Box<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Climbs from `seeds`, which are taken as already known to be toxic.
    pub fn run(&mut self, seeds: Vec<Vec<u8>>) -> Result<ClimbReport, SearchError> {
        let mut frontier = Frontier::from_seeds(seeds);
        let mut tested: HashSet<Vec<u8>> = frontier.iter().map(<[u8]>::to_vec).collect();
        let mut report = ClimbReport::default();
        let trials = self.ctx.settings().batch_trials;

        for iteration in 0..self.max_iterations {
            self.ctx.cancel_token().check()?;
            let index = match self.scheduler.next(&frontier, &mut self.rng) {
                Ok(index) => index,
                Err(_) => break,
            };
            let Some(current) = frontier.get(index).map(<[u8]>::to_vec) else {
                break;
            };

            let mut neighbours: Vec<(Vec<u8>, &'static str)> = Vec::new();
            for mutator in &mut self.mutators {
                let name = mutator.name();
                for neighbour in mutator.neighbours(&current, &mut self.rng) {
                    if tested.insert(neighbour.clone()) {
                        neighbours.push((neighbour, name));
                    }
                }
            }
            report.iterations = iteration + 1;
            if neighbours.is_empty() {
                continue;
            }

            let requests: Vec<ProbeRequest> = neighbours
                .iter()
                .map(|(part, mutator)| {
                    let candidate = self.template.render(part);
                    ProbeRequest::new(TestKey::pattern(&self.label, &candidate), candidate)
                        .describe(format!(
                            "iteration={} mutator={mutator} part={}",
                            iteration + 1,
                            hex::encode(part)
                        ))
                })
                .collect();
            let results = self.ctx.probe_batch(&requests, trials)?;
            report.tested += neighbours.len();

            for (((part, mutator), request), result) in
                neighbours.into_iter().zip(&requests).zip(results)
            {
                if !result.is_toxic() {
                    continue;
                }
                if !self.ctx.confirm(request)?.is_toxic() {
                    report.unconfirmed += 1;
                    continue;
                }
                if frontier.insert(part.clone()) {
                    tracing::info!(
                        label = %self.label,
                        iteration = iteration + 1,
                        mutator,
                        part = %hex::encode(&part),
                        "new toxic variant"
                    );
                }
            }

            if iteration % 10 == 0 {
                tracing::info!(
                    label = %self.label,
                    iteration = iteration + 1,
                    frontier = frontier.len(),
                    "climb progress"
                );
            }
        }

        report.frontier = frontier.into_parts();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::TrialAggregator;
    use crate::context::RunSettings;
    use crate::mutator::BitFlipMutator;
    use crate::store::{RecordKind, ResultStore};
    use crate::testing::PredicateOracle;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    /// Single-trial confirmations are answered by the batch result already
    /// in the store, so oracle calls equal probed neighbours.
    fn context(oracle: Arc<PredicateOracle>) -> RunContext {
        RunContext::with_parts(
            TrialAggregator::new(oracle, Duration::from_millis(1)),
            ResultStore::open_in_memory().unwrap(),
            None,
            RunSettings {
                trials: 1,
                ..RunSettings::default()
            },
        )
    }

    #[test]
    fn zero_iterations_return_seeds_untouched() {
        let oracle = Arc::new(PredicateOracle::new(|_| true));
        let ctx = context(oracle.clone());
        let seeds = vec![vec![1, 2, 3], vec![4, 5, 6]];
        let report = MutationHillClimber::new(&ctx, "climb", Template::identity())
            .with_max_iterations(0)
            .run(seeds.clone())
            .unwrap();
        assert_eq!(report.frontier, seeds);
        assert_eq!(oracle.calls(), 0);
    }

    #[test]
    fn toxic_neighbours_join_the_frontier() {
        // Toxic iff the first byte is 0x44, whatever the rest is.
        let oracle = Arc::new(PredicateOracle::new(|b| b[0] == 0x44));
        let ctx = context(oracle.clone());
        let report = MutationHillClimber::new(&ctx, "climb", Template::identity())
            .with_seed(11)
            .with_max_iterations(5)
            .run(vec![vec![0x44, 0x24, 0x12]])
            .unwrap();

        assert!(report.frontier.len() > 1);
        assert_eq!(report.frontier[0], vec![0x44, 0x24, 0x12]);
        assert!(report.frontier.iter().all(|p| p[0] == 0x44));
        assert_eq!(oracle.calls(), report.tested);
        assert!(report.discovered(1).iter().all(|p| p.len() == 3));
    }

    #[test]
    fn neighbours_are_never_probed_twice() {
        let oracle = Arc::new(PredicateOracle::new(|_| true));
        let ctx = context(oracle.clone());
        let report = MutationHillClimber::new(&ctx, "flip", Template::repeated(4))
            .with_mutators(vec![Box::new(BitFlipMutator)])
            .with_max_iterations(6)
            .run(vec![vec![0x00]])
            .unwrap();
        // Every 1-byte value reachable by bit flips is probed at most once.
        assert_eq!(oracle.calls(), report.tested);
        assert!(report.tested <= 255);
        assert_eq!(report.frontier.len(), report.tested + 1);

        let records = ctx.store().records(RecordKind::Pattern, None).unwrap();
        assert_eq!(records.len(), report.tested);
        assert!(records.iter().all(|r| {
            r.description
                .as_deref()
                .is_some_and(|d| d.contains("mutator=bitflip"))
        }));
    }

    #[test]
    fn unconfirmed_neighbours_stay_out_of_the_frontier() {
        // Every candidate loses only its first frame.
        let seen = Arc::new(Mutex::new(HashSet::new()));
        let oracle = Arc::new(PredicateOracle::with_outcomes(move |b, _| {
            !seen.lock().insert(b.to_vec())
        }));
        let ctx = RunContext::with_parts(
            TrialAggregator::new(oracle, Duration::from_millis(1)),
            ResultStore::open_in_memory().unwrap(),
            None,
            RunSettings {
                trials: 3,
                ..RunSettings::default()
            },
        );
        let report = MutationHillClimber::new(&ctx, "flaky", Template::identity())
            .with_max_iterations(2)
            .run(vec![vec![0x10, 0x20]])
            .unwrap();
        assert_eq!(report.frontier, vec![vec![0x10, 0x20]]);
        assert!(report.tested > 0);
        assert_eq!(report.unconfirmed, report.tested);
    }

    #[test]
    fn template_wraps_every_probe() {
        let oracle = Arc::new(PredicateOracle::new(|b| b.starts_with(b"HDR") && b.len() == 5));
        let ctx = context(oracle);
        let report = MutationHillClimber::new(&ctx, "suffix", Template::suffix_after(b"HDR", 1))
            .with_max_iterations(1)
            .run(vec![vec![1, 2]])
            .unwrap();
        assert!(report.frontier.len() > 1);
    }
}
