use crate::frontier::Frontier;
use rand_core::RngCore;
use thiserror::Error;

/// Errors that can occur during scheduler operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    /// The frontier holds no entry to schedule.
    #[error("Frontier is empty, cannot schedule next entry")]
    FrontierEmpty,
}

/// A `Scheduler` decides which frontier entry the hill climber mutates next.
pub trait Scheduler: Send {
    /// Selects the index of the next frontier entry to mutate.
    ///
    /// # Arguments
    /// * `frontier`: The current set of toxic parts.
    /// * `rng`: Random source for schedulers whose choice involves randomness.
    ///
    /// # Returns
    /// The index of the chosen entry, or `SchedulerError::FrontierEmpty`.
    fn next(&mut self, frontier: &Frontier, rng: &mut dyn RngCore)
    -> Result<usize, SchedulerError>;
}

/// Picks frontier entries uniformly at random.
///
/// Uniform choice keeps the search breadth-preserving: an entry found late
/// is as likely to be expanded as the original seed.
#[derive(Default, Debug)]
pub struct RandomScheduler;

impl RandomScheduler {
    /// Creates a new `RandomScheduler`.
    pub fn new() -> Self {
        RandomScheduler
    }
}

impl Scheduler for RandomScheduler {
    fn next(
        &mut self,
        frontier: &Frontier,
        rng: &mut dyn RngCore,
    ) -> Result<usize, SchedulerError> {
        frontier
            .random_select(rng)
            .map(|(index, _)| index)
            .ok_or(SchedulerError::FrontierEmpty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    #[test]
    fn next_from_empty_frontier_is_an_error() {
        let mut scheduler = RandomScheduler::new();
        let mut rng = ChaCha8Rng::from_seed([0; 32]);
        assert_eq!(
            scheduler.next(&Frontier::new(), &mut rng),
            Err(SchedulerError::FrontierEmpty)
        );
    }

    #[test]
    fn next_stays_within_frontier() {
        let mut scheduler = RandomScheduler::new();
        let mut rng = ChaCha8Rng::from_seed([3; 32]);
        let frontier = Frontier::from_seeds(vec![vec![1], vec![2], vec![3]]);
        for _ in 0..50 {
            let index = scheduler.next(&frontier, &mut rng).unwrap();
            assert!(index < frontier.len());
        }
    }
}
