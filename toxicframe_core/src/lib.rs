pub mod adaptive;
pub mod aggregator;
pub mod batch;
pub mod brute_force;
pub mod candidate;
pub mod capture;
pub mod classification;
pub mod config;
pub mod context;
pub mod corpus;
pub mod error;
pub mod frame;
pub mod frontier;
pub mod hill_climb;
pub mod injector;
pub mod length_search;
pub mod mutator;
pub mod oracle;
pub mod probe;
pub mod range_search;
pub mod safe_cache;
pub mod scheduler;
pub mod simplify;
pub mod store;
pub mod sweep;
pub mod template;

#[cfg(test)]
mod testing;

pub use adaptive::{AdaptiveOrchestrator, AdaptivePlan, AdaptiveReport, AdaptiveStep};
pub use aggregator::{CancelToken, MaybePolicy, TrialAggregator};
pub use batch::{BatchDispatcher, BatchSettings};
pub use brute_force::{
    two_byte_sweep, BruteForceEnumerator, CrossProduct, EditVariants, Finding, ScanReport,
};
pub use candidate::Candidate;
pub use capture::{ArrivalTable, CaptureLoop, FrameSource};
pub use classification::{Classification, ClassificationResult};
pub use config::ToxicframeConfig;
pub use context::{ContextError, RunContext, RunSettings};
pub use corpus::{CorpusError, PatternLayout, ReferenceCorpus};
pub use error::SearchError;
pub use frame::{FrameError, FrameLayout, MacAddr};
pub use frontier::Frontier;
pub use hill_climb::{ClimbReport, MutationHillClimber};
pub use injector::{HttpInjector, InjectError, Injector};
pub use length_search::LengthOutcome;
pub use mutator::{BitFlipMutator, Mutator, SampledSubstitutionMutator};
pub use oracle::{CorrelationOracle, Oracle, OracleError, OracleSettings};
pub use probe::{ProbeRequest, ProbeStats};
pub use range_search::{RangeBoundarySearch, RangeOutcome};
pub use safe_cache::{CacheStats, SafeCache};
pub use scheduler::{RandomScheduler, Scheduler, SchedulerError};
pub use simplify::{simplify, Simplification};
pub use store::{RecordKind, ResultStore, StoreError, StoreSummary, TestKey, TestRecord};
pub use sweep::{embedded_scan, length_histogram, EmbeddedResult, LengthHistogram};
pub use template::Template;
