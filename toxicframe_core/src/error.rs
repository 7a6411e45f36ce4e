use crate::corpus::CorpusError;
use crate::oracle::OracleError;
use crate::store::StoreError;
use thiserror::Error;

/// Failure of a probe or of a whole search.
///
/// Corpus and oracle errors abort only the probe that raised them; callers
/// decide whether the run goes on. `Cancelled` always ends the run.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error("Run cancelled before the probe was fully classified")]
    Cancelled,
    #[error("Invalid search input: {0}")]
    InvalidInput(String),
}
