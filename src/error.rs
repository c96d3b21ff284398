//! Fatal search errors.
//!
//! Per-node evaluation failures are absorbed by the search loop (see
//! `eval::EvalError`); only configuration problems and generator contract
//! violations abort a whole run.

use thiserror::Error;

/// Errors that terminate a search before or during setup.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("graph generator contract violation: {0}")]
    GeneratorContract(String),
}
