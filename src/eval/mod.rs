//! Node and solution evaluation contracts.
//!
//! A node evaluator maps a node (identified by its root-to-node path) to
//! an estimated cost. Failures are part of the contract: a node may not be
//! resolvable yet, sampling may come up empty, or a deadline may expire;
//! the search core absorbs all of these locally.

pub mod cache;
pub mod rollout;
pub mod uncertainty;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

pub use cache::PathCache;
pub use rollout::RandomCompletionEvaluator;
pub use uncertainty::{UncertaintySource, VarianceUncertainty};

/// Non-fatal evaluation outcomes. The search loop defers, prunes,
/// deprioritizes, or substitutes a fallback; it never crashes on these.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The node cannot be resolved yet; keep it around for a later pass.
    #[error("node not yet computable")]
    NotYetComputable,

    /// The domain evaluator failed; the path is blacklisted and never
    /// retried.
    #[error("domain evaluation failed: {0}")]
    EvaluationFailed(String),

    /// No rollout succeeded within the retry budget; the node is
    /// deprioritized, not pruned.
    #[error("no successful rollout within the retry budget")]
    SamplingExhausted,

    /// The per-node evaluation deadline expired.
    #[error("evaluation deadline expired")]
    Timeout,

    /// The search was cancelled while evaluating.
    #[error("evaluation cancelled")]
    Cancelled,
}

/// Error raised by a domain solution evaluator.
#[derive(Debug, Error)]
pub enum SolutionError {
    #[error("solution evaluation failed: {0}")]
    Domain(String),

    #[error("solution evaluation cancelled")]
    Cancelled,
}

/// Cooperative deadline and cancellation context threaded through every
/// evaluation. Checked once per rollout and once per expansion, so
/// cancellation latency is bounded by roughly one rollout.
#[derive(Clone)]
pub struct EvalContext {
    cancel: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl EvalContext {
    pub fn new(cancel: Arc<AtomicBool>, deadline: Option<Instant>) -> Self {
        EvalContext { cancel, deadline }
    }

    /// A context that never cancels and never expires.
    pub fn unbounded() -> Self {
        EvalContext {
            cancel: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// The same cancellation token with a tighter deadline.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) => Some(existing.min(deadline)),
            None => Some(deadline),
        };
        EvalContext {
            cancel: Arc::clone(&self.cancel),
            deadline,
        }
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Returns the pending interruption, if any.
    pub fn check(&self) -> Result<(), EvalError> {
        if self.cancelled() {
            return Err(EvalError::Cancelled);
        }
        if self.expired() {
            return Err(EvalError::Timeout);
        }
        Ok(())
    }
}

/// A cost estimate paired with its dispersion.
///
/// Totally ordered by Euclidean norm where a single ranking is required;
/// the Pareto scheduler uses the partial dominance order instead.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UncertaintyMeasure {
    pub cost: f64,
    pub uncertainty: f64,
}

impl UncertaintyMeasure {
    pub fn exact(cost: f64) -> Self {
        UncertaintyMeasure {
            cost,
            uncertainty: 0.0,
        }
    }

    /// Euclidean norm over the (cost, uncertainty) pair.
    pub fn norm(&self) -> f64 {
        (self.cost * self.cost + self.uncertainty * self.uncertainty).sqrt()
    }

    /// Pareto dominance: at least as good in both objectives and strictly
    /// better in one.
    pub fn dominates(&self, other: &UncertaintyMeasure) -> bool {
        self.cost <= other.cost
            && self.uncertainty <= other.uncertainty
            && (self.cost < other.cost || self.uncertainty < other.uncertainty)
    }
}

/// Result of a successful node evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Evaluation {
    pub cost: f64,
    pub uncertainty: f64,
    /// Rollouts actually used; 0 for exact or cache-served evaluations.
    pub samples: u32,
}

impl Evaluation {
    /// An exact evaluation with zero uncertainty.
    pub fn exact(cost: f64) -> Self {
        Evaluation {
            cost,
            uncertainty: 0.0,
            samples: 0,
        }
    }

    pub fn measure(&self) -> UncertaintyMeasure {
        UncertaintyMeasure {
            cost: self.cost,
            uncertainty: self.uncertainty,
        }
    }
}

/// Maps a node to an estimated cost.
///
/// The node is identified by its reconstructed path, not its identity, so
/// two node instances with equal paths are indistinguishable to the
/// evaluator. This is what makes path unification possible in decorating
/// layers.
pub trait NodeEvaluator<T>: Send + Sync {
    fn f(&self, path: &[T], is_goal: bool, ctx: &EvalContext) -> Result<Evaluation, EvalError>;
}

impl<T, F> NodeEvaluator<T> for F
where
    F: Fn(&[T], bool) -> Result<Evaluation, EvalError> + Send + Sync,
{
    fn f(&self, path: &[T], is_goal: bool, _ctx: &EvalContext) -> Result<Evaluation, EvalError> {
        self(path, is_goal)
    }
}

/// Scores a complete (goal-terminated) path.
pub trait SolutionEvaluator<T>: Send + Sync {
    fn evaluate(&self, path: &[T]) -> Result<f64, SolutionError>;

    /// Whether the last edge of `path` can affect the score of any
    /// completion below it. When false, the rollout evaluator reuses the
    /// parent's f-value without sampling. Defaults to true.
    fn last_edge_affects_score(&self, _path: &[T]) -> bool {
        true
    }
}

impl<T, F> SolutionEvaluator<T> for F
where
    F: Fn(&[T]) -> Result<f64, SolutionError> + Send + Sync,
{
    fn evaluate(&self, path: &[T]) -> Result<f64, SolutionError> {
        self(path)
    }
}
