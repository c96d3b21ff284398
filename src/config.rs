//! Search configuration.
//!
//! Immutable after search start, except for the adaptive phase lengths of
//! the two-phase scheduler, which the open list recomputes between phases.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Open-list scheduling policy for oversearch avoidance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OversearchAvoidanceMode {
    /// Plain best-first: pop strictly by lowest cost.
    None,
    /// Alternate between exploitation (lowest cost) and exploration
    /// (highest uncertainty) phases.
    TwoPhase,
    /// Pop a candidate that is Pareto-non-dominated over (cost, uncertainty).
    ParetoFront,
}

/// Configuration for the oversearch-avoidance scheduler.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OversearchAvoidanceConfig {
    /// Scheduling policy.
    pub mode: OversearchAvoidanceMode,
    /// Number of pops between phase-length recomputations (TwoPhase only).
    pub interval: usize,
    /// Maximum cost gap over the incumbent best solution that a candidate
    /// may have and still be popped during an exploitation phase.
    pub exploitation_threshold: f64,
    /// Minimum uncertainty a candidate must have to be popped during an
    /// exploration phase.
    pub exploration_threshold: f64,
    /// Minimum solution-distance from every previously emitted solution
    /// required of exploration candidates (only checked when a distance
    /// metric is installed).
    pub min_solution_distance: f64,
    /// Recompute phase lengths every `interval` pops from elapsed time
    /// against the timeout, instead of fixed halves.
    pub dynamic_phase_adjustment: bool,
    /// Deadline the adaptive clock model steers toward. Falls back to the
    /// global search timeout when unset.
    pub timeout: Option<Duration>,
}

impl Default for OversearchAvoidanceConfig {
    fn default() -> Self {
        OversearchAvoidanceConfig {
            mode: OversearchAvoidanceMode::None,
            interval: 50,
            exploitation_threshold: f64::INFINITY,
            exploration_threshold: 0.0,
            min_solution_distance: 0.0,
            dynamic_phase_adjustment: false,
            timeout: None,
        }
    }
}

/// Whether the search stops at the first solution or keeps collecting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolutionMode {
    /// Terminate as soon as the first goal node is popped.
    First,
    /// Keep searching and collect every solution until open is exhausted
    /// or a timeout/cancellation fires.
    All,
}

/// Top-level configuration for a best-first search run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Open-list scheduling policy and its parameters.
    pub avoidance: OversearchAvoidanceConfig,
    /// Stop at the first solution or collect all of them.
    pub solution_mode: SolutionMode,
    /// Worker pool size for parallel child evaluation (0 = rayon default).
    pub num_workers: usize,
    /// Per-node evaluation deadline. On expiry the fallback cost is
    /// substituted; without a fallback the node is pruned.
    pub per_node_eval_timeout: Option<Duration>,
    /// Cost substituted when a per-node evaluation times out.
    pub eval_fallback_cost: Option<f64>,
    /// Global search timeout.
    pub timeout: Option<Duration>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            avoidance: OversearchAvoidanceConfig::default(),
            solution_mode: SolutionMode::First,
            num_workers: 0,
            per_node_eval_timeout: None,
            eval_fallback_cost: None,
            timeout: None,
        }
    }
}

impl SearchConfig {
    /// Checks for setting combinations that cannot drive a search.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.avoidance.mode == OversearchAvoidanceMode::TwoPhase && self.avoidance.interval == 0
        {
            return Err(SearchError::InvalidConfig(
                "two-phase scheduling requires a nonzero interval".to_string(),
            ));
        }
        if self.avoidance.exploration_threshold < 0.0 {
            return Err(SearchError::InvalidConfig(format!(
                "exploration threshold must be non-negative, got {}",
                self.avoidance.exploration_threshold
            )));
        }
        if self.avoidance.exploitation_threshold < 0.0 {
            return Err(SearchError::InvalidConfig(format!(
                "exploitation threshold must be non-negative, got {}",
                self.avoidance.exploitation_threshold
            )));
        }
        Ok(())
    }
}
