//! Search algorithms and frontier management.
//!
//! The best-first core drives the expand-evaluate-insert loop; the open
//! list applies one of the oversearch-avoidance policies; the randomized
//! completer is the reduced search the rollout evaluator runs internally.

pub mod best_first;
pub mod completer;
pub mod open_list;

pub use best_first::{BestFirstSearch, SearchReport, Solution, Termination};
pub use open_list::{ClockModelAdjuster, OpenList, Phase, PhaseAdjuster};
