//! Search events.
//!
//! Consumers (logging, visualization, persistence) subscribe to the core
//! without affecting search correctness; events are emitted from the
//! controlling thread only.

use serde::Serialize;

use crate::graph::{NodeId, NodeKind};

/// Terminal statistics of a search run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    /// Nodes inserted into the arena.
    pub created: u64,
    /// Nodes expanded (moved to the closed set).
    pub expanded: u64,
    /// Nodes successfully evaluated and inserted into open.
    pub evaluated: u64,
    /// Nodes dropped because their evaluation failed.
    pub pruned: u64,
    /// Nodes parked as not-yet-computable.
    pub deferred: u64,
    /// Solutions emitted from popped goal nodes.
    pub solutions: u64,
    /// Goal paths first scored inside evaluations and surfaced without
    /// being popped.
    pub rollout_solutions: u64,
}

/// Events emitted by the best-first core.
#[derive(Clone, Debug)]
pub enum SearchEvent<T> {
    AlgorithmInitialized,
    NodeCreated {
        id: NodeId,
        parent: Option<NodeId>,
        kind: NodeKind,
        is_goal: bool,
    },
    NodeAnnotated {
        id: NodeId,
        key: String,
        value: serde_json::Value,
    },
    SolutionFound {
        path: Vec<T>,
        cost: f64,
    },
    AlgorithmFinished {
        stats: SearchStats,
    },
    Timeout,
    Cancelled,
}

/// Callback registered with the core; invoked synchronously per event.
pub type EventSubscriber<T> = Box<dyn FnMut(&SearchEvent<T>) + Send>;
