//! andor-search engine library.
//!
//! A pluggable best-first search engine over implicitly-defined AND/OR
//! graphs. Callers supply a graph generator (root, successors, goal test)
//! and a node evaluator; the engine supplies the frontier management,
//! Monte-Carlo rollout evaluation, uncertainty estimation, and
//! oversearch-avoidance scheduling policies.

pub mod config;
pub mod error;
pub mod eval;
pub mod events;
pub mod graph;
pub mod search;
