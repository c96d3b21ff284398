//! Node and graph model.
//!
//! Search nodes live in an append-only arena addressed by integer ids;
//! parent/child relations are plain indices, never owning references. The
//! graph itself is implicit: a `GraphGenerator` unrolls it lazily from a
//! root point.

pub mod arena;
pub mod generator;

pub use arena::{Arena, Node, NodeId};
pub use generator::{GraphGenerator, NodeKind, Successor};
