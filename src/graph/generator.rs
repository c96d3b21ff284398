//! Graph generator contract.
//!
//! The engine never materializes the search graph; it asks the generator
//! for the root point, for typed successor descriptions of a point, and
//! for goal membership. Implementations must be safely callable
//! concurrently for distinct points.

use std::hash::Hash;

/// Branch type of a successor in an AND/OR graph.
///
/// OR-nodes require one successful child; AND-nodes require all children.
/// The engine carries the kind as node metadata and leaves AND-composition
/// of child solutions to the caller's encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    And,
    Or,
}

/// A successor description produced by expanding a point.
#[derive(Clone, Debug)]
pub struct Successor<P> {
    /// The domain state reached over this edge.
    pub point: P,
    /// Caller-defined edge label, carried into node annotations.
    pub edge: String,
    /// Branch type of the successor.
    pub kind: NodeKind,
}

impl<P> Successor<P> {
    /// Creates an OR-branch successor, the common case.
    pub fn or(point: P, edge: impl Into<String>) -> Self {
        Successor {
            point,
            edge: edge.into(),
            kind: NodeKind::Or,
        }
    }

    /// Creates an AND-branch successor.
    pub fn and(point: P, edge: impl Into<String>) -> Self {
        Successor {
            point,
            edge: edge.into(),
            kind: NodeKind::And,
        }
    }
}

/// Supplies the implicit search graph.
pub trait GraphGenerator: Send + Sync {
    /// Opaque caller-defined domain state. Immutable once created and
    /// compared by value equality.
    type Point: Clone + Eq + Hash + Send + Sync;

    /// The root point the search starts from.
    fn root(&self) -> Self::Point;

    /// Expands a point into its typed successor descriptions. An empty
    /// vector marks a dead end.
    fn successors(&self, point: &Self::Point) -> Vec<Successor<Self::Point>>;

    /// Goal membership test for a single point.
    fn is_goal(&self, point: &Self::Point) -> bool;

    /// Whether `complete` structurally subsumes `partial`, i.e. shares it
    /// as a prefix. Domains with path semantics beyond structural equality
    /// (reorderable steps, normalized states) can override this to unify
    /// more paths.
    fn path_subsumed(&self, partial: &[Self::Point], complete: &[Self::Point]) -> bool {
        complete.len() >= partial.len() && complete[..partial.len()] == *partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Chain(u32);

    impl GraphGenerator for Chain {
        type Point = u32;

        fn root(&self) -> u32 {
            0
        }

        fn successors(&self, point: &u32) -> Vec<Successor<u32>> {
            if *point < self.0 {
                vec![Successor::or(point + 1, "step")]
            } else {
                Vec::new()
            }
        }

        fn is_goal(&self, point: &u32) -> bool {
            *point == self.0
        }
    }

    #[test]
    fn default_subsumption_is_prefix_matching() {
        let chain = Chain(4);
        assert!(chain.path_subsumed(&[0, 1], &[0, 1, 2, 3, 4]));
        assert!(chain.path_subsumed(&[0, 1, 2], &[0, 1, 2]));
        assert!(!chain.path_subsumed(&[0, 2], &[0, 1, 2, 3]));
        assert!(!chain.path_subsumed(&[0, 1, 2, 3, 4], &[0, 1]));
    }
}
