//! Append-only node arena.
//!
//! The arena owns every node for the lifetime of a search run; nodes are
//! never deleted, so the closed set retains full history for path
//! reconstruction. Parent links are back-references by index and are used
//! only to rebuild paths, never for ownership.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use crate::error::SearchError;
use crate::graph::generator::NodeKind;

/// Index of a node in the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The raw arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A search node.
///
/// Mutated only to attach a computed label, uncertainty, or annotation.
#[derive(Clone, Debug)]
pub struct Node<T> {
    pub id: NodeId,
    pub point: T,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
    /// Edge label of the incoming edge, empty for roots.
    pub edge: String,
    /// Computed f-value, if any.
    pub label: Option<f64>,
    /// Uncertainty paired with the label, if any.
    pub uncertainty: Option<f64>,
    pub is_goal: bool,
    pub annotations: HashMap<String, serde_json::Value>,
}

/// Flat arena of search nodes addressed by `NodeId`.
pub struct Arena<T> {
    nodes: Vec<Node<T>>,
    expanded: HashSet<NodeId>,
    /// Hashes of child-point sets seen so far, for duplicate detection.
    /// Hash-based like a transposition key; a collision only risks a
    /// spurious warning, never wrong search behavior.
    seen_child_sets: HashSet<u64>,
}

impl<T: Clone + Eq + Hash> Arena<T> {
    pub fn new() -> Self {
        Arena {
            nodes: Vec::new(),
            expanded: HashSet::new(),
            seen_child_sets: HashSet::new(),
        }
    }

    /// Inserts the root node.
    pub fn create_root(&mut self, point: T, is_goal: bool) -> NodeId {
        debug_assert!(self.nodes.is_empty(), "root must be the first node");
        self.insert(point, None, NodeKind::Or, String::new(), is_goal)
    }

    /// Expands a parent into child nodes, one per successor description.
    ///
    /// Returns the new ids plus a flag that is true when a structurally
    /// identical child set was already produced by an earlier expansion.
    /// Duplicates are a caller-visible warning condition, not fatal.
    pub fn expand(
        &mut self,
        parent: NodeId,
        successors: Vec<(T, String, NodeKind, bool)>,
    ) -> Result<(Vec<NodeId>, bool), SearchError> {
        if !self.expanded.insert(parent) {
            return Err(SearchError::GeneratorContract(format!(
                "node {} expanded twice",
                parent.0
            )));
        }

        let mut hasher = DefaultHasher::new();
        for (point, _, _, _) in &successors {
            point.hash(&mut hasher);
        }
        let duplicate = !successors.is_empty() && !self.seen_child_sets.insert(hasher.finish());

        let ids = successors
            .into_iter()
            .map(|(point, edge, kind, is_goal)| {
                self.insert(point, Some(parent), kind, edge, is_goal)
            })
            .collect();
        Ok((ids, duplicate))
    }

    fn insert(
        &mut self,
        point: T,
        parent: Option<NodeId>,
        kind: NodeKind,
        edge: String,
        is_goal: bool,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            id,
            point,
            parent,
            children: Vec::new(),
            kind,
            edge,
            label: None,
            uncertainty: None,
            is_goal,
            annotations: HashMap::new(),
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        id
    }

    /// Reconstructs the root-to-node path of points by walking parent
    /// links root-ward and reversing. O(depth).
    pub fn path_to(&self, id: NodeId) -> Vec<T> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &self.nodes[node_id.0];
            path.push(node.point.clone());
            current = node.parent;
        }
        path.reverse();
        path
    }

    /// Attaches an annotation to a node, overwriting any previous value
    /// for the key.
    pub fn annotate(&mut self, id: NodeId, key: impl Into<String>, value: serde_json::Value) {
        self.nodes[id.0].annotations.insert(key.into(), value);
    }

    /// Stores the computed f-value and its uncertainty on a node.
    pub fn set_label(&mut self, id: NodeId, label: f64, uncertainty: f64) {
        let node = &mut self.nodes[id.0];
        node.label = Some(label);
        node.uncertainty = Some(uncertainty);
    }

    pub fn node(&self, id: NodeId) -> &Node<T> {
        &self.nodes[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node<T>> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_expanded(&self, id: NodeId) -> bool {
        self.expanded.contains(&id)
    }
}

impl<T: Clone + Eq + Hash> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}
