//! Transformation Graph
//!
//! Model types are nodes, transformation descriptions are directed edges
//! from source type to target type. Built on petgraph with a HashMap index
//! from type id to node.
//!
//! Path resolution is single-hop: a path exists only when a direct edge
//! connects the two types. Chains through intermediate types don't count.

mod dot;

use std::collections::HashMap;
use std::sync::RwLock;

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::transformation::TransformationDescription;

/// Prefix of ids assigned to descriptions that carry none
pub const DEFAULT_INTERNAL_PREFIX: &str = "internal-";

/// A model type known to the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeNode {
    pub type_id: String,
    /// Inactive types were removed or only ever seen as transformation endpoints
    pub active: bool,
}

/// Edge label: the description id and the file it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationEdge {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

struct GraphInner {
    graph: DiGraph<TypeNode, TransformationEdge>,
    /// Node index lookup: type id -> NodeIndex
    node_indices: HashMap<String, NodeIndex>,
    /// Full descriptions by edge id
    descriptions: HashMap<String, TransformationDescription>,
    counter: u64,
    internal_prefix: String,
}

impl GraphInner {
    fn node(&mut self, type_id: &str) -> NodeIndex {
        if let Some(&idx) = self.node_indices.get(type_id) {
            return idx;
        }
        let idx = self.graph.add_node(TypeNode {
            type_id: type_id.to_string(),
            active: false,
        });
        self.node_indices.insert(type_id.to_string(), idx);
        idx
    }

    fn is_internal_id(&self, id: &str) -> bool {
        id.starts_with(&self.internal_prefix)
    }

    fn edges_between(&self, source: &str, target: &str) -> Vec<EdgeIndex> {
        let (Some(&from), Some(&to)) = (self.node_indices.get(source), self.node_indices.get(target)) else {
            return Vec::new();
        };
        self.graph
            .edges_connecting(from, to)
            .map(|e| e.id())
            .collect()
    }

    fn edge_by_id(&self, id: &str) -> Option<EdgeIndex> {
        self.graph
            .edge_indices()
            .find(|&e| self.graph[e].id == id)
    }

    /// Remove one edge and its description.
    ///
    /// petgraph moves the last edge into the freed slot, so indices gathered
    /// before the call must be removed highest first.
    fn remove_edge(&mut self, edge: EdgeIndex) -> Option<TransformationDescription> {
        let label = self.graph.remove_edge(edge)?;
        self.descriptions.remove(&label.id)
    }

    /// Add an edge; returns its id and the description as stored
    fn add(&mut self, mut description: TransformationDescription) -> (String, TransformationDescription) {
        let id = match description.id.clone() {
            Some(id) => id,
            None => {
                self.counter += 1;
                let id = format!("{}{}", self.internal_prefix, self.counter);
                description.id = Some(id.clone());
                id
            }
        };
        if let Some(existing) = self.edge_by_id(&id) {
            debug!(id = %id, "replacing transformation with the same id");
            self.remove_edge(existing);
        }
        let from = self.node(&description.source);
        let to = self.node(&description.target);
        self.graph.add_edge(
            from,
            to,
            TransformationEdge {
                id: id.clone(),
                file_name: description.file_name.clone(),
            },
        );
        debug!(id = %id, transformation = %description, "added transformation to the graph");
        self.descriptions.insert(id.clone(), description.clone());
        (id, description)
    }

    /// Every edge between the endpoints, whatever its id
    fn remove_pair(&mut self, source: &str, target: &str) -> Vec<TransformationDescription> {
        let mut edges = self.edges_between(source, target);
        edges.sort_by(|a, b| b.cmp(a));
        edges.into_iter().filter_map(|e| self.remove_edge(e)).collect()
    }

    fn replace(&mut self, description: TransformationDescription) -> (String, TransformationDescription, Vec<TransformationDescription>) {
        let removed = self.remove_pair(&description.source, &description.target);
        let (id, stored) = self.add(description);
        (id, stored, removed)
    }

    fn remove(&mut self, description: &TransformationDescription) -> Vec<TransformationDescription> {
        let mut matching: Vec<EdgeIndex> = self
            .edges_between(&description.source, &description.target)
            .into_iter()
            .filter(|&e| {
                let id = &self.graph[e].id;
                match &description.id {
                    None => self.is_internal_id(id),
                    Some(wanted) => id == wanted,
                }
            })
            .collect();
        matching.sort_by(|a, b| b.cmp(a));
        matching
            .into_iter()
            .filter_map(|e| self.remove_edge(e))
            .collect()
    }

    fn by_file(&self, file_name: &str) -> Vec<EdgeIndex> {
        self.graph
            .edge_indices()
            .filter(|&e| self.graph[e].file_name.as_deref() == Some(file_name))
            .collect()
    }

    fn remove_file(&mut self, file_name: &str) -> Vec<TransformationDescription> {
        let mut edges = self.by_file(file_name);
        edges.sort_by(|a, b| b.cmp(a));
        edges.into_iter().filter_map(|e| self.remove_edge(e)).collect()
    }
}

/// Thread-safe transformation graph
pub struct TransformationGraph {
    inner: RwLock<GraphInner>,
}

impl Default for TransformationGraph {
    fn default() -> Self {
        Self::with_internal_prefix(DEFAULT_INTERNAL_PREFIX)
    }
}

impl TransformationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph assigning internal ids with the given prefix
    pub fn with_internal_prefix(prefix: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(GraphInner {
                graph: DiGraph::new(),
                node_indices: HashMap::new(),
                descriptions: HashMap::new(),
                counter: 0,
                internal_prefix: prefix.into(),
            }),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, GraphInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, GraphInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    // ========== Types ==========

    /// Add a type, or reactivate it if already known
    pub fn add_type(&self, type_id: &str) {
        let mut inner = self.write();
        let idx = inner.node(type_id);
        inner.graph[idx].active = true;
        debug!(type_id, "activated type");
    }

    /// Mark a type inactive; its edges stay in place
    pub fn remove_type(&self, type_id: &str) {
        let mut inner = self.write();
        match inner.node_indices.get(type_id).copied() {
            Some(idx) => {
                inner.graph[idx].active = false;
                debug!(type_id, "deactivated type");
            }
            None => warn!(type_id, "cannot remove a type the graph doesn't know"),
        }
    }

    pub fn is_type_active(&self, type_id: &str) -> bool {
        let inner = self.read();
        inner
            .node_indices
            .get(type_id)
            .map(|&idx| inner.graph[idx].active)
            .unwrap_or(false)
    }

    /// All known types, sorted by id
    pub fn types(&self) -> Vec<TypeNode> {
        let inner = self.read();
        let mut nodes: Vec<TypeNode> = inner.graph.node_weights().cloned().collect();
        nodes.sort_by(|a, b| a.type_id.cmp(&b.type_id));
        nodes
    }

    // ========== Transformations ==========

    /// Add a description as an edge; returns its (possibly assigned) id.
    ///
    /// Missing endpoint types are created inactive. An edge with the same
    /// id is replaced.
    pub fn add_transformation(&self, description: TransformationDescription) -> String {
        self.write().add(description).0
    }

    /// Add a description as the only edge between its endpoints.
    ///
    /// Returns the id and the stored description; every other edge of the
    /// pair is removed in the same update.
    pub fn replace_transformation(&self, description: TransformationDescription) -> (String, TransformationDescription) {
        let (id, stored, removed) = self.write().replace(description);
        debug!(id = %id, replaced = removed.len(), "replaced transformations of the pair");
        (id, stored)
    }

    /// Remove edges between the description's endpoints.
    ///
    /// Without an explicit id every internally identified edge goes;
    /// otherwise only the edge with that id.
    pub fn remove_transformation(&self, description: &TransformationDescription) -> Vec<TransformationDescription> {
        let removed = self.write().remove(description);
        debug!(transformation = %description, count = removed.len(), "removed transformations");
        removed
    }

    pub fn transformation(&self, id: &str) -> Option<TransformationDescription> {
        self.read().descriptions.get(id).cloned()
    }

    pub fn transformations_by_file_name(&self, file_name: &str) -> Vec<TransformationDescription> {
        let inner = self.read();
        inner
            .by_file(file_name)
            .into_iter()
            .filter_map(|e| inner.descriptions.get(&inner.graph[e].id).cloned())
            .collect()
    }

    /// Remove every description loaded from a file
    pub fn remove_file(&self, file_name: &str) -> Vec<TransformationDescription> {
        let removed = self.write().remove_file(file_name);
        info!(file = file_name, count = removed.len(), "removed transformations of file");
        removed
    }

    /// Replace the descriptions of a file in one atomic update.
    ///
    /// Each added description becomes the only edge of its pair, so edges of
    /// the same pair from other files go too. Returns every removed
    /// description and the added ones as stored.
    pub fn reload_file(
        &self,
        file_name: &str,
        descriptions: Vec<TransformationDescription>,
    ) -> (Vec<TransformationDescription>, Vec<TransformationDescription>) {
        let mut inner = self.write();
        let mut removed = inner.remove_file(file_name);
        let mut added = Vec::with_capacity(descriptions.len());
        for description in descriptions {
            let (_, stored, replaced) = inner.replace(description.with_file_name(file_name));
            removed.extend(replaced);
            added.push(stored);
        }
        info!(file = file_name, removed = removed.len(), added = added.len(), "reloaded transformations of file");
        (removed, added)
    }

    // ========== Paths ==========

    /// The description directly converting `source` into `target`.
    ///
    /// With `ids`, the edge must carry the first required id.
    pub fn path(&self, source: &str, target: &str, ids: &[String]) -> Result<TransformationDescription> {
        let inner = self.read();
        let edges = inner.edges_between(source, target);
        let chosen = match ids.first() {
            Some(wanted) => edges.into_iter().find(|&e| &inner.graph[e].id == wanted),
            None => edges.into_iter().min(),
        };
        chosen
            .and_then(|e| inner.descriptions.get(&inner.graph[e].id).cloned())
            .ok_or_else(|| BridgeError::no_transformation(source, target))
    }

    pub fn path_exists(&self, source: &str, target: &str, ids: &[String]) -> bool {
        self.path(source, target, ids).is_ok()
    }

    pub fn type_count(&self) -> usize {
        self.read().graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.read().graph.edge_count()
    }

    /// GraphViz rendering of the graph
    pub fn to_dot(&self) -> String {
        dot::render(&self.read().graph)
    }
}
