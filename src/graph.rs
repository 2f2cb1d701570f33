//! A small indexed graph: nodes and edges are opaque integer handles kept in
//! side tables, rather than an object graph tied together with shared and
//! weak pointers.
//!
//! Nodes and edges are opaque integer identifiers with adjacency kept in
//! side tables, which enables safe mutation and avoids owned
//! back-references. Both the per-procedure basic-block graph and the
//! per-program procedure graph are built on this type.

use std::collections::HashMap;

/// Handle to a node. Stable for the lifetime of the graph (nodes are never
/// removed; see the module docs on why).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Handle to an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub u32);

#[derive(Debug, Clone)]
struct EdgeRecord<E> {
    source: NodeId,
    target: NodeId,
    payload: E,
}

/// An indexed, directed multigraph.
///
/// Node and edge removal are intentionally not implemented: procedures and
/// programs grow monotonically during disassembly. A cached vertex-index
/// map (used by dominance/RPO numbering) would be invalidated by removal;
/// since removal never happens here, no such cache-invalidation bookkeeping
/// is needed, but the constraint is documented since it is the reason this
/// type is append-only.
#[derive(Debug, Clone, Default)]
pub struct IndexedGraph<N, E> {
    nodes: HashMap<NodeId, N>,
    edges: HashMap<EdgeId, EdgeRecord<E>>,
    out_edges: HashMap<NodeId, Vec<EdgeId>>,
    in_edges: HashMap<NodeId, Vec<EdgeId>>,
    next_node: u32,
    next_edge: u32,
}

impl<N, E> IndexedGraph<N, E> {
    /// An empty graph.
    pub fn new() -> Self {
        IndexedGraph {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            out_edges: HashMap::new(),
            in_edges: HashMap::new(),
            next_node: 0,
            next_edge: 0,
        }
    }

    /// Insert a node, returning its handle.
    pub fn add_node(&mut self, payload: N) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.insert(id, payload);
        self.out_edges.insert(id, Vec::new());
        self.in_edges.insert(id, Vec::new());
        id
    }

    /// Insert a directed edge `source -> target`, returning its handle.
    ///
    /// Panics if either endpoint is not a node of this graph (an internal
    /// invariant violation, not a user-facing error: callers always look up
    /// `NodeId`s from this same graph).
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, payload: E) -> EdgeId {
        assert!(self.nodes.contains_key(&source), "unknown source node");
        assert!(self.nodes.contains_key(&target), "unknown target node");
        let id = EdgeId(self.next_edge);
        self.next_edge += 1;
        self.edges.insert(
            id,
            EdgeRecord {
                source,
                target,
                payload,
            },
        );
        self.out_edges.entry(source).or_default().push(id);
        self.in_edges.entry(target).or_default().push(id);
        id
    }

    /// Remove an edge by handle, keeping the side tables consistent.
    pub fn remove_edge(&mut self, edge: EdgeId) -> Option<E> {
        let record = self.edges.remove(&edge)?;
        if let Some(v) = self.out_edges.get_mut(&record.source) {
            v.retain(|e| *e != edge);
        }
        if let Some(v) = self.in_edges.get_mut(&record.target) {
            v.retain(|e| *e != edge);
        }
        Some(record.payload)
    }

    /// Borrow a node's payload.
    pub fn node(&self, id: NodeId) -> Option<&N> {
        self.nodes.get(&id)
    }

    /// Mutably borrow a node's payload.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut N> {
        self.nodes.get_mut(&id)
    }

    /// Borrow an edge's payload.
    pub fn edge(&self, id: EdgeId) -> Option<&E> {
        self.edges.get(&id).map(|r| &r.payload)
    }

    /// Mutably borrow an edge's payload.
    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut E> {
        self.edges.get_mut(&id).map(|r| &mut r.payload)
    }

    /// The `(source, target)` endpoints of an edge.
    pub fn endpoints(&self, id: EdgeId) -> Option<(NodeId, NodeId)> {
        self.edges.get(&id).map(|r| (r.source, r.target))
    }

    /// Outgoing edge handles of a node, in insertion order.
    pub fn out_edges(&self, id: NodeId) -> &[EdgeId] {
        self.out_edges.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Incoming edge handles of a node, in insertion order.
    pub fn in_edges(&self, id: NodeId) -> &[EdgeId] {
        self.in_edges.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Targets reachable by one outgoing edge from `id`.
    pub fn successors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.out_edges(id)
            .iter()
            .filter_map(move |e| self.edges.get(e).map(|r| r.target))
    }

    /// Sources of one incoming edge into `id`.
    pub fn predecessors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.in_edges(id)
            .iter()
            .filter_map(move |e| self.edges.get(e).map(|r| r.source))
    }

    /// Iterate over all node handles. Order is unspecified; callers needing
    /// a deterministic order should traverse from a root instead (see
    /// `reverse_postorder`).
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Number of nodes currently in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_traverse() {
        let mut g: IndexedGraph<&str, ()> = IndexedGraph::new();
        let a = g.add_node("a");
        let b = g.add_node("b");
        g.add_edge(a, b, ());
        assert_eq!(g.successors(a).collect::<Vec<_>>(), vec![b]);
        assert_eq!(g.predecessors(b).collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn remove_edge_updates_side_tables() {
        let mut g: IndexedGraph<&str, ()> = IndexedGraph::new();
        let a = g.add_node("a");
        let b = g.add_node("b");
        let e = g.add_edge(a, b, ());
        g.remove_edge(e);
        assert_eq!(g.out_edges(a).len(), 0);
        assert_eq!(g.in_edges(b).len(), 0);
    }
}
