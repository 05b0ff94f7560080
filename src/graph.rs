//! The graph contract searched by [`crate::search::GraphSearch`], and a free-form node graph.
use bevy::math::Vec3;
use smallvec::SmallVec;

/// A directed, weighted edge between two node indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    /// Non-negative traversal cost.
    pub cost: f32,
}

impl Edge {
    pub fn new(from: usize, to: usize, cost: f32) -> Self {
        Edge { from, to, cost }
    }
}

/// Anything A* can run on: nodes are dense indices `0..node_count()`.
pub trait Graph {
    /// Total number of nodes. Valid node indices are `0..node_count()`.
    fn node_count(&self) -> usize;

    /// Upper bound of edges `edges()` appends for a single node.
    fn max_edge_count(&self) -> usize;

    /// Appends the outgoing edges of `node` leading to walkable nodes.
    fn edges(&self, node: usize, edges: &mut Vec<Edge>);

    /// Estimated cost from `current` to `end`. Must not overestimate.
    fn heuristic(&self, current: usize, end: usize) -> f32;

    fn is_walkable(&self, node: usize) -> bool;
}

/// Adjacency list graph over positioned nodes, for waypoint networks that aren't grids.
///
/// The heuristic is the straight line distance between node positions, so edge costs
/// should be at least the distance between the nodes they connect.
#[derive(Debug, Clone, Default)]
pub struct NodeGraph {
    positions: Vec<Vec3>,
    edges: Vec<SmallVec<[Edge; 8]>>,
    blocked: Vec<bool>,
    max_edges: usize,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node at `position` and returns its index.
    pub fn add_node(&mut self, position: Vec3) -> usize {
        self.positions.push(position);
        self.edges.push(SmallVec::new());
        self.blocked.push(false);
        self.positions.len() - 1
    }

    /// Adds a one way edge. Panics if either node doesn't exist or `cost` is negative.
    pub fn connect(&mut self, from: usize, to: usize, cost: f32) {
        assert!(
            from < self.positions.len() && to < self.positions.len(),
            "connect({from}, {to}) on a graph with {} nodes",
            self.positions.len()
        );
        assert!(cost >= 0.0, "edge cost must be non-negative, got {cost}");

        let edges = &mut self.edges[from];
        if let Some(edge) = edges.iter_mut().find(|e| e.to == to) {
            edge.cost = cost;
        } else {
            edges.push(Edge::new(from, to, cost));
        }
        self.max_edges = self.max_edges.max(edges.len());
    }

    /// Connects both ways with the euclidean distance as cost.
    pub fn connect_both(&mut self, a: usize, b: usize) {
        let cost = self.positions[a].distance(self.positions[b]);
        self.connect(a, b, cost);
        self.connect(b, a, cost);
    }

    pub fn set_walkable(&mut self, node: usize, walkable: bool) {
        self.blocked[node] = !walkable;
    }

    pub fn position(&self, node: usize) -> Vec3 {
        self.positions[node]
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

impl Graph for NodeGraph {
    fn node_count(&self) -> usize {
        self.positions.len()
    }

    fn max_edge_count(&self) -> usize {
        self.max_edges
    }

    fn edges(&self, node: usize, edges: &mut Vec<Edge>) {
        edges.extend(self.edges[node].iter().filter(|e| !self.blocked[e.to]).copied());
    }

    fn heuristic(&self, current: usize, end: usize) -> f32 {
        self.positions[current].distance(self.positions[end])
    }

    fn is_walkable(&self, node: usize) -> bool {
        !self.blocked[node]
    }
}
