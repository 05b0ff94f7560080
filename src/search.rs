//! A* search over any [`Graph`], reusing its scratch buffers between calls.
use std::time::{Duration, Instant};

use crate::{
    graph::{Edge, Graph},
    queue::PriorityQueue,
};

const NO_PARENT: u32 = u32::MAX;

/// How often the deadline of a [`SearchBudget`] is checked, in expansions.
const DEADLINE_CHECK_INTERVAL: usize = 64;

#[derive(Debug, Clone, Copy)]
struct SearchNode {
    g: f32,
    parent: u32,
    generation: u32,
    closed: bool,
}

impl Default for SearchNode {
    fn default() -> Self {
        SearchNode {
            g: f32::INFINITY,
            parent: NO_PARENT,
            generation: 0,
            closed: false,
        }
    }
}

/// Open set ordering: lowest `f`, then lowest `h`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
struct SearchKey {
    f: f32,
    h: f32,
}

/// Limits on a single search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchBudget {
    /// Maximum number of nodes expanded before giving up.
    pub max_expansions: Option<usize>,
    /// Point in time after which the search gives up.
    pub deadline: Option<Instant>,
}

impl SearchBudget {
    pub const UNLIMITED: SearchBudget = SearchBudget {
        max_expansions: None,
        deadline: None,
    };

    pub fn expansions(max_expansions: usize) -> Self {
        SearchBudget {
            max_expansions: Some(max_expansions),
            deadline: None,
        }
    }

    /// Gives up once `timeout` elapsed from now.
    pub fn timeout(timeout: Duration) -> Self {
        SearchBudget {
            max_expansions: None,
            deadline: Some(Instant::now() + timeout),
        }
    }

    fn is_exhausted(&self, expanded: usize) -> bool {
        if self.max_expansions.is_some_and(|max| expanded >= max) {
            return true;
        }
        match self.deadline {
            Some(deadline) if expanded % DEADLINE_CHECK_INTERVAL == 0 => Instant::now() >= deadline,
            _ => false,
        }
    }
}

/// Result of [`GraphSearch::search_with_budget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// A path was written to the result.
    Found,
    /// Start and end aren't connected, or one of them isn't walkable.
    NoPath,
    /// The budget ran out before the search finished.
    Exhausted,
}

/// Reusable A* search.
///
/// Per-node scratch state is stamped with the generation of the search that wrote it,
/// so starting a new search only bumps the generation instead of clearing the buffers.
/// Buffers grow to the largest graph searched and are never shrunk.
///
/// A `GraphSearch` is cheap to move between threads but each search needs `&mut self`,
/// keep one per thread for concurrent pathfinding.
#[derive(Debug, Clone, Default)]
pub struct GraphSearch {
    nodes: Vec<SearchNode>,
    generation: u32,
    open: PriorityQueue<SearchKey>,
    edges: Vec<Edge>,
    last_cost: Option<f32>,
    last_expanded: usize,
}

impl GraphSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-allocates the scratch buffers for graphs of up to `node_count` nodes.
    pub fn with_capacity(node_count: usize) -> Self {
        let mut search = Self::default();
        search.reserve(node_count);
        search
    }

    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    fn reserve(&mut self, node_count: usize) {
        if self.nodes.len() < node_count {
            self.nodes.resize(node_count, SearchNode::default());
        }
        self.open.reserve_items(node_count);
    }

    /// Total cost of the path found by the most recent search.
    pub fn last_cost(&self) -> Option<f32> {
        self.last_cost
    }

    /// Number of nodes expanded by the most recent search.
    pub fn last_expanded(&self) -> usize {
        self.last_expanded
    }

    /// Finds the cheapest path from `start` to `end` and writes it to `result`, both ends included.
    ///
    /// `result` is cleared first and stays empty if there is no path. Returns false without
    /// searching if `start` or `end` isn't walkable.
    ///
    /// # Panics
    /// If `start` or `end` is not a node of `graph`.
    pub fn search<G: Graph + ?Sized>(
        &mut self,
        graph: &G,
        start: usize,
        end: usize,
        result: &mut Vec<usize>,
    ) -> bool {
        self.search_with_budget(graph, start, end, result, SearchBudget::UNLIMITED)
            == SearchOutcome::Found
    }

    /// [`GraphSearch::search`] that gives up once `budget` is used up.
    pub fn search_with_budget<G: Graph + ?Sized>(
        &mut self,
        graph: &G,
        start: usize,
        end: usize,
        result: &mut Vec<usize>,
        budget: SearchBudget,
    ) -> SearchOutcome {
        let node_count = graph.node_count();
        assert!(
            start < node_count && end < node_count,
            "search from {start} to {end} on a graph of {node_count} nodes"
        );
        assert!(
            node_count < NO_PARENT as usize,
            "graphs are limited to {} nodes",
            NO_PARENT
        );

        result.clear();
        self.last_cost = None;
        self.last_expanded = 0;

        if !graph.is_walkable(start) || !graph.is_walkable(end) {
            return SearchOutcome::NoPath;
        }
        if start == end {
            result.push(start);
            self.last_cost = Some(0.0);
            return SearchOutcome::Found;
        }

        self.reserve(node_count);
        self.next_generation();
        self.open.clear();
        self.edges.reserve(graph.max_edge_count());

        let GraphSearch {
            nodes,
            generation,
            open,
            edges,
            ..
        } = self;
        let generation = *generation;

        let h = graph.heuristic(start, end);
        nodes[start] = SearchNode {
            g: 0.0,
            parent: NO_PARENT,
            generation,
            closed: false,
        };
        open.push(start, SearchKey { f: h, h });

        let mut expanded = 0;
        let outcome = loop {
            if budget.is_exhausted(expanded) {
                break SearchOutcome::Exhausted;
            }

            let Some((current, _)) = open.try_pop() else {
                break SearchOutcome::NoPath;
            };
            nodes[current].closed = true;
            expanded += 1;

            if current == end {
                break SearchOutcome::Found;
            }

            let g = nodes[current].g;
            edges.clear();
            graph.edges(current, edges);

            for edge in edges.iter() {
                let next = &mut nodes[edge.to];
                let tentative = g + edge.cost;

                if next.generation != generation {
                    *next = SearchNode {
                        g: tentative,
                        parent: current as u32,
                        generation,
                        closed: false,
                    };
                    let h = graph.heuristic(edge.to, end);
                    open.push(edge.to, SearchKey { f: tentative + h, h });
                } else if !next.closed && tentative < next.g {
                    next.g = tentative;
                    next.parent = current as u32;
                    let h = graph.heuristic(edge.to, end);
                    open.update_priority(edge.to, SearchKey { f: tentative + h, h });
                }
            }
        };

        self.last_expanded = expanded;
        if outcome == SearchOutcome::Found {
            self.last_cost = Some(self.nodes[end].g);
            self.reconstruct(end, result);
        }
        outcome
    }

    fn next_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            // Stale stamps could alias the new generations after wrapping around.
            for node in &mut self.nodes {
                node.generation = 0;
            }
            self.generation = 1;
        }
    }

    fn reconstruct(&self, end: usize, result: &mut Vec<usize>) {
        let mut current = end as u32;
        while current != NO_PARENT {
            result.push(current as usize);
            current = self.nodes[current as usize].parent;
        }
        result.reverse();
    }
}
