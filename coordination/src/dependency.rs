//! Typed dependency DAG over consensus point ids.
//!
//! Nodes are never removed, so `NodeIndex` order equals insertion order and
//! doubles as the deterministic tie-breaker for topological sorting.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::points::{unit, Category};

/// Relationship from a parent consensus point to a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    Prerequisite,
    Supports,
    Refines,
    Extends,
    Derives,
    Contradicts,
}

impl DependencyType {
    /// Signed impact factor applied to the parent's strength.
    pub fn impact_factor(self) -> f64 {
        match self {
            Self::Prerequisite => 0.9,
            Self::Supports => 0.7,
            Self::Refines => 0.6,
            Self::Extends => 0.5,
            Self::Derives => 0.4,
            Self::Contradicts => -0.3,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "prerequisite" => Some(Self::Prerequisite),
            "supports" => Some(Self::Supports),
            "refines" => Some(Self::Refines),
            "extends" => Some(Self::Extends),
            "derives" => Some(Self::Derives),
            "contradicts" => Some(Self::Contradicts),
            _ => None,
        }
    }
}

impl std::fmt::Display for DependencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prerequisite => write!(f, "prerequisite"),
            Self::Supports => write!(f, "supports"),
            Self::Refines => write!(f, "refines"),
            Self::Extends => write!(f, "extends"),
            Self::Derives => write!(f, "derives"),
            Self::Contradicts => write!(f, "contradicts"),
        }
    }
}

/// Depth of a consensus point in the dependency hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyLevel {
    Foundational,
    Structural,
    Operational,
    Detail,
}

impl HierarchyLevel {
    pub fn from_category(category: Category) -> Self {
        match category {
            Category::Core => Self::Foundational,
            Category::Strategic => Self::Structural,
            Category::Tactical | Category::Technical => Self::Operational,
            Category::Procedural | Category::Auxiliary => Self::Detail,
        }
    }

    /// One level deeper, saturating at `Detail`.
    pub fn deeper(self) -> Self {
        match self {
            Self::Foundational => Self::Structural,
            Self::Structural => Self::Operational,
            Self::Operational | Self::Detail => Self::Detail,
        }
    }

    /// Weight used for partial consensus contribution.
    pub fn contribution_weight(self) -> f64 {
        match self {
            Self::Foundational => 1.0,
            Self::Structural => 0.8,
            Self::Operational => 0.6,
            Self::Detail => 0.4,
        }
    }
}

impl std::fmt::Display for HierarchyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Foundational => write!(f, "foundational"),
            Self::Structural => write!(f, "structural"),
            Self::Operational => write!(f, "operational"),
            Self::Detail => write!(f, "detail"),
        }
    }
}

/// Edge payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub kind: DependencyType,
    /// Edge strength in `[0, 1]`.
    pub strength: f64,
    pub evidence: String,
    /// Whether the edge was inferred rather than declared.
    #[serde(default)]
    pub is_inferred: bool,
}

impl DependencyEdge {
    pub fn new(kind: DependencyType, strength: f64, evidence: &str) -> Self {
        Self {
            kind,
            strength: unit(strength),
            evidence: evidence.to_string(),
            is_inferred: false,
        }
    }

    /// Signed impact: `factor × strength`.
    pub fn impact(&self) -> f64 {
        self.kind.impact_factor() * self.strength
    }
}

/// Errors raised while rebuilding a graph from serialized state.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("edge {parent} -> {child} references an unknown node")]
    UnknownNode { parent: String, child: String },
    #[error("edge {parent} -> {child} would create a cycle")]
    Cycle { parent: String, child: String },
}

/// Serialized form: nodes in index order plus an edge list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    pub nodes: Vec<String>,
    pub edges: Vec<EdgeState>,
    pub levels: BTreeMap<String, HierarchyLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeState {
    pub parent: String,
    pub child: String,
    pub edge: DependencyEdge,
}

/// Dependency DAG. Serializes as a [`GraphState`] and re-validates on load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "GraphState", try_from = "GraphState")]
pub struct DependencyGraph {
    graph: StableDiGraph<String, DependencyEdge>,
    nodes: BTreeMap<String, NodeIndex>,
    explicit_levels: BTreeMap<String, HierarchyLevel>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node; returns its index. Idempotent.
    pub fn ensure_node(&mut self, id: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(id.to_string());
        self.nodes.insert(id.to_string(), idx);
        idx
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Add or update `parent -> child`. Self-loops and cycle-forming edges
    /// are rejected and leave the graph unchanged.
    pub fn add_dependency(&mut self, parent: &str, child: &str, edge: DependencyEdge) -> bool {
        if parent == child {
            warn!(parent, "Rejected self-loop dependency");
            return false;
        }
        if let (Some(&p), Some(&c)) = (self.nodes.get(parent), self.nodes.get(child)) {
            if let Some(existing) = self.graph.find_edge(p, c) {
                self.graph[existing] = edge;
                debug!(parent, child, "Updated dependency edge");
                return true;
            }
            if self.reachable(c, p) {
                warn!(parent, child, "Rejected dependency that would create a cycle");
                return false;
            }
        }

        let p = self.ensure_node(parent);
        let c = self.ensure_node(child);
        debug!(parent, child, kind = %edge.kind, "Added dependency edge");
        self.graph.add_edge(p, c, edge);
        true
    }

    pub fn remove_dependency(&mut self, parent: &str, child: &str) -> bool {
        let (Some(&p), Some(&c)) = (self.nodes.get(parent), self.nodes.get(child)) else {
            return false;
        };
        match self.graph.find_edge(p, c) {
            Some(edge) => self.graph.remove_edge(edge).is_some(),
            None => false,
        }
    }

    pub fn edge(&self, parent: &str, child: &str) -> Option<&DependencyEdge> {
        let p = *self.nodes.get(parent)?;
        let c = *self.nodes.get(child)?;
        self.graph.find_edge(p, c).map(|e| &self.graph[e])
    }

    /// Parents of `id` with their edges, in node index order.
    pub fn parent_edges(&self, id: &str) -> Vec<(String, DependencyEdge)> {
        let Some(&idx) = self.nodes.get(id) else {
            return Vec::new();
        };
        let mut parents: Vec<(NodeIndex, DependencyEdge)> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (e.source(), e.weight().clone()))
            .collect();
        parents.sort_by_key(|(n, _)| *n);
        parents
            .into_iter()
            .map(|(n, e)| (self.graph[n].clone(), e))
            .collect()
    }

    pub fn parents(&self, id: &str) -> Vec<String> {
        self.neighbours(id, Direction::Incoming)
    }

    pub fn children(&self, id: &str) -> Vec<String> {
        self.neighbours(id, Direction::Outgoing)
    }

    pub fn ancestors(&self, id: &str) -> Vec<String> {
        self.breadth_first(id, Direction::Incoming)
    }

    pub fn descendants(&self, id: &str) -> Vec<String> {
        self.breadth_first(id, Direction::Outgoing)
    }

    /// Strength multiplier in `[0.3, 1.5]` inherited from parents.
    /// Parents missing from `strengths` count as 0.5.
    pub fn calculate_cascading_strength(&self, id: &str, strengths: &BTreeMap<String, f64>) -> f64 {
        let parents = self.parent_edges(id);
        if parents.is_empty() {
            return 1.0;
        }
        let total: f64 = parents
            .iter()
            .map(|(parent, edge)| {
                let s = strengths.get(parent).copied().unwrap_or(0.5);
                match edge.kind {
                    DependencyType::Contradicts => -s * edge.impact().abs(),
                    _ => s * edge.impact(),
                }
            })
            .sum();
        let avg = total / parents.len() as f64;
        (1.0 + avg * 0.5).clamp(0.3, 1.5)
    }

    /// Kahn topological order with ties broken by insertion order.
    /// Empty if a cycle is present.
    pub fn get_aggregation_order(&self) -> Vec<String> {
        let mut in_degree: BTreeMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| (n, self.graph.neighbors_directed(n, Direction::Incoming).count()))
            .collect();
        let mut ready: BTreeSet<NodeIndex> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&n, _)| n)
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(next) = ready.pop_first() {
            order.push(self.graph[next].clone());
            for child in self.graph.neighbors_directed(next, Direction::Outgoing) {
                if let Some(d) = in_degree.get_mut(&child) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(child);
                    }
                }
            }
        }

        if order.len() != self.graph.node_count() {
            warn!("Dependency graph contains a cycle; no aggregation order");
            return Vec::new();
        }
        order
    }

    pub fn set_hierarchy_level(&mut self, id: &str, level: HierarchyLevel) {
        self.ensure_node(id);
        self.explicit_levels.insert(id.to_string(), level);
    }

    /// Explicit level, else one deeper than the deepest parent.
    pub fn hierarchy_level(&self, id: &str) -> HierarchyLevel {
        if let Some(level) = self.explicit_levels.get(id) {
            return *level;
        }
        self.parents(id)
            .iter()
            .map(|p| self.hierarchy_level(p).deeper())
            .max()
            .unwrap_or(HierarchyLevel::Foundational)
    }

    /// Contribution of a partially supported point, boosted by dependants.
    pub fn partial_consensus_contribution(&self, id: &str, support_ratio: f64) -> f64 {
        let level_weight = self.hierarchy_level(id).contribution_weight();
        let bonus = (self.children(id).len() as f64 * 0.05).min(0.2);
        (unit(support_ratio) * level_weight + bonus).min(1.0)
    }

    /// Registered ids grouped by level, each group in insertion order.
    pub fn hierarchy_summary(&self) -> BTreeMap<HierarchyLevel, Vec<String>> {
        let mut summary: BTreeMap<HierarchyLevel, Vec<String>> = BTreeMap::new();
        for idx in self.graph.node_indices() {
            let id = &self.graph[idx];
            summary
                .entry(self.hierarchy_level(id))
                .or_default()
                .push(id.clone());
        }
        summary
    }

    fn reachable(&self, from: NodeIndex, to: NodeIndex) -> bool {
        let mut dfs = Dfs::new(&self.graph, from);
        while let Some(node) = dfs.next(&self.graph) {
            if node == to {
                return true;
            }
        }
        false
    }

    fn neighbours(&self, id: &str, direction: Direction) -> Vec<String> {
        let Some(&idx) = self.nodes.get(id) else {
            return Vec::new();
        };
        let mut found: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
        found.sort();
        found.dedup();
        found.into_iter().map(|n| self.graph[n].clone()).collect()
    }

    fn breadth_first(&self, id: &str, direction: Direction) -> Vec<String> {
        let Some(&start) = self.nodes.get(id) else {
            return Vec::new();
        };
        let mut seen = BTreeSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut out = Vec::new();
        while let Some(node) = queue.pop_front() {
            let mut next: Vec<NodeIndex> = self.graph.neighbors_directed(node, direction).collect();
            next.sort();
            for n in next {
                if seen.insert(n) {
                    out.push(self.graph[n].clone());
                    queue.push_back(n);
                }
            }
        }
        out
    }
}

impl From<DependencyGraph> for GraphState {
    fn from(graph: DependencyGraph) -> Self {
        let nodes = graph
            .graph
            .node_indices()
            .map(|n| graph.graph[n].clone())
            .collect();
        let mut edges: Vec<(NodeIndex, NodeIndex, EdgeState)> = graph
            .graph
            .edge_indices()
            .filter_map(|e| {
                let (source, target) = graph.graph.edge_endpoints(e)?;
                Some((
                    source,
                    target,
                    EdgeState {
                        parent: graph.graph[source].clone(),
                        child: graph.graph[target].clone(),
                        edge: graph.graph[e].clone(),
                    },
                ))
            })
            .collect();
        edges.sort_by_key(|(s, t, _)| (*s, *t));
        Self {
            nodes,
            edges: edges.into_iter().map(|(_, _, e)| e).collect(),
            levels: graph.explicit_levels,
        }
    }
}

impl TryFrom<GraphState> for DependencyGraph {
    type Error = GraphError;

    fn try_from(state: GraphState) -> Result<Self, Self::Error> {
        let mut graph = DependencyGraph::new();
        for id in &state.nodes {
            graph.ensure_node(id);
        }
        for edge in state.edges {
            if !graph.contains(&edge.parent) || !graph.contains(&edge.child) {
                return Err(GraphError::UnknownNode {
                    parent: edge.parent,
                    child: edge.child,
                });
            }
            if !graph.add_dependency(&edge.parent, &edge.child, edge.edge) {
                return Err(GraphError::Cycle {
                    parent: edge.parent,
                    child: edge.child,
                });
            }
        }
        for (id, level) in state.levels {
            graph.set_hierarchy_level(&id, level);
        }
        Ok(graph)
    }
}
