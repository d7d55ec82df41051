//! Kind-level precedence between schema objects.
//!
//! Edges are between kinds, never between individual descriptors: every
//! descriptor of a prerequisite kind is converged before any descriptor of a
//! dependent kind is touched.

use std::collections::BTreeSet;

use petgraph::Direction;
use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;

use crate::{ConfigError, Kind};

/// `(prerequisite, dependent)` pairs.
///
/// Type only precedes Table; there is deliberately no direct Type -> Index or
/// Type -> Permission edge.
pub const KIND_EDGES: [(Kind, Kind); 8] = [
    (Kind::Keyspace, Kind::Type),
    (Kind::Keyspace, Kind::Table),
    (Kind::Keyspace, Kind::Permission),
    (Kind::Type, Kind::Table),
    (Kind::Table, Kind::Index),
    (Kind::Table, Kind::Permission),
    (Kind::Index, Kind::User),
    (Kind::User, Kind::Permission),
];

const KIND_ORDER: [Kind; 6] = Kind::ALL;

const fn position(order: &[Kind], kind: Kind) -> Option<usize> {
    let mut i = 0;
    while i < order.len() {
        if order[i] as usize == kind as usize {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// True when `order` lists every edge's prerequisite before its dependent.
/// A graph admits such an order only if it is acyclic.
const fn order_respects_edges(order: &[Kind], edges: &[(Kind, Kind)]) -> bool {
    let mut i = 0;
    while i < edges.len() {
        let (from, to) = edges[i];
        match (position(order, from), position(order, to)) {
            (Some(a), Some(b)) if a < b => {}
            _ => return false,
        }
        i += 1;
    }
    true
}

const _: () = assert!(
    order_respects_edges(&KIND_ORDER, &KIND_EDGES),
    "KIND_EDGES must be acyclic and consistent with Kind declaration order"
);

/// Fixed application order of kinds for the built-in edge set.
pub fn ordered_kinds() -> &'static [Kind] {
    &KIND_ORDER
}

/// Dependency graph over kinds with a precomputed topological order.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraphMap<Kind, ()>,
    order: Vec<Kind>,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::standard()
    }
}

impl DependencyGraph {
    /// Graph over [`KIND_EDGES`]. Acyclicity is checked at compile time.
    pub fn standard() -> Self {
        Self {
            graph: build_graph(KIND_EDGES),
            order: KIND_ORDER.to_vec(),
        }
    }

    /// Build a graph from an arbitrary edge set, rejecting cycles.
    pub fn with_edges(
        edges: impl IntoIterator<Item = (Kind, Kind)>,
    ) -> Result<Self, ConfigError> {
        let graph = build_graph(edges);
        if let Some(kind) = find_cycle_member(&graph) {
            return Err(ConfigError::DependencyCycle { kind });
        }
        let order = topological_order(&graph);
        Ok(Self { graph, order })
    }

    /// Add edges on top of the current ones.
    pub fn extend(
        &self,
        edges: impl IntoIterator<Item = (Kind, Kind)>,
    ) -> Result<Self, ConfigError> {
        let existing = self.graph.all_edges().map(|(a, b, _)| (a, b)).collect::<Vec<_>>();
        Self::with_edges(existing.into_iter().chain(edges))
    }

    pub fn order(&self) -> &[Kind] {
        &self.order
    }

    /// Direct prerequisites of `kind`.
    pub fn prerequisites(&self, kind: Kind) -> BTreeSet<Kind> {
        self.graph
            .neighbors_directed(kind, Direction::Incoming)
            .collect()
    }

    /// True if `dependent` transitively depends on `prerequisite`.
    pub fn depends_on(&self, dependent: Kind, prerequisite: Kind) -> bool {
        let mut stack = vec![dependent];
        let mut seen = BTreeSet::new();
        while let Some(kind) = stack.pop() {
            for pre in self.graph.neighbors_directed(kind, Direction::Incoming) {
                if pre == prerequisite {
                    return true;
                }
                if seen.insert(pre) {
                    stack.push(pre);
                }
            }
        }
        false
    }
}

fn build_graph(edges: impl IntoIterator<Item = (Kind, Kind)>) -> DiGraphMap<Kind, ()> {
    let mut graph = DiGraphMap::new();
    for kind in Kind::ALL {
        graph.add_node(kind);
    }
    for (from, to) in edges {
        graph.add_edge(from, to, ());
    }
    graph
}

fn find_cycle_member(graph: &DiGraphMap<Kind, ()>) -> Option<Kind> {
    if !is_cyclic_directed(graph) {
        return None;
    }
    match petgraph::algo::toposort(graph, None) {
        Err(cycle) => Some(cycle.node_id()),
        Ok(_) => None,
    }
}

/// Kahn's algorithm, always taking the smallest ready kind so the order is
/// deterministic.
fn topological_order(graph: &DiGraphMap<Kind, ()>) -> Vec<Kind> {
    let mut remaining = graph
        .nodes()
        .map(|k| (k, graph.neighbors_directed(k, Direction::Incoming).count()))
        .collect::<std::collections::BTreeMap<_, _>>();
    let mut ready = remaining
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(k, _)| *k)
        .collect::<BTreeSet<_>>();
    let mut order = Vec::with_capacity(remaining.len());
    while let Some(kind) = ready.pop_first() {
        remaining.remove(&kind);
        order.push(kind);
        for next in graph.neighbors_directed(kind, Direction::Outgoing) {
            if let Some(deg) = remaining.get_mut(&next) {
                *deg -= 1;
                if *deg == 0 {
                    ready.insert(next);
                }
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_order_matches_fixed_order() {
        let graph = DependencyGraph::standard();
        assert_eq!(
            graph.order(),
            &[
                Kind::Keyspace,
                Kind::Type,
                Kind::Table,
                Kind::Index,
                Kind::User,
                Kind::Permission
            ]
        );
        assert_eq!(ordered_kinds(), graph.order());
    }

    #[test]
    fn computed_order_matches_the_static_one() {
        let computed = DependencyGraph::with_edges(KIND_EDGES).unwrap();
        assert_eq!(computed.order(), ordered_kinds());
    }

    #[test]
    fn every_edge_is_respected() {
        let order = ordered_kinds();
        for (from, to) in KIND_EDGES {
            let a = order.iter().position(|k| *k == from).unwrap();
            let b = order.iter().position(|k| *k == to).unwrap();
            assert!(a < b, "{from} must precede {to}");
        }
    }

    #[test]
    fn extension_introducing_cycle_is_rejected() {
        let err = DependencyGraph::standard()
            .extend([(Kind::Permission, Kind::Keyspace)])
            .unwrap_err();
        assert!(matches!(err, ConfigError::DependencyCycle { .. }));
    }

    #[test]
    fn acyclic_extension_is_accepted() {
        let graph = DependencyGraph::standard()
            .extend([(Kind::Type, Kind::Index)])
            .unwrap();
        assert!(graph.prerequisites(Kind::Index).contains(&Kind::Type));
        assert_eq!(graph.order(), ordered_kinds());
    }

    #[test]
    fn type_and_index_are_only_transitively_related() {
        let graph = DependencyGraph::standard();
        assert!(!graph.prerequisites(Kind::Index).contains(&Kind::Type));
        assert!(graph.depends_on(Kind::Index, Kind::Type));
        assert!(graph.depends_on(Kind::Permission, Kind::User));
        assert!(!graph.depends_on(Kind::Keyspace, Kind::Permission));
    }

    #[test]
    fn const_check_rejects_inconsistent_order() {
        let reversed = [
            Kind::Permission,
            Kind::User,
            Kind::Index,
            Kind::Table,
            Kind::Type,
            Kind::Keyspace,
        ];
        assert!(!order_respects_edges(&reversed, &KIND_EDGES));
        assert!(order_respects_edges(&KIND_ORDER, &KIND_EDGES));
    }
}
