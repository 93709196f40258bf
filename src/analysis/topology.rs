//! Structural analysis over a validated definition.
//!
//! Builds a petgraph digraph of the node wiring and answers the questions
//! the engine and validator ask about it: reachability closures and
//! cascade-risk cycle detection.

use crate::graph::{GraphDefinition, NodeId, NodeKind};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};

/// A directed view of the wiring between nodes, independent of port names.
pub struct Topology {
    graph: DiGraph<NodeId, ()>,
    index: HashMap<NodeId, NodeIndex>,
}

impl Topology {
    pub fn build(def: &GraphDefinition) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for node in def.nodes() {
            let ix = graph.add_node(node.id().clone());
            index.insert(node.id().clone(), ix);
        }
        for node in def.nodes() {
            let from = index[node.id()];
            for target in node.all_targets() {
                // Dangling targets are a validation error; tolerate them
                // here so analysis can run on unvalidated drafts too.
                if let Some(&to) = index.get(&target.node) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        Self { graph, index }
    }

    /// All nodes reachable by following edges forward from the start set,
    /// including the start nodes themselves.
    pub fn downstream_of(&self, start: &[NodeId]) -> HashSet<NodeId> {
        self.closure(start, petgraph::Direction::Outgoing)
    }

    /// All nodes reachable by following edges backward from the start set,
    /// including the start nodes themselves.
    pub fn upstream_of(&self, start: &[NodeId]) -> HashSet<NodeId> {
        self.closure(start, petgraph::Direction::Incoming)
    }

    fn closure(&self, start: &[NodeId], dir: petgraph::Direction) -> HashSet<NodeId> {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = start
            .iter()
            .filter_map(|id| self.index.get(id))
            .copied()
            .collect();

        while let Some(ix) = queue.pop_front() {
            if visited.insert(self.graph[ix].clone()) {
                for next in self.graph.neighbors_directed(ix, dir) {
                    queue.push_back(next);
                }
            }
        }
        visited
    }

    /// Cycles consisting purely of Process nodes.
    ///
    /// Every other kind gates token movement on the tick clock; a cycle of
    /// nothing but Process nodes re-fires synchronously and can only be
    /// stopped by the cascade iteration cap, so the validator surfaces
    /// these as warnings.
    pub fn ungated_process_cycles(&self, def: &GraphDefinition) -> Vec<Vec<NodeId>> {
        let mut cycles = Vec::new();

        for component in tarjan_scc(&self.graph) {
            let is_cycle = component.len() > 1
                || component
                    .first()
                    .map(|&ix| self.graph.find_edge(ix, ix).is_some())
                    .unwrap_or(false);
            if !is_cycle {
                continue;
            }

            let all_process = component
                .iter()
                .all(|&ix| def.kind_of(&self.graph[ix]) == Some(NodeKind::Process));
            if all_process {
                let mut ids: Vec<NodeId> =
                    component.iter().map(|&ix| self.graph[ix].clone()).collect();
                ids.sort();
                cycles.push(ids);
            }
        }

        cycles.sort();
        cycles
    }
}
