//! Compiled dependency graph.
//!
//! Vertices wrap resolved descriptors; edges point from a dependency to
//! its dependent, so topological order processes upstream descriptors
//! first. The same structure doubles as the shared cycle-detection graph
//! during import resolution, keyed by resolved source.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::descriptor::File;
use crate::error::{CompileError, CompileResult};

/// One vertex of a compiled graph: a resolved descriptor plus its private
/// working directory. The root vertex has no directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledVertex {
    pub file: Arc<File>,

    /// Data root for this dependency's fetched copy. `None` for the root
    /// vertex.
    pub dir: Option<PathBuf>,

    /// Display name, used in cycle chains and progress output.
    pub name: String,
}

/// A directed graph of [`CompiledVertex`] entries keyed by resolved source.
#[derive(Debug, Default)]
pub struct DepGraph {
    graph: StableDiGraph<CompiledVertex, ()>,
    by_key: HashMap<String, NodeIndex>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex under `key`, returning the existing index if the key
    /// is already present.
    pub fn add(&mut self, key: &str, vertex: CompiledVertex) -> NodeIndex {
        if let Some(&idx) = self.by_key.get(key) {
            return idx;
        }
        let idx = self.graph.add_node(vertex);
        self.by_key.insert(key.to_string(), idx);
        idx
    }

    pub fn get(&self, key: &str) -> Option<NodeIndex> {
        self.by_key.get(key).copied()
    }

    /// Connect `from` to `to` (from must be processed before to). Parallel
    /// edges are collapsed.
    pub fn connect(&mut self, from: NodeIndex, to: NodeIndex) {
        if !self.graph.contains_edge(from, to) {
            self.graph.add_edge(from, to, ());
        }
    }

    /// Return the vertex names of a cycle, if any exists.
    pub fn cycle_chain(&self) -> Option<Vec<String>> {
        for scc in petgraph::algo::tarjan_scc(&self.graph) {
            let cyclic = scc.len() > 1
                || (scc.len() == 1 && self.graph.contains_edge(scc[0], scc[0]));
            if cyclic {
                let mut chain: Vec<String> = scc
                    .iter()
                    .filter_map(|&idx| self.graph.node_weight(idx).map(|v| v.name.clone()))
                    .collect();
                chain.sort();
                return Some(chain);
            }
        }
        None
    }

    /// Fail with a descriptive cycle error if the graph has a cycle.
    pub fn check_cycles(&self) -> CompileResult<()> {
        match self.cycle_chain() {
            Some(chain) => Err(CompileError::CycleDetected { chain }),
            None => Ok(()),
        }
    }

    /// Validate the compiled shape: acyclic, with `root` the single sink
    /// reachable from every other vertex via dependency edges.
    pub fn validate(&self, root: NodeIndex) -> CompileResult<()> {
        self.check_cycles()
            .map_err(|e| CompileError::GraphValidation(e.to_string()))?;

        if self
            .graph
            .neighbors_directed(root, Direction::Outgoing)
            .next()
            .is_some()
        {
            return Err(CompileError::GraphValidation(
                "root vertex has a dependent".into(),
            ));
        }

        for idx in self.graph.node_indices() {
            if idx == root {
                continue;
            }
            if !petgraph::algo::has_path_connecting(&self.graph, idx, root, None) {
                let name = self
                    .graph
                    .node_weight(idx)
                    .map(|v| v.name.clone())
                    .unwrap_or_default();
                return Err(CompileError::GraphValidation(format!(
                    "vertex '{}' cannot reach the root",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn vertex(&self, idx: NodeIndex) -> Option<&CompiledVertex> {
        self.graph.node_weight(idx)
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn vertices(&self) -> impl Iterator<Item = (NodeIndex, &CompiledVertex)> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx).map(|v| (idx, v)))
    }

    /// Indices whose work must finish before `idx` may start.
    pub fn dependencies_of(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .collect()
    }

    /// Indices unblocked by the completion of `idx`.
    pub fn dependents_of(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect()
    }

    /// Dependency-order listing of all vertices. `None` if cyclic.
    pub fn topo_order(&self) -> Option<Vec<NodeIndex>> {
        petgraph::algo::toposort(&self.graph, None).ok()
    }

    pub(crate) fn export(&self) -> (Vec<(String, CompiledVertex)>, Vec<(usize, usize)>) {
        let mut order: Vec<(&String, NodeIndex)> =
            self.by_key.iter().map(|(k, &v)| (k, v)).collect();
        order.sort_by(|a, b| a.0.cmp(b.0));
        let pos: HashMap<NodeIndex, usize> =
            order.iter().enumerate().map(|(i, (_, idx))| (*idx, i)).collect();

        let vertices = order
            .iter()
            .map(|(k, idx)| ((*k).clone(), self.graph[*idx].clone()))
            .collect();
        let edges = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (pos[&a], pos[&b]))
            .collect();
        (vertices, edges)
    }

    pub(crate) fn import(
        vertices: Vec<(String, CompiledVertex)>,
        edges: Vec<(usize, usize)>,
    ) -> CompileResult<(Self, Vec<NodeIndex>)> {
        let mut graph = DepGraph::new();
        let mut indices = Vec::with_capacity(vertices.len());
        for (key, vertex) in vertices {
            indices.push(graph.add(&key, vertex));
        }
        for (a, b) in edges {
            let (&from, &to) = (
                indices.get(a).ok_or_else(bad_edge)?,
                indices.get(b).ok_or_else(bad_edge)?,
            );
            graph.connect(from, to);
        }
        Ok((graph, indices))
    }
}

fn bad_edge() -> CompileError {
    CompileError::Persist("edge references unknown vertex".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(name: &str) -> CompiledVertex {
        CompiledVertex {
            file: Arc::new(File::default()),
            dir: None,
            name: name.into(),
        }
    }

    #[test]
    fn test_add_is_idempotent_per_key() {
        let mut g = DepGraph::new();
        let a = g.add("x", vertex("x"));
        let b = g.add("x", vertex("x"));
        assert_eq!(a, b);
        assert_eq!(g.vertex_count(), 1);
    }

    #[test]
    fn test_cycle_chain_names_vertices() {
        let mut g = DepGraph::new();
        let x = g.add("x", vertex("x"));
        let y = g.add("y", vertex("y"));
        g.connect(x, y);
        assert!(g.check_cycles().is_ok());

        g.connect(y, x);
        match g.check_cycles() {
            Err(CompileError::CycleDetected { chain }) => {
                assert_eq!(chain, vec!["x".to_string(), "y".to_string()]);
            }
            other => panic!("expected CycleDetected, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_single_root() {
        let mut g = DepGraph::new();
        let root = g.add("root", vertex("root"));
        let dep = g.add("dep", vertex("dep"));
        g.connect(dep, root);
        assert!(g.validate(root).is_ok());

        // A vertex with no path to the root is rejected.
        let orphan = g.add("orphan", vertex("orphan"));
        let err = g.validate(root).unwrap_err();
        assert!(err.to_string().contains("orphan"));
        let _ = orphan;
    }

    #[test]
    fn test_validate_rejects_root_with_dependent() {
        let mut g = DepGraph::new();
        let root = g.add("root", vertex("root"));
        let other = g.add("other", vertex("other"));
        g.connect(root, other);
        assert!(g.validate(root).is_err());
    }

    #[test]
    fn test_topo_order_puts_dependencies_first() {
        let mut g = DepGraph::new();
        let root = g.add("root", vertex("root"));
        let a = g.add("a", vertex("a"));
        let b = g.add("b", vertex("b"));
        g.connect(a, root);
        g.connect(b, root);
        g.connect(a, b);

        let order = g.topo_order().unwrap();
        let pos = |idx| order.iter().position(|&i| i == idx).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(b) < pos(root));
    }

    #[test]
    fn test_export_import_roundtrip() {
        let mut g = DepGraph::new();
        let root = g.add("root", vertex("root"));
        let dep = g.add("dep", vertex("dep"));
        g.connect(dep, root);

        let (vertices, edges) = g.export();
        let (restored, _) = DepGraph::import(vertices, edges).unwrap();
        assert_eq!(restored.vertex_count(), 2);
        let root2 = restored.get("root").unwrap();
        assert!(restored.validate(root2).is_ok());
    }
}
