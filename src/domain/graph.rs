//! Dependency graph for namespaces
//!
//! Built from scanned source units. Each tracked namespace is a node; an edge
//! runs from a dependency to its dependent. Requires naming namespaces that no
//! tracked unit provides (library namespaces) are kept on the unit but produce
//! no edge. Uses petgraph for graph storage.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use thiserror::Error;

use super::name::NamespaceName;
use super::node::{Fingerprint, SourceUnit};
use super::source::{SourceError, SourceProvider};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Duplicate namespace {name}: declared in {} and {}", first.display(), second.display())]
    DuplicateNamespace {
        name: NamespaceName,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Cyclic dependency: {}", format_cycle(cycle))]
    CyclicDependency { cycle: Vec<NamespaceName> },

    #[error("Namespace not found: {0}")]
    NamespaceNotFound(NamespaceName),
}

impl GraphError {
    /// Namespace names the error is about
    pub fn namespaces(&self) -> Vec<NamespaceName> {
        match self {
            GraphError::Source(_) => vec![],
            GraphError::DuplicateNamespace { name, .. } => vec![name.clone()],
            GraphError::CyclicDependency { cycle } => cycle.clone(),
            GraphError::NamespaceNotFound(name) => vec![name.clone()],
        }
    }
}

/// Renders a cycle as `a -> b -> a`
pub fn format_cycle(cycle: &[NamespaceName]) -> String {
    let mut parts: Vec<&str> = cycle.iter().map(|n| n.as_str()).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.as_str());
    }
    parts.join(" -> ")
}

/// A dependency graph over tracked namespaces
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    /// The underlying directed graph (dependency -> dependent)
    graph: DiGraph<NamespaceName, ()>,

    /// Map from namespace name to node index
    node_map: HashMap<NamespaceName, NodeIndex>,

    /// Source unit each namespace was built from
    units: BTreeMap<NamespaceName, SourceUnit>,

    /// Namespace declared by each unit path
    paths: HashMap<PathBuf, NamespaceName>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans a provider and builds the graph from every unit it lists
    ///
    /// Any unreadable or malformed unit aborts the build.
    pub fn from_provider(provider: &dyn SourceProvider) -> Result<Self, GraphError> {
        let units = provider.read_all()?;
        Self::build(units)
    }

    /// Builds a graph from scanned units
    ///
    /// Fails when two units declare the same namespace; no partial graph is
    /// returned. A unit requiring itself gets no self edge and is reported as
    /// a one-member cycle by the topological tracker.
    pub fn build(units: impl IntoIterator<Item = SourceUnit>) -> Result<Self, GraphError> {
        let mut graph = Self::new();

        // First pass: add all nodes
        for unit in units {
            let name = unit.decl.name.clone();
            if let Some(existing) = graph.units.get(&name) {
                let (first, second) = if existing.path <= unit.path {
                    (existing.path.clone(), unit.path.clone())
                } else {
                    (unit.path.clone(), existing.path.clone())
                };
                return Err(GraphError::DuplicateNamespace { name, first, second });
            }
            let idx = graph.graph.add_node(name.clone());
            graph.node_map.insert(name.clone(), idx);
            graph.paths.insert(unit.path.clone(), name.clone());
            graph.units.insert(name, unit);
        }

        // Second pass: add edges between tracked namespaces
        let mut edges = Vec::new();
        for (name, unit) in &graph.units {
            let dependent = graph.node_map[name];
            for dep in unit.decl.requires() {
                if &dep == name {
                    continue;
                }
                if let Some(&dependency) = graph.node_map.get(&dep) {
                    edges.push((dependency, dependent));
                }
            }
        }
        for (from, to) in edges {
            graph.graph.add_edge(from, to, ());
        }

        tracing::debug!(
            namespaces = graph.len(),
            edges = graph.graph.edge_count(),
            "built dependency graph"
        );

        Ok(graph)
    }

    /// Returns the direct tracked dependencies of a namespace, in name order
    pub fn dependencies(&self, name: &NamespaceName) -> Vec<NamespaceName> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Returns the direct dependents of a namespace, in name order
    pub fn dependents(&self, name: &NamespaceName) -> Vec<NamespaceName> {
        self.neighbors(name, Direction::Outgoing)
    }

    fn neighbors(&self, name: &NamespaceName, direction: Direction) -> Vec<NamespaceName> {
        let idx = match self.node_map.get(name) {
            Some(idx) => *idx,
            None => return vec![],
        };

        let mut out: Vec<_> = self
            .graph
            .neighbors_directed(idx, direction)
            .filter_map(|idx| self.graph.node_weight(idx).cloned())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Returns every namespace that transitively depends on any of `names`
    ///
    /// The seeds themselves are not included unless one depends on another.
    pub fn transitive_dependents<'a>(
        &self,
        names: impl IntoIterator<Item = &'a NamespaceName>,
    ) -> BTreeSet<NamespaceName> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<NamespaceName> = names.into_iter().cloned().collect();

        while let Some(name) = queue.pop_front() {
            for dependent in self.dependents(&name) {
                if seen.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }

        seen
    }

    /// Returns requires that no tracked unit provides
    pub fn external_dependencies(&self, name: &NamespaceName) -> BTreeSet<NamespaceName> {
        match self.units.get(name) {
            Some(unit) => unit
                .decl
                .requires()
                .into_iter()
                .filter(|dep| !self.node_map.contains_key(dep))
                .collect(),
            None => BTreeSet::new(),
        }
    }

    /// Returns true if the namespace lists itself among its requires
    pub fn requires_itself(&self, name: &NamespaceName) -> bool {
        self.units
            .get(name)
            .is_some_and(|unit| unit.decl.requires().contains(name))
    }

    /// Returns the source unit for a namespace
    pub fn unit(&self, name: &NamespaceName) -> Option<&SourceUnit> {
        self.units.get(name)
    }

    /// Returns the namespace declared by the unit at `path`
    pub fn name_for_path(&self, path: &Path) -> Option<&NamespaceName> {
        self.paths.get(path)
    }

    /// Returns every unit's fingerprint keyed by path
    pub fn fingerprints(&self) -> BTreeMap<PathBuf, Fingerprint> {
        self.units
            .values()
            .map(|unit| (unit.path.clone(), unit.fingerprint.clone()))
            .collect()
    }

    /// Returns all edges as (dependent, dependency) pairs, sorted
    pub fn edges(&self) -> Vec<(NamespaceName, NamespaceName)> {
        let mut edges: Vec<_> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .filter_map(|(dep, dependent)| {
                Some((
                    self.graph.node_weight(dependent)?.clone(),
                    self.graph.node_weight(dep)?.clone(),
                ))
            })
            .collect();
        edges.sort();
        edges
    }

    /// Returns true if the graph contains the namespace
    pub fn contains(&self, name: &NamespaceName) -> bool {
        self.node_map.contains_key(name)
    }

    /// Returns the number of namespaces in the graph
    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    /// Returns true if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }

    /// Returns all namespace names in order
    pub fn names(&self) -> impl Iterator<Item = &NamespaceName> {
        self.units.keys()
    }

    /// Returns all source units in name order
    pub fn units(&self) -> impl Iterator<Item = &SourceUnit> {
        self.units.values()
    }
}
