//! Topological ordering and cycle detection
//!
//! Depth-first traversal over dependencies with an explicit recursion stack.
//! A dependency that is still on the stack when revisited closes a cycle; the
//! cycle is reported as the stack slice starting at that dependency, which is
//! the order the traversal encountered its members. A namespace requiring
//! itself has no self edge in the graph and is reported as a one-member cycle
//! when first entered. Roots and dependencies are visited in name order so
//! results are reproducible.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use super::graph::{DependencyGraph, GraphError};
use super::name::NamespaceName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Active,
    Done,
}

struct Frame {
    name: NamespaceName,
    deps: Vec<NamespaceName>,
    next: usize,
}

/// Result of ordering a graph that may contain cycles
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopoPartition {
    /// Load order of every namespace not affected by a cycle
    pub order: Vec<NamespaceName>,

    /// Each cycle found, members in encounter order
    pub cycles: Vec<Vec<NamespaceName>>,

    /// Cycle members and everything depending on them
    pub blocked: BTreeSet<NamespaceName>,
}

impl TopoPartition {
    /// Returns true if the graph had no cycles
    pub fn is_acyclic(&self) -> bool {
        self.cycles.is_empty()
    }

    /// Cycles whose blocked component contains `name`
    pub fn cycles_blocking(&self, graph: &DependencyGraph, name: &NamespaceName) -> Vec<&Vec<NamespaceName>> {
        self.cycles
            .iter()
            .filter(|cycle| {
                cycle.contains(name) || graph.transitive_dependents(cycle.iter()).contains(name)
            })
            .collect()
    }
}

/// Walks the graph, calling `on_cycle` for every back edge.
/// Returning `false` from `on_cycle` stops the walk.
fn walk(
    graph: &DependencyGraph,
    mut on_cycle: impl FnMut(Vec<NamespaceName>) -> bool,
) -> Vec<NamespaceName> {
    let mut marks: HashMap<NamespaceName, Mark> = HashMap::new();
    let mut order = Vec::with_capacity(graph.len());
    let mut stack: Vec<Frame> = Vec::new();

    for root in graph.names() {
        if marks.contains_key(root) {
            continue;
        }

        marks.insert(root.clone(), Mark::Active);
        if graph.requires_itself(root) && !on_cycle(vec![root.clone()]) {
            return order;
        }
        stack.push(Frame {
            name: root.clone(),
            deps: graph.dependencies(root),
            next: 0,
        });

        while let Some(frame) = stack.last_mut() {
            if frame.next < frame.deps.len() {
                let dep = frame.deps[frame.next].clone();
                frame.next += 1;

                match marks.get(&dep).copied() {
                    None => {
                        marks.insert(dep.clone(), Mark::Active);
                        if graph.requires_itself(&dep) && !on_cycle(vec![dep.clone()]) {
                            return order;
                        }
                        let deps = graph.dependencies(&dep);
                        stack.push(Frame { name: dep, deps, next: 0 });
                    }
                    Some(Mark::Active) => {
                        let start = stack.iter().position(|f| f.name == dep).unwrap_or(0);
                        let cycle = stack[start..].iter().map(|f| f.name.clone()).collect();
                        if !on_cycle(cycle) {
                            return order;
                        }
                    }
                    Some(Mark::Done) => {}
                }
            } else if let Some(frame) = stack.pop() {
                marks.insert(frame.name.clone(), Mark::Done);
                order.push(frame.name);
            }
        }
    }

    order
}

/// Returns all namespaces with every dependency before its dependents
///
/// Fails on the first cycle found.
pub fn topological_order(graph: &DependencyGraph) -> Result<Vec<NamespaceName>, GraphError> {
    let mut found = None;
    let order = walk(graph, |cycle| {
        found = Some(cycle);
        false
    });

    match found {
        Some(cycle) => {
            tracing::debug!(cycle = ?cycle, "cycle detected");
            Err(GraphError::CyclicDependency { cycle })
        }
        None => Ok(order),
    }
}

/// Orders the acyclic part of the graph and reports every cycle
///
/// A cycle only blocks its own members and their dependents; the rest of the
/// graph is still ordered.
pub fn partition(graph: &DependencyGraph) -> TopoPartition {
    let mut cycles = Vec::new();
    let full = walk(graph, |cycle| {
        cycles.push(cycle);
        true
    });

    let mut blocked: BTreeSet<NamespaceName> = cycles.iter().flatten().cloned().collect();
    let dependents = graph.transitive_dependents(blocked.iter());
    blocked.extend(dependents);

    let order = full.into_iter().filter(|n| !blocked.contains(n)).collect();

    if !cycles.is_empty() {
        tracing::warn!(cycles = cycles.len(), blocked = blocked.len(), "dependency cycles found");
    }

    TopoPartition { order, cycles, blocked }
}

/// Returns every cycle in the graph
pub fn find_cycles(graph: &DependencyGraph) -> Vec<Vec<NamespaceName>> {
    partition(graph).cycles
}

impl DependencyGraph {
    /// Returns all namespaces in topological order (dependencies before dependents)
    pub fn topological_order(&self) -> Result<Vec<NamespaceName>, GraphError> {
        topological_order(self)
    }
}
