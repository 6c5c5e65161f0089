//! Inspection commands (check, graph, order, status)
//!
//! `check`, `graph` and `order` work on a fresh scan of the source
//! directories. `status` reports the persisted tracker state.

use std::collections::BTreeSet;

use anyhow::Result;
use serde::Serialize;

use super::output::{join_names, Output};
use crate::domain::{format_cycle, partition, DependencyGraph, GraphError, LoadState, NamespaceName, Scope};
use crate::storage::Workspace;

fn scan(output: &Output, context: &str) -> Result<DependencyGraph> {
    let workspace = Workspace::open_current()?;
    let provider = workspace.provider()?;
    let graph = DependencyGraph::from_provider(&provider)?;
    output.verbose_ctx(context, &format!("Scanned {} namespace(s)", graph.len()));
    Ok(graph)
}

/// Reports dependency cycles; fails if any exist
pub fn check(output: &Output) -> Result<()> {
    let graph = scan(output, "check")?;
    let result = partition(&graph);

    if output.is_json() {
        output.data(&serde_json::json!({
            "namespaces": graph.len(),
            "cycles": result.cycles,
            "blocked": result.blocked,
        }));
    } else if result.is_acyclic() {
        println!("No cycles in {} namespace(s).", graph.len());
    } else {
        for cycle in &result.cycles {
            println!("Cyclic dependency: {}", format_cycle(cycle));
        }
        println!("Blocked: {}", join_names(&result.blocked));
    }

    if !result.is_acyclic() {
        anyhow::bail!("{} dependency cycle(s) found", result.cycles.len());
    }
    Ok(())
}

#[derive(Serialize)]
struct NodeView<'a> {
    name: &'a NamespaceName,
    path: String,
    requires: Vec<NamespaceName>,
    external: BTreeSet<NamespaceName>,
    dependents: Vec<NamespaceName>,
}

#[derive(Serialize)]
struct EdgeView {
    from: NamespaceName,
    to: NamespaceName,
}

/// Prints the whole graph
pub fn graph(output: &Output, dot: bool) -> Result<()> {
    let graph = scan(output, "graph")?;

    if dot {
        println!("digraph namespaces {{");
        for name in graph.names() {
            println!("  \"{}\";", name);
        }
        for (dependent, dependency) in graph.edges() {
            println!("  \"{}\" -> \"{}\";", dependent, dependency);
        }
        println!("}}");
        return Ok(());
    }

    if output.is_json() {
        let nodes: Vec<NodeView> = graph.names().map(|name| node_view(&graph, name)).collect();
        let edges: Vec<EdgeView> = graph
            .edges()
            .into_iter()
            .map(|(from, to)| EdgeView { from, to })
            .collect();
        output.data(&serde_json::json!({ "nodes": nodes, "edges": edges }));
        return Ok(());
    }

    if graph.is_empty() {
        println!("No namespaces found.");
        return Ok(());
    }

    for name in graph.names() {
        println!("{}", name);
        for dep in graph.dependencies(name) {
            println!("  -> {}", dep);
        }
        for dep in graph.external_dependencies(name) {
            println!("  -> {} (external)", dep);
        }
    }

    Ok(())
}

fn node_view<'a>(graph: &DependencyGraph, name: &'a NamespaceName) -> NodeView<'a> {
    NodeView {
        name,
        path: graph
            .unit(name)
            .map(|u| u.path.display().to_string())
            .unwrap_or_default(),
        requires: graph.dependencies(name),
        external: graph.external_dependencies(name),
        dependents: graph.dependents(name),
    }
}

/// Prints one namespace's neighbourhood
pub fn graph_of(output: &Output, name: &str) -> Result<()> {
    let graph = scan(output, "graph")?;
    let name: NamespaceName = name.parse()?;

    if !graph.contains(&name) {
        return Err(GraphError::NamespaceNotFound(name).into());
    }

    let affected = graph.transitive_dependents([&name]);

    if output.is_json() {
        output.data(&serde_json::json!({
            "node": node_view(&graph, &name),
            "affected": affected,
        }));
        return Ok(());
    }

    let view = node_view(&graph, &name);
    println!("{} ({})", name, view.path);
    println!("  requires:   {}", join_names(&view.requires));
    println!("  external:   {}", join_names(&view.external));
    println!("  dependents: {}", join_names(&view.dependents));
    println!("  reloads:    {}", join_names(&affected));

    Ok(())
}

/// Prints the load order; fails on a cycle
pub fn order(output: &Output) -> Result<()> {
    let graph = scan(output, "order")?;
    let order = graph.topological_order()?;

    if output.is_json() {
        output.data(&order);
    } else {
        for name in &order {
            println!("{}", name);
        }
    }

    Ok(())
}

/// Shows persisted load state, flagging units changed since the last refresh
pub fn status(output: &Output) -> Result<()> {
    let workspace = Workspace::open_current()?;
    let registry = workspace.state_store().load()?;

    // A failed scan only loses the stale column
    let stale: BTreeSet<NamespaceName> = match workspace
        .provider()
        .and_then(|provider| Ok(registry.prepare(&provider, Scope::Changed)?))
    {
        Ok(refresh) => refresh.plan.reload.iter().chain(refresh.plan.unload.iter()).cloned().collect(),
        Err(e) => {
            output.verbose_ctx("status", &format!("Scan failed: {:#}", e));
            BTreeSet::new()
        }
    };

    if output.is_json() {
        let items: Vec<_> = registry
            .nodes()
            .map(|node| {
                serde_json::json!({
                    "name": node.name,
                    "state": node.state,
                    "path": node.path,
                    "loaded_at": node.loaded_at,
                    "pending": registry.pending().contains(&node.name),
                    "stale": stale.contains(&node.name),
                })
            })
            .collect();
        output.data(&items);
        return Ok(());
    }

    if registry.is_empty() {
        println!("No namespaces tracked. Run 'nstools refresh' to load.");
        return Ok(());
    }

    println!("{:<32} {:<10} {:<6} PATH", "NAMESPACE", "STATE", "STALE");
    println!("{}", "-".repeat(72));
    for node in registry.nodes() {
        let marker = if registry.pending().contains(&node.name) || stale.contains(&node.name) {
            "yes"
        } else {
            ""
        };
        println!(
            "{:<32} {:<10} {:<6} {}",
            node.name.as_str(),
            node.state.as_str(),
            marker,
            node.path.display()
        );
    }

    let loaded = registry
        .nodes()
        .filter(|n| n.state == LoadState::Loaded)
        .count();
    println!();
    println!(
        "{} tracked, {} loaded, {} pending",
        registry.nodes().count(),
        loaded,
        registry.pending().len()
    );

    Ok(())
}
