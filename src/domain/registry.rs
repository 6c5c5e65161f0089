//! Namespace registry
//!
//! The tracker state for one runtime: the graph from the last scan, every
//! tracked node with its load state, and the namespaces still waiting for a
//! successful load. A refresh is split into a pure [`Registry::prepare`] step
//! (scan, diff, plan) and [`Registry::execute`], which drives the loader and
//! commits the new state.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::change::{detect_changes, ChangeSet};
use super::decl::NsDecl;
use super::graph::{DependencyGraph, GraphError};
use super::name::NamespaceName;
use super::node::{NamespaceNode, SourceUnit, StateError};
use super::reload::{self, BatchOutcome, CancelToken, LoadError, Loader, Operation, ReloadPlan};
use super::source::SourceProvider;
use super::topo;

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    State(#[from] StateError),
}

/// Which namespaces a refresh considers changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Only units whose fingerprint changed, plus pending namespaces
    #[default]
    Changed,
    /// Every tracked namespace
    All,
}

/// A planned refresh, ready to execute
#[derive(Debug, Clone)]
pub struct Refresh {
    graph: DependencyGraph,
    removed: BTreeSet<NamespaceName>,
    pub changes: ChangeSet,
    pub plan: ReloadPlan,
}

impl Refresh {
    /// The graph built from the scan
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Namespaces no longer provided by any source unit
    pub fn removed(&self) -> &BTreeSet<NamespaceName> {
        &self.removed
    }
}

/// What a refresh did
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    pub changes: ChangeSet,
    pub plan: ReloadPlan,
    pub outcome: BatchOutcome,
    /// Namespaces to retry on the next refresh
    pub pending: BTreeSet<NamespaceName>,
}

impl RefreshReport {
    /// Returns true if every affected namespace was reloaded
    pub fn is_success(&self) -> bool {
        self.outcome.is_complete() && self.plan.blocked.is_empty()
    }
}

/// What a teardown did
#[derive(Debug, Clone, Default, Serialize)]
pub struct TeardownReport {
    pub unloaded: Vec<NamespaceName>,
    pub skipped: Vec<NamespaceName>,
    pub errors: Vec<LoadError>,
}

/// One persisted node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(flatten)]
    pub node: NamespaceNode,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pending: bool,
}

/// Tracker state for one runtime
#[derive(Debug, Clone, Default)]
pub struct Registry {
    graph: DependencyGraph,
    nodes: BTreeMap<NamespaceName, NamespaceNode>,
    pending: BTreeSet<NamespaceName>,
}

impl Registry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a registry from persisted records
    pub fn restore(records: impl IntoIterator<Item = NodeRecord>) -> Result<Self, GraphError> {
        let mut nodes = BTreeMap::new();
        let mut pending = BTreeSet::new();

        for record in records {
            if record.pending {
                pending.insert(record.node.name.clone());
            }
            nodes.insert(record.node.name.clone(), record.node);
        }

        let graph = DependencyGraph::build(nodes.values().map(unit_of))?;
        Ok(Self { graph, nodes, pending })
    }

    /// Records for persistence, in name order
    pub fn snapshot(&self) -> Vec<NodeRecord> {
        self.nodes
            .values()
            .map(|node| NodeRecord {
                node: node.clone(),
                pending: self.pending.contains(&node.name),
            })
            .collect()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn node(&self, name: &NamespaceName) -> Option<&NamespaceNode> {
        self.nodes.get(name)
    }

    /// All tracked nodes in name order
    pub fn nodes(&self) -> impl Iterator<Item = &NamespaceNode> {
        self.nodes.values()
    }

    pub fn pending(&self) -> &BTreeSet<NamespaceName> {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Scans `provider` and plans a refresh without touching the registry
    ///
    /// Parse and duplicate-namespace errors abort here, so a failed scan never
    /// changes tracked state.
    pub fn prepare(&self, provider: &dyn SourceProvider, scope: Scope) -> Result<Refresh, RefreshError> {
        let graph = DependencyGraph::from_provider(provider)?;
        let changes = detect_changes(&self.graph.fingerprints(), &graph.fingerprints());

        let removed: BTreeSet<NamespaceName> = self
            .nodes
            .keys()
            .filter(|name| !graph.contains(name))
            .cloned()
            .collect();

        let mut changed: BTreeSet<NamespaceName> = match scope {
            Scope::All => graph.names().cloned().collect(),
            Scope::Changed => changes
                .touched()
                .filter_map(|path| graph.name_for_path(path))
                .cloned()
                .collect(),
        };
        changed.extend(self.pending.iter().filter(|n| graph.contains(n)).cloned());
        // Names with no node yet
        changed.extend(graph.names().filter(|n| !self.nodes.contains_key(*n)).cloned());

        let plan = reload::plan_reload(&self.graph, &graph, &changed, &removed);

        Ok(Refresh {
            graph,
            removed,
            changes,
            plan,
        })
    }

    /// Runs a prepared refresh and commits the result
    pub fn execute(
        &mut self,
        refresh: Refresh,
        loader: &mut dyn Loader,
        cancel: &CancelToken,
    ) -> Result<RefreshReport, RefreshError> {
        let Refresh {
            graph,
            removed,
            changes,
            plan,
        } = refresh;

        for unit in graph.units() {
            self.nodes
                .entry(unit.decl.name.clone())
                .and_modify(|node| node.update_from(unit))
                .or_insert_with(|| NamespaceNode::from_unit(unit));
        }

        let outcome = reload::execute(&plan, &mut self.nodes, loader, cancel)?;

        // Removed nodes are forgotten once unloaded, or at once if unload is disabled
        for name in &removed {
            let keep = self
                .nodes
                .get(name)
                .is_some_and(|n| n.state.is_resident() && n.unload);
            if !keep {
                self.nodes.remove(name);
            }
        }

        let mut pending: BTreeSet<NamespaceName> = outcome.not_reached.iter().cloned().collect();
        if let Some(error) = &outcome.error {
            if error.operation == Operation::Load {
                pending.insert(error.namespace.clone());
            }
        }
        pending.extend(plan.blocked.iter().cloned());
        pending.retain(|name| graph.contains(name));

        if !pending.is_empty() {
            tracing::info!(pending = pending.len(), "namespaces left for next refresh");
        }

        self.graph = graph;
        self.pending = pending.clone();

        Ok(RefreshReport {
            changes,
            plan,
            outcome,
            pending,
        })
    }

    /// Reloads changed namespaces and their dependents
    pub fn refresh(
        &mut self,
        provider: &dyn SourceProvider,
        loader: &mut dyn Loader,
        cancel: &CancelToken,
    ) -> Result<RefreshReport, RefreshError> {
        let refresh = self.prepare(provider, Scope::Changed)?;
        self.execute(refresh, loader, cancel)
    }

    /// Reloads every namespace
    pub fn refresh_all(
        &mut self,
        provider: &dyn SourceProvider,
        loader: &mut dyn Loader,
        cancel: &CancelToken,
    ) -> Result<RefreshReport, RefreshError> {
        let refresh = self.prepare(provider, Scope::All)?;
        self.execute(refresh, loader, cancel)
    }

    /// Forgets all tracked state without calling the loader
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Unloads every resident namespace, dependents first, then clears state
    ///
    /// Keeps going past unload failures and reports them.
    pub fn teardown(&mut self, loader: &mut dyn Loader) -> TeardownReport {
        let mut report = TeardownReport::default();

        for name in self.teardown_order() {
            let Some(node) = self.nodes.get_mut(&name) else {
                continue;
            };
            if !node.state.is_resident() {
                continue;
            }
            if !node.unload {
                report.skipped.push(name);
                continue;
            }

            match loader.unload(node) {
                Ok(()) => {
                    report.unloaded.push(name);
                }
                Err(e) => {
                    let error = LoadError {
                        namespace: name,
                        operation: Operation::Unload,
                        message: format!("{:#}", e),
                    };
                    tracing::warn!(%error, "teardown unload failed");
                    report.errors.push(error);
                }
            }
        }

        self.clear();
        report
    }

    /// Dependents before dependencies; untracked and cyclic names first
    fn teardown_order(&self) -> Vec<NamespaceName> {
        let partition = topo::partition(&self.graph);

        let mut order: Vec<NamespaceName> = self
            .nodes
            .keys()
            .filter(|n| !self.graph.contains(n))
            .cloned()
            .collect();
        order.extend(partition.blocked.iter().rev().cloned());
        order.extend(partition.order.into_iter().rev());
        order
    }
}

fn unit_of(node: &NamespaceNode) -> SourceUnit {
    let mut decl = NsDecl::new(node.name.clone(), node.requires.iter().cloned());
    decl.reload = node.reload;
    decl.unload = node.unload;
    SourceUnit::new(node.path.clone(), decl, node.fingerprint.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::LoadState;
    use crate::domain::reload::testing::RecordingLoader;
    use crate::domain::source::MemoryProvider;

    fn name(s: &str) -> NamespaceName {
        NamespaceName::new(s).unwrap()
    }

    fn abc() -> MemoryProvider {
        let mut provider = MemoryProvider::new();
        provider.insert("src/a.clj", "(ns a)");
        provider.insert("src/b.clj", "(ns b (:require [a :as x]))");
        provider.insert("src/c.clj", "(ns c (:require b))");
        provider
    }

    fn refreshed(provider: &MemoryProvider) -> (Registry, RecordingLoader) {
        let mut registry = Registry::new();
        let mut loader = RecordingLoader::default();
        registry.refresh(provider, &mut loader, &CancelToken::new()).unwrap();
        (registry, loader)
    }

    #[test]
    fn first_refresh_loads_everything_in_order() {
        let (registry, loader) = refreshed(&abc());
        assert_eq!(loader.loads(), vec!["a", "b", "c"]);
        assert!(loader.unloads().is_empty());
        assert!(registry.nodes().all(|n| n.state == LoadState::Loaded));
        assert!(registry.pending().is_empty());
    }

    #[test]
    fn second_refresh_without_changes_loads_nothing() {
        let provider = abc();
        let (mut registry, _) = refreshed(&provider);

        let mut loader = RecordingLoader::default();
        let report = registry.refresh(&provider, &mut loader, &CancelToken::new()).unwrap();

        assert!(loader.calls.is_empty());
        assert!(report.changes.is_empty());
        assert!(report.plan.is_empty());
        assert!(report.is_success());
    }

    #[test]
    fn modified_unit_reloads_dependents() {
        let mut provider = abc();
        let (mut registry, _) = refreshed(&provider);

        provider.insert("src/b.clj", "(ns b (:require a))\n(def v 2)");
        let mut loader = RecordingLoader::default();
        let report = registry.refresh(&provider, &mut loader, &CancelToken::new()).unwrap();

        assert_eq!(loader.unloads(), vec!["c", "b"]);
        assert_eq!(loader.loads(), vec!["b", "c"]);
        assert_eq!(report.changes.modified.len(), 1);
    }

    #[test]
    fn refresh_all_reloads_everything() {
        let provider = abc();
        let (mut registry, _) = refreshed(&provider);

        let mut loader = RecordingLoader::default();
        registry.refresh_all(&provider, &mut loader, &CancelToken::new()).unwrap();

        assert_eq!(loader.unloads(), vec!["c", "b", "a"]);
        assert_eq!(loader.loads(), vec!["a", "b", "c"]);
    }

    #[test]
    fn parse_error_leaves_state_unchanged() {
        let mut provider = abc();
        let (mut registry, _) = refreshed(&provider);
        let before = registry.snapshot();

        provider.insert("src/b.clj", "(ns b (:require [a)");
        let mut loader = RecordingLoader::default();
        let err = registry
            .refresh(&provider, &mut loader, &CancelToken::new())
            .unwrap_err();

        assert!(matches!(err, RefreshError::Graph(GraphError::Source(_))));
        assert!(loader.calls.is_empty());
        assert_eq!(registry.snapshot(), before);
    }

    #[test]
    fn duplicate_namespace_rejected() {
        let mut provider = abc();
        provider.insert("src/other/a.clj", "(ns a)");

        let mut registry = Registry::new();
        let mut loader = RecordingLoader::default();
        let err = registry
            .refresh(&provider, &mut loader, &CancelToken::new())
            .unwrap_err();

        match err {
            RefreshError::Graph(GraphError::DuplicateNamespace { name: dup, .. }) => assert_eq!(dup, name("a")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn failed_load_is_retried_with_unreached() {
        let provider = abc();
        let mut registry = Registry::new();
        let mut loader = RecordingLoader {
            fail_load: BTreeSet::from(["b".to_string()]),
            ..Default::default()
        };

        let report = registry.refresh(&provider, &mut loader, &CancelToken::new()).unwrap();
        assert!(!report.is_success());
        assert_eq!(report.pending, BTreeSet::from([name("b"), name("c")]));
        assert_eq!(registry.node(&name("b")).map(|n| n.state), Some(LoadState::Error));

        let mut loader = RecordingLoader::default();
        let report = registry.refresh(&provider, &mut loader, &CancelToken::new()).unwrap();
        assert!(report.changes.is_empty());
        assert_eq!(loader.unloads(), vec!["b"]);
        assert_eq!(loader.loads(), vec!["b", "c"]);
        assert!(registry.pending().is_empty());
    }

    #[test]
    fn removed_unit_is_unloaded_and_forgotten() {
        let mut provider = abc();
        let (mut registry, _) = refreshed(&provider);

        provider.remove("src/c.clj");
        let mut loader = RecordingLoader::default();
        let report = registry.refresh(&provider, &mut loader, &CancelToken::new()).unwrap();

        assert_eq!(loader.unloads(), vec!["c"]);
        assert!(loader.loads().is_empty());
        assert_eq!(report.changes.removed.len(), 1);
        assert!(registry.node(&name("c")).is_none());
    }

    #[test]
    fn removed_unload_disabled_unit_is_forgotten_without_unload() {
        let mut provider = abc();
        provider.insert(
            "src/c.clj",
            "(ns ^{:clojure.tools.namespace.repl/unload false} c (:require b))",
        );
        let (mut registry, _) = refreshed(&provider);
        assert!(!registry.node(&name("c")).unwrap().unload);

        provider.remove("src/c.clj");
        let mut loader = RecordingLoader::default();
        let report = registry.refresh(&provider, &mut loader, &CancelToken::new()).unwrap();

        assert!(loader.calls.is_empty());
        assert!(report.is_success());
        assert!(registry.node(&name("c")).is_none());
    }

    #[test]
    fn self_require_blocks_only_itself() {
        let mut provider = MemoryProvider::new();
        provider.insert("src/a.clj", "(ns a)");
        provider.insert("src/b.clj", "(ns b (:require a))");
        provider.insert("src/s.clj", "(ns s (:require s))");

        let mut registry = Registry::new();
        let mut loader = RecordingLoader::default();
        let report = registry.refresh(&provider, &mut loader, &CancelToken::new()).unwrap();

        assert_eq!(loader.loads(), vec!["a", "b"]);
        assert_eq!(report.plan.cycles, vec![vec![name("s")]]);
        assert_eq!(report.pending, BTreeSet::from([name("s")]));
        assert!(!report.is_success());
        assert_eq!(registry.node(&name("s")).unwrap().state, LoadState::Unloaded);
    }

    #[test]
    fn cycle_blocks_component_and_stays_pending() {
        let mut provider = abc();
        provider.insert("src/x.clj", "(ns x (:require y))");
        provider.insert("src/y.clj", "(ns y (:require x))");

        let mut registry = Registry::new();
        let mut loader = RecordingLoader::default();
        let report = registry.refresh(&provider, &mut loader, &CancelToken::new()).unwrap();

        assert_eq!(loader.loads(), vec!["a", "b", "c"]);
        assert_eq!(report.plan.cycles.len(), 1);
        assert!(!report.is_success());
        assert_eq!(report.pending, BTreeSet::from([name("x"), name("y")]));

        provider.insert("src/y.clj", "(ns y)");
        let mut loader = RecordingLoader::default();
        registry.refresh(&provider, &mut loader, &CancelToken::new()).unwrap();
        assert_eq!(loader.loads(), vec!["y", "x"]);
        assert!(registry.pending().is_empty());
    }

    #[test]
    fn snapshot_round_trip_keeps_pending() {
        let provider = abc();
        let mut registry = Registry::new();
        let mut loader = RecordingLoader {
            fail_load: BTreeSet::from(["c".to_string()]),
            ..Default::default()
        };
        registry.refresh(&provider, &mut loader, &CancelToken::new()).unwrap();

        let restored = Registry::restore(registry.snapshot()).unwrap();
        assert_eq!(restored.pending(), registry.pending());
        assert_eq!(restored.graph().len(), 3);
        assert_eq!(restored.snapshot(), registry.snapshot());
    }

    #[test]
    fn restored_registry_refresh_is_idempotent() {
        let provider = abc();
        let (registry, _) = refreshed(&provider);
        let mut restored = Registry::restore(registry.snapshot()).unwrap();

        let mut loader = RecordingLoader::default();
        restored.refresh(&provider, &mut loader, &CancelToken::new()).unwrap();
        assert!(loader.calls.is_empty());
    }

    #[test]
    fn teardown_unloads_dependents_first_and_clears() {
        let provider = abc();
        let (mut registry, _) = refreshed(&provider);

        let mut loader = RecordingLoader {
            fail_unload: BTreeSet::from(["b".to_string()]),
            ..Default::default()
        };
        let report = registry.teardown(&mut loader);

        assert_eq!(loader.unloads(), vec!["c", "b", "a"]);
        assert_eq!(report.unloaded, vec![name("c"), name("a")]);
        assert_eq!(report.errors.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn clear_forgets_without_unloading() {
        let provider = abc();
        let (mut registry, _) = refreshed(&provider);
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.graph().is_empty());

        let mut loader = RecordingLoader::default();
        registry.refresh(&provider, &mut loader, &CancelToken::new()).unwrap();
        assert!(loader.unloads().is_empty());
        assert_eq!(loader.loads(), vec!["a", "b", "c"]);
    }

    #[test]
    fn prepare_does_not_mutate() {
        let mut provider = abc();
        let (registry, _) = refreshed(&provider);
        provider.insert("src/a.clj", "(ns a) (def changed true)");

        let refresh = registry.prepare(&provider, Scope::Changed).unwrap();
        assert_eq!(refresh.plan.reload, vec![name("a"), name("b"), name("c")]);
        assert!(refresh.removed().is_empty());
        assert_eq!(refresh.graph().len(), 3);

        let again = registry.prepare(&provider, Scope::Changed).unwrap();
        assert_eq!(again.plan, refresh.plan);
    }
}
