//! Selective reload
//!
//! Planning turns a set of changed namespaces into an unload list
//! (dependents first) and a reload list (dependencies first). Execution runs a
//! plan against a [`Loader`], one namespace at a time.
//!
//! ## Partial batches
//!
//! A failed load aborts the rest of the batch. Namespaces already reloaded stay
//! `Loaded`, the failing namespace becomes `Error`, and everything not reached
//! is reported so the caller can retry it on the next refresh. Cancellation
//! stops the batch between namespaces with the same partial state.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use super::graph::DependencyGraph;
use super::name::NamespaceName;
use super::node::{LoadState, NamespaceNode, StateError};
use super::topo;

/// Which side of a reload an operation was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Load,
    Unload,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Load => f.write_str("load"),
            Operation::Unload => f.write_str("unload"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[error("Failed to {operation} {namespace}: {message}")]
pub struct LoadError {
    pub namespace: NamespaceName,
    pub operation: Operation,
    pub message: String,
}

/// Loads and unloads namespaces in the host runtime
pub trait Loader {
    fn load(&mut self, node: &NamespaceNode) -> anyhow::Result<()>;

    fn unload(&mut self, node: &NamespaceNode) -> anyhow::Result<()>;
}

/// Shared flag for aborting a batch between namespaces
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Ordered unload and reload lists for one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReloadPlan {
    /// Dependents before dependencies
    pub unload: Vec<NamespaceName>,

    /// Dependencies before dependents
    pub reload: Vec<NamespaceName>,

    /// Affected namespaces left out because a cycle blocks them
    pub blocked: BTreeSet<NamespaceName>,

    /// Cycles responsible for `blocked`
    pub cycles: Vec<Vec<NamespaceName>>,
}

impl ReloadPlan {
    /// Returns true if the batch has nothing to do
    pub fn is_empty(&self) -> bool {
        self.unload.is_empty() && self.reload.is_empty()
    }
}

/// Computes the unload and reload lists for a change
///
/// `changed` names namespaces of `current` whose source was added or modified
/// (or that must be retried). `removed` names namespaces that no longer exist;
/// their dependents are found in `previous`, the graph they were loaded from.
pub fn plan_reload(
    previous: &DependencyGraph,
    current: &DependencyGraph,
    changed: &BTreeSet<NamespaceName>,
    removed: &BTreeSet<NamespaceName>,
) -> ReloadPlan {
    let mut seeds: BTreeSet<NamespaceName> = changed
        .iter()
        .filter(|n| current.contains(n))
        .cloned()
        .collect();
    seeds.extend(
        previous
            .transitive_dependents(removed.iter())
            .into_iter()
            .filter(|n| current.contains(n)),
    );

    let mut affected = current.transitive_dependents(seeds.iter());
    affected.extend(seeds);

    let partition = topo::partition(current);
    let blocked: BTreeSet<NamespaceName> = affected.intersection(&partition.blocked).cloned().collect();
    let cycles = partition
        .cycles
        .iter()
        .filter(|cycle| {
            let mut component: BTreeSet<_> = cycle.iter().cloned().collect();
            component.extend(current.transitive_dependents(cycle.iter()));
            !component.is_disjoint(&blocked)
        })
        .cloned()
        .collect();

    let ordered: Vec<NamespaceName> = partition
        .order
        .into_iter()
        .filter(|n| affected.contains(n))
        .collect();

    let flags = |name: &NamespaceName| current.unit(name).map(|u| (u.decl.reload, u.decl.unload));

    let reload: Vec<_> = ordered
        .iter()
        .filter(|n| flags(n).map_or(true, |(reload, _)| reload))
        .cloned()
        .collect();

    let mut unload: Vec<_> = ordered
        .iter()
        .rev()
        .filter(|n| flags(n).map_or(true, |(_, unload)| unload))
        .cloned()
        .collect();

    // Removed namespaces go last: nothing that remains depends on them.
    let previous_order = topo::partition(previous).order;
    let rank: HashMap<&NamespaceName, usize> = previous_order.iter().enumerate().map(|(i, n)| (n, i)).collect();
    let mut gone: Vec<&NamespaceName> = removed
        .iter()
        .filter(|n| !current.contains(n))
        .filter(|n| previous.unit(n).map_or(true, |u| u.decl.unload))
        .collect();
    gone.sort_by(|a, b| {
        let ra = rank.get(a).copied().unwrap_or(usize::MAX);
        let rb = rank.get(b).copied().unwrap_or(usize::MAX);
        rb.cmp(&ra).then_with(|| a.cmp(b))
    });
    unload.extend(gone.into_iter().cloned());

    tracing::debug!(
        unload = unload.len(),
        reload = reload.len(),
        blocked = blocked.len(),
        "planned reload"
    );

    ReloadPlan {
        unload,
        reload,
        blocked,
        cycles,
    }
}

/// What happened while executing a plan
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchOutcome {
    /// Namespaces unloaded, in order
    pub unloaded: Vec<NamespaceName>,

    /// Namespaces loaded, in order
    pub loaded: Vec<NamespaceName>,

    /// Reload-list entries the batch never reached
    pub not_reached: Vec<NamespaceName>,

    /// The failure that aborted the batch
    pub error: Option<LoadError>,

    /// True if the batch stopped because of cancellation
    pub cancelled: bool,
}

impl BatchOutcome {
    /// Returns true if every planned namespace was handled
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && !self.cancelled && self.not_reached.is_empty()
    }
}

/// Executes a plan against `loader`, updating node states in `nodes`
///
/// Unloads run first, then loads. Each namespace in the reload list reaches
/// `Loaded` before any later namespace starts loading.
pub fn execute(
    plan: &ReloadPlan,
    nodes: &mut BTreeMap<NamespaceName, NamespaceNode>,
    loader: &mut dyn Loader,
    cancel: &CancelToken,
) -> Result<BatchOutcome, StateError> {
    let mut outcome = BatchOutcome::default();

    for name in &plan.unload {
        if cancel.is_cancelled() {
            tracing::info!(namespace = %name, "batch cancelled before unload");
            outcome.cancelled = true;
            outcome.not_reached = plan.reload.clone();
            return Ok(outcome);
        }

        let Some(node) = nodes.get_mut(name) else {
            continue;
        };
        if !node.state.is_resident() {
            continue;
        }

        tracing::debug!(namespace = %name, "unloading");
        if let Err(e) = loader.unload(node) {
            let error = LoadError {
                namespace: name.clone(),
                operation: Operation::Unload,
                message: format!("{:#}", e),
            };
            tracing::warn!(%error, "unload failed");
            outcome.error = Some(error);
            outcome.not_reached = plan.reload.clone();
            return Ok(outcome);
        }
        node.transition(LoadState::Unloaded)?;
        outcome.unloaded.push(name.clone());
    }

    for (i, name) in plan.reload.iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::info!(namespace = %name, "batch cancelled before load");
            outcome.cancelled = true;
            outcome.not_reached = plan.reload[i..].to_vec();
            return Ok(outcome);
        }

        let Some(node) = nodes.get_mut(name) else {
            continue;
        };

        // Unload disabled: definitions stay resident and are reloaded in place
        if node.state == LoadState::Loaded {
            node.transition(LoadState::Unloaded)?;
        }

        node.transition(LoadState::Loading)?;
        tracing::debug!(namespace = %name, "loading");

        match loader.load(node) {
            Ok(()) => {
                node.transition(LoadState::Loaded)?;
                outcome.loaded.push(name.clone());
            }
            Err(e) => {
                node.transition(LoadState::Error)?;
                let error = LoadError {
                    namespace: name.clone(),
                    operation: Operation::Load,
                    message: format!("{:#}", e),
                };
                tracing::warn!(%error, "load failed, aborting batch");
                outcome.error = Some(error);
                outcome.not_reached = plan.reload[i + 1..].to_vec();
                return Ok(outcome);
            }
        }
    }

    Ok(outcome)
}
