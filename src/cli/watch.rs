//! Watch mode
//!
//! Watches the source directories and refreshes after each debounced burst of
//! changes. A change arriving while a refresh is running cancels it between
//! namespaces; the next refresh picks up both the new change and whatever the
//! cancelled one left pending.

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};

use super::output::Output;
use super::reload::print_report;
use crate::domain::{CancelToken, Registry};
use crate::runtime::CommandLoader;
use crate::storage::{DirectoryProvider, StateStore, Workspace};

/// Runs until the watcher channel closes
pub fn run(output: &Output, debounce: Option<u64>) -> Result<()> {
    let workspace = Workspace::open_current()?;
    let provider = workspace.provider()?;
    let store = workspace.state_store();
    let mut registry = store.load()?;
    let mut loader = CommandLoader::new(
        workspace.config().project.loader.command.clone(),
        workspace.root(),
    )?;

    let debounce_millis = debounce.unwrap_or(workspace.config().project.watch.debounce_millis);
    let cancel = CancelToken::new();
    let (tx, rx) = mpsc::channel();

    let filter = provider.clone();
    let on_change = cancel.clone();
    let mut debouncer = new_debouncer(
        Duration::from_millis(debounce_millis),
        move |result: DebounceEventResult| match result {
            Ok(events) => {
                let paths: Vec<PathBuf> = events.into_iter().map(|e| e.path).collect();
                if count_relevant(&filter, &paths) > 0 {
                    on_change.cancel();
                    let _ = tx.send(());
                }
            }
            Err(error) => tracing::warn!(%error, "watch error"),
        },
    )
    .context("Failed to start file watcher")?;

    for dir in workspace.source_dirs() {
        debouncer
            .watcher()
            .watch(&dir, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;
        output.verbose_ctx("watch", &format!("Watching {}", dir.display()));
    }

    if !output.is_json() {
        println!(
            "Watching {} source dir(s) (debounce: {}ms). Press Ctrl-C to stop.",
            workspace.source_dirs().len(),
            debounce_millis
        );
    }

    refresh_once(output, &provider, &store, &mut registry, &mut loader, &cancel)?;

    while rx.recv().is_ok() {
        // Coalesce bursts that queued up during the last refresh
        while rx.try_recv().is_ok() {}
        cancel.reset();
        refresh_once(output, &provider, &store, &mut registry, &mut loader, &cancel)?;
    }

    Ok(())
}

/// Refreshes and persists; scan and load failures are reported, not fatal
fn refresh_once(
    output: &Output,
    provider: &DirectoryProvider,
    store: &StateStore,
    registry: &mut Registry,
    loader: &mut CommandLoader,
    cancel: &CancelToken,
) -> Result<()> {
    match registry.refresh(provider, loader, cancel) {
        Ok(report) => {
            store.save(registry)?;
            print_report(output, &report);
        }
        Err(e) => {
            tracing::debug!(error = %e, "refresh failed");
            output.error(&format!("{:#}", anyhow::Error::from(e)));
        }
    }
    Ok(())
}

/// Number of event paths that are source units
fn count_relevant(provider: &DirectoryProvider, paths: &[PathBuf]) -> usize {
    paths.iter().filter(|p| provider.is_source(p)).count()
}
