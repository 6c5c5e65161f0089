//! Reload commands (refresh, clear, teardown)

use anyhow::Result;

use super::output::{join_names, Output};
use crate::domain::{format_cycle, CancelToken, RefreshReport, ReloadPlan, Scope};
use crate::runtime::CommandLoader;
use crate::storage::Workspace;

/// Reloads changed namespaces, or all of them with `all`
pub fn refresh(output: &Output, all: bool, dry_run: bool) -> Result<()> {
    let workspace = Workspace::open_current()?;
    output.verbose_ctx(
        "refresh",
        &format!("Opened workspace at: {}", workspace.root().display()),
    );

    let provider = workspace.provider()?;
    let store = workspace.state_store();
    let mut registry = store.load()?;
    output.verbose_ctx(
        "refresh",
        &format!("Loaded state for {} namespace(s)", registry.nodes().count()),
    );

    let scope = if all { Scope::All } else { Scope::Changed };
    let prepared = registry.prepare(&provider, scope)?;

    if dry_run {
        print_plan(output, &prepared.plan);
        return Ok(());
    }

    let mut loader = CommandLoader::new(
        workspace.config().project.loader.command.clone(),
        workspace.root(),
    )?;

    let report = registry.execute(prepared, &mut loader, &CancelToken::new())?;
    store.save(&registry)?;

    print_report(output, &report);
    if !report.is_success() {
        anyhow::bail!(
            "Refresh incomplete; {} namespace(s) pending",
            report.pending.len()
        );
    }

    Ok(())
}

/// Forgets tracked state
pub fn clear(output: &Output) -> Result<()> {
    let workspace = Workspace::open_current()?;
    let store = workspace.state_store();

    let mut registry = store.load()?;
    let count = registry.nodes().count();
    registry.clear();
    store.clear()?;

    if output.is_json() {
        output.data(&serde_json::json!({ "cleared": count }));
    } else {
        output.success(&format!("Cleared {} tracked namespace(s)", count));
    }

    Ok(())
}

/// Unloads everything, then forgets tracked state
pub fn teardown(output: &Output) -> Result<()> {
    let workspace = Workspace::open_current()?;
    let store = workspace.state_store();
    let mut registry = store.load()?;

    if registry.is_empty() {
        if output.is_json() {
            output.data(&crate::domain::TeardownReport::default());
        } else {
            println!("Nothing to tear down.");
        }
        return Ok(());
    }

    let mut loader = CommandLoader::new(
        workspace.config().project.loader.command.clone(),
        workspace.root(),
    )?;

    let report = registry.teardown(&mut loader);
    store.clear()?;

    if output.is_json() {
        output.data(&report);
    } else {
        println!("Unloaded: {}", join_names(&report.unloaded));
        if !report.skipped.is_empty() {
            println!("Left loaded (unload disabled): {}", join_names(&report.skipped));
        }
        for error in &report.errors {
            output.error(&error.to_string());
        }
    }

    if !report.errors.is_empty() {
        anyhow::bail!("{} namespace(s) failed to unload", report.errors.len());
    }

    Ok(())
}

fn print_plan(output: &Output, plan: &ReloadPlan) {
    if output.is_json() {
        output.data(plan);
        return;
    }

    if plan.is_empty() {
        println!("Nothing to reload.");
    } else {
        println!("Would unload: {}", join_names(&plan.unload));
        println!("Would reload: {}", join_names(&plan.reload));
    }
    print_cycles(output, plan);
}

fn print_cycles(output: &Output, plan: &ReloadPlan) {
    for cycle in &plan.cycles {
        output.error(&format!("Cyclic dependency: {}", format_cycle(cycle)));
    }
    if !plan.blocked.is_empty() {
        output.warn(&format!("Blocked by cycles: {}", join_names(&plan.blocked)));
    }
}

/// Prints what a refresh did
pub fn print_report(output: &Output, report: &RefreshReport) {
    if output.is_json() {
        output.data(report);
        return;
    }

    let outcome = &report.outcome;
    if report.plan.is_empty() && report.plan.blocked.is_empty() {
        println!("Nothing to reload.");
        return;
    }

    if !outcome.unloaded.is_empty() {
        println!("Unloaded: {}", join_names(&outcome.unloaded));
    }
    println!("Loaded: {}", join_names(&outcome.loaded));

    if let Some(error) = &outcome.error {
        output.error(&error.to_string());
    }
    if outcome.cancelled {
        output.warn("Refresh cancelled");
    }
    print_cycles(output, &report.plan);

    if !report.pending.is_empty() {
        println!("Pending: {}", join_names(&report.pending));
    }
}
