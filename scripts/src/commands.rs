//! Implementations of the various bootstrap scripts

use std::path::{Path, PathBuf};

use tracing::info;

use crate::{
    artifacts::ArtifactStore,
    bindings::Bindings,
    cli::{BootstrapArgs, DeployArgs},
    errors::ScriptError,
    invoker::Invoker,
    ledger::Ledger,
    sequencer::Sequencer,
    session::{resolve_identity, Session},
    types::{CallOutcome, ConfirmationPolicy, ResourceInstance, RunReport},
    utils::{read_plan, write_report, RunSummary},
};

/// Resolve and log the deployer identity without submitting anything
pub async fn identity(ledger: impl Ledger) -> Result<(), ScriptError> {
    resolve_identity(&ledger).await.map(|_| ())
}

/// Obtain every resource of a plan, in order
pub async fn deploy(
    args: DeployArgs,
    ledger: impl Ledger,
    artifacts: PathBuf,
    policy: ConfirmationPolicy,
) -> Result<(), ScriptError> {
    let plan = read_plan(&args.plan)?;
    if !plan.calls.is_empty() {
        info!(
            "Ignoring {} configuration calls, run `bootstrap` to make them",
            plan.calls.len()
        );
    }

    let mut session = Session::open(ledger, ArtifactStore::new(artifacts), policy).await?;
    let mut bindings = Bindings::new();
    let resources = Sequencer::new(&mut session)
        .run(&plan.resources, &mut bindings)
        .await;

    finish(args.report.as_deref(), resources, RunReport::empty())
}

/// Obtain every resource of a plan, then make its configuration calls against them
pub async fn bootstrap(
    args: BootstrapArgs,
    ledger: impl Ledger,
    artifacts: PathBuf,
    policy: ConfirmationPolicy,
) -> Result<(), ScriptError> {
    let plan = read_plan(&args.plan)?;

    let mut session = Session::open(ledger, ArtifactStore::new(artifacts), policy).await?;
    let mut bindings = Bindings::new();
    let resources = Sequencer::new(&mut session)
        .run(&plan.resources, &mut bindings)
        .await;
    if !resources.is_success() {
        return finish(args.report.as_deref(), resources, RunReport::empty());
    }

    let calls = Invoker::new(&mut session)
        .run_sequence(&plan.calls, &mut bindings)
        .await;

    finish(args.report.as_deref(), resources, calls)
}

/// Write the report if one was requested, then surface the run's failure, if any
fn finish(
    report_path: Option<&Path>,
    resources: RunReport<ResourceInstance>,
    calls: RunReport<CallOutcome>,
) -> Result<(), ScriptError> {
    let summary = RunSummary::new(&resources, &calls);
    if let Some(path) = report_path {
        write_report(path, &summary)?;
        info!("Report written to {}", path.display());
    }

    resources.into_result()?;
    calls.into_result()?;

    info!(
        "Run complete: {} resources, {} calls",
        summary.resources.len(),
        summary.calls.len()
    );
    Ok(())
}
