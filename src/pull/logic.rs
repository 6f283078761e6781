// snapshot-sync/src/pull/logic.rs
use std::path::Path;

use tracing::instrument::WithSubscriber;
use tracing::{info, warn};

use crate::config::{AppConfig, PullConfig};
use crate::errors::Result;
use crate::flow::snapshot::summarize_snapshot;
use crate::flow::{SnapshotFlow, VendorOperation, run_snapshot_flow};
use crate::runner::{CommandInvocation, CommandRunner};
use crate::utils::find_system_executable;

const GIT: &str = "git";

/// Orchestrates the pull:
/// 1. Authenticates against the dev organization.
/// 2. Clears the local snapshot directory (unless disabled).
/// 3. Pulls the organization's configuration into it.
/// 4. Logs what landed on disk.
/// 5. Optionally stages the snapshot in git.
pub async fn perform_pull_orchestration(
    app_config: &AppConfig,
    pull_config: &PullConfig,
    runner: &CommandRunner,
) -> Result<()> {
    let flow = SnapshotFlow {
        operation: VendorOperation::Pull,
        credentials: pull_config.credentials.clone(),
        snapshot_dir: pull_config.snapshot_dir.clone(),
        reset_snapshot_dir: pull_config.reset_snapshot_dir,
        preview: false,
        confirmation: None,
    };
    run_snapshot_flow(&app_config.vendor, runner, &flow).await?;

    finish_pull(app_config, pull_config, runner)
        .with_subscriber(runner.dispatch().clone())
        .await
}

async fn finish_pull(
    app_config: &AppConfig,
    pull_config: &PullConfig,
    runner: &CommandRunner,
) -> Result<()> {
    let snapshot_dir = &pull_config.snapshot_dir;
    if snapshot_dir.is_dir() {
        let summary = summarize_snapshot(snapshot_dir)?;
        info!(
            path = %snapshot_dir.display(),
            files = summary.files,
            bytes = summary.bytes,
            "Snapshot saved"
        );
    } else {
        warn!(
            path = %snapshot_dir.display(),
            "Pull finished but no snapshot directory was written"
        );
    }

    if pull_config.stage_with_git {
        stage_snapshot(app_config, snapshot_dir, runner, GIT).await?;
    }
    Ok(())
}

/// `git add` the snapshot directory, run from the project directory.
async fn stage_snapshot(
    app_config: &AppConfig,
    snapshot_dir: &Path,
    runner: &CommandRunner,
    git_name: &str,
) -> Result<()> {
    let project_dir = &app_config.vendor.project_dir;
    let git = find_system_executable(git_name)?;
    let relative = snapshot_dir.strip_prefix(project_dir).unwrap_or(snapshot_dir);

    info!(path = %relative.display(), "Staging configuration snapshot in git");
    let invocation = CommandInvocation::new([
        git.to_string_lossy().into_owned(),
        "add".to_string(),
        "--".to_string(),
        relative.to_string_lossy().into_owned(),
    ])?
    .with_working_dir(project_dir)
    .with_timeout(app_config.vendor.operation_timeout)?;
    runner.run(invocation).await?;
    Ok(())
}
