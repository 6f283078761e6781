// snapshot-sync/src/push/logic.rs
use tracing::info;

use crate::config::{AppConfig, PushConfig};
use crate::errors::Result;
use crate::flow::snapshot::{require_snapshot_dir, summarize_snapshot};
use crate::flow::{SnapshotFlow, VendorOperation, run_snapshot_flow};
use crate::runner::CommandRunner;

/// Orchestrates the push:
/// 1. Checks there is a local snapshot to push.
/// 2. Authenticates against the target organization.
/// 3. Previews the differences (unless disabled).
/// 4. Pushes, answering the vendor's confirmation prompt on stdin.
pub async fn perform_push_orchestration(
    app_config: &AppConfig,
    push_config: &PushConfig,
    runner: &CommandRunner,
) -> Result<()> {
    let snapshot_dir = &push_config.snapshot_dir;
    tracing::dispatcher::with_default(runner.dispatch(), || describe_snapshot(push_config))?;

    let flow = SnapshotFlow {
        operation: VendorOperation::Push,
        credentials: push_config.credentials.clone(),
        snapshot_dir: snapshot_dir.clone(),
        reset_snapshot_dir: false,
        preview: push_config.preview,
        confirmation: Some(push_config.confirmation.clone()),
    };
    run_snapshot_flow(&app_config.vendor, runner, &flow).await?;
    Ok(())
}

fn describe_snapshot(push_config: &PushConfig) -> Result<()> {
    let snapshot_dir = &push_config.snapshot_dir;
    require_snapshot_dir(snapshot_dir)?;
    let summary = summarize_snapshot(snapshot_dir)?;
    info!(
        path = %snapshot_dir.display(),
        files = summary.files,
        bytes = summary.bytes,
        org_id = %push_config.credentials.org_id,
        "Pushing configuration snapshot"
    );
    Ok(())
}
