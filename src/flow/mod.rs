//! The authenticate-then-operate sequence shared by pull and push.
//!
//! Steps run strictly in order and a step only starts once the previous one
//! succeeded; the first error ends the flow.

// snapshot-sync/src/flow/mod.rs
pub mod snapshot;

use std::path::PathBuf;

use tracing::info;
use tracing::instrument::WithSubscriber;

use crate::config::{Credentials, VendorConfig};
use crate::errors::Result;
use crate::runner::{CommandInvocation, CommandRunner, InvocationResult};
use crate::utils::find_vendor_cli;
use snapshot::reset_snapshot_dir;

const AUTH_SUBCOMMAND: &str = "auth:token";
const PREVIEW_SUBCOMMAND: &str = "org:resources:preview";
const ORGANIZATION_FLAG: &str = "--organization";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorOperation {
    Pull,
    Push,
}

impl VendorOperation {
    pub fn subcommand(self) -> &'static str {
        match self {
            VendorOperation::Pull => "org:resources:pull",
            VendorOperation::Push => "org:resources:push",
        }
    }
}

/// Parameters of one flow run.
#[derive(Debug, Clone)]
pub struct SnapshotFlow {
    pub operation: VendorOperation,
    pub credentials: Credentials,
    pub snapshot_dir: PathBuf,
    /// Delete the snapshot directory after authenticating, before the operation.
    pub reset_snapshot_dir: bool,
    /// Show the pending differences before the operation.
    pub preview: bool,
    /// Answer for the vendor's confirmation prompt. When set, the operation
    /// runs interactively with this text on stdin.
    pub confirmation: Option<String>,
}

/// Runs the flow and returns the result of the final operation.
pub async fn run_snapshot_flow(
    vendor: &VendorConfig,
    runner: &CommandRunner,
    flow: &SnapshotFlow,
) -> Result<InvocationResult> {
    execute_flow(vendor, runner, flow)
        .with_subscriber(runner.dispatch().clone())
        .await
}

async fn execute_flow(
    vendor: &VendorConfig,
    runner: &CommandRunner,
    flow: &SnapshotFlow,
) -> Result<InvocationResult> {
    let org_id = flow.credentials.org_id.as_str();
    let cli = find_vendor_cli(&vendor.project_dir, &vendor.cli_name, vendor.cli_path.as_deref())?;
    let cli = cli.to_string_lossy().into_owned();

    info!(org_id, "Authenticating to organization");
    runner
        .run(auth_invocation(&cli, &flow.credentials, vendor)?)
        .await?;

    if flow.reset_snapshot_dir {
        reset_snapshot_dir(&flow.snapshot_dir)?;
    }

    if flow.preview {
        info!(org_id, "Previewing configuration differences");
        let preview = runner
            .run(org_invocation(&cli, PREVIEW_SUBCOMMAND, org_id, vendor)?)
            .await?;
        info!(output = %preview.stdout.trim_end(), "Preview finished");
    }

    let subcommand = flow.operation.subcommand();
    info!(org_id, operation = subcommand, "Running snapshot operation");
    let invocation = org_invocation(&cli, subcommand, org_id, vendor)?;
    let result = match &flow.confirmation {
        Some(answer) => {
            runner
                .run_interactive(invocation.with_input(answer.as_str()))
                .await?
        }
        None => runner.run(invocation).await?,
    };
    info!(
        operation = subcommand,
        output = %result.stdout.trim_end(),
        "Snapshot operation finished"
    );
    Ok(result)
}

/// The token travels on stdin; the argument list only names the organization.
pub(crate) fn auth_invocation(
    cli: &str,
    credentials: &Credentials,
    vendor: &VendorConfig,
) -> Result<CommandInvocation> {
    Ok(CommandInvocation::new([
        cli,
        AUTH_SUBCOMMAND,
        ORGANIZATION_FLAG,
        credentials.org_id.as_str(),
    ])?
    .with_input(format!("{}\n", credentials.api_key()))
    .with_working_dir(&vendor.project_dir)
    .with_timeout(vendor.auth_timeout)?)
}

fn org_invocation(
    cli: &str,
    subcommand: &str,
    org_id: &str,
    vendor: &VendorConfig,
) -> Result<CommandInvocation> {
    CommandInvocation::new([cli, subcommand, ORGANIZATION_FLAG, org_id])?
        .with_working_dir(&vendor.project_dir)
        .with_timeout(vendor.operation_timeout)
}


#[cfg(all(test, unix))]
mod tests {
    use super::test_support::{FakeVendor, env_of};
    use super::*;
    use crate::config::{DEV_API_KEY, DEV_ORG_ID};
    use crate::errors::AppError;
    use crate::utils::logging::test_support::LogBuffer;
    use serial_test::serial;
    use std::time::Duration;

    fn dev_credentials() -> Credentials {
        Credentials::from_lookup(
            DEV_ORG_ID,
            DEV_API_KEY,
            env_of(&[("DEV_ORG_ID", "acme"), ("DEV_API_KEY", "tok123")]),
        )
        .unwrap()
    }

    fn pull_flow(vendor: &FakeVendor) -> SnapshotFlow {
        SnapshotFlow {
            operation: VendorOperation::Pull,
            credentials: dev_credentials(),
            snapshot_dir: vendor.snapshot_dir(),
            reset_snapshot_dir: true,
            preview: false,
            confirmation: None,
        }
    }

    fn push_flow(vendor: &FakeVendor, confirmation: &str) -> SnapshotFlow {
        SnapshotFlow {
            operation: VendorOperation::Push,
            credentials: dev_credentials(),
            snapshot_dir: vendor.snapshot_dir(),
            reset_snapshot_dir: false,
            preview: true,
            confirmation: Some(confirmation.to_string()),
        }
    }

    #[test]
    fn test_auth_arguments_never_contain_the_token() -> anyhow::Result<()> {
        let vendor = FakeVendor::missing()?;
        let invocation = auth_invocation("coveo", &dev_credentials(), &vendor.vendor_config()?)?;

        assert_eq!(
            invocation.args(),
            ["coveo", "auth:token", "--organization", "acme"]
        );
        assert!(!invocation.args().iter().any(|arg| arg.contains("tok123")));
        assert_eq!(invocation.timeout(), Duration::from_secs(5));
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn test_pull_authenticates_then_pulls() -> anyhow::Result<()> {
        let vendor = FakeVendor::new()?;
        let logs = LogBuffer::default();
        let runner = CommandRunner::new(logs.dispatch());

        let result =
            run_snapshot_flow(&vendor.vendor_config()?, &runner, &pull_flow(&vendor)).await?;

        assert_eq!(result.stdout, "Pulled 42 resources\n");
        assert_eq!(
            vendor.calls(),
            [
                "auth:token --organization acme",
                "org:resources:pull --organization acme"
            ]
        );
        assert_eq!(vendor.tokens(), ["tok123"]);
        assert!(vendor.snapshot_dir().join("fresh.json").is_file());

        let output = logs.contents();
        assert!(output.contains("Pulled 42 resources"), "{output}");
        assert!(!output.contains("tok123"), "{output}");
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn test_push_previews_then_confirms() -> anyhow::Result<()> {
        let vendor = FakeVendor::new()?;
        let logs = LogBuffer::default();
        let runner = CommandRunner::new(logs.dispatch());

        let result =
            run_snapshot_flow(&vendor.vendor_config()?, &runner, &push_flow(&vendor, "y\n")).await?;

        assert!(result.stdout.ends_with("Pushed 42 resources"));
        assert_eq!(
            vendor.calls(),
            [
                "auth:token --organization acme",
                "org:resources:preview --organization acme",
                "org:resources:push --organization acme"
            ]
        );
        let output = logs.contents();
        assert!(output.contains("Preview: 3 resources would change"), "{output}");
        assert!(output.contains("Continue? (y/n)"), "{output}");
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn test_push_declined_propagates_vendor_exit_code() -> anyhow::Result<()> {
        let vendor = FakeVendor::new()?;
        let runner = CommandRunner::new(LogBuffer::default().dispatch());

        let err = run_snapshot_flow(&vendor.vendor_config()?, &runner, &push_flow(&vendor, "n\n"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Command { code: 4, .. }));
        assert_eq!(err.exit_code(), 4);
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn test_auth_failure_stops_the_flow() -> anyhow::Result<()> {
        let vendor = FakeVendor::with_cases(
            "  auth:token) echo 'invalid token' >&2; exit 6 ;;",
        )?;
        std::fs::create_dir_all(vendor.snapshot_dir())?;
        std::fs::write(vendor.snapshot_dir().join("kept.json"), "{}")?;
        let runner = CommandRunner::new(LogBuffer::default().dispatch());

        let err = run_snapshot_flow(&vendor.vendor_config()?, &runner, &pull_flow(&vendor))
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), 6);
        assert_eq!(vendor.calls(), ["auth:token --organization acme"]);
        // The snapshot is only cleared once authentication succeeded.
        assert!(vendor.snapshot_dir().join("kept.json").is_file());
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn test_operation_timeout_is_fatal() -> anyhow::Result<()> {
        let vendor = FakeVendor::with_cases(
            "  org:resources:pull) echo 'halfway there'; exec sleep 30 ;;",
        )?;
        let logs = LogBuffer::default();
        let runner = CommandRunner::new(logs.dispatch());
        let mut config = vendor.vendor_config()?;
        config.operation_timeout = Duration::from_millis(500);

        let err = run_snapshot_flow(&config, &runner, &pull_flow(&vendor))
            .await
            .unwrap_err();

        match &err {
            AppError::Timeout { stdout, .. } => assert_eq!(stdout, "halfway there\n"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.exit_code(), 1);
        assert!(logs.contents().contains("halfway there"));
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn test_missing_cli_starts_nothing() -> anyhow::Result<()> {
        let vendor = FakeVendor::missing()?;
        let runner = CommandRunner::new(LogBuffer::default().dispatch());
        let mut config = vendor.vendor_config()?;
        config.cli_name = "snapshot-sync-no-such-cli".to_string();

        let err = run_snapshot_flow(&config, &runner, &pull_flow(&vendor))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ExecutableNotFound(_)));
        assert!(vendor.calls().is_empty());
        Ok(())
    }
}
