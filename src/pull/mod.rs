// snapshot-sync/src/pull/mod.rs
pub(crate) mod logic;

use crate::config::{AppConfig, OperationConfig};
use crate::errors::{AppError, Result};
use crate::runner::CommandRunner;

/// Public entry point for the pull process.
pub async fn run_pull_flow(app_config: &AppConfig, runner: &CommandRunner) -> Result<()> {
    let pull_config = match &app_config.operation {
        Some(OperationConfig::Pull(cfg)) => cfg,
        _ => {
            return Err(AppError::Config(
                "Pull operation selected but no pull configuration found.".to_string(),
            ));
        }
    };

    logic::perform_pull_orchestration(app_config, pull_config, runner).await
}
