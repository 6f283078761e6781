// snapshot-sync/src/push/mod.rs
pub(crate) mod logic;

use crate::config::{AppConfig, OperationConfig};
use crate::errors::{AppError, Result};
use crate::runner::CommandRunner;

/// Public entry point for the push process.
pub async fn run_push_flow(app_config: &AppConfig, runner: &CommandRunner) -> Result<()> {
    let push_config = match &app_config.operation {
        Some(OperationConfig::Push(cfg)) => cfg,
        _ => {
            return Err(AppError::Config(
                "Push operation selected but no push configuration found.".to_string(),
            ));
        }
    };

    logic::perform_push_orchestration(app_config, push_config, runner).await
}
