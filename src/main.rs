//! Search configuration snapshot tool
//!
//! Pulls a configuration snapshot from the dev organization, or pushes the
//! local snapshot to the target organization, through the vendor CLI.

// snapshot-sync/src/main.rs
mod config;
mod errors;
mod flow;
mod pull;
mod push;
mod runner;
mod utils;

use anyhow::Context;
use config::{AppConfig, OperationConfig, load_pull_config, load_push_config};
use errors::{AppError, Result};
use runner::CommandRunner;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::instrument::WithSubscriber;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Pull,
    Push,
}

impl Operation {
    fn parse(choice: &str) -> Option<Self> {
        match choice.trim() {
            "1" | "pull" => Some(Operation::Pull),
            "2" | "push" => Some(Operation::Push),
            _ => None,
        }
    }
}

/// Main entry point for the snapshot tool
#[tokio::main]
async fn main() -> ExitCode {
    // Real environment variables win over .env entries.
    dotenv::dotenv().ok();

    let dispatch = utils::logging::stdout_dispatch();
    let runner = CommandRunner::new(dispatch.clone());

    async {
        match run_app(&runner).await {
            Ok(()) => {
                info!("Operation completed successfully.");
                ExitCode::SUCCESS
            }
            Err(e) => {
                let exit_code = e.exit_code();
                error!(error = %e, exit_code, "Operation failed");
                ExitCode::from(exit_code)
            }
        }
    }
    .with_subscriber(dispatch)
    .await
}

async fn run_app(runner: &CommandRunner) -> Result<()> {
    // Optional settings file next to where the tool is run from.
    let config_path = PathBuf::from("config.json");
    let app_config = AppConfig::load(&config_path)?;

    let args: Vec<String> = env::args().collect();
    let choice = if args.len() > 1 {
        args[1].trim().to_string()
    } else {
        prompt_choice()?
    };

    let Some(operation) = Operation::parse(&choice) else {
        return Err(AppError::Config(format!(
            "Invalid choice '{choice}'. Please enter '1' (pull) or '2' (push)."
        )));
    };

    run_operation(operation, app_config, |name| env::var(name).ok(), runner).await
}

/// Loads the credentials for `operation` and runs its flow. Credentials are
/// checked before anything is spawned.
async fn run_operation<F>(
    operation: Operation,
    mut app_config: AppConfig,
    lookup: F,
    runner: &CommandRunner,
) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    match operation {
        Operation::Pull => {
            info!("Starting pull from the dev organization");
            let pull_config = load_pull_config(&app_config, lookup)?;
            app_config.operation = Some(OperationConfig::Pull(pull_config));
            pull::run_pull_flow(&app_config, runner).await
        }
        Operation::Push => {
            info!("Starting push to the target organization");
            let push_config = load_push_config(&app_config, lookup)?;
            app_config.operation = Some(OperationConfig::Push(push_config));
            push::run_push_flow(&app_config, runner).await
        }
    }
}

/// Prompts user to select the pull or push operation
///
/// Returns the user's choice as String
fn prompt_choice() -> Result<String> {
    use std::io::{Write, stdin, stdout};

    println!("Select an operation:");
    println!("1. Pull snapshot from dev (or type 'pull')");
    println!("2. Push snapshot to target (or type 'push')");
    print!("Enter your choice: ");
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin()
        .read_line(&mut input)
        .context("Failed to read user input")?;
    Ok(input.trim().to_string())
}
