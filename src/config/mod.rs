// snapshot-sync/src/config/mod.rs
use anyhow::Context;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::errors::{AppError, Result};

pub const DEFAULT_CLI_NAME: &str = "coveo";
pub const DEFAULT_SNAPSHOT_DIR: &str = "resources";
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CONFIRMATION: &str = "y\n";

pub const DEV_ORG_ID: &str = "DEV_ORG_ID";
pub const DEV_API_KEY: &str = "DEV_API_KEY";
pub const TARGET_ORG_ID: &str = "TARGET_ORG_ID";
pub const TARGET_API_KEY: &str = "TARGET_API_KEY";

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonPullOptions {
    pub reset_snapshot_dir: Option<bool>,
    pub stage_with_git: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonPushOptions {
    pub preview: Option<bool>,
    pub confirmation: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub cli_name: Option<String>,
    pub cli_path: Option<PathBuf>,
    pub project_dir: Option<PathBuf>,
    pub snapshot_dir: Option<PathBuf>,
    pub auth_timeout_secs: Option<u64>,
    pub operation_timeout_secs: Option<u64>,
    pub pull: Option<JsonPullOptions>,
    pub push: Option<JsonPushOptions>,
}

// Application's internal configuration structs

/// An organization id and its API token.
///
/// The token is only reachable through [`Credentials::api_key`] and is
/// redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub org_id: String,
    api_key: String,
}

impl Credentials {
    /// Reads both variables through `lookup`. Unset, empty and whitespace-only
    /// values all count as missing.
    pub fn from_lookup<F>(org_var: &str, key_var: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        match (read(org_var), read(key_var)) {
            (Some(org_id), Some(api_key)) => Ok(Credentials { org_id, api_key }),
            (org_id, api_key) => {
                let missing: Vec<&str> = [
                    (org_var, org_id.is_none()),
                    (key_var, api_key.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, is_missing)| is_missing.then_some(name))
                .collect();
                Err(AppError::MissingCredential(missing.join(", ")))
            }
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("org_id", &self.org_id)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// How to find and drive the vendor CLI.
#[derive(Debug, Clone)]
pub struct VendorConfig {
    pub cli_name: String,
    pub cli_path: Option<PathBuf>,
    pub project_dir: PathBuf,
    pub auth_timeout: Duration,
    pub operation_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PullConfig {
    pub credentials: Credentials,
    pub snapshot_dir: PathBuf,
    pub reset_snapshot_dir: bool,
    pub stage_with_git: bool,
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub credentials: Credentials,
    pub snapshot_dir: PathBuf,
    pub preview: bool,
    pub confirmation: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub operation: Option<OperationConfig>,
    pub vendor: VendorConfig,
    pub raw_json_config: RawJsonConfig,
}

#[derive(Debug, Clone)]
pub enum OperationConfig {
    Pull(PullConfig),
    Push(PushConfig),
}

impl AppConfig {
    /// Loads settings from `config_path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            debug!(path = %config_path.display(), "No settings file, using defaults");
            return Self::from_raw(RawJsonConfig::default());
        }
        Self::load_from_json(config_path)
    }

    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw_json_config: RawJsonConfig =
            serde_json::from_str(&config_content).with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;
        Self::from_raw(raw_json_config)
    }

    pub fn from_raw(raw_json_config: RawJsonConfig) -> Result<Self> {
        let cli_name = raw_json_config
            .cli_name
            .clone()
            .unwrap_or_else(|| DEFAULT_CLI_NAME.to_string());
        if cli_name.trim().is_empty() {
            return Err(AppError::Config(
                "cli_name cannot be empty in config.json.".to_string(),
            ));
        }

        let vendor = VendorConfig {
            cli_name,
            cli_path: raw_json_config.cli_path.clone(),
            project_dir: raw_json_config
                .project_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
            auth_timeout: positive_secs(
                "auth_timeout_secs",
                raw_json_config.auth_timeout_secs,
                DEFAULT_AUTH_TIMEOUT_SECS,
            )?,
            operation_timeout: positive_secs(
                "operation_timeout_secs",
                raw_json_config.operation_timeout_secs,
                DEFAULT_OPERATION_TIMEOUT_SECS,
            )?,
        };

        Ok(AppConfig {
            operation: None, // To be filled by main after picking the flow
            vendor,
            raw_json_config,
        })
    }

    /// Snapshot directory, resolved against the project directory.
    pub fn snapshot_dir(&self) -> PathBuf {
        let dir = self
            .raw_json_config
            .snapshot_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR));
        self.vendor.project_dir.join(dir)
    }
}

pub fn load_pull_config<F>(app_config: &AppConfig, lookup: F) -> Result<PullConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let credentials = Credentials::from_lookup(DEV_ORG_ID, DEV_API_KEY, lookup)?;
    let options = app_config.raw_json_config.pull.clone().unwrap_or_default();

    Ok(PullConfig {
        credentials,
        snapshot_dir: app_config.snapshot_dir(),
        reset_snapshot_dir: options.reset_snapshot_dir.unwrap_or(true),
        stage_with_git: options.stage_with_git.unwrap_or(false),
    })
}

pub fn load_push_config<F>(app_config: &AppConfig, lookup: F) -> Result<PushConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let credentials = Credentials::from_lookup(TARGET_ORG_ID, TARGET_API_KEY, lookup)?;
    let options = app_config.raw_json_config.push.clone().unwrap_or_default();

    let confirmation = options
        .confirmation
        .unwrap_or_else(|| DEFAULT_CONFIRMATION.to_string());
    // The vendor prompt reads a whole line.
    let confirmation = if confirmation.ends_with('\n') {
        confirmation
    } else {
        format!("{confirmation}\n")
    };

    Ok(PushConfig {
        credentials,
        snapshot_dir: app_config.snapshot_dir(),
        preview: options.preview.unwrap_or(true),
        confirmation,
    })
}

fn positive_secs(field: &str, value: Option<u64>, default: u64) -> Result<Duration> {
    match value.unwrap_or(default) {
        0 => Err(AppError::Config(format!(
            "{field} must be greater than zero in config.json."
        ))),
        secs => Ok(Duration::from_secs(secs)),
    }
}
