//! Configuration for layerflow.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (APS_CLIENT_ID, APS_CLIENT_SECRET, APS_BUCKET_KEY,
//!    APS_NICKNAME, LAYERFLOW_BIND), including a `.env` file
//! 2. Config file (.layerflow/config.yaml)
//! 3. Defaults
//!
//! Config file discovery:
//! - Searches current directory and parents for .layerflow/config.yaml
//! - Falls back to the user config dir (e.g. ~/.config/layerflow/config.yaml)
//! - `server.input_dir` is relative to the config file's project root
//!
//! The resolved config is passed explicitly to whatever needs it; there is no
//! process-wide cache.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::aps::DEFAULT_BASE_URL;
use crate::core::{ClientIdentity, PollPolicy};
use crate::domain::TransferMode;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub version: Option<String>,
    #[serde(default)]
    pub aps: ApsSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub automation: AutomationSection,
    #[serde(default)]
    pub polling: PollingSection,
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApsSection {
    pub base_url: Option<String>,
    /// Design Automation region
    pub region: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scopes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageSection {
    pub bucket_key: Option<String>,
    /// transient | temporary | persistent
    pub policy: Option<String>,
    pub upload_mode: Option<TransferMode>,
    pub signed_url_minutes: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AutomationSection {
    pub nickname: Option<String>,
    pub alias: Option<String>,
    pub extract_activity: Option<String>,
    pub rename_activity: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollingSection {
    pub job: Option<PollPolicy>,
    pub result: Option<PollPolicy>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSection {
    pub bind: Option<String>,
    pub input_dir: Option<String>,
    pub pipeline_timeout_seconds: Option<u64>,
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub base_url: String,
    pub region: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
    pub bucket_key: Option<String>,
    pub bucket_policy: String,
    pub upload_mode: TransferMode,
    pub signed_url_minutes: u32,
    pub nickname: String,
    pub alias: String,
    pub extract_activity: String,
    pub rename_activity: String,
    pub job_poll: PollPolicy,
    pub result_poll: PollPolicy,
    pub bind: SocketAddr,
    /// Where `{objectKey}` requests read drawings from
    pub input_dir: PathBuf,
    pub pipeline_timeout_seconds: u64,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

fn default_scopes() -> Vec<String> {
    ["data:read", "data:write", "data:create", "bucket:create", "bucket:read", "code:all"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl ResolvedConfig {
    /// Fully qualified activity id: `nickname.Activity+alias`
    pub fn activity_id(&self, activity: &str) -> String {
        format!("{}.{}+{}", self.nickname, activity, self.alias)
    }

    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline_timeout_seconds)
    }

    /// Client identity, required for any vendor call
    pub fn identity(&self) -> Result<ClientIdentity> {
        let client_id = self
            .client_id
            .clone()
            .context("APS_CLIENT_ID is not set (env or aps.client_id)")?;
        let client_secret = self
            .client_secret
            .clone()
            .context("APS_CLIENT_SECRET is not set (env or aps.client_secret)")?;
        Ok(ClientIdentity {
            client_id,
            client_secret,
        })
    }

    /// Bucket key, required and restricted to what the store accepts
    pub fn bucket(&self) -> Result<&str> {
        let bucket = self
            .bucket_key
            .as_deref()
            .context("APS_BUCKET_KEY is not set (env or storage.bucket_key)")?;
        validate_bucket_key(bucket)?;
        Ok(bucket)
    }
}

/// Bucket keys: 3-128 chars of `[-_.a-z0-9]`
pub fn validate_bucket_key(bucket: &str) -> Result<()> {
    if !(3..=128).contains(&bucket.len()) {
        anyhow::bail!("Bucket key '{}' must be 3-128 characters long", bucket);
    }
    if !bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
    {
        anyhow::bail!(
            "Bucket key '{}' may only contain lowercase letters, digits, '-', '_' and '.'",
            bucket
        );
    }
    Ok(())
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".layerflow").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Per-user config file, used when no project config is found
fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("layerflow").join("config.yaml"))
        .filter(|path| path.exists())
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Merge file settings, environment and defaults
fn resolve(
    file: ConfigFile,
    config_file: Option<PathBuf>,
    base_dir: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let bind = env("LAYERFLOW_BIND")
        .or(file.server.bind)
        .unwrap_or_else(|| "127.0.0.1:3000".to_string());
    let bind: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", bind))?;

    let input_dir = file
        .server
        .input_dir
        .map(|dir| {
            let dir = PathBuf::from(dir);
            if dir.is_absolute() {
                dir
            } else {
                base_dir.join(dir)
            }
        })
        .unwrap_or_else(|| base_dir.join("scripts"));

    let job_poll = file.polling.job.unwrap_or_else(PollPolicy::job_default);
    let result_poll = file.polling.result.unwrap_or_else(PollPolicy::result_default);
    anyhow::ensure!(
        job_poll.max_attempts > 0,
        "polling.job.max_attempts must be at least 1"
    );
    anyhow::ensure!(
        result_poll.max_attempts > 0,
        "polling.result.max_attempts must be at least 1"
    );

    Ok(ResolvedConfig {
        base_url: file.aps.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        region: file.aps.region.unwrap_or_else(|| "us-east".to_string()),
        client_id: env("APS_CLIENT_ID").or(file.aps.client_id),
        client_secret: env("APS_CLIENT_SECRET").or(file.aps.client_secret),
        scopes: file.aps.scopes.unwrap_or_else(default_scopes),
        bucket_key: env("APS_BUCKET_KEY").or(file.storage.bucket_key),
        bucket_policy: file.storage.policy.unwrap_or_else(|| "transient".to_string()),
        upload_mode: file.storage.upload_mode.unwrap_or_default(),
        signed_url_minutes: file.storage.signed_url_minutes.unwrap_or(60),
        nickname: env("APS_NICKNAME")
            .or(file.automation.nickname)
            .unwrap_or_else(|| "snapclean".to_string()),
        alias: file.automation.alias.unwrap_or_else(|| "prod".to_string()),
        extract_activity: file
            .automation
            .extract_activity
            .unwrap_or_else(|| "ExtractLayersActivity".to_string()),
        rename_activity: file
            .automation
            .rename_activity
            .unwrap_or_else(|| "RenameLayersActivity".to_string()),
        job_poll,
        result_poll,
        bind,
        input_dir,
        pipeline_timeout_seconds: file.server.pipeline_timeout_seconds.unwrap_or(180),
        config_file,
    })
}

/// Load configuration from all sources
pub fn load_config() -> Result<ResolvedConfig> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;

    match find_config_file(&cwd).or_else(user_config_file) {
        Some(config_path) => {
            let file = load_config_file(&config_path)?;
            // Project root is the parent of .layerflow/; a user config
            // resolves relative paths against the working directory
            let base_dir = config_path
                .parent()
                .filter(|dir| dir.ends_with(".layerflow"))
                .and_then(|dir| dir.parent())
                .unwrap_or(&cwd)
                .to_path_buf();
            resolve(file, Some(config_path), &base_dir, |k| std::env::var(k).ok())
        }
        None => resolve(ConfigFile::default(), None, &cwd, |k| std::env::var(k).ok()),
    }
}
