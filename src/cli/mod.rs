//! Command-line interface for layerflow.
//!
//! Provides commands for serving the HTTP API, running one-off extract and
//! rename jobs against local drawings, and inspecting the configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::adapters::{ApsClient, ApsEndpoints};
use crate::config::{self, ResolvedConfig};
use crate::core::{
    ArtifactStaging, CredentialProvider, JobOrchestrator, LayerPipeline, PipelineSettings,
    ResultRetrieval,
};
use crate::domain::mapping;
use crate::error::PipelineError;
use crate::server::{self, AppState};

/// layerflow - Remote CAD layer extraction and renaming
#[derive(Parser, Debug)]
#[command(name = "layerflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind to (overrides config)
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Extract the layer names of a drawing
    Extract {
        /// Drawing to upload
        file: PathBuf,

        /// Object key in the bucket (defaults to the file name)
        #[arg(short, long)]
        object_key: Option<String>,
    },

    /// Rename layers of a drawing
    Rename {
        /// Drawing to upload
        file: PathBuf,

        /// CSV file with one `oldName,newName` pair per line
        #[arg(short, long)]
        mapping: PathBuf,

        /// Object key in the bucket (defaults to the file name)
        #[arg(short, long)]
        object_key: Option<String>,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = config::load_config()?;

        match self.command {
            Commands::Serve { bind } => serve(&config, bind).await,
            Commands::Extract { file, object_key } => extract(&config, &file, object_key).await,
            Commands::Rename {
                file,
                mapping,
                object_key,
            } => rename(&config, &file, &mapping, object_key).await,
            Commands::Config => show_config(&config),
        }
    }
}

/// Wire the vendor client into a pipeline
pub fn build_pipeline(config: &ResolvedConfig) -> Result<LayerPipeline> {
    let identity = config.identity()?;
    let bucket = config.bucket()?.to_string();

    let endpoints = ApsEndpoints::new(&config.base_url, &config.region, config.signed_url_minutes)?;
    let client = Arc::new(ApsClient::new(endpoints));

    let staging = Arc::new(ArtifactStaging::new(
        client.clone(),
        config.upload_mode,
        &config.bucket_policy,
    ));

    Ok(LayerPipeline::new(
        CredentialProvider::new(client.clone(), identity),
        staging.clone(),
        JobOrchestrator::new(client).with_policy(config.job_poll.clone()),
        ResultRetrieval::new(staging).with_policy(config.result_poll.clone()),
        PipelineSettings {
            bucket,
            scopes: config.scopes.clone(),
            extract_activity: config.activity_id(&config.extract_activity),
            rename_activity: config.activity_id(&config.rename_activity),
            deadline: config.pipeline_timeout(),
        },
    ))
}

/// Start the HTTP server
async fn serve(config: &ResolvedConfig, bind: Option<SocketAddr>) -> Result<()> {
    let pipeline = Arc::new(build_pipeline(config)?);
    let state = AppState::new(pipeline, &config.input_dir);
    server::serve(bind.unwrap_or(config.bind), state).await
}

/// Extract layers from a local drawing
async fn extract(config: &ResolvedConfig, file: &Path, object_key: Option<String>) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let object_key = object_key_for(file, object_key)?;
    let payload = std::fs::read(file)
        .with_context(|| format!("Failed to read drawing: {}", file.display()))?;

    let cancel = cancel_on_ctrl_c();
    let result = pipeline.extract_layers(&object_key, payload, &cancel).await;

    match result {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            eprintln!("\n[{} layers in {}]", report.layers.len(), report.object_key);
            Ok(())
        }
        Err(e) => report_failure(e),
    }
}

/// Rename layers of a local drawing
async fn rename(
    config: &ResolvedConfig,
    file: &Path,
    mapping_file: &Path,
    object_key: Option<String>,
) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let object_key = object_key_for(file, object_key)?;
    let payload = std::fs::read(file)
        .with_context(|| format!("Failed to read drawing: {}", file.display()))?;

    let csv = std::fs::read_to_string(mapping_file)
        .with_context(|| format!("Failed to read mapping file: {}", mapping_file.display()))?;
    let mappings = mapping::from_csv(&csv)?;

    let cancel = cancel_on_ctrl_c();
    match pipeline
        .rename_layers(&object_key, payload, &mappings, &cancel)
        .await
    {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            eprintln!("\n[Renamed {} layers, output {}]", mappings.len(), report.output_key);
            Ok(())
        }
        Err(e) => report_failure(e),
    }
}

fn object_key_for(file: &Path, object_key: Option<String>) -> Result<String> {
    match object_key {
        Some(key) => Ok(key),
        None => file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .with_context(|| format!("Cannot derive an object key from {}", file.display())),
    }
}

/// Token cancelled on Ctrl+C, so polling stops cleanly
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    cancel
}

/// Print the error kind and vendor payload, then exit non-zero
fn report_failure(err: PipelineError) -> Result<()> {
    eprintln!("[{}] {}", err.kind(), err);
    if let Some(details) = err.details() {
        eprintln!("{}", serde_json::to_string_pretty(details).unwrap_or_default());
    }
    std::process::exit(1);
}

/// Show the resolved configuration (for debugging)
fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    let redact = |value: &Option<String>| match value {
        Some(_) => "<set>".to_string(),
        None => "(not set)".to_string(),
    };

    println!("layerflow configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Platform:");
    println!("  Base URL:      {}", cfg.base_url);
    println!("  Region:        {}", cfg.region);
    println!("  Client ID:     {}", cfg.client_id.as_deref().unwrap_or("(not set)"));
    println!("  Client secret: {}", redact(&cfg.client_secret));
    println!("  Scopes:        {}", cfg.scopes.join(" "));
    println!();
    println!("Storage:");
    println!("  Bucket:        {}", cfg.bucket_key.as_deref().unwrap_or("(not set)"));
    println!("  Policy:        {}", cfg.bucket_policy);
    println!("  Upload mode:   {:?}", cfg.upload_mode);
    println!("  URL lifetime:  {} min", cfg.signed_url_minutes);
    println!();
    println!("Activities:");
    println!("  Extract:       {}", cfg.activity_id(&cfg.extract_activity));
    println!("  Rename:        {}", cfg.activity_id(&cfg.rename_activity));
    println!();
    println!("Polling:");
    println!(
        "  Job:           every {:?}, {} attempts (after {:?})",
        cfg.job_poll.interval, cfg.job_poll.max_attempts, cfg.job_poll.initial_delay
    );
    println!(
        "  Result:        every {:?}, {} attempts (after {:?})",
        cfg.result_poll.interval, cfg.result_poll.max_attempts, cfg.result_poll.initial_delay
    );
    println!();
    println!("Server:");
    println!("  Bind:          {}", cfg.bind);
    println!("  Input dir:     {}", cfg.input_dir.display());
    println!("  Timeout:       {}s", cfg.pipeline_timeout_seconds);

    Ok(())
}
