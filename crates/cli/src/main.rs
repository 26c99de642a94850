//! Apartment rent predictor CLI
//!
//! Builds the rent model, inspects the stored artifact and estimates rents
//! from the command line.

mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{build, inspect, predict};
use predictor_lib::PredictorConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Apartment rent predictor CLI
#[derive(Parser)]
#[command(name = "rentp")]
#[command(author, version, about = "CLI for the apartment rent predictor", long_about = None)]
pub struct Cli {
    /// Directory holding the model artifact (overrides configuration)
    #[arg(long, global = true, env = "RENTP_MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Artifact file name (overrides configuration)
    #[arg(long, global = true, env = "RENTP_MODEL_NAME")]
    pub model_name: Option<String>,

    /// Read listings from this CSV file instead of the configured source
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Log pipeline progress to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Retrain the model and overwrite the stored artifact
    Build,

    /// Estimate the monthly rent of one apartment
    Predict(predict::PredictArgs),

    /// Show metadata of the stored artifact
    Inspect,
}

impl Cli {
    /// Configuration with command-line overrides applied
    fn config(&self) -> Result<PredictorConfig> {
        let mut config = PredictorConfig::load().context("failed to load configuration")?;
        if let Some(path) = &self.model_path {
            config.model_path = path.clone();
        }
        if let Some(name) = &self.model_name {
            config.model_name = name.clone();
        }
        if let Some(path) = &self.data {
            config.data_source = predictor_lib::DataSourceConfig::Csv { path: path.clone() };
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("info"))
            .with_writer(std::io::stderr)
            .init();
    }

    let config = cli.config()?;

    match &cli.command {
        Commands::Build => build::build_model(config, cli.format).await?,
        Commands::Predict(args) => predict::predict_rent(config, args, cli.format).await?,
        Commands::Inspect => inspect::inspect_artifact(&config, cli.format).await?,
    }

    Ok(())
}
