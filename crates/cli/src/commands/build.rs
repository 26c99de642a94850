//! Unconditional model build

use anyhow::{Context, Result};
use colored::Colorize;
use predictor_lib::{
    trainer::CandidateScore, ArtifactMetadata, BuildOutput, ModelBuilder, PredictorConfig,
    SearchReport, StructuredLogger,
};
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;

use crate::output::{color_r2, format_r2, print_header, print_json, print_success, print_table, OutputFormat};

/// Row for the grid search leaderboard
#[derive(Tabled)]
struct CandidateRow {
    #[tabled(rename = "Rank")]
    rank: usize,
    #[tabled(rename = "Criterion")]
    criterion: String,
    #[tabled(rename = "Max Depth")]
    max_depth: usize,
    #[tabled(rename = "Trees")]
    n_estimators: usize,
    #[tabled(rename = "Mean CV R²")]
    mean_r2: String,
    #[tabled(rename = "Std")]
    std_r2: String,
}

impl From<&CandidateScore> for CandidateRow {
    fn from(c: &CandidateScore) -> Self {
        Self {
            rank: c.rank,
            criterion: c.params.criterion.to_string(),
            max_depth: c.params.max_depth,
            n_estimators: c.params.n_estimators,
            mean_r2: format_r2(c.mean_r2),
            std_r2: format_r2(c.std_r2),
        }
    }
}

#[derive(Serialize)]
struct BuildSummary<'a> {
    path: &'a PathBuf,
    metadata: &'a ArtifactMetadata,
    search: &'a SearchReport,
}

/// Retrain from the configured source and overwrite the artifact
pub async fn build_model(config: PredictorConfig, format: OutputFormat) -> Result<()> {
    let logger = StructuredLogger::new(config.model_name.clone());
    let output: BuildOutput = ModelBuilder::from_config(config, logger)
        .build_and_save()
        .await
        .context("model build failed")?;
    let metadata = output.artifact.metadata();

    match format {
        OutputFormat::Json => print_json(&BuildSummary {
            path: &output.path,
            metadata,
            search: &output.report,
        })?,
        OutputFormat::Table => {
            print_header("Grid Search");
            let rows: Vec<CandidateRow> = output
                .report
                .leaderboard()
                .into_iter()
                .map(CandidateRow::from)
                .collect();
            print_table(&rows);
            println!();

            print_header("Selected Model");
            println!("Criterion:              {}", metadata.params.criterion.to_string().cyan());
            println!("Max depth:              {}", metadata.params.max_depth);
            println!("Trees:                  {}", metadata.params.n_estimators);
            println!("Mean CV R²:             {}", color_r2(metadata.cv_r2));
            println!(
                "Held-out R²:            {} ({} train / {} test rows)",
                color_r2(metadata.test_r2),
                metadata.train_rows,
                metadata.test_rows
            );
            println!();
            print_success(&format!("Saved model to {}", output.path.display()));
        }
    }

    Ok(())
}
