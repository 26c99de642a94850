//! Stored artifact metadata

use anyhow::{Context, Result};
use colored::Colorize;
use predictor_lib::{ArtifactMetadata, ArtifactStore, PredictorConfig, StructuredLogger};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::output::{color_r2, print_header, print_json, OutputFormat};

#[derive(Serialize)]
struct ArtifactInfo<'a> {
    path: PathBuf,
    size_bytes: u64,
    metadata: &'a ArtifactMetadata,
}

/// Read the artifact without building and print its metadata
pub async fn inspect_artifact(config: &PredictorConfig, format: OutputFormat) -> Result<()> {
    let path = config.artifact_path();
    let store = ArtifactStore::new(StructuredLogger::new(config.model_name.clone()));

    let load_path = path.clone();
    let artifact = tokio::task::spawn_blocking(move || store.load(&load_path))
        .await
        .context("artifact reader task failed")?
        .with_context(|| format!("cannot read model at {}", path.display()))?;
    let size_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

    match format {
        OutputFormat::Json => print_json(&ArtifactInfo {
            path: path.clone(),
            size_bytes,
            metadata: artifact.metadata(),
        })?,
        OutputFormat::Table => print_metadata(&path, size_bytes, artifact.metadata()),
    }

    Ok(())
}

fn print_metadata(path: &Path, size_bytes: u64, meta: &ArtifactMetadata) {
    print_header("Rent Model");
    println!("Path:                   {}", path.display().to_string().cyan());
    println!("Size:                   {} bytes", size_bytes);
    println!(
        "Created:                {}",
        meta.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("Built by version:       {}", meta.crate_version);
    println!();

    print_header("Hyperparameters");
    println!("Criterion:              {}", meta.params.criterion);
    println!("Max depth:              {}", meta.params.max_depth);
    println!("Trees:                  {}", meta.params.n_estimators);
    println!();

    print_header("Evaluation");
    println!("Mean CV R²:             {}", color_r2(meta.cv_r2));
    println!("Held-out R²:            {}", color_r2(meta.test_r2));
    println!("Train rows:             {}", meta.train_rows);
    println!("Test rows:              {}", meta.test_rows);
    println!();

    print_header("Features");
    for (i, column) in meta.feature_columns.iter().enumerate() {
        println!("{:>2}. {}", i + 1, column);
    }
}
