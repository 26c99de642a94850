//! CLI integration tests

use predictor_lib::{
    fixtures, DataSourceConfig, ModelBuilder, PredictorConfig, SearchGrid, SingleFlight,
    SplitCriterion, StructuredLogger, TrainingConfig,
};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn rentp(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rentp"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("Failed to execute rentp")
}

/// Train a small model into `<dir>/models` through the library
async fn build_fixture_model(dir: &Path) -> PredictorConfig {
    let csv = dir.join("rent_apartments.csv");
    std::fs::write(&csv, fixtures::listings_csv(100)).unwrap();

    let config = PredictorConfig {
        model_path: dir.join("models"),
        data_source: DataSourceConfig::Csv { path: csv },
        training: TrainingConfig {
            grid: SearchGrid {
                n_estimators: vec![10],
                criteria: vec![SplitCriterion::SquaredError],
                max_depth: vec![6],
            },
            ..Default::default()
        },
        ..Default::default()
    };
    ModelBuilder::from_config(config.clone(), StructuredLogger::new("test"))
        .with_gate(SingleFlight::new())
        .build_and_save()
        .await
        .unwrap();
    config
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let dir = TempDir::new().unwrap();
    let output = rentp(dir.path(), &["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("rent predictor"), "Should show app description");
    assert!(stdout.contains("build"), "Should show build command");
    assert!(stdout.contains("predict"), "Should show predict command");
    assert!(stdout.contains("inspect"), "Should show inspect command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let dir = TempDir::new().unwrap();
    let output = rentp(dir.path(), &["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("rentp"), "Should show binary name");
}

/// Test predict subcommand help
#[test]
fn test_predict_help() {
    let dir = TempDir::new().unwrap();
    let output = rentp(dir.path(), &["predict", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Predict help should succeed");
    for flag in ["--area", "--year", "--bedrooms", "--garden", "--garage", "--no-build"] {
        assert!(stdout.contains(flag), "Should show {} option", flag);
    }
}

#[tokio::test]
async fn test_inspect_json_reports_metadata() {
    let dir = TempDir::new().unwrap();
    build_fixture_model(dir.path()).await;

    let output = rentp(dir.path(), &["--model-path", "models", "inspect", "--format", "json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let info: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(info["metadata"]["train_rows"], 80);
    assert_eq!(info["metadata"]["test_rows"], 20);
    assert_eq!(info["metadata"]["params"]["criterion"], "squared_error");
    assert_eq!(info["metadata"]["feature_columns"].as_array().unwrap().len(), 9);
}

#[tokio::test]
async fn test_predict_from_stored_model() {
    let dir = TempDir::new().unwrap();
    build_fixture_model(dir.path()).await;

    let output = rentp(
        dir.path(),
        &[
            "--model-path", "models", "--format", "json", "predict", "--no-build",
            "--area", "85", "--year", "2015", "--bedrooms", "2", "--garden", "20",
            "--balcony", "1", "--storage", "1", "--garage", "1",
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let estimate: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rent = estimate["rent"].as_f64().unwrap();
    assert!(rent.is_finite() && rent >= 0.0);
    assert!(estimate["formatted"].as_str().unwrap().starts_with('$'));
}

#[tokio::test]
async fn test_predict_rejects_out_of_domain_amenity() {
    let dir = TempDir::new().unwrap();
    build_fixture_model(dir.path()).await;

    let output = rentp(
        dir.path(),
        &[
            "--model-path", "models", "predict", "--no-build",
            "--area", "85", "--year", "2015", "--bedrooms", "2", "--balcony", "2",
        ],
    );
    assert!(!output.status.success());
}

#[test]
fn test_no_build_without_model_fails_and_trains_nothing() {
    let dir = TempDir::new().unwrap();
    let output = rentp(
        dir.path(),
        &[
            "--model-path", "models", "predict", "--no-build",
            "--area", "85", "--year", "2015", "--bedrooms", "2",
        ],
    );

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no usable model"));
    assert!(!dir.path().join("models").exists());
}

#[test]
fn test_inspect_without_model_fails() {
    let dir = TempDir::new().unwrap();
    let output = rentp(dir.path(), &["--model-path", "models", "inspect"]);
    assert!(!output.status.success());
}
