use super::*;
use crate::config::SearchGrid;
use crate::features::FeaturePreparer;
use crate::fixtures;

fn small_config() -> TrainingConfig {
    TrainingConfig {
        max_parallelism: 2,
        grid: SearchGrid {
            n_estimators: vec![10, 20],
            criteria: vec![SplitCriterion::SquaredError, SplitCriterion::AbsoluteError],
            max_depth: vec![4],
        },
        ..Default::default()
    }
}

fn trainer(config: TrainingConfig) -> ModelTrainer {
    ModelTrainer::new(config, StructuredLogger::new("test"))
}

fn dataset(rows: usize) -> Dataset {
    FeaturePreparer::new(StructuredLogger::new("test"))
        .prepare(&fixtures::listings(rows))
        .unwrap()
}

#[test]
fn test_split_is_reproducible() {
    let data = dataset(100);
    let t = trainer(small_config());

    let a = t.split(&data.features, &data.target).unwrap();
    let b = t.split(&data.features, &data.target).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.x_test.nrows(), 20);
    assert_eq!(a.x_train.nrows(), 80);
    assert_eq!(a.y_train.len(), 80);
}

#[test]
fn test_split_depends_on_seed() {
    let data = dataset(100);
    let a = trainer(small_config()).split(&data.features, &data.target).unwrap();
    let b = trainer(TrainingConfig {
        seed: 7,
        ..small_config()
    })
    .split(&data.features, &data.target)
    .unwrap();
    assert_ne!(a.y_test, b.y_test);
}

#[test]
fn test_split_rounds_test_size_up() {
    let data = dataset(11);
    let split = trainer(small_config()).split(&data.features, &data.target).unwrap();
    assert_eq!(split.x_test.nrows(), 3);
    assert_eq!(split.x_train.nrows(), 8);
}

#[test]
fn test_empty_matrix_is_training_error() {
    let x = Array2::<f64>::zeros((0, 9));
    let y = Array1::<f64>::zeros(0);
    let err = trainer(small_config()).split(&x, &y).unwrap_err();
    assert!(matches!(err, PredictorError::Training(_)));
}

#[test]
fn test_row_count_mismatch_is_training_error() {
    let x = Array2::<f64>::ones((10, 9));
    let y = Array1::<f64>::ones(9);
    let err = trainer(small_config()).search_and_fit(&x, &y).unwrap_err();
    assert!(matches!(err, PredictorError::Training(_)));
}

#[test]
fn test_non_finite_value_is_training_error() {
    let mut x = Array2::<f64>::ones((10, 9));
    x[[3, 2]] = f64::NAN;
    let y = Array1::<f64>::ones(10);
    let err = trainer(small_config()).split(&x, &y).unwrap_err();
    assert!(matches!(err, PredictorError::Training(_)));
}

#[test]
fn test_train_on_fixture_listings() {
    let data = dataset(100);
    let outcome = trainer(small_config()).train(&data).unwrap();

    assert_eq!(outcome.train_rows, 80);
    assert_eq!(outcome.test_rows, 20);
    assert_eq!(outcome.report.candidates.len(), 4);
    assert!(outcome.report.candidates.iter().all(|c| c.fold_scores.len() == 5));
    assert_eq!(outcome.params(), outcome.report.best().params);
    assert_eq!(outcome.report.best().rank, 1);
    assert!(outcome.test_r2.is_finite());
    assert!(outcome.test_r2 > 0.0, "test R² {}", outcome.test_r2);
    assert_eq!(outcome.model.n_trees(), outcome.params().n_estimators);
}

#[test]
fn test_train_is_reproducible() {
    let data = dataset(60);
    let a = trainer(small_config()).train(&data).unwrap();
    let b = trainer(small_config()).train(&data).unwrap();
    assert_eq!(a.model, b.model);
    assert_eq!(a.report, b.report);
}

#[test]
fn test_expired_deadline_aborts_training() {
    let data = dataset(40);
    let config = TrainingConfig {
        deadline_secs: Some(0),
        ..small_config()
    };
    let err = trainer(config).train(&data).unwrap_err();
    assert!(matches!(err, PredictorError::Training(_)));
}

#[test]
fn test_evaluate_rejects_wrong_width() {
    let data = dataset(40);
    let t = trainer(small_config());
    let (model, _) = t.search_and_fit(&data.features, &data.target).unwrap();
    let narrow = Array2::<f64>::ones((3, 4));
    let y = Array1::<f64>::ones(3);
    assert!(t.evaluate(&model, &narrow, &y).is_err());
}

#[test]
fn test_criterion_names_round_trip_through_serde() {
    for criterion in SplitCriterion::ALL {
        let json = serde_json::to_string(&criterion).unwrap();
        assert_eq!(json, format!("\"{}\"", criterion));
        let back: SplitCriterion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, criterion);
    }
}
