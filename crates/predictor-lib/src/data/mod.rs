//! Raw listing sources
//!
//! A source fetches the untransformed table of listings. It checks only that
//! the data could be read and has the expected columns; value semantics are
//! the feature preparer's concern.

mod csv;
mod sqlite;

pub use self::csv::CsvSource;
pub use self::sqlite::SqliteSource;

use crate::config::{DataSourceConfig, PredictorConfig};
use crate::error::{PredictorError, Result};
use crate::models::RawRecord;
use crate::observability::StructuredLogger;
use async_trait::async_trait;
use std::sync::Arc;

/// Year column as spelled in the published listings data set
pub const LEGACY_YEAR_COLUMN: &str = "constraction_year";

/// Trait for raw listing sources
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch every listing. Fails with `DataAccess` when the source cannot be
    /// read or holds no rows.
    async fn fetch(&self) -> Result<Vec<RawRecord>>;

    /// Human-readable location for logs
    fn describe(&self) -> String;
}

/// Build the source selected by configuration
pub fn build_source(config: &PredictorConfig, logger: StructuredLogger) -> Arc<dyn DataSource> {
    match &config.data_source {
        DataSourceConfig::Csv { path } => Arc::new(CsvSource::new(path.clone(), logger)),
        DataSourceConfig::Sqlite { url, table } => {
            Arc::new(SqliteSource::new(url.clone(), table.clone(), logger))
        }
    }
}

/// Accept only plain SQL identifiers for table names
pub fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(PredictorError::Config(format!("invalid table name {:?}", name)))
    }
}

/// Shared guard for empty results
pub(crate) fn ensure_not_empty(records: Vec<RawRecord>, location: &str) -> Result<Vec<RawRecord>> {
    if records.is_empty() {
        return Err(PredictorError::DataAccess(format!("no listings found in {}", location)));
    }
    Ok(records)
}

pub(crate) fn missing_value(row: usize, column: &str) -> PredictorError {
    PredictorError::Schema(format!("row {}: missing value in column {}", row, column))
}
