//! Relational table source over an sqlx sqlite pool

use super::{ensure_not_empty, missing_value, validate_identifier, DataSource, LEGACY_YEAR_COLUMN};
use crate::error::{PredictorError, Result};
use crate::models::RawRecord;
use crate::observability::StructuredLogger;
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::Row;

/// Reads listings with `SELECT * FROM <table>`
pub struct SqliteSource {
    url: String,
    table: String,
    logger: StructuredLogger,
}

impl SqliteSource {
    pub fn new(url: impl Into<String>, table: impl Into<String>, logger: StructuredLogger) -> Self {
        Self {
            url: url.into(),
            table: table.into(),
            logger,
        }
    }
}

#[async_trait]
impl DataSource for SqliteSource {
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        validate_identifier(&self.table)?;
        self.logger.log_data_fetch_started(&self.describe());

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&self.url)
            .await
            .map_err(|e| {
                PredictorError::DataAccess(format!("failed to connect to {}: {}", self.url, e))
            })?;

        let query = format!("SELECT * FROM {}", self.table);
        let rows = sqlx::query(&query).fetch_all(&pool).await;
        pool.close().await;
        let rows = rows?;

        let records = rows
            .iter()
            .enumerate()
            .map(|(i, row)| record_from_row(i, row))
            .collect::<Result<Vec<_>>>()?;

        let records = ensure_not_empty(records, &self.describe())?;
        self.logger.log_data_fetched(&self.describe(), records.len());
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("{} (table {})", self.url, self.table)
    }
}

fn record_from_row(i: usize, row: &SqliteRow) -> Result<RawRecord> {
    let year_column = if has_column(row, "construction_year") {
        "construction_year"
    } else {
        LEGACY_YEAR_COLUMN
    };

    Ok(RawRecord {
        address: text(row, "address", false)?.unwrap_or_default(),
        area: number(row, "area")?.ok_or_else(|| missing_value(i, "area"))?,
        construction_year: integer(row, year_column)?
            .ok_or_else(|| missing_value(i, year_column))?,
        rooms: integer(row, "rooms").ok().flatten().unwrap_or_default(),
        bedrooms: integer(row, "bedrooms")?.ok_or_else(|| missing_value(i, "bedrooms"))?,
        bathrooms: integer(row, "bathrooms").ok().flatten().unwrap_or_default(),
        balcony: text(row, "balcony", true)?.unwrap_or_default(),
        storage: text(row, "storage", true)?.unwrap_or_default(),
        parking: text(row, "parking", true)?.unwrap_or_default(),
        furnished: text(row, "furnished", true)?.unwrap_or_default(),
        garage: text(row, "garage", true)?.unwrap_or_default(),
        garden: text(row, "garden", true)?.unwrap_or_default(),
        energy: text(row, "energy", false)?.unwrap_or_default(),
        facilities: text(row, "facilities", false)?.unwrap_or_default(),
        zip: text(row, "zip", false)?.unwrap_or_default(),
        neighborhood: text(row, "neighborhood", false)?.unwrap_or_default(),
        rent: number(row, "rent")?.ok_or_else(|| missing_value(i, "rent"))?,
    })
}

fn has_column(row: &SqliteRow, name: &str) -> bool {
    row.try_get_raw(name).is_ok()
}

fn column_error(name: &str, e: sqlx::Error) -> PredictorError {
    match e {
        sqlx::Error::ColumnNotFound(_) => PredictorError::Schema(format!("missing column {}", name)),
        other => PredictorError::DataAccess(format!("column {}: {}", name, other)),
    }
}

/// REAL or INTEGER storage, read as f64
fn number(row: &SqliteRow, name: &str) -> Result<Option<f64>> {
    match row.try_get::<Option<f64>, _>(name) {
        Ok(v) => Ok(v),
        Err(sqlx::Error::ColumnNotFound(_)) => Err(column_error(name, sqlx::Error::ColumnNotFound(name.into()))),
        Err(_) => row
            .try_get::<Option<i64>, _>(name)
            .map(|v| v.map(|n| n as f64))
            .map_err(|e| column_error(name, e)),
    }
}

fn integer(row: &SqliteRow, name: &str) -> Result<Option<i64>> {
    match row.try_get::<Option<i64>, _>(name) {
        Ok(v) => Ok(v),
        Err(sqlx::Error::ColumnNotFound(_)) => Err(column_error(name, sqlx::Error::ColumnNotFound(name.into()))),
        Err(_) => row
            .try_get::<Option<f64>, _>(name)
            .map(|v| v.map(|n| n.round() as i64))
            .map_err(|e| column_error(name, e)),
    }
}

fn text(row: &SqliteRow, name: &str, is_required: bool) -> Result<Option<String>> {
    match row.try_get::<Option<String>, _>(name) {
        Ok(v) => Ok(v),
        Err(sqlx::Error::ColumnNotFound(_)) if !is_required => Ok(None),
        Err(sqlx::Error::ColumnNotFound(_)) => Err(column_error(name, sqlx::Error::ColumnNotFound(name.into()))),
        // numeric storage in a text column, e.g. all-digit postal codes
        Err(_) => Ok(integer(row, name)?.map(|n| n.to_string())),
    }
}
