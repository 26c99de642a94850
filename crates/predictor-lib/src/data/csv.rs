//! CSV file source backed by polars

use super::{ensure_not_empty, missing_value, DataSource, LEGACY_YEAR_COLUMN};
use crate::error::{PredictorError, Result};
use crate::models::RawRecord;
use crate::observability::StructuredLogger;
use async_trait::async_trait;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Reads listings from a headered CSV file
pub struct CsvSource {
    path: PathBuf,
    logger: StructuredLogger,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>, logger: StructuredLogger) -> Self {
        Self {
            path: path.into(),
            logger,
        }
    }

    fn read_frame(path: &Path) -> Result<DataFrame> {
        let file = File::open(path).map_err(|e| {
            PredictorError::DataAccess(format!("failed to open {}: {}", path.display(), e))
        })?;

        let frame = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(1000))
            .into_reader_with_file_handle(file)
            .finish()?;
        Ok(frame)
    }
}

#[async_trait]
impl DataSource for CsvSource {
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        self.logger.log_data_fetch_started(&self.describe());
        let path = self.path.clone();
        let records = tokio::task::spawn_blocking(move || {
            let frame = Self::read_frame(&path)?;
            records_from_frame(&frame)
        })
        .await
        .map_err(|e| PredictorError::DataAccess(format!("CSV reader task failed: {}", e)))??;

        let records = ensure_not_empty(records, &self.describe())?;
        self.logger.log_data_fetched(&self.describe(), records.len());
        Ok(records)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Convert a loaded frame into typed records
fn records_from_frame(frame: &DataFrame) -> Result<Vec<RawRecord>> {
    let rows = frame.height();

    let year_column = if frame.column("construction_year").is_ok() {
        "construction_year"
    } else {
        LEGACY_YEAR_COLUMN
    };

    let area = float_column(frame, "area")?;
    let year = int_column(frame, year_column)?;
    let bedrooms = int_column(frame, "bedrooms")?;
    let rent = float_column(frame, "rent")?;
    let rooms = optional_int_column(frame, "rooms")?;
    let bathrooms = optional_int_column(frame, "bathrooms")?;

    let balcony = text_column(frame, "balcony", true)?;
    let storage = text_column(frame, "storage", true)?;
    let parking = text_column(frame, "parking", true)?;
    let furnished = text_column(frame, "furnished", true)?;
    let garage = text_column(frame, "garage", true)?;
    let garden = text_column(frame, "garden", true)?;
    let address = text_column(frame, "address", false)?;
    let energy = text_column(frame, "energy", false)?;
    let facilities = text_column(frame, "facilities", false)?;
    let zip = text_column(frame, "zip", false)?;
    let neighborhood = text_column(frame, "neighborhood", false)?;

    let mut records = Vec::with_capacity(rows);
    for i in 0..rows {
        records.push(RawRecord {
            address: address[i].clone().unwrap_or_default(),
            area: area[i].ok_or_else(|| missing_value(i, "area"))?,
            construction_year: year[i].ok_or_else(|| missing_value(i, year_column))?,
            rooms: rooms[i].unwrap_or_default(),
            bedrooms: bedrooms[i].ok_or_else(|| missing_value(i, "bedrooms"))?,
            bathrooms: bathrooms[i].unwrap_or_default(),
            balcony: balcony[i].clone().unwrap_or_default(),
            storage: storage[i].clone().unwrap_or_default(),
            parking: parking[i].clone().unwrap_or_default(),
            furnished: furnished[i].clone().unwrap_or_default(),
            garage: garage[i].clone().unwrap_or_default(),
            garden: garden[i].clone().unwrap_or_default(),
            energy: energy[i].clone().unwrap_or_default(),
            facilities: facilities[i].clone().unwrap_or_default(),
            zip: zip[i].clone().unwrap_or_default(),
            neighborhood: neighborhood[i].clone().unwrap_or_default(),
            rent: rent[i].ok_or_else(|| missing_value(i, "rent"))?,
        });
    }
    Ok(records)
}

fn required<'a>(frame: &'a DataFrame, name: &str) -> Result<&'a Series> {
    frame
        .column(name)
        .map_err(|_| PredictorError::Schema(format!("missing column {}", name)))
}

fn float_column(frame: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = required(frame, name)?.cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

fn int_column(frame: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let series = required(frame, name)?.cast(&DataType::Int64)?;
    Ok(series.i64()?.into_iter().collect())
}

fn optional_int_column(frame: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    if frame.column(name).is_err() {
        return Ok(vec![None; frame.height()]);
    }
    int_column(frame, name)
}

fn text_column(frame: &DataFrame, name: &str, is_required: bool) -> Result<Vec<Option<String>>> {
    let series = match frame.column(name) {
        Ok(series) => series.cast(&DataType::String)?,
        Err(_) if !is_required => return Ok(vec![None; frame.height()]),
        Err(_) => return Err(PredictorError::Schema(format!("missing column {}", name))),
    };
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}
