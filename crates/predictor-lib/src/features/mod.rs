//! Feature preparation
//!
//! Turns raw listings into the fixed 9-column feature matrix. Every step takes
//! and returns a polars `DataFrame`. The categorical domains are enumerated up
//! front, so drift in the source data fails with a schema error instead of
//! changing the feature count.

use crate::error::{PredictorError, Result};
use crate::models::{RawRecord, AMENITY_COLUMNS, FEATURE_COLUMNS, TARGET_COLUMN};
use crate::observability::StructuredLogger;
use ndarray::{Array1, Array2};
use polars::prelude::*;

/// Literal used by the listings data for apartments without a garden
pub const GARDEN_ABSENT: &str = "Not present";

/// Level encoded as 1 by the amenity indicators; the other level is dropped
const POSITIVE_LEVEL: &str = "yes";
const REFERENCE_LEVEL: &str = "no";

/// Feature matrix and target vector in model order
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub features: Array2<f64>,
    pub target: Array1<f64>,
}

impl Dataset {
    pub fn rows(&self) -> usize {
        self.features.nrows()
    }
}

/// Name of the indicator derived from an amenity column
pub fn indicator_name(column: &str) -> String {
    format!("{}_{}", column, POSITIVE_LEVEL)
}

/// Garden size from its raw description
///
/// `"Not present"` is 0; otherwise the first run of digits is the size.
pub fn parse_garden_value(raw: &str) -> Result<i64> {
    if raw == GARDEN_ABSENT {
        return Ok(0);
    }
    let digits: String = raw
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return Err(PredictorError::Schema(format!(
            "garden value {:?} has no size",
            raw
        )));
    }
    digits
        .parse()
        .map_err(|_| PredictorError::Schema(format!("garden size {:?} out of range", digits)))
}

/// Lay raw listings out as a frame with the source column names
pub fn records_to_frame(records: &[RawRecord]) -> Result<DataFrame> {
    let text = |f: fn(&RawRecord) -> &str| records.iter().map(f).collect::<Vec<&str>>();
    let int = |f: fn(&RawRecord) -> i64| records.iter().map(f).collect::<Vec<i64>>();
    let float = |f: fn(&RawRecord) -> f64| records.iter().map(f).collect::<Vec<f64>>();

    df!(
        "address" => text(|r| r.address.as_str()),
        "area" => float(|r| r.area),
        "construction_year" => int(|r| r.construction_year),
        "rooms" => int(|r| r.rooms),
        "bedrooms" => int(|r| r.bedrooms),
        "bathrooms" => int(|r| r.bathrooms),
        "balcony" => text(|r| r.balcony.as_str()),
        "storage" => text(|r| r.storage.as_str()),
        "parking" => text(|r| r.parking.as_str()),
        "furnished" => text(|r| r.furnished.as_str()),
        "garage" => text(|r| r.garage.as_str()),
        "garden" => text(|r| r.garden.as_str()),
        "energy" => text(|r| r.energy.as_str()),
        "facilities" => text(|r| r.facilities.as_str()),
        "zip" => text(|r| r.zip.as_str()),
        "neighborhood" => text(|r| r.neighborhood.as_str()),
        TARGET_COLUMN => float(|r| r.rent)
    )
    .map_err(schema_error)
}

fn schema_error(e: PolarsError) -> PredictorError {
    PredictorError::Schema(e.to_string())
}

fn missing_column(name: &str) -> PredictorError {
    PredictorError::Schema(format!("missing column {}", name))
}

/// Converts raw listings into model inputs
#[derive(Debug, Clone)]
pub struct FeaturePreparer {
    logger: StructuredLogger,
}

impl FeaturePreparer {
    pub fn new(logger: StructuredLogger) -> Self {
        Self { logger }
    }

    /// Full pipeline: encode, parse garden, binarize, select
    pub fn prepare(&self, records: &[RawRecord]) -> Result<Dataset> {
        let frame = records_to_frame(records)?;
        let frame = self.encode_categoricals(frame)?;
        let frame = self.parse_garden(frame)?;
        let frame = self.binarize(frame)?;
        let dataset = self.select(&frame)?;
        self.logger
            .log_features_prepared(dataset.rows(), dataset.features.ncols());
        Ok(dataset)
    }

    /// Replace each amenity column with its `<col>_yes` indicator.
    ///
    /// Only "yes" and "no" are accepted. Columns already encoded are left alone.
    pub fn encode_categoricals(&self, mut frame: DataFrame) -> Result<DataFrame> {
        for column in AMENITY_COLUMNS {
            let indicator = indicator_name(column);
            let levels = match frame.column(column) {
                Ok(series) if series.dtype() == &DataType::String => {
                    series.str().map_err(schema_error)?.clone()
                }
                Ok(series) => {
                    return Err(PredictorError::Schema(format!(
                        "amenity column {} has type {}, expected text",
                        column,
                        series.dtype()
                    )))
                }
                Err(_) if frame.column(&indicator).is_ok() => continue,
                Err(_) => return Err(missing_column(column)),
            };

            let unexpected = levels
                .into_iter()
                .enumerate()
                .find(|(_, v)| !matches!(v, Some(POSITIVE_LEVEL) | Some(REFERENCE_LEVEL)));
            if let Some((row, level)) = unexpected {
                return Err(PredictorError::Schema(format!(
                    "row {}: {} has unexpected level {:?}",
                    row, column, level
                )));
            }

            let encoded = levels
                .equal(POSITIVE_LEVEL)
                .into_series()
                .cast(&DataType::Int64)
                .map_err(schema_error)?
                .with_name(&indicator);
            frame.drop_in_place(column).map_err(schema_error)?;
            frame.with_column(encoded).map_err(schema_error)?;
        }
        Ok(frame)
    }

    /// Replace the garden description with its integer size
    pub fn parse_garden(&self, mut frame: DataFrame) -> Result<DataFrame> {
        let garden = frame.column("garden").map_err(|_| missing_column("garden"))?;
        let sizes = match garden.dtype().clone() {
            DataType::String => garden
                .str()
                .map_err(schema_error)?
                .into_iter()
                .enumerate()
                .map(|(row, v)| match v {
                    Some(raw) => parse_garden_value(raw),
                    None => Err(PredictorError::Schema(format!("row {}: garden is empty", row))),
                })
                .collect::<Result<Vec<i64>>>()?,
            dtype if dtype.is_integer() => return Ok(frame),
            dtype => {
                return Err(PredictorError::Schema(format!(
                    "garden column has type {}, expected text or integer",
                    dtype
                )))
            }
        };
        frame
            .with_column(Series::new("garden", sizes))
            .map_err(schema_error)?;
        Ok(frame)
    }

    /// Coerce the indicators to strict 0/1 integers
    pub fn binarize(&self, mut frame: DataFrame) -> Result<DataFrame> {
        for column in AMENITY_COLUMNS {
            let indicator = indicator_name(column);
            let values = numeric(&frame, &indicator)?;

            let strict = values
                .iter()
                .enumerate()
                .map(|(row, &v)| {
                    if v == 0.0 {
                        Ok(0)
                    } else if v == 1.0 {
                        Ok(1)
                    } else {
                        Err(PredictorError::Schema(format!(
                            "row {}: {} is {}, expected 0 or 1",
                            row, indicator, v
                        )))
                    }
                })
                .collect::<Result<Vec<i64>>>()?;
            frame
                .with_column(Series::new(&indicator, strict))
                .map_err(schema_error)?;
        }
        Ok(frame)
    }

    /// Pick the feature columns in model order plus the target
    pub fn select(&self, frame: &DataFrame) -> Result<Dataset> {
        let rows = frame.height();
        let mut features = Array2::<f64>::zeros((rows, FEATURE_COLUMNS.len()));
        for (j, name) in FEATURE_COLUMNS.iter().enumerate() {
            let values = numeric(frame, name)?;
            features.column_mut(j).assign(&Array1::from(values));
        }
        let target = Array1::from(numeric(frame, TARGET_COLUMN)?);
        Ok(Dataset { features, target })
    }
}

/// Values of a numeric column as f64; text and missing values are schema errors
fn numeric(frame: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = frame.column(name).map_err(|_| missing_column(name))?;
    if !series.dtype().is_numeric() {
        return Err(PredictorError::Schema(format!(
            "column {} has type {}, expected numbers",
            name,
            series.dtype()
        )));
    }
    let values = series.cast(&DataType::Float64).map_err(schema_error)?;
    values
        .f64()
        .map_err(schema_error)?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| PredictorError::Schema(format!("row {}: {} is empty", row, name)))
        })
        .collect()
}
