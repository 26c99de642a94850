//! Core data models for the rent predictor

use crate::error::{PredictorError, Result};
use serde::{Deserialize, Serialize};

/// Number of model inputs
pub const FEATURE_COUNT: usize = 9;

/// Feature column names in model order. Shared by training and inference.
pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "area",
    "construction_year",
    "bedrooms",
    "garden",
    "balcony_yes",
    "storage_yes",
    "parking_yes",
    "furnished_yes",
    "garage_yes",
];

/// Two-level amenity columns, in the order their indicators appear in the schema
pub const AMENITY_COLUMNS: [&str; 5] = ["balcony", "storage", "parking", "furnished", "garage"];

/// Index of the first amenity indicator within a feature vector
pub const FIRST_INDICATOR: usize = 4;

/// Target column name
pub const TARGET_COLUMN: &str = "rent";

/// One untransformed apartment listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub address: String,
    pub area: f64,
    pub construction_year: i64,
    pub rooms: i64,
    pub bedrooms: i64,
    pub bathrooms: i64,
    pub balcony: String,
    pub storage: String,
    pub parking: String,
    pub furnished: String,
    pub garage: String,
    pub garden: String,
    pub energy: String,
    pub facilities: String,
    pub zip: String,
    pub neighborhood: String,
    pub rent: f64,
}

impl RawRecord {
    /// Value of an amenity column by name
    pub fn amenity(&self, column: &str) -> Option<&str> {
        match column {
            "balcony" => Some(&self.balcony),
            "storage" => Some(&self.storage),
            "parking" => Some(&self.parking),
            "furnished" => Some(&self.furnished),
            "garage" => Some(&self.garage),
            _ => None,
        }
    }
}

/// Model input for a single apartment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub area: f64,
    pub construction_year: f64,
    pub bedrooms: f64,
    pub garden: f64,
    pub balcony: u8,
    pub storage: u8,
    pub parking: u8,
    pub furnished: u8,
    pub garage: u8,
}

impl FeatureVector {
    /// Values in `FEATURE_COLUMNS` order
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.area,
            self.construction_year,
            self.bedrooms,
            self.garden,
            f64::from(self.balcony),
            f64::from(self.storage),
            f64::from(self.parking),
            f64::from(self.furnished),
            f64::from(self.garage),
        ]
    }

    /// Validate an ordered slice against the schema and build a vector from it.
    ///
    /// Fails with `SchemaMismatch` when the length is not 9, a value is not
    /// finite, or an indicator position holds anything other than 0 or 1.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        if values.len() != FEATURE_COUNT {
            return Err(PredictorError::SchemaMismatch {
                expected: format!("{} values ({})", FEATURE_COUNT, FEATURE_COLUMNS.join(", ")),
                actual: format!("{} values", values.len()),
            });
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(PredictorError::SchemaMismatch {
                expected: format!("finite value for {}", FEATURE_COLUMNS[pos]),
                actual: values[pos].to_string(),
            });
        }

        let mut indicators = [0u8; 5];
        for (slot, pos) in indicators.iter_mut().zip(FIRST_INDICATOR..FEATURE_COUNT) {
            *slot = match values[pos] {
                v if v == 0.0 => 0,
                v if v == 1.0 => 1,
                v => {
                    return Err(PredictorError::SchemaMismatch {
                        expected: format!("0 or 1 for {}", FEATURE_COLUMNS[pos]),
                        actual: v.to_string(),
                    })
                }
            };
        }

        Ok(Self {
            area: values[0],
            construction_year: values[1],
            bedrooms: values[2],
            garden: values[3],
            balcony: indicators[0],
            storage: indicators[1],
            parking: indicators[2],
            furnished: indicators[3],
            garage: indicators[4],
        })
    }
}

/// Dollar amount with thousands separators and two decimals, e.g. `$1,234.56`
pub fn format_currency(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(1234.564), "$1,234.56");
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(999.999), "$1,000.00");
        assert_eq!(format_currency(1_250_000.5), "$1,250,000.50");
        assert_eq!(format_currency(-42.1), "-$42.10");
    }

    #[test]
    fn test_feature_vector_round_trip_order() {
        let values = [85.0, 2015.0, 2.0, 20.0, 1.0, 1.0, 0.0, 0.0, 1.0];
        let v = FeatureVector::from_slice(&values).unwrap();
        assert_eq!(v.balcony, 1);
        assert_eq!(v.parking, 0);
        assert_eq!(v.garage, 1);
        assert_eq!(v.to_array(), values);
    }

    #[test]
    fn test_wrong_length_is_mismatch() {
        let err = FeatureVector::from_slice(&[85.0, 2015.0, 2.0]).unwrap_err();
        assert!(matches!(err, PredictorError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_indicator_out_of_domain_is_mismatch() {
        // year and area swapped into indicator positions
        let values = [1.0, 1.0, 0.0, 0.0, 1.0, 85.0, 2015.0, 2.0, 20.0];
        let err = FeatureVector::from_slice(&values).unwrap_err();
        assert!(matches!(err, PredictorError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_non_finite_is_mismatch() {
        let values = [f64::NAN, 2015.0, 2.0, 20.0, 1.0, 1.0, 0.0, 0.0, 1.0];
        assert!(FeatureVector::from_slice(&values).is_err());
    }

    #[test]
    fn test_amenity_lookup() {
        let record = RawRecord {
            address: "Main 1".into(),
            area: 50.0,
            construction_year: 1990,
            rooms: 2,
            bedrooms: 1,
            bathrooms: 1,
            balcony: "yes".into(),
            storage: "no".into(),
            parking: "no".into(),
            furnished: "yes".into(),
            garage: "no".into(),
            garden: "Not present".into(),
            energy: "A".into(),
            facilities: String::new(),
            zip: "1011".into(),
            neighborhood: "Centrum".into(),
            rent: 1200.0,
        };
        assert_eq!(record.amenity("balcony"), Some("yes"));
        assert_eq!(record.amenity("furnished"), Some("yes"));
        assert_eq!(record.amenity("garden"), None);
    }
}
