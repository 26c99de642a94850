//! Single rent estimate

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use predictor_lib::{
    format_currency, LoadOutcome, PredictionService, PredictorConfig, StructuredLogger,
};
use serde::Serialize;

use crate::output::{print_json, print_warning, OutputFormat};

/// Apartment attributes; amenities are 0 or 1
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Living area in m²
    #[arg(long)]
    pub area: f64,

    /// Construction year
    #[arg(long)]
    pub year: f64,

    #[arg(long)]
    pub bedrooms: f64,

    /// Garden area in m², 0 when there is none
    #[arg(long, default_value_t = 0.0)]
    pub garden: f64,

    #[arg(long, default_value_t = 0)]
    pub balcony: u8,

    #[arg(long, default_value_t = 0)]
    pub storage: u8,

    #[arg(long, default_value_t = 0)]
    pub parking: u8,

    #[arg(long, default_value_t = 0)]
    pub furnished: u8,

    #[arg(long, default_value_t = 0)]
    pub garage: u8,

    /// Fail instead of training when no model is stored
    #[arg(long)]
    pub no_build: bool,
}

impl PredictArgs {
    /// Values in model feature order
    pub fn features(&self) -> [f64; 9] {
        [
            self.area,
            self.year,
            self.bedrooms,
            self.garden,
            f64::from(self.balcony),
            f64::from(self.storage),
            f64::from(self.parking),
            f64::from(self.furnished),
            f64::from(self.garage),
        ]
    }
}

#[derive(Serialize)]
struct Estimate {
    rent: f64,
    formatted: String,
}

/// Load (or build) the model and print one estimate
pub async fn predict_rent(
    config: PredictorConfig,
    args: &PredictArgs,
    format: OutputFormat,
) -> Result<()> {
    let artifact_path = config.artifact_path();
    let logger = StructuredLogger::new(config.model_name.clone());
    let service = PredictionService::new(config, logger);

    if args.no_build {
        service
            .load_existing()
            .await
            .with_context(|| format!("no usable model at {}", artifact_path.display()))?;
    } else {
        if matches!(format, OutputFormat::Table) && !artifact_path.is_file() {
            print_warning("No stored model found, training one first");
        }
        let outcome = service.load().await.context("failed to load model")?;
        if matches!(format, OutputFormat::Table) && outcome == LoadOutcome::Rebuilt {
            print_warning("Stored model was unreadable and has been rebuilt");
        }
    }

    let rent = service
        .predict(&args.features())
        .context("prediction rejected")?;
    let estimate = Estimate {
        rent,
        formatted: format_currency(rent),
    };

    match format {
        OutputFormat::Json => print_json(&estimate)?,
        OutputFormat::Table => {
            println!("Estimated rent: {}", estimate.formatted.green().bold());
        }
    }

    Ok(())
}
