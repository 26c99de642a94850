//! Rent predictor service
//!
//! HTTP surface and startup lifecycle around `predictor_lib::PredictionService`.

pub mod api;
pub mod lifecycle;
