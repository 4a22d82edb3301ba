//! Error types for LearnLens

use thiserror::Error;

/// Errors raised by the explicit-failure paths (clustering, parsing, configuration).
///
/// The factor-analysis path never returns these for bad log content; it degrades
/// to an empty [`crate::types::FactorAnalysisResult`] instead.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid feature map: {0}")]
    InvalidFeatureMap(String),

    #[error("Feature collection is empty")]
    EmptyFeatures,

    #[error("Invalid cluster count k={k} (expected 1 <= k <= {rows})")]
    InvalidClusterCount { k: usize, rows: usize },

    #[error("No factor axes found in feature map")]
    NoFactorAxes,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}
