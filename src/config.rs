//! Engine configuration
//!
//! Iteration caps, tolerances and thresholds for every numerical stage. All
//! fields are optional in JSON; missing fields take the defaults below.

use crate::error::AnalyticsError;
use serde::{Deserialize, Serialize};

/// Default Jacobi iteration cap
pub const DEFAULT_JACOBI_MAX_ITERATIONS: usize = 100;

/// Largest off-diagonal magnitude treated as zero by the Jacobi solver
pub const DEFAULT_JACOBI_TOLERANCE: f64 = 1e-10;

/// Kaiser criterion: retain factors whose eigenvalue exceeds this
pub const DEFAULT_KAISER_THRESHOLD: f64 = 1.0;

/// Default number of varimax sweeps
pub const DEFAULT_VARIMAX_MAX_ITERATIONS: usize = 20;

/// Default k-means iteration cap
pub const DEFAULT_KMEANS_MAX_ITERATIONS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub jacobi_max_iterations: usize,
    pub jacobi_tolerance: f64,
    pub kaiser_threshold: f64,
    pub varimax_max_iterations: usize,
    /// Stop varimax early once the criterion changes by less than this.
    /// `None` always runs the full sweep count.
    pub varimax_tolerance: Option<f64>,
    pub kmeans_max_iterations: usize,
    /// Seed for k-means initialization; `None` seeds from OS entropy
    pub seed: Option<u64>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            jacobi_max_iterations: DEFAULT_JACOBI_MAX_ITERATIONS,
            jacobi_tolerance: DEFAULT_JACOBI_TOLERANCE,
            kaiser_threshold: DEFAULT_KAISER_THRESHOLD,
            varimax_max_iterations: DEFAULT_VARIMAX_MAX_ITERATIONS,
            varimax_tolerance: None,
            kmeans_max_iterations: DEFAULT_KMEANS_MAX_ITERATIONS,
            seed: None,
        }
    }
}

impl AnalyticsConfig {
    /// Load configuration from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self, AnalyticsError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Reject values the numerical stages cannot work with
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if !(self.jacobi_tolerance.is_finite() && self.jacobi_tolerance > 0.0) {
            return Err(AnalyticsError::InvalidConfig(format!(
                "jacobi_tolerance must be a positive number, got {}",
                self.jacobi_tolerance
            )));
        }
        if !self.kaiser_threshold.is_finite() {
            return Err(AnalyticsError::InvalidConfig(
                "kaiser_threshold must be finite".to_string(),
            ));
        }
        if let Some(tol) = self.varimax_tolerance {
            if !(tol.is_finite() && tol > 0.0) {
                return Err(AnalyticsError::InvalidConfig(format!(
                    "varimax_tolerance must be a positive number, got {}",
                    tol
                )));
            }
        }
        if self.kmeans_max_iterations == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "kmeans_max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
