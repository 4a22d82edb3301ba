//! Pipeline orchestration
//!
//! This module provides the public API for LearnLens.
//! It orchestrates the full pipeline from raw log JSON to factor scores,
//! learner clusters and the dashboard report.

use crate::config::AnalyticsConfig;
use crate::eigen::EigenSolver;
use crate::encoder::ReportEncoder;
use crate::error::AnalyticsError;
use crate::factor::{factor_key, FactorExtractor, FactorScorer, VarimaxRotator};
use crate::kmeans::{FeatureMatrix, KMeans, RandomSource};
use crate::observations::ObservationExtractor;
use crate::stats::{CovarianceBuilder, Standardizer};
use crate::types::{
    AnalyticsReport, ClusteringResult, FactorAnalysisResult, LogRecord, ObservationSet,
    OrderedMap,
};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;

/// Run factor analysis over typed log records.
///
/// Never fails: empty input or data without qualifying factors yields a
/// result with `num_factors == 0`.
///
/// # Example
/// ```ignore
/// let result = run_factor_analysis(&records, &AnalyticsConfig::default());
/// if result.is_empty() { /* nothing could be computed */ }
/// ```
pub fn run_factor_analysis(
    records: &[LogRecord],
    config: &AnalyticsConfig,
) -> FactorAnalysisResult {
    info!("Factor analysis: starting on {} log records", records.len());
    let observations = ObservationExtractor::extract(records);
    analyze_observations(&observations, config)
}

/// Run factor analysis over a JSON log payload.
///
/// Accepts either a bare array of records or an object with a `logs` array.
/// Only unparseable JSON is an error; any other shape degrades to an empty result.
pub fn factor_analysis_from_json(
    json: &str,
    config: &AnalyticsConfig,
) -> Result<FactorAnalysisResult, AnalyticsError> {
    let entries = parse_log_payload(json)?;
    info!("Factor analysis: starting on {} log entries", entries.len());
    let observations = ObservationExtractor::extract_values(&entries);
    Ok(analyze_observations(&observations, config))
}

/// Cluster learners by their factor scores.
///
/// # Errors
/// Explicit failures for empty scores, missing factor axes and invalid `k`.
pub fn cluster_factor_scores<R: RandomSource + ?Sized>(
    scores: &OrderedMap<OrderedMap<f64>>,
    k: usize,
    max_iterations: usize,
    rng: &mut R,
) -> Result<ClusteringResult, AnalyticsError> {
    let features = FeatureMatrix::from_factor_scores(scores)?;
    KMeans::new(k)
        .with_max_iterations(max_iterations)
        .fit(&features, rng)
}

/// Extract the list of log entries from a payload
fn parse_log_payload(json: &str) -> Result<Vec<Value>, AnalyticsError> {
    let value: Value = serde_json::from_str(json)?;
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut obj) => match obj.remove("logs") {
            Some(Value::Array(entries)) => entries,
            _ => {
                warn!("Log payload has no `logs` array");
                Vec::new()
            }
        },
        _ => {
            warn!("Log payload is neither an array nor an object");
            Vec::new()
        }
    };
    Ok(entries)
}

/// Factor analysis over an already extracted observation set.
///
/// Pipeline stages:
/// 1. Standardizer - z-score each variable
/// 2. CovarianceBuilder - sample covariance of the z-scores
/// 3. EigenSolver - Jacobi eigen-decomposition
/// 4. FactorExtractor - Kaiser criterion and initial loadings
/// 5. VarimaxRotator - rotate loadings
/// 6. FactorScorer - project learners onto rotated loadings
pub fn analyze_observations(
    observations: &ObservationSet,
    config: &AnalyticsConfig,
) -> FactorAnalysisResult {
    if observations.is_empty() {
        warn!("Factor analysis: no data extracted");
        return FactorAnalysisResult::empty();
    }

    info!(
        "Factor analysis: extracted {} learners, {} variables",
        observations.learner_ids.len(),
        observations.variables.len()
    );

    // Stage 1: Standardize
    let standardized = Standardizer::standardize(&observations.matrix);

    // Stage 2: Covariance of standardized data
    let covariance = CovarianceBuilder::build(&standardized.standardized);

    // Stage 3: Eigen-decomposition
    let decomposition = EigenSolver::new(config.jacobi_max_iterations, config.jacobi_tolerance)
        .solve(&covariance);

    // Stage 4: Factor count and initial loadings
    let extractor = FactorExtractor::new(config.kaiser_threshold);
    let num_factors = extractor.retained_count(&decomposition.eigenvalues);
    info!("Factor analysis: {} factors retained (Kaiser criterion)", num_factors);

    if num_factors == 0 {
        warn!("Factor analysis: no eigenvalue above {}", config.kaiser_threshold);
        return FactorAnalysisResult::without_factors(decomposition.eigenvalues);
    }

    let initial = extractor.loadings(&decomposition);

    // Stage 5: Rotation
    let rotation = VarimaxRotator::new(config.varimax_max_iterations)
        .with_tolerance(config.varimax_tolerance)
        .rotate(&initial);
    debug!("Factor analysis: rotation ran {} sweeps", rotation.sweeps);

    // Stage 6: Factor scores
    let scores = FactorScorer::score(&standardized.standardized, &rotation.loadings);

    let loadings: OrderedMap<Vec<f64>> = observations
        .variables
        .iter()
        .cloned()
        .zip(rotation.loadings)
        .collect();

    let factor_scores: OrderedMap<OrderedMap<f64>> = observations
        .learner_ids
        .iter()
        .cloned()
        .zip(scores)
        .map(|(learner, row)| {
            let axes: OrderedMap<f64> = row
                .into_iter()
                .enumerate()
                .map(|(j, value)| (factor_key(j), value))
                .collect();
            (learner, axes)
        })
        .collect();

    info!("Factor analysis: completed");

    FactorAnalysisResult {
        eigenvalues: decomposition.eigenvalues,
        num_factors,
        loadings,
        factor_scores,
    }
}

/// Processor holding configuration, a random source and a report encoder.
///
/// Use this when several analyses should share one configuration and one
/// (optionally seeded) random stream.
pub struct AnalyticsProcessor {
    config: AnalyticsConfig,
    rng: StdRng,
    encoder: ReportEncoder,
}

impl Default for AnalyticsProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyticsProcessor {
    /// Create a processor with default settings
    pub fn new() -> Self {
        Self::with_config(AnalyticsConfig::default())
    }

    /// Create a processor with a specific configuration
    pub fn with_config(config: AnalyticsConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng,
            encoder: ReportEncoder::new(),
        }
    }

    /// Load configuration from JSON, reseeding the random source
    pub fn load_config(&mut self, json: &str) -> Result<(), AnalyticsError> {
        *self = Self::with_config(AnalyticsConfig::from_json(json)?);
        Ok(())
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Factor analysis over typed records
    pub fn factor_analysis(&self, records: &[LogRecord]) -> FactorAnalysisResult {
        run_factor_analysis(records, &self.config)
    }

    /// Factor analysis over a JSON log payload
    pub fn factor_analysis_json(&self, json: &str) -> Result<FactorAnalysisResult, AnalyticsError> {
        factor_analysis_from_json(json, &self.config)
    }

    /// Cluster typed factor scores
    pub fn cluster(
        &mut self,
        scores: &OrderedMap<OrderedMap<f64>>,
        k: usize,
    ) -> Result<ClusteringResult, AnalyticsError> {
        cluster_factor_scores(scores, k, self.config.kmeans_max_iterations, &mut self.rng)
    }

    /// Cluster factor scores given as JSON (`learner -> { axis: number }`)
    pub fn cluster_json(
        &mut self,
        json: &str,
        k: usize,
    ) -> Result<ClusteringResult, AnalyticsError> {
        let features = FeatureMatrix::from_json(json)?;
        KMeans::new(k)
            .with_max_iterations(self.config.kmeans_max_iterations)
            .fit(&features, &mut self.rng)
    }

    /// Run factor analysis and, when `k` is given, cluster the factor scores.
    ///
    /// Clustering is skipped when no factor was retained. An invalid `k` for
    /// the learners that do have scores is an error.
    pub fn analyze(
        &mut self,
        logs_json: &str,
        k: Option<usize>,
    ) -> Result<AnalyticsReport, AnalyticsError> {
        let entries = parse_log_payload(logs_json)?;
        let observations = ObservationExtractor::extract_values(&entries);
        let factor_analysis = analyze_observations(&observations, &self.config);

        let clustering = match k {
            Some(_) if factor_analysis.is_empty() => {
                warn!("Skipping clustering: no factor scores");
                None
            }
            Some(k) => Some(self.cluster(&factor_analysis.factor_scores, k)?),
            None => None,
        };

        Ok(self.encoder.encode(
            observations.learner_ids.len(),
            factor_analysis,
            clustering,
        ))
    }

    /// Run [`Self::analyze`] and serialize the report
    pub fn analyze_to_json(
        &mut self,
        logs_json: &str,
        k: Option<usize>,
    ) -> Result<String, AnalyticsError> {
        let report = self.analyze(logs_json, k)?;
        self.encoder.to_json(&report)
    }
}
