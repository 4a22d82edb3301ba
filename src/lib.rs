//! LearnLens - Learning analytics engine for learner interaction logs
//!
//! LearnLens turns raw learner interaction logs into latent learning-style
//! factors and learner groups through a deterministic pipeline:
//! observation extraction → standardization → covariance → Jacobi
//! eigen-decomposition → Kaiser factor selection → varimax rotation →
//! factor scores → k-means clustering → report encoding.
//!
//! ## Modules
//!
//! - **Factor Analysis**: Extract, standardize and decompose per-learner observations
//! - **Clustering**: Group learners by their factor scores with seeded k-means

pub mod config;
pub mod eigen;
pub mod encoder;
pub mod error;
pub mod factor;
pub mod kmeans;
pub mod metrics;
pub mod observations;
pub mod pipeline;
pub mod stats;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::AnalyticsConfig;
pub use error::AnalyticsError;
pub use kmeans::{FeatureMatrix, KMeans, RandomSource};
pub use pipeline::{
    cluster_factor_scores, factor_analysis_from_json, run_factor_analysis, AnalyticsProcessor,
};

// Data model exports
pub use types::{
    AnalyticsReport, ClusteringResult, FactorAnalysisResult, LogRecord, ObservedVariable,
    OrderedMap,
};

/// LearnLens version embedded in all reports
pub const LEARNLENS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "learnlens";
