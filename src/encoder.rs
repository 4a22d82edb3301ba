//! Report encoding
//!
//! This module wraps factor-analysis and clustering results into the report
//! envelope consumed by the dashboard layer, stamping producer metadata and
//! the computation time.

use crate::error::AnalyticsError;
use crate::types::{AnalyticsReport, ClusteringResult, FactorAnalysisResult, ReportProducer};
use crate::{LEARNLENS_VERSION, PRODUCER_NAME};
use chrono::Utc;
use uuid::Uuid;

/// Current report schema version
pub const REPORT_VERSION: &str = "1.0.0";

/// Encoder for producing analytics reports
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Build the report envelope
    pub fn encode(
        &self,
        learner_count: usize,
        factor_analysis: FactorAnalysisResult,
        clustering: Option<ClusteringResult>,
    ) -> AnalyticsReport {
        AnalyticsReport {
            report_version: REPORT_VERSION.to_string(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: LEARNLENS_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            learner_count,
            factor_analysis,
            clustering,
        }
    }

    /// Serialize a report to JSON
    pub fn to_json(&self, report: &AnalyticsReport) -> Result<String, AnalyticsError> {
        serde_json::to_string(report).map_err(|e| AnalyticsError::EncodingError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_producer_metadata() {
        let encoder = ReportEncoder::with_instance_id("instance-1".to_string());
        let report = encoder.encode(3, FactorAnalysisResult::empty(), None);

        assert_eq!(report.report_version, REPORT_VERSION);
        assert_eq!(report.producer.name, PRODUCER_NAME);
        assert_eq!(report.producer.instance_id, "instance-1");
        assert_eq!(report.learner_count, 3);
        assert!(DateTime::parse_from_rfc3339(&report.computed_at_utc).is_ok());
    }

    #[test]
    fn test_unique_instance_ids() {
        assert_ne!(
            ReportEncoder::new().instance_id(),
            ReportEncoder::new().instance_id()
        );
    }

    #[test]
    fn test_json_shape() {
        let encoder = ReportEncoder::new();
        let report = encoder.encode(0, FactorAnalysisResult::without_factors(vec![0.5]), None);
        let json: serde_json::Value =
            serde_json::from_str(&encoder.to_json(&report).unwrap()).unwrap();

        assert_eq!(json["factor_analysis"]["num_factors"], 0);
        assert_eq!(json["factor_analysis"]["eigenvalues"][0], 0.5);
        assert!(json["factor_analysis"]["loadings"].as_object().unwrap().is_empty());
        assert!(json.get("clustering").is_none());
    }
}
