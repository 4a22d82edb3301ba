//! Observation extraction
//!
//! This module turns raw interaction logs into one numeric row per learner:
//! - Records grouped by learner id in first-seen order
//! - Each cell is the learner's mean for that variable
//! - Missing cells imputed with the variable's population mean

use crate::types::{LogRecord, ObservationSet, ObservedVariable};
use serde_json::Value;
use std::collections::HashMap;

const VARIABLE_COUNT: usize = ObservedVariable::ALL.len();

/// Extractor for building the observation matrix
pub struct ObservationExtractor;

impl ObservationExtractor {
    /// Extract per-learner observations from typed log records
    pub fn extract(records: &[LogRecord]) -> ObservationSet {
        if records.is_empty() {
            return ObservationSet::default();
        }

        let mut learner_ids: Vec<String> = Vec::new();
        let mut by_learner: HashMap<String, LearnerAccumulator> = HashMap::new();

        for record in records {
            let learner_id = record.learner_id();
            if !by_learner.contains_key(learner_id) {
                learner_ids.push(learner_id.to_string());
            }
            by_learner
                .entry(learner_id.to_string())
                .or_default()
                .add_record(record);
        }

        let learner_means: Vec<[Option<f64>; VARIABLE_COUNT]> = learner_ids
            .iter()
            .map(|id| by_learner[id].means())
            .collect();

        let population_means = population_means(&learner_means);

        let matrix = learner_means
            .iter()
            .map(|means| {
                means
                    .iter()
                    .zip(population_means.iter())
                    .map(|(own, fallback)| own.unwrap_or(*fallback))
                    .collect()
            })
            .collect();

        ObservationSet {
            matrix,
            variables: ObservedVariable::ALL
                .iter()
                .map(|v| v.as_str().to_string())
                .collect(),
            learner_ids,
        }
    }

    /// Extract observations from untyped JSON log entries.
    ///
    /// Entries that are not JSON objects are skipped.
    pub fn extract_values(entries: &[Value]) -> ObservationSet {
        let records: Vec<LogRecord> = entries.iter().filter_map(LogRecord::from_value).collect();
        Self::extract(&records)
    }
}

/// Collected per-variable readings for one learner
#[derive(Default)]
struct LearnerAccumulator {
    readings: [Vec<f64>; VARIABLE_COUNT],
}

impl LearnerAccumulator {
    fn push(&mut self, variable: ObservedVariable, value: f64) {
        self.readings[variable.column()].push(value);
    }

    fn add_record(&mut self, record: &LogRecord) {
        if let Some(correct) = record.correct {
            self.push(ObservedVariable::Correct, if correct { 1.0 } else { 0.0 });
        }

        if let Some(rt) = record.response_time {
            self.push(ObservedVariable::ResponseTime, rt);
        }

        self.push(ObservedVariable::ChoiceSteps, choice_steps(record));
        self.push(ObservedVariable::BackCount, back_count(record));

        if let Some(score) = record.abstract_score {
            self.push(ObservedVariable::AbstractScore, score);
        }

        if let Some(confidence) = record.confidence {
            self.push(ObservedVariable::Confidence, confidence);
        }

        // Page dwell falls back to response time when not logged separately
        if let Some(dwell) = record.dwell.or(record.response_time) {
            self.push(ObservedVariable::Dwell, dwell);
        }

        let error_type = match (record.correct, record.error_type) {
            (Some(false), Some(error_type)) => error_type,
            _ => 0.0,
        };
        self.push(ObservedVariable::ErrorType, error_type);
    }

    fn means(&self) -> [Option<f64>; VARIABLE_COUNT] {
        let mut means = [None; VARIABLE_COUNT];
        for (slot, readings) in means.iter_mut().zip(self.readings.iter()) {
            *slot = mean(readings);
        }
        means
    }
}

/// Number of choice transitions: path length, else clicks length, else 1
fn choice_steps(record: &LogRecord) -> f64 {
    let path_len = record.path.as_ref().map_or(0, Vec::len);
    let clicks_len = record.clicks.as_ref().map_or(0, Vec::len);

    if path_len > 0 {
        path_len as f64
    } else if clicks_len > 0 {
        clicks_len as f64
    } else {
        1.0
    }
}

fn back_count(record: &LogRecord) -> f64 {
    record
        .path
        .as_ref()
        .map_or(0, |path| path.iter().filter(|step| step.is_back()).count()) as f64
}

/// Mean of each variable over the learners that supplied it (0 if none did)
fn population_means(learner_means: &[[Option<f64>; VARIABLE_COUNT]]) -> [f64; VARIABLE_COUNT] {
    let mut result = [0.0; VARIABLE_COUNT];
    for (column, slot) in result.iter_mut().enumerate() {
        let supplied: Vec<f64> = learner_means.iter().filter_map(|row| row[column]).collect();
        *slot = mean(&supplied).unwrap_or(0.0);
    }
    result
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
