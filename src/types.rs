//! Core types for the LearnLens pipeline
//!
//! This module defines the data structures that flow between pipeline stages:
//! raw log records, the per-learner observation set, and the factor-analysis,
//! clustering and report outputs handed to the dashboard layer.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// String-keyed map that keeps insertion order through serde.
///
/// Learner ids, variable names and factor axes are reported in the order they
/// were first seen, so a sorted map would reorder dashboard output. Lookups go
/// through a key -> position index.
#[derive(Debug, Clone)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
}

impl<V: PartialEq> PartialEq for OrderedMap<V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Insert a value, replacing (in place) any existing value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        if let Some(&position) = self.index.get(&key) {
            return Some(std::mem::replace(&mut self.entries[position].1, value));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        None
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.index.get(key).map(|&position| &self.entries[position].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        let mut map = OrderedMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct OrderedMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = OrderedMap::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

/// The eight tracked observation variables, in matrix column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservedVariable {
    Correct,
    ResponseTime,
    ChoiceSteps,
    BackCount,
    AbstractScore,
    Confidence,
    Dwell,
    ErrorType,
}

impl ObservedVariable {
    pub const ALL: [ObservedVariable; 8] = [
        ObservedVariable::Correct,
        ObservedVariable::ResponseTime,
        ObservedVariable::ChoiceSteps,
        ObservedVariable::BackCount,
        ObservedVariable::AbstractScore,
        ObservedVariable::Confidence,
        ObservedVariable::Dwell,
        ObservedVariable::ErrorType,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObservedVariable::Correct => "correct",
            ObservedVariable::ResponseTime => "response_time",
            ObservedVariable::ChoiceSteps => "choice_steps",
            ObservedVariable::BackCount => "back_count",
            ObservedVariable::AbstractScore => "abstract_score",
            ObservedVariable::Confidence => "confidence",
            ObservedVariable::Dwell => "dwell",
            ObservedVariable::ErrorType => "error_type",
        }
    }

    /// Column index in the observation matrix
    pub fn column(&self) -> usize {
        *self as usize
    }
}

/// One step of a recorded answer path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathStep(pub Value);

impl PathStep {
    /// A step is a "back" navigation when it is the string `"back"` or an
    /// object whose `type` is `"back"`.
    pub fn is_back(&self) -> bool {
        match &self.0 {
            Value::String(s) => s == "back",
            Value::Object(obj) => obj.get("type").and_then(Value::as_str) == Some("back"),
            _ => false,
        }
    }
}

/// A single student-response log entry.
///
/// Records arrive from several producers with inconsistent typing, so decoding
/// is lenient: a field of the wrong JSON type is treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct: Option<bool>,
    /// Seconds spent answering
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathStep>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clicks: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abstract_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Seconds the page stayed open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dwell: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<f64>,
}

impl LogRecord {
    /// Decode a record from an arbitrary JSON value. Returns `None` for non-objects.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let number = |key: &str| obj.get(key).and_then(Value::as_f64);
        let sequence = |key: &str| obj.get(key).and_then(Value::as_array);

        Some(Self {
            user_id: obj.get("user_id").and_then(id_from_value),
            student_id: obj.get("student_id").and_then(id_from_value),
            correct: obj.get("correct").and_then(Value::as_bool),
            response_time: number("response_time"),
            path: sequence("path").map(|steps| steps.iter().cloned().map(PathStep).collect()),
            clicks: sequence("clicks").cloned(),
            abstract_score: number("abstract_score"),
            confidence: number("confidence"),
            dwell: number("dwell"),
            error_type: number("error_type"),
        })
    }

    /// Learner identifier: first non-empty of `user_id`, `student_id`, else `"unknown"`
    pub fn learner_id(&self) -> &str {
        [&self.user_id, &self.student_id]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|id| !id.is_empty())
            .unwrap_or("unknown")
    }
}

impl<'de> Deserialize<'de> for LogRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        LogRecord::from_value(&value)
            .ok_or_else(|| de::Error::custom("log record must be a JSON object"))
    }
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Per-learner observation rows produced by the extractor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationSet {
    /// One row per learner, one column per variable
    pub matrix: Vec<Vec<f64>>,
    /// Variable names in column order
    pub variables: Vec<String>,
    /// Learner ids in row order
    pub learner_ids: Vec<String>,
}

impl ObservationSet {
    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }
}

/// Output of the factor-analysis stage.
///
/// Always well-formed; `num_factors == 0` signals that nothing could be computed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactorAnalysisResult {
    pub eigenvalues: Vec<f64>,
    pub num_factors: usize,
    /// Rotated loadings per variable
    pub loadings: OrderedMap<Vec<f64>>,
    /// Factor scores per learner, keyed `F1`, `F2`, ...
    pub factor_scores: OrderedMap<OrderedMap<f64>>,
}

impl FactorAnalysisResult {
    /// Result for input that produced no observations
    pub fn empty() -> Self {
        Self::default()
    }

    /// Result when no eigenvalue passed the retention threshold
    pub fn without_factors(eigenvalues: Vec<f64>) -> Self {
        Self {
            eigenvalues,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.num_factors == 0
    }
}

/// Output of the k-means stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringResult {
    pub k: usize,
    /// Cluster index per learner
    pub labels: OrderedMap<usize>,
    /// One centroid per cluster, keyed by axis
    pub cluster_centers: Vec<OrderedMap<f64>>,
    /// Axis names in centroid order
    pub factor_keys: Vec<String>,
    /// Assignment passes executed
    pub iterations: usize,
}

/// Producer metadata embedded in every report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Report envelope consumed by the dashboard layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub report_version: String,
    pub producer: ReportProducer,
    pub computed_at_utc: String,
    pub learner_count: usize,
    pub factor_analysis: FactorAnalysisResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clustering: Option<ClusteringResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_ordered_map_keeps_insertion_order() {
        let json = r#"{"zeta": 1, "alpha": 2, "mid": 3}"#;
        let map: OrderedMap<i32> = serde_json::from_str(json).unwrap();

        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"zeta":1,"alpha":2,"mid":3}"#);
    }

    #[test]
    fn test_ordered_map_insert_replaces_in_place() {
        let mut map = OrderedMap::new();
        map.insert("a", 1);
        map.insert("b", 2);
        assert_eq!(map.insert("a", 3), Some(1));

        assert_eq!(map.len(), 2);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(map.get("a"), Some(&3));
    }

    #[test]
    fn test_ordered_map_indexes_many_keys() {
        let map: OrderedMap<usize> = (0..5_000).map(|i| (format!("learner-{}", i), i)).collect();

        assert_eq!(map.len(), 5_000);
        assert_eq!(map.get("learner-4321"), Some(&4321));
        assert!(!map.contains_key("learner-5000"));
        assert_eq!(map.keys().nth(17), Some("learner-17"));

        let mut rebuilt = OrderedMap::new();
        for (key, value) in map.iter() {
            rebuilt.insert(key, *value);
        }
        assert_eq!(rebuilt, map);
    }

    #[test]
    fn test_ordered_map_rejects_non_object() {
        let result: Result<OrderedMap<f64>, _> = serde_json::from_str("[1, 2]");
        assert!(result.is_err());
    }

    #[test]
    fn test_log_record_lenient_decoding() {
        let value = json!({
            "user_id": 42,
            "correct": "yes",
            "response_time": 3.5,
            "path": ["a", {"type": "back"}, "back"],
            "confidence": null
        });
        let record = LogRecord::from_value(&value).unwrap();

        assert_eq!(record.user_id.as_deref(), Some("42"));
        assert_eq!(record.correct, None);
        assert_eq!(record.response_time, Some(3.5));
        assert_eq!(record.confidence, None);
        let backs = record.path.unwrap().iter().filter(|s| s.is_back()).count();
        assert_eq!(backs, 2);
    }

    #[test]
    fn test_learner_id_fallbacks() {
        let record = LogRecord {
            user_id: Some(String::new()),
            student_id: Some("s-7".to_string()),
            ..Default::default()
        };
        assert_eq!(record.learner_id(), "s-7");
        assert_eq!(LogRecord::default().learner_id(), "unknown");
    }

    #[test]
    fn test_log_record_deserialize_requires_object() {
        assert!(serde_json::from_str::<LogRecord>("3").is_err());
        let record: LogRecord = serde_json::from_str(r#"{"student_id": "s1"}"#).unwrap();
        assert_eq!(record.learner_id(), "s1");
    }

    #[test]
    fn test_variable_columns_follow_declaration_order() {
        for (i, var) in ObservedVariable::ALL.iter().enumerate() {
            assert_eq!(var.column(), i);
        }
        assert_eq!(ObservedVariable::ErrorType.as_str(), "error_type");
    }
}
