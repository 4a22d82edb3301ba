//! Vector metrics
//!
//! Distance and similarity helpers shared by clustering and the report layer.

use crate::types::OrderedMap;

/// Euclidean distance; `+inf` when the vectors differ in length.
///
/// The infinite sentinel keeps a malformed row from ever being the nearest
/// candidate and must not be clamped.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Cosine similarity; 0 for mismatched lengths or a zero-norm vector
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Values of an axis map in axis order
pub fn to_vector(axes: &OrderedMap<f64>) -> Vec<f64> {
    axes.values().copied().collect()
}
