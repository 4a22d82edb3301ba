//! K-means clustering of learners
//!
//! Lloyd's algorithm over per-learner feature vectors (normally factor scores):
//! random distinct rows as initial centroids, nearest-centroid assignment,
//! mean update with random reseeding of empty clusters, and a stop as soon as
//! the label vector repeats.
//!
//! Randomness is injected through [`RandomSource`] so runs are reproducible
//! with a seeded generator.

use crate::config::DEFAULT_KMEANS_MAX_ITERATIONS;
use crate::error::AnalyticsError;
use crate::metrics::euclidean_distance;
use crate::types::{ClusteringResult, OrderedMap};
use log::{debug, info};
use rand::Rng;
use serde_json::error::Category;
use serde_json::Value;

/// Source of uniform random indices
pub trait RandomSource {
    /// Uniform index in `0..upper`; `upper` is always at least 1
    fn next_index(&mut self, upper: usize) -> usize;
}

impl<R: Rng + ?Sized> RandomSource for R {
    fn next_index(&mut self, upper: usize) -> usize {
        self.gen_range(0..upper)
    }
}

/// Learner feature vectors with their ids and axis names
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMatrix {
    pub learner_ids: Vec<String>,
    pub axes: Vec<String>,
    /// One row per learner, one value per axis
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn new(learner_ids: Vec<String>, axes: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        Self {
            learner_ids,
            axes,
            rows,
        }
    }

    /// Build from factor scores (`learner -> { "F1": v, ... }`).
    ///
    /// Axes are the first learner's `F`-prefixed keys in natural order; a
    /// learner missing an axis gets 0 for it.
    pub fn from_factor_scores(
        scores: &OrderedMap<OrderedMap<f64>>,
    ) -> Result<Self, AnalyticsError> {
        let Some(first) = scores.values().next() else {
            return Err(AnalyticsError::EmptyFeatures);
        };
        let axes = select_factor_axes(first.keys())?;

        let rows = scores
            .values()
            .map(|features| {
                axes.iter()
                    .map(|axis| features.get(axis).copied().unwrap_or(0.0))
                    .collect()
            })
            .collect();

        Ok(Self::new(
            scores.keys().map(str::to_string).collect(),
            axes,
            rows,
        ))
    }

    /// Build from loosely typed JSON (`learner -> { axis: number }`).
    ///
    /// Non-numeric values count as 0; a top-level or per-learner value that is
    /// not an object is rejected.
    pub fn from_json(json: &str) -> Result<Self, AnalyticsError> {
        let learners: OrderedMap<Value> =
            serde_json::from_str(json).map_err(|e| match e.classify() {
                Category::Data => AnalyticsError::InvalidFeatureMap(e.to_string()),
                _ => AnalyticsError::JsonError(e),
            })?;

        let mut scores = OrderedMap::with_capacity(learners.len());
        for (learner, features) in learners.iter() {
            let Some(obj) = features.as_object() else {
                return Err(AnalyticsError::InvalidFeatureMap(format!(
                    "features for learner '{}' are not an object",
                    learner
                )));
            };
            let axes: OrderedMap<f64> = obj
                .iter()
                .map(|(axis, value)| (axis.clone(), value.as_f64().unwrap_or(0.0)))
                .collect();
            scores.insert(learner, axes);
        }

        Self::from_factor_scores(&scores)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// `F`-prefixed keys, `F2` before `F10`
fn select_factor_axes<'a>(
    keys: impl Iterator<Item = &'a str>,
) -> Result<Vec<String>, AnalyticsError> {
    let mut axes: Vec<String> = keys
        .filter(|key| key.starts_with('F'))
        .map(str::to_string)
        .collect();

    if axes.is_empty() {
        return Err(AnalyticsError::NoFactorAxes);
    }

    axes.sort_by(|a, b| {
        let na = a[1..].parse::<u64>().ok();
        let nb = b[1..].parse::<u64>().ok();
        (na.is_none(), na, a).cmp(&(nb.is_none(), nb, b))
    });
    Ok(axes)
}

/// K-means clusterer
#[derive(Debug, Clone, Copy)]
pub struct KMeans {
    k: usize,
    max_iterations: usize,
}

impl KMeans {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iterations: DEFAULT_KMEANS_MAX_ITERATIONS,
        }
    }

    /// Cap on assignment passes (at least one pass always runs)
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Partition the learners into `k` clusters.
    ///
    /// # Errors
    /// - [`AnalyticsError::EmptyFeatures`] when there are no rows
    /// - [`AnalyticsError::InvalidClusterCount`] when `k == 0` or `k` exceeds the row count
    pub fn fit<R: RandomSource + ?Sized>(
        &self,
        features: &FeatureMatrix,
        rng: &mut R,
    ) -> Result<ClusteringResult, AnalyticsError> {
        let data = &features.rows;
        let n = data.len();

        if n == 0 {
            return Err(AnalyticsError::EmptyFeatures);
        }
        if self.k == 0 || self.k > n {
            return Err(AnalyticsError::InvalidClusterCount { k: self.k, rows: n });
        }

        // Rows may be ragged when built by hand; centroids span the widest one
        let dimension = data.iter().map(Vec::len).max().unwrap_or(0);
        let mut centroids = initial_centroids(data, self.k, rng);
        let mut labels: Vec<usize> = Vec::new();
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iterations {
            iterations += 1;
            let next = assign_clusters(data, &centroids);

            if iterations > 1 && next == labels {
                converged = true;
                break;
            }

            labels = next;
            centroids = update_centroids(data, &labels, self.k, dimension, rng);
        }

        if converged {
            info!("K-means converged at iteration {}", iterations);
        } else {
            info!("K-means stopped at iteration cap ({})", self.max_iterations);
        }

        let labels_by_learner: OrderedMap<usize> = features
            .learner_ids
            .iter()
            .cloned()
            .zip(labels.iter().copied())
            .collect();

        let cluster_centers: Vec<OrderedMap<f64>> = centroids
            .iter()
            .map(|centroid| {
                features
                    .axes
                    .iter()
                    .cloned()
                    .zip(centroid.iter().copied())
                    .collect()
            })
            .collect();

        Ok(ClusteringResult {
            k: self.k,
            labels: labels_by_learner,
            cluster_centers,
            factor_keys: features.axes.clone(),
            iterations,
        })
    }
}

/// `k` distinct rows chosen uniformly without replacement (partial Fisher-Yates)
fn initial_centroids<R: RandomSource + ?Sized>(
    data: &[Vec<f64>],
    k: usize,
    rng: &mut R,
) -> Vec<Vec<f64>> {
    let mut indices: Vec<usize> = (0..data.len()).collect();
    for i in 0..k {
        let j = i + rng.next_index(data.len() - i);
        indices.swap(i, j);
    }
    debug!("K-means seeded from rows {:?}", &indices[..k]);
    indices[..k].iter().map(|&i| data[i].clone()).collect()
}

/// Nearest centroid per row; the lowest centroid index wins exact ties
fn assign_clusters(data: &[Vec<f64>], centroids: &[Vec<f64>]) -> Vec<usize> {
    data.iter()
        .map(|point| {
            let mut closest = 0;
            let mut min_distance = f64::INFINITY;
            for (index, centroid) in centroids.iter().enumerate() {
                let distance = euclidean_distance(point, centroid);
                if distance < min_distance {
                    min_distance = distance;
                    closest = index;
                }
            }
            closest
        })
        .collect()
}

/// Member means; an empty cluster is reseeded to a random row.
///
/// Each axis is averaged over the members that have it, so a short row never
/// indexes past its end. An axis no member has is 0.
fn update_centroids<R: RandomSource + ?Sized>(
    data: &[Vec<f64>],
    labels: &[usize],
    k: usize,
    dimension: usize,
    rng: &mut R,
) -> Vec<Vec<f64>> {
    (0..k)
        .map(|cluster| {
            let members: Vec<&Vec<f64>> = data
                .iter()
                .zip(labels.iter())
                .filter(|(_, &label)| label == cluster)
                .map(|(point, _)| point)
                .collect();

            if members.is_empty() {
                debug!("Cluster {} is empty, reseeding", cluster);
                return data[rng.next_index(data.len())].clone();
            }

            (0..dimension)
                .map(|d| {
                    let (sum, count) = members
                        .iter()
                        .filter_map(|point| point.get(d))
                        .fold((0.0_f64, 0usize), |(sum, count), x| (sum + x, count + 1));
                    if count == 0 {
                        0.0
                    } else {
                        sum / count as f64
                    }
                })
                .collect()
        })
        .collect()
}
