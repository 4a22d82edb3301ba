//! Factor extraction, rotation and scoring
//!
//! This module derives latent learning factors from an eigen-decomposition:
//! - Kaiser criterion for the number of retained factors
//! - Initial loadings scaled by the square root of each eigenvalue
//! - Pairwise varimax-style rotation of the loadings
//! - Factor scores as projections of standardized observations

use crate::config::{DEFAULT_KAISER_THRESHOLD, DEFAULT_VARIMAX_MAX_ITERATIONS};
use crate::eigen::EigenDecomposition;
use log::debug;

/// Axis name for the zero-based factor index (`F1`, `F2`, ...)
pub fn factor_key(index: usize) -> String {
    format!("F{}", index + 1)
}

/// Selects and scales the retained factors
#[derive(Debug, Clone, Copy)]
pub struct FactorExtractor {
    threshold: f64,
}

impl Default for FactorExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_KAISER_THRESHOLD)
    }
}

impl FactorExtractor {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Number of eigenvalues strictly above the threshold
    pub fn retained_count(&self, eigenvalues: &[f64]) -> usize {
        eigenvalues.iter().filter(|&&v| v > self.threshold).count()
    }

    /// Loadings matrix (variables x retained factors).
    ///
    /// Entry `[i][j]` is `eigenvector_j[i] * sqrt(eigenvalue_j)`. Empty columns
    /// when no factor is retained.
    pub fn loadings(&self, decomp: &EigenDecomposition) -> Vec<Vec<f64>> {
        let factors = self.retained_count(&decomp.eigenvalues);
        let variables = decomp.eigenvalues.len();

        (0..variables)
            .map(|i| {
                (0..factors)
                    .map(|j| decomp.eigenvectors[j][i] * decomp.eigenvalues[j].max(0.0).sqrt())
                    .collect()
            })
            .collect()
    }
}

/// Rotated loadings with the accumulated rotation
#[derive(Debug, Clone, PartialEq)]
pub struct RotationResult {
    /// Same shape as the input loadings
    pub loadings: Vec<Vec<f64>>,
    /// k x k orthogonal matrix with `input * rotation == loadings`
    pub rotation: Vec<Vec<f64>>,
    /// Full passes over all factor pairs
    pub sweeps: usize,
}

/// Orthogonal rotation of factor loadings by pairwise plane rotations
#[derive(Debug, Clone, Copy)]
pub struct VarimaxRotator {
    max_iterations: usize,
    tolerance: Option<f64>,
}

impl Default for VarimaxRotator {
    fn default() -> Self {
        Self::new(DEFAULT_VARIMAX_MAX_ITERATIONS)
    }
}

impl VarimaxRotator {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            tolerance: None,
        }
    }

    /// Stop once the varimax criterion changes by less than `tolerance` per sweep
    pub fn with_tolerance(mut self, tolerance: Option<f64>) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn rotate(&self, loadings: &[Vec<f64>]) -> RotationResult {
        let k = loadings.first().map_or(0, Vec::len);
        let mut rotation = identity(k);

        if k <= 1 {
            return RotationResult {
                loadings: loadings.to_vec(),
                rotation,
                sweeps: 0,
            };
        }

        let mut rotated = loadings.to_vec();
        let mut criterion = varimax_criterion(&rotated);
        let mut sweeps = 0;

        for _ in 0..self.max_iterations {
            for i in 0..k {
                for j in (i + 1)..k {
                    let (u, v) = rotated.iter().fold((0.0, 0.0), |(u, v), row| {
                        let (a, b) = (row[i], row[j]);
                        (u + a * a - b * b, v + 2.0 * a * b)
                    });
                    let theta = 0.25 * v.atan2(u);
                    let (s, c) = theta.sin_cos();
                    rotate_columns(&mut rotated, i, j, c, s);
                    rotate_columns(&mut rotation, i, j, c, s);
                }
            }
            sweeps += 1;

            if let Some(tolerance) = self.tolerance {
                let next = varimax_criterion(&rotated);
                let change = (next - criterion).abs();
                criterion = next;
                if change < tolerance {
                    debug!("Varimax settled after {} sweeps (change {:.3e})", sweeps, change);
                    break;
                }
            }
        }

        RotationResult {
            loadings: rotated,
            rotation,
            sweeps,
        }
    }
}

/// `a' = c*a - s*b`, `b' = s*a + c*b` on columns `i` and `j` of every row
fn rotate_columns(matrix: &mut [Vec<f64>], i: usize, j: usize, c: f64, s: f64) {
    for row in matrix.iter_mut() {
        let (a, b) = (row[i], row[j]);
        row[i] = c * a - s * b;
        row[j] = s * a + c * b;
    }
}

/// Raw varimax criterion: summed per-factor variance of squared loadings
pub fn varimax_criterion(loadings: &[Vec<f64>]) -> f64 {
    let n = loadings.len() as f64;
    let k = loadings.first().map_or(0, Vec::len);
    if n == 0.0 {
        return 0.0;
    }

    (0..k)
        .map(|j| {
            let squares: Vec<f64> = loadings.iter().map(|row| row[j] * row[j]).collect();
            let mean_sq = squares.iter().sum::<f64>() / n;
            let mean_quad = squares.iter().map(|s| s * s).sum::<f64>() / n;
            mean_quad - mean_sq * mean_sq
        })
        .sum()
}

fn identity(n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect()
}

/// Projects standardized observations onto factor loadings
pub struct FactorScorer;

impl FactorScorer {
    /// `score[i][j] = sum_v data[i][v] * loadings[v][j]` (learners x factors)
    pub fn score(data: &[Vec<f64>], loadings: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let Some(first) = loadings.first() else {
            return Vec::new();
        };
        let k = first.len();

        data.iter()
            .map(|row| {
                (0..k)
                    .map(|j| {
                        row.iter()
                            .zip(loadings.iter())
                            .map(|(x, loading)| x * loading[j])
                            .sum()
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_loadings() -> Vec<Vec<f64>> {
        vec![
            vec![0.8, 0.3, 0.1],
            vec![0.7, 0.4, -0.2],
            vec![0.2, 0.9, 0.3],
            vec![-0.1, 0.6, 0.5],
            vec![0.4, -0.2, 0.7],
        ]
    }

    fn matmul(a: &[Vec<f64>], b: &[Vec<f64>]) -> Vec<Vec<f64>> {
        a.iter()
            .map(|row| {
                (0..b[0].len())
                    .map(|j| row.iter().zip(b.iter()).map(|(x, brow)| x * brow[j]).sum())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_kaiser_count_is_strict() {
        let extractor = FactorExtractor::default();
        assert_eq!(extractor.retained_count(&[2.5, 1.2, 1.0, 0.3]), 2);
        assert_eq!(extractor.retained_count(&[0.9, 0.1]), 0);
        assert_eq!(FactorExtractor::new(0.5).retained_count(&[0.9, 0.1]), 1);
    }

    #[test]
    fn test_loadings_scale_by_sqrt_eigenvalue() {
        let decomp = EigenDecomposition {
            eigenvalues: vec![4.0, 1.5, 0.5],
            eigenvectors: vec![
                vec![0.6, 0.8, 0.0],
                vec![0.0, 0.0, 1.0],
                vec![0.8, -0.6, 0.0],
            ],
            converged: true,
            rotations: 0,
        };
        let loadings = FactorExtractor::default().loadings(&decomp);

        let s = 1.5_f64.sqrt();
        assert_eq!(loadings.len(), 3);
        assert_eq!(loadings[0], vec![1.2, 0.0]);
        assert_eq!(loadings[1], vec![1.6, 0.0]);
        assert_eq!(loadings[2], vec![0.0, s]);
    }

    #[test]
    fn test_single_factor_rotation_is_noop() {
        let loadings = vec![vec![0.7], vec![-0.3], vec![0.5]];
        let result = VarimaxRotator::default().rotate(&loadings);

        assert_eq!(result.loadings, loadings);
        assert_eq!(result.rotation, vec![vec![1.0]]);
        assert_eq!(result.sweeps, 0);
    }

    #[test]
    fn test_rotation_preserves_shape_and_communalities() {
        let loadings = sample_loadings();
        let result = VarimaxRotator::default().rotate(&loadings);

        assert_eq!(result.sweeps, DEFAULT_VARIMAX_MAX_ITERATIONS);
        assert_eq!(result.loadings.len(), loadings.len());
        for (before, after) in loadings.iter().zip(result.loadings.iter()) {
            assert_eq!(after.len(), 3);
            let h_before: f64 = before.iter().map(|x| x * x).sum();
            let h_after: f64 = after.iter().map(|x| x * x).sum();
            assert!((h_before - h_after).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rotation_matrix_reproduces_rotated_loadings() {
        let loadings = sample_loadings();
        let result = VarimaxRotator::new(5).rotate(&loadings);
        let product = matmul(&loadings, &result.rotation);

        for (row_a, row_b) in product.iter().zip(result.loadings.iter()) {
            for (a, b) in row_a.iter().zip(row_b.iter()) {
                assert!((a - b).abs() < 1e-9);
            }
        }

        let tt = matmul(
            &result.rotation,
            &(0..3)
                .map(|i| (0..3).map(|j| result.rotation[j][i]).collect())
                .collect::<Vec<Vec<f64>>>(),
        );
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((tt[i][j] - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_tolerance_stops_early_on_settled_loadings() {
        // Columns already orthogonal with u = v = 0 for the only pair: theta is 0
        let loadings = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let result = VarimaxRotator::new(20)
            .with_tolerance(Some(1e-6))
            .rotate(&loadings);

        assert_eq!(result.sweeps, 1);
        assert_eq!(result.loadings, loadings);
    }

    #[test]
    fn test_empty_loadings() {
        let result = VarimaxRotator::default().rotate(&[]);
        assert!(result.loadings.is_empty());
        assert!(FactorScorer::score(&[vec![1.0]], &[]).is_empty());
    }

    #[test]
    fn test_factor_scores_project_onto_loadings() {
        let data = vec![vec![1.0, -1.0, 0.5], vec![0.0, 2.0, -1.0]];
        let loadings = vec![vec![0.5, 0.1], vec![0.2, 0.4], vec![-0.3, 0.8]];
        let scores = FactorScorer::score(&data, &loadings);

        assert_eq!(scores.len(), 2);
        assert!((scores[0][0] - (0.5 - 0.2 - 0.15)).abs() < 1e-12);
        assert!((scores[0][1] - (0.1 - 0.4 + 0.4)).abs() < 1e-12);
        assert!((scores[1][0] - (0.4 + 0.3)).abs() < 1e-12);
        assert!((scores[1][1] - (0.8 - 0.8)).abs() < 1e-12);
    }

    #[test]
    fn test_criterion_of_simple_structure() {
        assert_eq!(varimax_criterion(&[]), 0.0);
        let simple = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        // Per factor: mean of a^4 = 0.5, mean of a^2 = 0.5
        assert!((varimax_criterion(&simple) - 0.5).abs() < 1e-12);
    }
}
