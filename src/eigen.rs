//! Symmetric eigen-decomposition
//!
//! Classical Jacobi method: repeatedly annihilate the largest off-diagonal
//! entry with a plane rotation until the matrix is diagonal (within tolerance)
//! or the iteration cap is reached. A capped run is not an error; the partial
//! diagonalization is returned as-is.

use crate::config::{DEFAULT_JACOBI_MAX_ITERATIONS, DEFAULT_JACOBI_TOLERANCE};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Eigenvalues in descending order with aligned unit eigenvectors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EigenDecomposition {
    pub eigenvalues: Vec<f64>,
    /// `eigenvectors[i]` belongs to `eigenvalues[i]`
    pub eigenvectors: Vec<Vec<f64>>,
    /// Whether the off-diagonal mass fell below tolerance before the cap
    pub converged: bool,
    /// Rotations applied
    pub rotations: usize,
}

/// Cyclic Jacobi solver for symmetric matrices
#[derive(Debug, Clone, Copy)]
pub struct EigenSolver {
    max_iterations: usize,
    tolerance: f64,
}

impl Default for EigenSolver {
    fn default() -> Self {
        Self::new(DEFAULT_JACOBI_MAX_ITERATIONS, DEFAULT_JACOBI_TOLERANCE)
    }
}

impl EigenSolver {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
        }
    }

    /// Decompose a symmetric matrix. The input is never modified.
    pub fn solve(&self, matrix: &[Vec<f64>]) -> EigenDecomposition {
        let n = matrix.len();
        if n == 0 {
            return EigenDecomposition {
                converged: true,
                ..Default::default()
            };
        }

        let mut a: Vec<Vec<f64>> = matrix.to_vec();
        let mut v = identity(n);
        let mut converged = false;
        let mut rotations = 0;

        for _ in 0..self.max_iterations {
            let (p, q, largest) = largest_off_diagonal(&a);
            if largest < self.tolerance {
                converged = true;
                break;
            }
            rotate(&mut a, &mut v, p, q);
            rotations += 1;
        }

        // The last rotation before the cap may have finished the job
        if !converged {
            converged = largest_off_diagonal(&a).2 < self.tolerance;
        }

        if converged {
            debug!("Jacobi converged after {} rotations", rotations);
        } else {
            warn!(
                "Jacobi stopped at iteration cap ({}) before convergence",
                self.max_iterations
            );
        }

        let mut order: Vec<usize> = (0..n).collect();
        // Stable: equal eigenvalues (including 0.0 and -0.0) keep their diagonal order
        order.sort_by(|&i, &j| a[j][j].partial_cmp(&a[i][i]).unwrap_or(Ordering::Equal));

        let eigenvalues = order.iter().map(|&i| a[i][i]).collect();
        let eigenvectors = order
            .iter()
            .map(|&col| v.iter().map(|row| row[col]).collect())
            .collect();

        EigenDecomposition {
            eigenvalues,
            eigenvectors,
            converged,
            rotations,
        }
    }
}

fn identity(n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect()
}

/// Position and magnitude of the largest upper-triangle entry (first wins ties)
fn largest_off_diagonal(a: &[Vec<f64>]) -> (usize, usize, f64) {
    let n = a.len();
    let (mut p, mut q, mut largest) = (0, 0, 0.0);
    for i in 0..n {
        for j in (i + 1)..n {
            let magnitude = a[i][j].abs();
            if magnitude > largest {
                largest = magnitude;
                p = i;
                q = j;
            }
        }
    }
    (p, q, largest)
}

/// Apply the plane rotation that zeroes `a[p][q]`, accumulating it into `v`.
///
/// With `theta = 0.5 * atan2(2 a_pq, a_pp - a_qq)` the new basis vectors are
/// `e_p' = c e_p + s e_q` and `e_q' = -s e_p + c e_q`.
fn rotate(a: &mut [Vec<f64>], v: &mut [Vec<f64>], p: usize, q: usize) {
    let n = a.len();
    let theta = 0.5 * (2.0 * a[p][q]).atan2(a[p][p] - a[q][q]);
    let (s, c) = theta.sin_cos();

    for k in 0..n {
        if k == p || k == q {
            continue;
        }
        let akp = a[p][k];
        let akq = a[q][k];
        a[p][k] = c * akp + s * akq;
        a[k][p] = a[p][k];
        a[q][k] = -s * akp + c * akq;
        a[k][q] = a[q][k];
    }

    let app = a[p][p];
    let aqq = a[q][q];
    let apq = a[p][q];
    a[p][p] = c * c * app + 2.0 * c * s * apq + s * s * aqq;
    a[q][q] = s * s * app - 2.0 * c * s * apq + c * c * aqq;
    a[p][q] = 0.0;
    a[q][p] = 0.0;

    for row in v.iter_mut() {
        let vkp = row[p];
        let vkq = row[q];
        row[p] = c * vkp + s * vkq;
        row[q] = -s * vkp + c * vkq;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(decomp: &EigenDecomposition) -> Vec<Vec<f64>> {
        let n = decomp.eigenvalues.len();
        let mut out = vec![vec![0.0; n]; n];
        for (value, vector) in decomp.eigenvalues.iter().zip(decomp.eigenvectors.iter()) {
            for i in 0..n {
                for j in 0..n {
                    out[i][j] += value * vector[i] * vector[j];
                }
            }
        }
        out
    }

    fn assert_close(a: &[Vec<f64>], b: &[Vec<f64>], tol: f64) {
        for (ra, rb) in a.iter().zip(b.iter()) {
            for (x, y) in ra.iter().zip(rb.iter()) {
                assert!((x - y).abs() < tol, "{x} vs {y}");
            }
        }
    }

    #[test]
    fn test_diagonal_matrix() {
        let decomp = EigenSolver::default().solve(&[vec![4.0, 0.0], vec![0.0, 1.0]]);

        assert!(decomp.converged);
        assert_eq!(decomp.eigenvalues, vec![4.0, 1.0]);
        assert_eq!(decomp.eigenvectors[0][0].abs(), 1.0);
        assert_eq!(decomp.eigenvectors[0][1], 0.0);
        assert_eq!(decomp.eigenvectors[1][0], 0.0);
        assert_eq!(decomp.eigenvectors[1][1].abs(), 1.0);
    }

    #[test]
    fn test_unsorted_diagonal_is_reordered() {
        let decomp = EigenSolver::default().solve(&[
            vec![1.0, 0.0, 0.0],
            vec![0.0, 5.0, 0.0],
            vec![0.0, 0.0, 3.0],
        ]);
        assert_eq!(decomp.eigenvalues, vec![5.0, 3.0, 1.0]);
        assert_eq!(decomp.eigenvectors[0], vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_two_by_two_asymmetric_diagonal() {
        let matrix = vec![vec![3.0, 1.0], vec![1.0, 1.0]];
        let decomp = EigenSolver::default().solve(&matrix);

        assert!(decomp.converged);
        let sqrt2 = 2.0_f64.sqrt();
        assert!((decomp.eigenvalues[0] - (2.0 + sqrt2)).abs() < 1e-10);
        assert!((decomp.eigenvalues[1] - (2.0 - sqrt2)).abs() < 1e-10);
        assert_close(&reconstruct(&decomp), &matrix, 1e-9);
    }

    #[test]
    fn test_reconstruction_and_orthonormality() {
        let matrix = vec![
            vec![4.0, 1.0, 0.5, 0.2],
            vec![1.0, 3.0, 0.3, 0.1],
            vec![0.5, 0.3, 2.0, 0.4],
            vec![0.2, 0.1, 0.4, 1.0],
        ];
        let decomp = EigenSolver::default().solve(&matrix);

        assert!(decomp.converged);
        assert_close(&reconstruct(&decomp), &matrix, 1e-6);

        for i in 0..4 {
            for j in 0..4 {
                let dot: f64 = decomp.eigenvectors[i]
                    .iter()
                    .zip(decomp.eigenvectors[j].iter())
                    .map(|(a, b)| a * b)
                    .sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_eigenvalues_non_increasing() {
        let matrix = vec![
            vec![1.0, 0.9, 0.1, 0.0],
            vec![0.9, 1.0, 0.2, 0.1],
            vec![0.1, 0.2, 1.0, 0.8],
            vec![0.0, 0.1, 0.8, 1.0],
        ];
        let decomp = EigenSolver::default().solve(&matrix);

        assert_eq!(decomp.eigenvalues.len(), 4);
        for pair in decomp.eigenvalues.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        let trace: f64 = decomp.eigenvalues.iter().sum();
        assert!((trace - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_iteration_cap_is_not_an_error() {
        let matrix = vec![
            vec![2.0, 1.0, 1.0],
            vec![1.0, 2.0, 1.0],
            vec![1.0, 1.0, 2.0],
        ];
        let decomp = EigenSolver::new(1, 1e-10).solve(&matrix);

        assert_eq!(decomp.rotations, 1);
        assert!(!decomp.converged);
        assert_eq!(decomp.eigenvalues.len(), 3);
    }

    #[test]
    fn test_signed_zero_eigenvalues_keep_diagonal_order() {
        let matrix = vec![vec![-0.0, 0.0], vec![0.0, 0.0]];
        let result = EigenSolver::default().solve(&matrix);

        assert!(result.converged);
        assert_eq!(result.rotations, 0);
        assert!(result.eigenvalues[0].is_sign_negative());
        assert_eq!(result.eigenvectors[0], vec![1.0, 0.0]);
        assert_eq!(result.eigenvectors[1], vec![0.0, 1.0]);
    }

    #[test]
    fn test_empty_and_scalar() {
        let empty = EigenSolver::default().solve(&[]);
        assert!(empty.eigenvalues.is_empty());

        let scalar = EigenSolver::default().solve(&[vec![2.5]]);
        assert_eq!(scalar.eigenvalues, vec![2.5]);
        assert_eq!(scalar.eigenvectors, vec![vec![1.0]]);
        assert!(scalar.converged);
    }

    #[test]
    fn test_input_is_not_mutated() {
        let matrix = vec![vec![2.0, 1.0], vec![1.0, 2.0]];
        let copy = matrix.clone();
        let _ = EigenSolver::default().solve(&matrix);
        assert_eq!(matrix, copy);
    }
}
