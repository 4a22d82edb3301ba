//! Standardization and covariance
//!
//! Column-wise z-scores of the observation matrix and the unbiased sample
//! covariance of the standardized data.

use serde::{Deserialize, Serialize};

/// Standardized data plus the column statistics used to produce it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardizedData {
    pub standardized: Vec<Vec<f64>>,
    pub means: Vec<f64>,
    /// Population standard deviations, with zero replaced by 1
    pub stds: Vec<f64>,
}

/// Column-wise z-score normalizer
pub struct Standardizer;

impl Standardizer {
    /// Standardize each column to mean 0 and population std 1.
    ///
    /// A zero-variance column keeps std = 1, so it standardizes to exactly 0.
    /// Ragged rows are tolerated: a column's statistics come from the rows
    /// that reach it, and every row keeps its own width.
    pub fn standardize(data: &[Vec<f64>]) -> StandardizedData {
        if data.is_empty() {
            return StandardizedData::default();
        }

        let m = data.iter().map(Vec::len).max().unwrap_or(0);
        let mut means = Vec::with_capacity(m);
        let mut stds = Vec::with_capacity(m);

        for j in 0..m {
            let column: Vec<f64> = data.iter().filter_map(|row| row.get(j).copied()).collect();
            let n = column.len() as f64;
            let mean = column.iter().sum::<f64>() / n;
            let variance = column.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            means.push(mean);
            stds.push(if std > 0.0 && std.is_finite() { std } else { 1.0 });
        }

        let standardized = data
            .iter()
            .map(|row| {
                row.iter()
                    .zip(means.iter().zip(stds.iter()))
                    .map(|(x, (mean, std))| (x - mean) / std)
                    .collect()
            })
            .collect();

        StandardizedData {
            standardized,
            means,
            stds,
        }
    }
}

/// Sample covariance builder
pub struct CovarianceBuilder;

impl CovarianceBuilder {
    /// Compute `cov[i][j] = sum_k x[k][i] * x[k][j] / (n - 1)` for centered data.
    ///
    /// With a single row the denominator is 1 rather than 0. A cell missing
    /// from a short row counts as 0, the mean of centered data.
    pub fn build(data: &[Vec<f64>]) -> Vec<Vec<f64>> {
        if data.is_empty() {
            return Vec::new();
        }

        let m = data.iter().map(Vec::len).max().unwrap_or(0);
        let cell = |row: &Vec<f64>, j: usize| row.get(j).copied().unwrap_or(0.0);
        let denominator = if data.len() > 1 {
            (data.len() - 1) as f64
        } else {
            1.0
        };

        let mut cov = vec![vec![0.0; m]; m];
        for i in 0..m {
            for j in i..m {
                let sum: f64 = data.iter().map(|row| cell(row, i) * cell(row, j)).sum();
                let value = sum / denominator;
                cov[i][j] = value;
                cov[j][i] = value;
            }
        }
        cov
    }
}
