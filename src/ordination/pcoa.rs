//! Principal coordinates analysis (classical multidimensional scaling).

use super::{Embedding, Ordination, OrdinationMethod};
use crate::data::DissimilarityMatrix;
use crate::error::{DivError, Result};
use log::debug;
use nalgebra::{DMatrix, SymmetricEigen};

/// Eigenvalues below this fraction of the largest magnitude are treated as zero.
const EIGEN_TOL: f64 = 1e-10;

/// Gower double-centred PCoA keeping the two leading axes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pcoa;

/// Gower double-centring of -½D²: B = J(-½D²)J with J = I - 11ᵀ/n.
fn gower_centre(d: &DMatrix<f64>) -> DMatrix<f64> {
    let n = d.nrows();
    let a = d.map(|v| -0.5 * v * v);
    let row_means: Vec<f64> = (0..n).map(|i| a.row(i).mean()).collect();
    let col_means: Vec<f64> = (0..n).map(|j| a.column(j).mean()).collect();
    let grand = a.mean();
    DMatrix::from_fn(n, n, |i, j| a[(i, j)] - row_means[i] - col_means[j] + grand)
}

impl Ordination for Pcoa {
    fn method(&self) -> OrdinationMethod {
        OrdinationMethod::Pcoa
    }

    fn embed(&self, dm: &DissimilarityMatrix) -> Result<Embedding> {
        let n = dm.len();
        if n == 0 {
            return Err(DivError::EmptyData("Cannot ordinate an empty matrix".to_string()));
        }
        if n == 1 {
            return Ok(Embedding::collapsed(
                OrdinationMethod::Pcoa,
                dm,
                "single sample placed at the origin".to_string(),
            ));
        }
        if dm.max() == 0.0 {
            return Ok(Embedding::collapsed(
                OrdinationMethod::Pcoa,
                dm,
                "all dissimilarities are zero; samples placed at the origin".to_string(),
            ));
        }

        let b = gower_centre(dm.as_matrix());
        let eigen = SymmetricEigen::new(b);

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&i, &j| {
            eigen.eigenvalues[j]
                .partial_cmp(&eigen.eigenvalues[i])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if eigen.eigenvalues.iter().any(|v| !v.is_finite()) {
            return Err(DivError::Numerical(
                "Eigen-decomposition produced non-finite eigenvalues".to_string(),
            ));
        }

        let scale = eigen.eigenvalues.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let positive_sum: f64 = eigen
            .eigenvalues
            .iter()
            .filter(|&&v| v > EIGEN_TOL * scale)
            .sum();

        let mut notes = Vec::new();
        let negative = eigen
            .eigenvalues
            .iter()
            .filter(|&&v| v < -EIGEN_TOL * scale)
            .count();
        if negative > 0 {
            notes.push(format!(
                "{} negative eigenvalue(s) clamped to zero; dissimilarities are not Euclidean",
                negative
            ));
        }

        let mut axes = [vec![0.0; n], vec![0.0; n]];
        let mut explained = [0.0; 2];
        for (axis, &k) in order.iter().take(2).enumerate() {
            let lambda = eigen.eigenvalues[k];
            if lambda <= EIGEN_TOL * scale {
                notes.push(format!("axis {} has no positive eigenvalue and collapses to 0", axis + 1));
                continue;
            }
            let vector = eigen.eigenvectors.column(k);
            // Fix the sign so the largest-magnitude loading is positive
            let pivot = vector
                .iter()
                .cloned()
                .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
            let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
            let root = lambda.sqrt();
            for i in 0..n {
                axes[axis][i] = sign * vector[i] * root;
            }
            explained[axis] = lambda / positive_sum;
        }
        debug!(
            "PCoA explained variance: {:.3}, {:.3}",
            explained[0], explained[1]
        );

        Ok(Embedding {
            method: OrdinationMethod::Pcoa,
            sample_ids: dm.ids().to_vec(),
            coords: (0..n).map(|i| (axes[0][i], axes[1][i])).collect(),
            stress: None,
            explained_variance: Some(explained),
            converged: true,
            notes,
        })
    }
}
