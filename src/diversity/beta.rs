//! Bray-Curtis beta diversity.

use crate::data::{CountMatrix, DissimilarityMatrix};
use crate::error::{DivError, Result};
use log::{info, warn};

/// Bray-Curtis dissimilarity Σ|aₖ - bₖ| / Σ(aₖ + bₖ).
///
/// Lies in [0, 1]; 0 when both samples are empty.
pub fn bray_curtis(a: &[f64], b: &[f64]) -> f64 {
    let (numerator, denominator) = a
        .iter()
        .zip(b)
        .fold((0.0, 0.0), |(num, den), (&ai, &bi)| {
            (num + (ai - bi).abs(), den + ai + bi)
        });
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Pairwise Bray-Curtis dissimilarities between all non-empty samples.
///
/// All-zero samples are left out and reported through
/// [`DissimilarityMatrix::excluded_samples`]. Fails when fewer than two
/// samples remain.
pub fn bray_curtis_matrix(counts: &CountMatrix) -> Result<DissimilarityMatrix> {
    let sums = counts.col_sums();
    let columns = counts.columns_dense();

    let mut kept_ids = Vec::new();
    let mut kept_cols = Vec::new();
    let mut excluded = Vec::new();
    for ((sid, col), total) in counts.sample_ids().iter().zip(columns).zip(sums) {
        if total > 0.0 {
            kept_ids.push(sid.clone());
            kept_cols.push(col);
        } else {
            excluded.push(sid.clone());
        }
    }

    if !excluded.is_empty() {
        warn!(
            "Excluding {} empty sample(s) from beta diversity: {}",
            excluded.len(),
            excluded.join(", ")
        );
    }
    if kept_ids.len() < 2 {
        return Err(DivError::EmptyData(format!(
            "Beta diversity needs at least 2 non-empty samples, found {}",
            kept_ids.len()
        )));
    }

    info!("Computing Bray-Curtis for {} samples", kept_ids.len());
    let dm = DissimilarityMatrix::from_fn(kept_ids, |i, j| bray_curtis(&kept_cols[i], &kept_cols[j]))?;
    Ok(dm.with_excluded(excluded))
}
