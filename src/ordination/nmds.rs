//! Non-metric multidimensional scaling by SMACOF stress majorization.
//!
//! # Algorithm
//!
//! For each of `n_init` random starting configurations:
//!
//! 1. Compute Euclidean distances of the current configuration
//! 2. Fit disparities: isotonic regression of distances on the rank order of
//!    the dissimilarities, rescaled so Σ d̂² = n(n-1)/2
//! 3. Raw stress = Σ (d - d̂)² over sample pairs
//! 4. Guttman transform: X ← B(X)X / n
//! 5. Stop when the relative stress improvement drops below `eps`
//!
//! The start with the lowest final stress is kept.

use super::{Embedding, Ordination, OrdinationConfig, OrdinationMethod};
use crate::data::DissimilarityMatrix;
use crate::error::{DivError, Result};
use log::debug;
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;

/// Floor for configuration distances in the Guttman transform.
const MIN_DISTANCE: f64 = 1e-5;

/// Non-metric MDS in two dimensions.
#[derive(Debug, Clone)]
pub struct Nmds {
    pub n_init: usize,
    pub max_iter: usize,
    pub eps: f64,
    pub seed: u64,
}

impl Default for Nmds {
    fn default() -> Self {
        Self::from_config(&OrdinationConfig::default())
    }
}

impl Nmds {
    pub fn from_config(config: &OrdinationConfig) -> Self {
        Self {
            n_init: config.n_init,
            max_iter: config.max_iter,
            eps: config.eps,
            seed: config.seed,
        }
    }
}

/// Upper-triangle pairs ordered by dissimilarity, with tied dissimilarities grouped.
struct PairOrder {
    pairs: Vec<(usize, usize)>,
    /// Consecutive ranges of `pairs` sharing the same dissimilarity.
    blocks: Vec<std::ops::Range<usize>>,
}

impl PairOrder {
    fn new(dm: &DissimilarityMatrix) -> Self {
        let n = dm.len();
        let mut pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .collect();
        pairs.sort_by(|a, b| {
            dm.get(a.0, a.1)
                .partial_cmp(&dm.get(b.0, b.1))
                .unwrap_or(Ordering::Equal)
        });

        let mut blocks = Vec::new();
        let mut start = 0;
        for k in 1..=pairs.len() {
            if k == pairs.len() || dm.get(pairs[k].0, pairs[k].1) != dm.get(pairs[start].0, pairs[start].1) {
                blocks.push(start..k);
                start = k;
            }
        }
        Self { pairs, blocks }
    }
}

/// Weighted pool-adjacent-violators: non-decreasing fit to `values`.
pub(crate) fn isotonic_regression(values: &[f64], weights: &[f64]) -> Vec<f64> {
    // (mean, weight, count of merged inputs)
    let mut stack: Vec<(f64, f64, usize)> = Vec::with_capacity(values.len());
    for (&v, &w) in values.iter().zip(weights) {
        stack.push((v, w, 1));
        while stack.len() > 1 {
            let (m2, w2, c2) = stack[stack.len() - 1];
            let (m1, w1, c1) = stack[stack.len() - 2];
            if m1 <= m2 {
                break;
            }
            stack.truncate(stack.len() - 2);
            let w = w1 + w2;
            stack.push(((m1 * w1 + m2 * w2) / w, w, c1 + c2));
        }
    }
    stack
        .into_iter()
        .flat_map(|(m, _, c)| std::iter::repeat(m).take(c))
        .collect()
}

fn distances(x: &DMatrix<f64>) -> DMatrix<f64> {
    let n = x.nrows();
    DMatrix::from_fn(n, n, |i, j| (x.row(i) - x.row(j)).norm())
}

/// Isotonic fit of the distances on the dissimilarity rank order, for every pair.
fn fitted_disparities(order: &PairOrder, dist: &DMatrix<f64>) -> DMatrix<f64> {
    let n = dist.nrows();
    let means: Vec<f64> = order
        .blocks
        .iter()
        .map(|b| order.pairs[b.clone()].iter().map(|&(i, j)| dist[(i, j)]).sum::<f64>() / b.len() as f64)
        .collect();
    let weights: Vec<f64> = order.blocks.iter().map(|b| b.len() as f64).collect();
    let fitted = isotonic_regression(&means, &weights);

    let mut disp = DMatrix::<f64>::zeros(n, n);
    for (block, &value) in order.blocks.iter().zip(&fitted) {
        for &(i, j) in &order.pairs[block.clone()] {
            disp[(i, j)] = value;
            disp[(j, i)] = value;
        }
    }
    disp
}

/// Disparities scaled so their squares sum to n(n-1)/2.
fn disparities(order: &PairOrder, dist: &DMatrix<f64>) -> DMatrix<f64> {
    let n = dist.nrows();
    let mut disp = fitted_disparities(order, dist);
    let sum_sq: f64 = order.pairs.iter().map(|&(i, j)| disp[(i, j)].powi(2)).sum();
    if sum_sq > 0.0 {
        let target = (n * (n - 1)) as f64 / 2.0;
        disp *= (target / sum_sq).sqrt();
    }
    disp
}

fn raw_stress(order: &PairOrder, dist: &DMatrix<f64>, disp: &DMatrix<f64>) -> f64 {
    order
        .pairs
        .iter()
        .map(|&(i, j)| (dist[(i, j)] - disp[(i, j)]).powi(2))
        .sum()
}

/// Kruskal stress-1: sqrt(Σ(d - d̂)² / Σd²).
fn stress_1(order: &PairOrder, x: &DMatrix<f64>) -> f64 {
    let dist = distances(x);
    let disp = fitted_disparities(order, &dist);
    let denom: f64 = order.pairs.iter().map(|&(i, j)| dist[(i, j)].powi(2)).sum();
    if denom > 0.0 {
        (raw_stress(order, &dist, &disp) / denom).sqrt()
    } else {
        0.0
    }
}

/// One SMACOF run from a given start; returns the final configuration,
/// its raw stress and whether the tolerance was reached.
fn smacof_single(order: &PairOrder, mut x: DMatrix<f64>, max_iter: usize, eps: f64) -> (DMatrix<f64>, f64, bool) {
    let n = x.nrows();
    let mut old_stress: Option<f64> = None;
    let mut stress = f64::INFINITY;
    let mut converged = false;

    for it in 0..max_iter {
        let dist = distances(&x);
        let disp = disparities(order, &dist);
        stress = raw_stress(order, &dist, &disp);

        let mut b = DMatrix::<f64>::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    let ratio = disp[(i, j)] / dist[(i, j)].max(MIN_DISTANCE);
                    b[(i, j)] = -ratio;
                    b[(i, i)] += ratio;
                }
            }
        }
        x = (b * &x) / n as f64;

        let norm: f64 = (0..n).map(|i| x.row(i).norm()).sum();
        if norm <= 0.0 {
            break;
        }
        let relative = stress / norm;
        if let Some(old) = old_stress {
            if old - relative < eps {
                debug!("SMACOF converged after {} iterations", it + 1);
                converged = true;
                break;
            }
        }
        old_stress = Some(relative);
    }
    (x, stress, converged)
}

impl Ordination for Nmds {
    fn method(&self) -> OrdinationMethod {
        OrdinationMethod::Nmds
    }

    fn embed(&self, dm: &DissimilarityMatrix) -> Result<Embedding> {
        let n = dm.len();
        if n == 0 {
            return Err(DivError::EmptyData("Cannot ordinate an empty matrix".to_string()));
        }
        if self.n_init == 0 || self.max_iter == 0 {
            return Err(DivError::InvalidParameter(
                "NMDS needs at least one start and one iteration".to_string(),
            ));
        }
        if n == 1 {
            return Ok(Embedding::collapsed(
                OrdinationMethod::Nmds,
                dm,
                "single sample placed at the origin".to_string(),
            ));
        }
        if dm.max() == 0.0 {
            return Ok(Embedding::collapsed(
                OrdinationMethod::Nmds,
                dm,
                "all dissimilarities are zero; samples placed at the origin".to_string(),
            ));
        }
        if n == 2 {
            // Rank order is trivial: any positive separation is a perfect fit
            return Ok(Embedding {
                method: OrdinationMethod::Nmds,
                sample_ids: dm.ids().to_vec(),
                coords: vec![(-0.5, 0.0), (0.5, 0.0)],
                stress: Some(0.0),
                explained_variance: None,
                converged: true,
                notes: vec!["two samples carry no rank information; placed on one axis".to_string()],
            });
        }

        let order = PairOrder::new(dm);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<(DMatrix<f64>, f64, bool)> = None;

        for start in 0..self.n_init {
            let init = DMatrix::from_fn(n, 2, |_, _| rng.gen::<f64>());
            let (x, stress, converged) = smacof_single(&order, init, self.max_iter, self.eps);
            debug!("NMDS start {}: raw stress {:.6}", start, stress);
            if !stress.is_finite() || x.iter().any(|v| !v.is_finite()) {
                continue;
            }
            if best.as_ref().map_or(true, |(_, s, _)| stress < *s) {
                best = Some((x, stress, converged));
            }
        }

        let (mut x, _, converged) = best.ok_or_else(|| {
            DivError::Numerical("NMDS did not produce a finite configuration".to_string())
        })?;

        // Centre on the origin
        for axis in 0..2 {
            let mean = x.column(axis).mean();
            x.column_mut(axis).add_scalar_mut(-mean);
        }

        let mut notes = Vec::new();
        if !converged {
            notes.push(format!(
                "best start did not reach tolerance {} within {} iterations",
                self.eps, self.max_iter
            ));
        }
        if n == 3 {
            notes.push("three samples give a trivially perfect rank fit".to_string());
        }

        Ok(Embedding {
            method: OrdinationMethod::Nmds,
            sample_ids: dm.ids().to_vec(),
            coords: (0..n).map(|i| (x[(i, 0)], x[(i, 1)])).collect(),
            stress: Some(stress_1(&order, &x)),
            explained_variance: None,
            converged,
            notes,
        })
    }
}
