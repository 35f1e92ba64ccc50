//! Rarefaction curves by repeated subsampling without replacement.
//!
//! A sample is treated as its multiset of reads (one read per counted
//! occurrence of a feature, counts truncated to integers). At each depth
//! `repeats` read indices are drawn without replacement and mapped back to
//! features through the cumulative counts; the mean number of distinct
//! features is recorded.

use crate::data::CountMatrix;
use crate::error::{DivError, Result};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Configuration for rarefaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RarefactionConfig {
    /// Number of depths evaluated per curve.
    pub steps: usize,
    /// Subsamples drawn per depth.
    pub repeats: usize,
    /// First depth of the curve.
    pub min_depth: usize,
    /// Random seed for reproducibility.
    pub seed: u64,
}

impl Default for RarefactionConfig {
    fn default() -> Self {
        Self {
            steps: 10,
            repeats: 10,
            min_depth: 10,
            seed: 42,
        }
    }
}

impl RarefactionConfig {
    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_repeats(mut self, repeats: usize) -> Self {
        self.repeats = repeats;
        self
    }

    pub fn with_min_depth(mut self, min_depth: usize) -> Self {
        self.min_depth = min_depth;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.steps == 0 {
            return Err(DivError::InvalidParameter(
                "Rarefaction needs at least one depth step".to_string(),
            ));
        }
        if self.repeats == 0 {
            return Err(DivError::InvalidParameter(
                "Rarefaction needs at least one repeat per depth".to_string(),
            ));
        }
        Ok(())
    }
}

/// Expected richness as a function of sequencing depth for one sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RarefactionCurve {
    pub sample_id: String,
    /// Subsampling depths from `min_depth` to the sample's read total. The
    /// grid descends when the total is below `min_depth`.
    pub depths: Vec<usize>,
    /// Mean distinct features at each depth; NaN where the depth is 0 or exceeds the reads.
    pub richness: Vec<f64>,
}

impl RarefactionCurve {
    /// `(depth, richness)` pairs that were actually evaluated.
    pub fn points(&self) -> Vec<(usize, f64)> {
        self.depths
            .iter()
            .zip(&self.richness)
            .filter(|(_, r)| !r.is_nan())
            .map(|(&d, &r)| (d, r))
            .collect()
    }
}

/// Integer depths evenly spaced from `start` to `stop` inclusive, truncated toward zero.
pub fn depth_grid(start: usize, stop: usize, steps: usize) -> Vec<usize> {
    match steps {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let (a, b) = (start as f64, stop as f64);
            let step = (b - a) / (steps - 1) as f64;
            (0..steps)
                .map(|k| {
                    if k == steps - 1 {
                        stop
                    } else {
                        (a + k as f64 * step).trunc().max(0.0) as usize
                    }
                })
                .collect()
        }
    }
}

/// Rarefaction curve of a single sample.
pub fn rarefaction_curve(
    counts: &CountMatrix,
    sample_id: &str,
    config: &RarefactionConfig,
) -> Result<RarefactionCurve> {
    config.validate()?;
    let col = counts.sample_index(sample_id).ok_or_else(|| {
        DivError::InvalidParameter(format!("Sample '{}' not in abundance table", sample_id))
    })?;

    // Reads [cumulative[f-1], cumulative[f]) belong to feature f
    let mut total_reads = 0usize;
    let cumulative: Vec<usize> = counts
        .col_dense(col)
        .iter()
        .map(|&c| {
            total_reads += c.trunc().max(0.0) as usize;
            total_reads
        })
        .collect();
    if total_reads == 0 {
        return Err(DivError::EmptySample(sample_id.to_string()));
    }

    let n_features = counts.n_features();
    let depths = depth_grid(config.min_depth, total_reads, config.steps);
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut seen = vec![false; n_features];

    let richness = depths
        .iter()
        .map(|&depth| {
            if depth == 0 || depth > total_reads {
                return f64::NAN;
            }
            let mut total = 0usize;
            for _ in 0..config.repeats {
                seen.iter_mut().for_each(|s| *s = false);
                let mut distinct = 0;
                for i in index::sample(&mut rng, total_reads, depth) {
                    let feature = cumulative.partition_point(|&c| c <= i);
                    if !seen[feature] {
                        seen[feature] = true;
                        distinct += 1;
                    }
                }
                total += distinct;
            }
            total as f64 / config.repeats as f64
        })
        .collect();

    debug!("Rarefied '{}' at {} depths", sample_id, depths.len());
    Ok(RarefactionCurve {
        sample_id: sample_id.to_string(),
        depths,
        richness,
    })
}

/// Rarefaction curves for every non-empty sample.
pub fn rarefaction_curves(
    counts: &CountMatrix,
    config: &RarefactionConfig,
) -> Result<Vec<RarefactionCurve>> {
    config.validate()?;
    let mut curves = Vec::with_capacity(counts.n_samples());
    for sid in counts.sample_ids() {
        match rarefaction_curve(counts, sid, config) {
            Ok(curve) => curves.push(curve),
            Err(DivError::EmptySample(sid)) => {
                warn!("Skipping rarefaction for empty sample '{}'", sid)
            }
            Err(e) => return Err(e),
        }
    }
    Ok(curves)
}

/// Write curves in long format: sample, depth, richness.
pub fn write_curves_tsv<P: AsRef<Path>>(curves: &[RarefactionCurve], path: P) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "sample_id\tdepth\trichness")?;
    for curve in curves {
        for (depth, richness) in curve.depths.iter().zip(&curve.richness) {
            if richness.is_nan() {
                writeln!(writer, "{}\t{}\tNA", curve.sample_id, depth)?;
            } else {
                writeln!(writer, "{}\t{}\t{:.4}", curve.sample_id, depth, richness)?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}
