//! Per-sample alpha diversity indices.
//!
//! Each metric is evaluated independently: a metric that cannot be computed
//! for a sample is stored as NaN for that sample without affecting the others.

use crate::data::CountMatrix;
use crate::error::{DivError, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

/// Supported alpha diversity indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlphaMetric {
    /// Number of features with a positive count.
    Observed,
    /// Shannon entropy, natural log.
    Shannon,
    /// Gini-Simpson index, 1 - Σp².
    Simpson,
    /// Bias-corrected Chao1 richness.
    Chao1,
}

impl AlphaMetric {
    /// All metrics in reporting order.
    pub fn all() -> Vec<AlphaMetric> {
        vec![
            AlphaMetric::Observed,
            AlphaMetric::Shannon,
            AlphaMetric::Simpson,
            AlphaMetric::Chao1,
        ]
    }

    /// Stable display name.
    pub fn name(&self) -> &'static str {
        match self {
            AlphaMetric::Observed => "Observed",
            AlphaMetric::Shannon => "Shannon",
            AlphaMetric::Simpson => "Simpson",
            AlphaMetric::Chao1 => "Chao1",
        }
    }

    /// Evaluate the metric on one sample's counts.
    pub fn compute(&self, counts: &[f64]) -> Result<f64> {
        let value = match self {
            AlphaMetric::Observed => observed(counts)?,
            AlphaMetric::Shannon => shannon(counts)?,
            AlphaMetric::Simpson => simpson(counts)?,
            AlphaMetric::Chao1 => chao1(counts)?,
        };
        if !value.is_finite() {
            return Err(DivError::Numerical(format!(
                "{} evaluated to {}",
                self.name(),
                value
            )));
        }
        Ok(value)
    }
}

impl fmt::Display for AlphaMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AlphaMetric {
    type Err = DivError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "observed" | "richness" => Ok(AlphaMetric::Observed),
            "shannon" => Ok(AlphaMetric::Shannon),
            "simpson" => Ok(AlphaMetric::Simpson),
            "chao1" => Ok(AlphaMetric::Chao1),
            other => Err(DivError::InvalidParameter(format!(
                "Unknown alpha metric '{}'. Use: observed, shannon, simpson, chao1",
                other
            ))),
        }
    }
}

fn total(counts: &[f64]) -> Result<f64> {
    let total: f64 = counts.iter().sum();
    if total <= 0.0 {
        return Err(DivError::EmptyData("sample has zero total abundance".to_string()));
    }
    Ok(total)
}

/// Number of features with a positive count.
pub fn observed(counts: &[f64]) -> Result<f64> {
    total(counts)?;
    Ok(counts.iter().filter(|&&c| c > 0.0).count() as f64)
}

/// Shannon entropy H = -Σ pᵢ ln pᵢ.
pub fn shannon(counts: &[f64]) -> Result<f64> {
    let total = total(counts)?;
    let h = counts
        .iter()
        .filter(|&&c| c > 0.0)
        .map(|&c| {
            let p = c / total;
            -p * p.ln()
        })
        .sum::<f64>();
    // A single feature gives -1·ln(1) = -0.0
    Ok(h.max(0.0))
}

/// Gini-Simpson index 1 - Σpᵢ².
pub fn simpson(counts: &[f64]) -> Result<f64> {
    let total = total(counts)?;
    let sum_p2: f64 = counts
        .iter()
        .filter(|&&c| c > 0.0)
        .map(|&c| (c / total).powi(2))
        .sum();
    Ok((1.0 - sum_p2).max(0.0))
}

/// Chao1 richness: S_obs + f1(f1-1) / (2(f2+1)); no correction when there are no doubletons.
pub fn chao1(counts: &[f64]) -> Result<f64> {
    let s_obs = observed(counts)?;
    let f1 = counts.iter().filter(|&&c| c == 1.0).count() as f64;
    let f2 = counts.iter().filter(|&&c| c == 2.0).count() as f64;
    if f2 == 0.0 {
        return Ok(s_obs);
    }
    Ok(s_obs + f1 * (f1 - 1.0) / (2.0 * (f2 + 1.0)))
}

/// Sample × metric table of alpha diversity values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaTable {
    /// Sample identifiers, row order.
    pub sample_ids: Vec<String>,
    /// Metrics, column order.
    pub metrics: Vec<AlphaMetric>,
    /// `values[sample][metric]`; NaN where the metric failed.
    pub values: Vec<Vec<f64>>,
    /// Samples with zero total abundance.
    pub empty_samples: Vec<String>,
}

impl AlphaTable {
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// One metric for every sample, `None` if the metric was not computed.
    pub fn metric(&self, metric: AlphaMetric) -> Option<Vec<f64>> {
        let col = self.metrics.iter().position(|m| *m == metric)?;
        Some(self.values.iter().map(|row| row[col]).collect())
    }

    /// Value for one sample and metric.
    pub fn value(&self, sample_id: &str, metric: AlphaMetric) -> Option<f64> {
        let row = self.sample_ids.iter().position(|s| s == sample_id)?;
        let col = self.metrics.iter().position(|m| *m == metric)?;
        Some(self.values[row][col])
    }

    /// Write the table as TSV; NaN cells are written as `NA`.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "sample_id")?;
        for metric in &self.metrics {
            write!(writer, "\t{}", metric)?;
        }
        writeln!(writer)?;

        for (sid, row) in self.sample_ids.iter().zip(&self.values) {
            write!(writer, "{}", sid)?;
            for v in row {
                if v.is_nan() {
                    write!(writer, "\tNA")?;
                } else {
                    write!(writer, "\t{:.6}", v)?;
                }
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Compute every alpha metric for every sample.
pub fn alpha_diversity(counts: &CountMatrix) -> AlphaTable {
    alpha_diversity_with(counts, &AlphaMetric::all())
}

/// Compute the chosen alpha metrics for every sample.
pub fn alpha_diversity_with(counts: &CountMatrix, metrics: &[AlphaMetric]) -> AlphaTable {
    let empty_samples = counts.empty_samples();
    if !empty_samples.is_empty() {
        warn!(
            "{} sample(s) with zero total abundance; alpha metrics set to NaN: {}",
            empty_samples.len(),
            empty_samples.join(", ")
        );
    }

    let values = counts
        .columns_dense()
        .iter()
        .zip(counts.sample_ids())
        .map(|(col, sid)| {
            metrics
                .iter()
                .map(|metric| match metric.compute(col) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("{} failed for sample '{}': {}", metric, sid, e);
                        f64::NAN
                    }
                })
                .collect()
        })
        .collect();

    AlphaTable {
        sample_ids: counts.sample_ids().to_vec(),
        metrics: metrics.to_vec(),
        values,
        empty_samples,
    }
}
