//! Two-dimensional embeddings of a dissimilarity matrix.
//!
//! Two strategies implement the [`Ordination`] trait:
//!
//! - [`Nmds`]: non-metric multidimensional scaling (SMACOF with isotonic
//!   regression). The default for Bray-Curtis input.
//! - [`Pcoa`]: principal coordinates analysis, deterministic.
//!
//! Both return an [`Embedding`] that records how it was produced, including
//! notes about degenerate input.

pub mod ellipse;
pub mod nmds;
pub mod pcoa;

pub use ellipse::{confidence_ellipse, group_ellipses, Ellipse, GroupEllipse};
pub use nmds::Nmds;
pub use pcoa::Pcoa;

use crate::data::DissimilarityMatrix;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Ordination strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrdinationMethod {
    #[default]
    Nmds,
    Pcoa,
}

impl OrdinationMethod {
    /// Short label used for axis names (`NMDS1`, `PCoA1`).
    pub fn label(&self) -> &'static str {
        match self {
            OrdinationMethod::Nmds => "NMDS",
            OrdinationMethod::Pcoa => "PCoA",
        }
    }
}

impl fmt::Display for OrdinationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Configuration for ordination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrdinationConfig {
    pub method: OrdinationMethod,
    /// Random seed for NMDS starting configurations.
    pub seed: u64,
    /// Number of NMDS random starts.
    pub n_init: usize,
    /// Maximum SMACOF iterations per start.
    pub max_iter: usize,
    /// Relative stress improvement below which SMACOF stops.
    pub eps: f64,
}

impl Default for OrdinationConfig {
    fn default() -> Self {
        Self {
            method: OrdinationMethod::default(),
            seed: 42,
            n_init: 10,
            max_iter: 300,
            eps: 1e-3,
        }
    }
}

impl OrdinationConfig {
    /// Deterministic principal coordinates.
    pub fn pcoa() -> Self {
        Self {
            method: OrdinationMethod::Pcoa,
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: OrdinationMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    /// Strategy object for the configured method.
    pub fn strategy(&self) -> Box<dyn Ordination> {
        match self.method {
            OrdinationMethod::Nmds => Box::new(Nmds::from_config(self)),
            OrdinationMethod::Pcoa => Box::new(Pcoa),
        }
    }
}

/// A method that places samples in the plane so that distances reflect dissimilarities.
pub trait Ordination {
    fn method(&self) -> OrdinationMethod;

    fn embed(&self, dm: &DissimilarityMatrix) -> Result<Embedding>;
}

/// Samples placed in two dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub method: OrdinationMethod,
    pub sample_ids: Vec<String>,
    /// `(x, y)` per sample, aligned with `sample_ids`.
    pub coords: Vec<(f64, f64)>,
    /// Kruskal stress-1 (NMDS only).
    pub stress: Option<f64>,
    /// Fraction of variance on each axis (PCoA only).
    pub explained_variance: Option<[f64; 2]>,
    pub converged: bool,
    /// Precision loss and degenerate-input remarks.
    pub notes: Vec<String>,
}

impl Embedding {
    pub fn len(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_ids.is_empty()
    }

    /// Coordinates of a sample.
    pub fn point(&self, sample_id: &str) -> Option<(f64, f64)> {
        let i = self.sample_ids.iter().position(|s| s == sample_id)?;
        Some(self.coords[i])
    }

    /// Axis names, e.g. `["NMDS1", "NMDS2"]`.
    pub fn axis_names(&self) -> [String; 2] {
        let label = self.method.label();
        [format!("{}1", label), format!("{}2", label)]
    }

    /// Write coordinates as TSV.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let [x, y] = self.axis_names();
        writeln!(writer, "sample_id\t{}\t{}", x, y)?;
        for (sid, (px, py)) in self.sample_ids.iter().zip(&self.coords) {
            writeln!(writer, "{}\t{:.6}\t{:.6}", sid, px, py)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Embedding of zero or one sample, or of samples with no dissimilarity at all.
    pub(crate) fn collapsed(method: OrdinationMethod, dm: &DissimilarityMatrix, note: String) -> Self {
        Self {
            method,
            sample_ids: dm.ids().to_vec(),
            coords: vec![(0.0, 0.0); dm.len()],
            stress: match method {
                OrdinationMethod::Nmds => Some(0.0),
                OrdinationMethod::Pcoa => None,
            },
            explained_variance: None,
            converged: true,
            notes: vec![note],
        }
    }
}

/// Embed a dissimilarity matrix with the configured method.
pub fn ordinate(dm: &DissimilarityMatrix, config: &OrdinationConfig) -> Result<Embedding> {
    config.strategy().embed(dm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_nmds() {
        let config = OrdinationConfig::default();
        assert_eq!(config.method, OrdinationMethod::Nmds);
        assert_eq!(config.n_init, 10);
        assert_eq!(config.max_iter, 300);
        assert_eq!(config.strategy().method(), OrdinationMethod::Nmds);
        assert_eq!(OrdinationConfig::pcoa().strategy().method(), OrdinationMethod::Pcoa);
    }

    #[test]
    fn test_config_yaml_defaults() {
        let config: OrdinationConfig = serde_yaml::from_str("method: Pcoa\n").unwrap();
        assert_eq!(config.method, OrdinationMethod::Pcoa);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_ordinate_dispatches() {
        let dm = DissimilarityMatrix::from_fn(vec!["A".into(), "B".into(), "C".into()], |i, j| {
            [[0.0, 0.3, 0.8], [0.3, 0.0, 0.6], [0.8, 0.6, 0.0]][i][j]
        })
        .unwrap();

        let emb = ordinate(&dm, &OrdinationConfig::pcoa()).unwrap();
        assert_eq!(emb.method, OrdinationMethod::Pcoa);
        assert_eq!(emb.axis_names(), ["PCoA1".to_string(), "PCoA2".to_string()]);
        assert!(emb.point("B").is_some());
    }
}
