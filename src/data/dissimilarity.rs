//! Symmetric sample × sample dissimilarity matrix.

use crate::error::{DivError, Result};
use nalgebra::DMatrix;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const SYMMETRY_TOL: f64 = 1e-9;

/// Pairwise dissimilarities between samples.
///
/// Invariants checked on construction: square, symmetric, zero diagonal,
/// finite and non-negative entries.
#[derive(Debug, Clone)]
pub struct DissimilarityMatrix {
    ids: Vec<String>,
    data: DMatrix<f64>,
    /// Samples that were dropped before computing the matrix.
    excluded: Vec<String>,
}

impl DissimilarityMatrix {
    pub fn new(ids: Vec<String>, data: DMatrix<f64>) -> Result<Self> {
        let n = ids.len();
        if data.nrows() != n || data.ncols() != n {
            return Err(DivError::DimensionMismatch {
                expected: n,
                actual: data.nrows().max(data.ncols()),
            });
        }
        for i in 0..n {
            if data[(i, i)].abs() > SYMMETRY_TOL {
                return Err(DivError::Numerical(format!(
                    "Non-zero self-dissimilarity for sample '{}'",
                    ids[i]
                )));
            }
            for j in (i + 1)..n {
                let (a, b) = (data[(i, j)], data[(j, i)]);
                if !a.is_finite() || a < 0.0 {
                    return Err(DivError::Numerical(format!(
                        "Invalid dissimilarity {} between '{}' and '{}'",
                        a, ids[i], ids[j]
                    )));
                }
                if (a - b).abs() > SYMMETRY_TOL {
                    return Err(DivError::Numerical(format!(
                        "Asymmetric dissimilarity between '{}' and '{}'",
                        ids[i], ids[j]
                    )));
                }
            }
        }
        Ok(Self {
            ids,
            data,
            excluded: Vec::new(),
        })
    }

    /// Build from a pairwise function evaluated on the upper triangle.
    pub fn from_fn<F>(ids: Vec<String>, mut f: F) -> Result<Self>
    where
        F: FnMut(usize, usize) -> f64,
    {
        let n = ids.len();
        let mut data = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in (i + 1)..n {
                let d = f(i, j);
                data[(i, j)] = d;
                data[(j, i)] = d;
            }
        }
        Self::new(ids, data)
    }

    /// Record samples that were left out of the matrix.
    pub fn with_excluded(mut self, excluded: Vec<String>) -> Self {
        self.excluded = excluded;
        self
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[(i, j)]
    }

    /// Dissimilarity between two samples by ID.
    pub fn get_by_id(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.index_of(a)?;
        let j = self.index_of(b)?;
        Some(self.data[(i, j)])
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|s| s == id)
    }

    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Samples excluded before computation (e.g. all-zero samples).
    pub fn excluded_samples(&self) -> &[String] {
        &self.excluded
    }

    /// Largest entry, 0 for matrices with fewer than two samples.
    pub fn max(&self) -> f64 {
        self.data.iter().cloned().fold(0.0, f64::max)
    }

    /// Write as a square TSV with sample IDs on both axes.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "sample_id")?;
        for id in &self.ids {
            write!(writer, "\t{}", id)?;
        }
        writeln!(writer)?;

        for (i, id) in self.ids.iter().enumerate() {
            write!(writer, "{}", id)?;
            for j in 0..self.len() {
                write!(writer, "\t{:.6}", self.data[(i, j)])?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}
