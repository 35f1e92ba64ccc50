//! Rank-level relative abundance summaries.
//!
//! Counts are summed per taxonomic label, the dominant labels are kept and
//! the remainder is pooled, then each sample is expressed in percent.

pub mod aggregate;

pub use aggregate::{aggregate_rank, aggregate_ranks};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Configuration for taxonomic aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonomyConfig {
    /// Ranks to aggregate; empty means every informative rank.
    pub ranks: Vec<String>,
    /// Number of most abundant labels kept verbatim.
    pub top_n: usize,
    /// Label of the pooled remainder.
    pub other_label: String,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            ranks: Vec::new(),
            top_n: 10,
            other_label: "Other".to_string(),
        }
    }
}

impl TaxonomyConfig {
    pub fn with_ranks(mut self, ranks: Vec<String>) -> Self {
        self.ranks = ranks;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_other_label(mut self, label: &str) -> Self {
        self.other_label = label.to_string();
        self
    }
}

/// Composition of one sample at a rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RankComposition {
    /// Percent per profile column, summing to 100.
    Percentages(Vec<f64>),
    /// None of the sample's reads carry a label at this rank.
    NoData,
}

/// Per-sample percentages of the dominant labels at one rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomicProfile {
    pub rank: String,
    pub sample_ids: Vec<String>,
    /// Column labels, most abundant first, the pooled bucket last.
    pub taxa: Vec<String>,
    /// One entry per sample, aligned with `sample_ids`.
    pub compositions: Vec<RankComposition>,
    /// Abundance features without a taxonomy entry.
    pub unmatched_features: usize,
    /// Matched features with no label at this rank.
    pub unlabeled_features: usize,
    /// Labels merged into the pooled bucket.
    pub pooled_labels: usize,
}

impl TaxonomicProfile {
    /// False when no sample has any labelled reads at this rank.
    pub fn has_data(&self) -> bool {
        self.compositions
            .iter()
            .any(|c| matches!(c, RankComposition::Percentages(_)))
    }

    /// Percentages of one sample, `None` if unknown or without data.
    pub fn percentages(&self, sample_id: &str) -> Option<&[f64]> {
        let i = self.sample_ids.iter().position(|s| s == sample_id)?;
        match &self.compositions[i] {
            RankComposition::Percentages(p) => Some(p),
            RankComposition::NoData => None,
        }
    }

    /// Write samples × taxa percentages as TSV; samples without data get `NA`.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "sample_id")?;
        for taxon in &self.taxa {
            write!(writer, "\t{}", taxon)?;
        }
        writeln!(writer)?;

        for (sid, composition) in self.sample_ids.iter().zip(&self.compositions) {
            write!(writer, "{}", sid)?;
            match composition {
                RankComposition::Percentages(values) => {
                    for v in values {
                        write!(writer, "\t{:.4}", v)?;
                    }
                }
                RankComposition::NoData => {
                    for _ in &self.taxa {
                        write!(writer, "\tNA")?;
                    }
                }
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl fmt::Display for TaxonomicProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Taxonomic Profile: {}", self.rank)?;
        writeln!(f, "==================")?;
        writeln!(f, "Samples: {}", self.sample_ids.len())?;
        writeln!(f, "Labels shown: {}", self.taxa.len())?;
        writeln!(f, "Labels pooled: {}", self.pooled_labels)?;
        if self.unmatched_features > 0 {
            writeln!(f, "Features without taxonomy: {}", self.unmatched_features)?;
        }
        if self.unlabeled_features > 0 {
            writeln!(f, "Features without a {} label: {}", self.rank, self.unlabeled_features)?;
        }
        let no_data = self
            .compositions
            .iter()
            .filter(|c| matches!(c, RankComposition::NoData))
            .count();
        if no_data > 0 {
            writeln!(f, "Samples without data: {}", no_data)?;
        }
        Ok(())
    }
}
