//! Composable Microbiome Diversity Library
//!
//! This library provides modular primitives for diversity analysis of
//! microbiome abundance tables.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core data structures (CountMatrix, Metadata, TaxonomyTable, DissimilarityMatrix)
//!   and sample/feature identifier harmonization
//! - **diversity**: Alpha diversity, Bray-Curtis dissimilarity, rarefaction curves
//! - **ordination**: NMDS and PCoA embeddings, group confidence ellipses
//! - **test**: ANOVA / Kruskal-Wallis on alpha diversity, PERMANOVA
//! - **taxonomy**: Rank-level relative abundance with top-N pooling
//! - **pipeline**: Declarative end-to-end analysis with per-step failure isolation
//!
//! # Example
//!
//! ```no_run
//! use composable_diversity::prelude::*;
//!
//! let counts = CountMatrix::from_path("counts.tsv").unwrap();
//! let metadata = Metadata::from_path("metadata.tsv").unwrap();
//!
//! let tables = AnalysisTables::new(counts).with_metadata(metadata);
//! let config = AnalysisConfig::default().name("survey").group_by("treatment");
//! let report = run_analysis(&tables, &config);
//! println!("{}", report);
//! ```

pub mod data;
pub mod diversity;
pub mod error;
pub mod ordination;
pub mod pipeline;
pub mod taxonomy;
pub mod test;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::data::{
        canonical_id, harmonize, match_ids, normalize_rank_name, CountMatrix, DissimilarityMatrix,
        Grouping, Harmonized, IdOverlap, Metadata, TaxonomyTable, Variable, VariableType,
    };
    pub use crate::diversity::{
        alpha_diversity, alpha_diversity_with, bray_curtis, bray_curtis_matrix, rarefaction_curve,
        rarefaction_curves, AlphaMetric, AlphaTable, RarefactionConfig, RarefactionCurve,
    };
    pub use crate::error::{DivError, Result};
    pub use crate::ordination::{
        confidence_ellipse, group_ellipses, ordinate, Ellipse, Embedding, GroupEllipse, Nmds,
        Ordination, OrdinationConfig, OrdinationMethod, Pcoa,
    };
    pub use crate::pipeline::{
        run_analysis, AlphaTest, AnalysisConfig, AnalysisReport, AnalysisStep, AnalysisTables,
        StepFailure,
    };
    pub use crate::taxonomy::{
        aggregate_rank, aggregate_ranks, RankComposition, TaxonomicProfile, TaxonomyConfig,
    };
    pub use crate::test::{
        kruskal_wallis, one_way_anova, permanova, sanitize_labels, test_alpha_groups, test_groups,
        NotComputableReason, PermanovaConfig, TestMethod, TestOutcome, TestResult,
    };
}
