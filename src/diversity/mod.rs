//! Diversity estimators: per-sample (alpha), between-sample (beta) and
//! depth-dependent (rarefaction).

pub mod alpha;
pub mod beta;
pub mod rarefaction;

pub use alpha::{alpha_diversity, alpha_diversity_with, AlphaMetric, AlphaTable};
pub use beta::{bray_curtis, bray_curtis_matrix};
pub use rarefaction::{rarefaction_curve, rarefaction_curves, RarefactionConfig, RarefactionCurve};
