//! Group-significance tests on alpha diversity and dissimilarity matrices.

pub mod anova;

pub use anova::{kruskal_wallis, one_way_anova, test_alpha_groups, test_groups};
pub use outcome::{NotComputableReason, TestMethod, TestOutcome, TestResult};
pub use permanova::{permanova, sanitize_labels, PermanovaConfig};
