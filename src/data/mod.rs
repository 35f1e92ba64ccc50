//! Input tables and the shapes shared by every engine.

mod count_matrix;
mod delimited;
mod dissimilarity;
mod grouping;
pub mod identity;
mod metadata;
mod taxonomy;

pub use count_matrix::CountMatrix;
pub use dissimilarity::DissimilarityMatrix;
pub use grouping::Grouping;
pub use identity::{canonical_id, harmonize, match_ids, Harmonized, IdOverlap};
pub use metadata::{Metadata, Variable, VariableType};
pub use taxonomy::{normalize_rank_name, TaxonomyTable};
