//! Error types for the composable-diversity library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum DivError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid count value '{value}' at row {row}, column {col}")]
    InvalidCount {
        value: String,
        row: usize,
        col: usize,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Missing column '{0}'")]
    MissingColumn(String),

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Sample '{0}' has zero total abundance")]
    EmptySample(String),

    #[error(
        "No identifiers shared between {left} and {right}; check that sample/feature names match"
    )]
    NoOverlap { left: String, right: String },

    #[error("Identifiers '{first}' and '{second}' in {table} collapse to the same canonical id '{canonical}'")]
    DuplicateId {
        table: String,
        first: String,
        second: String,
        canonical: String,
    },

    #[error("No feature identifiers shared between the abundance matrix and the taxonomy table")]
    RankJoinEmpty,

    #[error("Rank '{0}' has fewer than two distinct labels and carries no information")]
    NonInformativeRank(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, DivError>;
