//! End-to-end analysis composition and execution.

mod runner;

pub use runner::{
    run_analysis, AlphaTest, AnalysisConfig, AnalysisReport, AnalysisStep, AnalysisTables,
    StepFailure,
};
