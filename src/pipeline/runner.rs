//! Declarative analysis runner: one config in, one report out.

use crate::data::{harmonize, CountMatrix, Grouping, IdOverlap, Metadata, TaxonomyTable};
use crate::diversity::{
    alpha_diversity_with, bray_curtis_matrix, rarefaction_curves, AlphaMetric, AlphaTable,
    RarefactionConfig, RarefactionCurve,
};
use crate::error::{DivError, Result};
use crate::ordination::{group_ellipses, ordinate, Embedding, GroupEllipse, OrdinationConfig};
use crate::taxonomy::{aggregate_ranks, TaxonomicProfile, TaxonomyConfig};
use crate::test::{permanova, test_alpha_groups, PermanovaConfig, TestOutcome};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A step of the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisStep {
    /// Match sample IDs between abundance table and metadata.
    Harmonize,
    /// Resolve the grouping column.
    Grouping,
    /// Alpha diversity table.
    Alpha,
    /// ANOVA / Kruskal-Wallis per alpha metric.
    AlphaTests,
    /// Bray-Curtis dissimilarities.
    Beta,
    /// 2D embedding of the dissimilarities.
    Ordination,
    /// Group confidence ellipses on the embedding.
    Ellipses,
    /// PERMANOVA on the dissimilarities.
    Permanova,
    /// Rarefaction curves.
    Rarefaction,
    /// Rank-level relative abundance.
    Taxonomy,
}

impl AnalysisStep {
    /// Steps that can be switched on or off in a config, in execution order.
    pub fn all() -> Vec<AnalysisStep> {
        vec![
            AnalysisStep::Alpha,
            AnalysisStep::AlphaTests,
            AnalysisStep::Beta,
            AnalysisStep::Ordination,
            AnalysisStep::Ellipses,
            AnalysisStep::Permanova,
            AnalysisStep::Rarefaction,
            AnalysisStep::Taxonomy,
        ]
    }
}

impl fmt::Display for AnalysisStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

fn default_name() -> String {
    "unnamed".to_string()
}

/// Analysis configuration for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Name of the analysis.
    #[serde(default = "default_name")]
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Metadata column defining groups; the first usable column when absent.
    #[serde(default)]
    pub group_column: Option<String>,
    #[serde(default = "AlphaMetric::all")]
    pub alpha_metrics: Vec<AlphaMetric>,
    #[serde(default)]
    pub ordination: OrdinationConfig,
    #[serde(default)]
    pub permanova: PermanovaConfig,
    #[serde(default)]
    pub rarefaction: RarefactionConfig,
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
    /// Steps to execute.
    #[serde(default = "AnalysisStep::all")]
    pub steps: Vec<AnalysisStep>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            description: None,
            group_column: None,
            alpha_metrics: AlphaMetric::all(),
            ordination: OrdinationConfig::default(),
            permanova: PermanovaConfig::default(),
            rarefaction: RarefactionConfig::default(),
            taxonomy: TaxonomyConfig::default(),
            steps: AnalysisStep::all(),
        }
    }
}

impl AnalysisConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(DivError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(DivError::from)
    }

    /// Load from a YAML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn group_by(mut self, column: &str) -> Self {
        self.group_column = Some(column.to_string());
        self
    }

    pub fn with_alpha_metrics(mut self, metrics: Vec<AlphaMetric>) -> Self {
        self.alpha_metrics = metrics;
        self
    }

    pub fn with_ordination(mut self, ordination: OrdinationConfig) -> Self {
        self.ordination = ordination;
        self
    }

    pub fn with_permanova(mut self, permanova: PermanovaConfig) -> Self {
        self.permanova = permanova;
        self
    }

    pub fn with_rarefaction(mut self, rarefaction: RarefactionConfig) -> Self {
        self.rarefaction = rarefaction;
        self
    }

    pub fn with_taxonomy(mut self, taxonomy: TaxonomyConfig) -> Self {
        self.taxonomy = taxonomy;
        self
    }

    /// Restrict execution to the given steps.
    pub fn with_steps(mut self, steps: Vec<AnalysisStep>) -> Self {
        self.steps = steps;
        self
    }

    fn runs(&self, step: AnalysisStep) -> bool {
        self.steps.contains(&step)
    }
}

/// The three input tables of an analysis.
#[derive(Debug, Clone)]
pub struct AnalysisTables {
    pub counts: CountMatrix,
    pub metadata: Option<Metadata>,
    pub taxonomy: Option<TaxonomyTable>,
}

impl AnalysisTables {
    pub fn new(counts: CountMatrix) -> Self {
        Self {
            counts,
            metadata: None,
            taxonomy: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_taxonomy(mut self, taxonomy: TaxonomyTable) -> Self {
        self.taxonomy = Some(taxonomy);
        self
    }

    /// Load tables from delimited files.
    pub fn load<P: AsRef<Path>>(counts: P, metadata: Option<P>, taxonomy: Option<P>) -> Result<Self> {
        let mut tables = Self::new(CountMatrix::from_path(counts)?);
        if let Some(path) = metadata {
            tables.metadata = Some(Metadata::from_path(path)?);
        }
        if let Some(path) = taxonomy {
            tables.taxonomy = Some(TaxonomyTable::from_path(path)?);
        }
        Ok(tables)
    }
}

/// A step that failed; the remaining steps still ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step: AnalysisStep,
    /// Rank, metric or other detail the step was working on.
    pub target: Option<String>,
    pub message: String,
}

/// Group test of one alpha metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaTest {
    pub metric: AlphaMetric,
    pub outcome: TestOutcome,
}

/// Everything an analysis produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub name: String,
    pub n_samples: usize,
    pub n_features: usize,
    /// Abundance table vs. metadata sample matching.
    pub sample_overlap: Option<IdOverlap>,
    pub group_column: Option<String>,
    pub alpha: Option<AlphaTable>,
    pub alpha_tests: Vec<AlphaTest>,
    /// Samples left out of the dissimilarity matrix.
    pub beta_excluded: Vec<String>,
    pub embedding: Option<Embedding>,
    pub ellipses: Vec<GroupEllipse>,
    pub permanova: Option<TestOutcome>,
    pub rarefaction: Vec<RarefactionCurve>,
    pub taxonomy: Vec<TaxonomicProfile>,
    pub failures: Vec<StepFailure>,
}

impl AnalysisReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            n_samples: 0,
            n_features: 0,
            sample_overlap: None,
            group_column: None,
            alpha: None,
            alpha_tests: Vec::new(),
            beta_excluded: Vec::new(),
            embedding: None,
            ellipses: Vec::new(),
            permanova: None,
            rarefaction: Vec::new(),
            taxonomy: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Keep the value of a step, or record its failure.
    fn record<T>(&mut self, step: AnalysisStep, target: Option<&str>, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Step {} failed: {}", step, e);
                self.failures.push(StepFailure {
                    step,
                    target: target.map(String::from),
                    message: e.to_string(),
                });
                None
            }
        }
    }

    /// True when every step succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(DivError::from)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(DivError::from)
    }

    /// Write the report as pretty JSON.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Analysis: {}", self.name)?;
        writeln!(f, "Samples: {}, features: {}", self.n_samples, self.n_features)?;
        if let Some(column) = &self.group_column {
            writeln!(f, "Grouping: {}", column)?;
        }
        for test in &self.alpha_tests {
            writeln!(f, "  {}: {}", test.metric, test.outcome)?;
        }
        if let Some(embedding) = &self.embedding {
            write!(f, "Ordination: {}", embedding.method)?;
            if let Some(stress) = embedding.stress {
                write!(f, " (stress {:.4})", stress)?;
            }
            writeln!(f)?;
        }
        if let Some(outcome) = &self.permanova {
            writeln!(f, "  {}", outcome)?;
        }
        if !self.rarefaction.is_empty() {
            writeln!(f, "Rarefaction curves: {}", self.rarefaction.len())?;
        }
        for profile in &self.taxonomy {
            writeln!(f, "Taxonomy: {} ({} labels)", profile.rank, profile.taxa.len())?;
        }
        for failure in &self.failures {
            match &failure.target {
                Some(target) => writeln!(f, "FAILED {} [{}]: {}", failure.step, target, failure.message)?,
                None => writeln!(f, "FAILED {}: {}", failure.step, failure.message)?,
            }
        }
        Ok(())
    }
}

/// Resolve the grouping column: the configured one, or the first usable metadata column.
fn resolve_group_column(metadata: &Metadata, configured: Option<&str>) -> Result<Option<String>> {
    match configured {
        Some(column) if metadata.has_column(column) => Ok(Some(column.to_string())),
        Some(column) => Err(DivError::MissingColumn(column.to_string())),
        None => Ok(metadata.grouping_columns().into_iter().next()),
    }
}

/// Run every configured step, isolating failures.
pub fn run_analysis(tables: &AnalysisTables, config: &AnalysisConfig) -> AnalysisReport {
    let mut report = AnalysisReport::new(&config.name);
    info!("Running analysis '{}'", config.name);

    // Align metadata to the abundance table when both are present
    let (counts, metadata) = match &tables.metadata {
        Some(metadata) => match report.record(AnalysisStep::Harmonize, None, harmonize(&tables.counts, metadata)) {
            Some(h) => {
                report.sample_overlap = Some(h.samples);
                (h.counts, Some(h.metadata))
            }
            None => (tables.counts.clone(), None),
        },
        None => (tables.counts.clone(), None),
    };
    report.n_samples = counts.n_samples();
    report.n_features = counts.n_features();

    let group_column = match &metadata {
        Some(m) => report
            .record(
                AnalysisStep::Grouping,
                config.group_column.as_deref(),
                resolve_group_column(m, config.group_column.as_deref()),
            )
            .flatten(),
        None => None,
    };
    if metadata.is_some() && group_column.is_none() {
        info!("No grouping column available; group statistics skipped");
    }
    report.group_column = group_column.clone();
    let grouped = metadata.as_ref().zip(group_column.as_deref());

    if config.runs(AnalysisStep::Alpha) {
        let alpha = alpha_diversity_with(&counts, &config.alpha_metrics);
        if config.runs(AnalysisStep::AlphaTests) {
            if let Some((metadata, column)) = grouped {
                for &metric in &alpha.metrics {
                    let result = test_alpha_groups(&alpha, metadata, column, metric);
                    if let Some(outcome) = report.record(AnalysisStep::AlphaTests, Some(metric.name()), result) {
                        report.alpha_tests.push(AlphaTest { metric, outcome });
                    }
                }
            }
        }
        report.alpha = Some(alpha);
    }

    if config.runs(AnalysisStep::Beta) {
        if let Some(dm) = report.record(AnalysisStep::Beta, None, bray_curtis_matrix(&counts)) {
            report.beta_excluded = dm.excluded_samples().to_vec();

            let grouping: Option<Grouping> = match grouped {
                Some((metadata, column)) => report.record(
                    AnalysisStep::Grouping,
                    Some(column),
                    metadata.grouping(column, dm.ids()),
                ),
                None => None,
            };

            if config.runs(AnalysisStep::Ordination) {
                let embedding = report.record(AnalysisStep::Ordination, None, ordinate(&dm, &config.ordination));
                if let (Some(embedding), Some(grouping)) = (&embedding, &grouping) {
                    if config.runs(AnalysisStep::Ellipses) {
                        report.ellipses = group_ellipses(embedding, grouping);
                    }
                }
                report.embedding = embedding;
            }

            if config.runs(AnalysisStep::Permanova) {
                if let Some(grouping) = &grouping {
                    report.permanova =
                        report.record(AnalysisStep::Permanova, None, permanova(&dm, grouping, &config.permanova));
                }
            }
        }
    }

    if config.runs(AnalysisStep::Rarefaction) {
        if let Some(curves) = report.record(
            AnalysisStep::Rarefaction,
            None,
            rarefaction_curves(&counts, &config.rarefaction),
        ) {
            report.rarefaction = curves;
        }
    }

    if config.runs(AnalysisStep::Taxonomy) {
        if let Some(taxonomy) = &tables.taxonomy {
            for (rank, result) in aggregate_ranks(&counts, taxonomy, &config.taxonomy) {
                if let Some(profile) = report.record(AnalysisStep::Taxonomy, Some(rank.as_str()), result) {
                    if !profile.has_data() {
                        warn!("No sample has data at rank {}", profile.rank);
                    }
                    report.taxonomy.push(profile);
                }
            }
        }
    }

    info!(
        "Analysis '{}' finished with {} failed step(s)",
        config.name,
        report.failures.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ordination::OrdinationMethod;

    fn create_test_counts() -> CountMatrix {
        // 6 features × 8 samples; treatment samples shift abundance to features 3-5
        let rows: Vec<Vec<f64>> = (0..6)
            .map(|feat| {
                (0..8)
                    .map(|sample| {
                        let treated = sample % 2 == 1;
                        let base = if (feat < 3) != treated { 40.0 } else { 5.0 };
                        base + (sample * (feat + 1) % 7) as f64
                    })
                    .collect()
            })
            .collect();
        CountMatrix::from_rows(
            &rows,
            (0..6).map(|i| format!("otu{}", i)).collect(),
            (0..8).map(|i| format!("S{}", i)).collect(),
        )
        .unwrap()
    }

    fn create_test_metadata() -> Metadata {
        Metadata::from_records(
            vec!["group".into(), "subject".into()],
            (0..8)
                .map(|i| {
                    let group = if i % 2 == 0 { "control" } else { "treatment" };
                    (format!("s{}", i), vec![group.to_string(), format!("P{}", i)])
                })
                .collect(),
        )
        .unwrap()
    }

    fn create_test_taxonomy() -> TaxonomyTable {
        TaxonomyTable::new(
            vec!["Phylum".into(), "Genus".into()],
            (0..6)
                .map(|i| {
                    let phylum = if i < 3 { "Firmicutes" } else { "Bacteroidetes" };
                    (format!("otu{}", i), vec![phylum.to_string(), format!("G{}", i)])
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_full_analysis() {
        let tables = AnalysisTables::new(create_test_counts())
            .with_metadata(create_test_metadata())
            .with_taxonomy(create_test_taxonomy());
        let config = AnalysisConfig::default()
            .name("test")
            .with_permanova(PermanovaConfig::quick())
            .with_ordination(OrdinationConfig::pcoa());

        let report = run_analysis(&tables, &config);

        assert!(report.is_complete(), "{:?}", report.failures);
        assert_eq!(report.n_samples, 8);
        // subject is unique per sample, so group is picked
        assert_eq!(report.group_column.as_deref(), Some("group"));
        assert_eq!(report.alpha_tests.len(), 4);
        assert_eq!(report.embedding.as_ref().unwrap().method, OrdinationMethod::Pcoa);
        assert_eq!(report.ellipses.len(), 2);
        assert!(report.permanova.as_ref().unwrap().is_computed());
        assert_eq!(report.rarefaction.len(), 8);
        assert_eq!(report.taxonomy.len(), 2);
    }

    #[test]
    fn test_failures_are_isolated() {
        let tables = AnalysisTables::new(create_test_counts())
            .with_metadata(create_test_metadata())
            .with_taxonomy(create_test_taxonomy());
        let config = AnalysisConfig::default()
            .group_by("missing_column")
            .with_taxonomy(TaxonomyConfig::default().with_ranks(vec!["Species".into()]))
            .with_steps(vec![AnalysisStep::Alpha, AnalysisStep::Rarefaction, AnalysisStep::Taxonomy]);

        let report = run_analysis(&tables, &config);

        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].step, AnalysisStep::Grouping);
        assert_eq!(report.failures[1].step, AnalysisStep::Taxonomy);
        assert_eq!(report.failures[1].target.as_deref(), Some("Species"));
        assert!(report.alpha.is_some());
        assert_eq!(report.rarefaction.len(), 8);
        assert!(report.embedding.is_none());
    }

    #[test]
    fn test_without_metadata() {
        let tables = AnalysisTables::new(create_test_counts());
        let config = AnalysisConfig::default().with_ordination(OrdinationConfig::pcoa());
        let report = run_analysis(&tables, &config);

        assert!(report.is_complete());
        assert!(report.group_column.is_none());
        assert!(report.permanova.is_none());
        assert!(report.embedding.is_some());
    }

    #[test]
    fn test_config_yaml() {
        let yaml = r#"
name: gut-survey
group_column: treatment
alpha_metrics: [Observed, Shannon]
ordination: { method: Pcoa }
permanova: { permutations: 199 }
taxonomy: { ranks: [Phylum], top_n: 5 }
"#;
        let config = AnalysisConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.name, "gut-survey");
        assert_eq!(config.alpha_metrics, vec![AlphaMetric::Observed, AlphaMetric::Shannon]);
        assert_eq!(config.ordination.method, OrdinationMethod::Pcoa);
        assert_eq!(config.permanova.permutations, 199);
        assert_eq!(config.permanova.seed, 42);
        assert_eq!(config.rarefaction, RarefactionConfig::default());
        assert_eq!(config.steps, AnalysisStep::all());

        let parsed = AnalysisConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_report_serializes() {
        let tables = AnalysisTables::new(create_test_counts()).with_metadata(create_test_metadata());
        let config = AnalysisConfig::default()
            .with_permanova(PermanovaConfig::quick())
            .with_steps(vec![AnalysisStep::Alpha, AnalysisStep::Beta, AnalysisStep::Permanova]);
        let report = run_analysis(&tables, &config);

        let json = report.to_json().unwrap();
        assert!(json.contains("\"permanova\""));
        assert!(json.contains("Permanova"));
        assert!(report.to_string().contains("Analysis: unnamed"));
    }
}
