//! cdiv - microbiome diversity CLI
//!
//! Command-line interface for composable diversity analysis.

use clap::{Parser, Subcommand, ValueEnum};
use composable_diversity::data::{harmonize, CountMatrix, Metadata, TaxonomyTable};
use composable_diversity::diversity::{
    alpha_diversity_with, bray_curtis_matrix, rarefaction::write_curves_tsv, rarefaction_curves,
    AlphaMetric, RarefactionConfig,
};
use composable_diversity::error::{DivError, Result};
use composable_diversity::ordination::{ordinate, OrdinationConfig, OrdinationMethod};
use composable_diversity::pipeline::{run_analysis, AnalysisConfig, AnalysisTables};
use composable_diversity::taxonomy::{aggregate_ranks, TaxonomyConfig};
use composable_diversity::test::{permanova, PermanovaConfig};
use std::path::{Path, PathBuf};

/// CLI-friendly ordination method
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliOrdination {
    /// Non-metric multidimensional scaling
    Nmds,
    /// Principal coordinates analysis
    Pcoa,
}

impl From<CliOrdination> for OrdinationMethod {
    fn from(method: CliOrdination) -> Self {
        match method {
            CliOrdination::Nmds => OrdinationMethod::Nmds,
            CliOrdination::Pcoa => OrdinationMethod::Pcoa,
        }
    }
}

/// Composable microbiome diversity analysis
#[derive(Parser)]
#[command(name = "cdiv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Abundance tables store samples as rows instead of columns
    #[arg(long, global = true)]
    samples_as_rows: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute alpha diversity per sample
    Alpha {
        /// Path to abundance table (TSV or CSV)
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Comma-separated metrics (observed, shannon, simpson, chao1)
        #[arg(long, default_value = "observed,shannon,simpson,chao1")]
        metrics: String,

        /// Output path for the alpha diversity TSV
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Bray-Curtis dissimilarities, ordination and PERMANOVA
    Beta {
        /// Path to abundance table
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Output path for the dissimilarity matrix TSV
        #[arg(short, long)]
        output: PathBuf,

        /// Output path for ordination coordinates
        #[arg(long)]
        coordinates: Option<PathBuf>,

        /// Ordination method
        #[arg(long, value_enum, default_value = "nmds")]
        method: CliOrdination,

        /// Path to metadata table (enables PERMANOVA)
        #[arg(short, long)]
        metadata: Option<PathBuf>,

        /// Grouping column for PERMANOVA
        #[arg(short, long)]
        group: Option<String>,

        /// Number of permutations (default: 999)
        #[arg(long, default_value = "999")]
        permutations: usize,

        /// Random seed (default: 42)
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Rarefaction curves per sample
    Rarefy {
        /// Path to abundance table
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Output path for curves TSV (long format)
        #[arg(short, long)]
        output: PathBuf,

        /// Number of depths per curve (default: 10)
        #[arg(long, default_value = "10")]
        steps: usize,

        /// Subsampling repeats per depth (default: 10)
        #[arg(long, default_value = "10")]
        repeats: usize,

        /// Random seed (default: 42)
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Relative abundance per taxonomic rank
    Taxa {
        /// Path to abundance table
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Path to taxonomy table
        #[arg(short, long)]
        taxonomy: PathBuf,

        /// Ranks to aggregate (comma-separated); all informative ranks if omitted
        #[arg(short, long)]
        ranks: Option<String>,

        /// Number of labels kept per rank (default: 10)
        #[arg(long, default_value = "10")]
        top_n: usize,

        /// Output directory, one TSV per rank
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Run the full analysis, optionally from a YAML configuration file
    Run {
        /// Path to analysis configuration YAML
        #[arg(long)]
        config: Option<PathBuf>,

        /// Path to abundance table
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Path to metadata table
        #[arg(short, long)]
        metadata: Option<PathBuf>,

        /// Path to taxonomy table
        #[arg(short, long)]
        taxonomy: Option<PathBuf>,

        /// Output path for the report
        #[arg(short, long)]
        output: PathBuf,

        /// Output format: json or yaml
        #[arg(short, long, default_value = "json")]
        format: String,
    },

    /// Write an example analysis configuration
    Example {
        /// Output path for example YAML
        #[arg(short, long, default_value = "analysis.yaml")]
        output: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let transpose = cli.samples_as_rows;

    let result = match cli.command {
        Commands::Alpha {
            counts,
            metrics,
            output,
        } => cmd_alpha(&counts, transpose, &metrics, &output),

        Commands::Beta {
            counts,
            output,
            coordinates,
            method,
            metadata,
            group,
            permutations,
            seed,
        } => cmd_beta(
            &counts,
            transpose,
            &output,
            coordinates.as_deref(),
            method,
            metadata.as_deref(),
            group.as_deref(),
            permutations,
            seed,
        ),

        Commands::Rarefy {
            counts,
            output,
            steps,
            repeats,
            seed,
        } => cmd_rarefy(&counts, transpose, &output, steps, repeats, seed),

        Commands::Taxa {
            counts,
            taxonomy,
            ranks,
            top_n,
            output,
        } => cmd_taxa(&counts, transpose, &taxonomy, ranks.as_deref(), top_n, &output),

        Commands::Run {
            config,
            counts,
            metadata,
            taxonomy,
            output,
            format,
        } => cmd_run(
            config.as_deref(),
            &counts,
            transpose,
            metadata.as_deref(),
            taxonomy.as_deref(),
            &output,
            &format,
        ),

        Commands::Example { output } => cmd_example(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_counts(path: &Path, transpose: bool) -> Result<CountMatrix> {
    eprintln!("Loading abundance table from {:?}...", path);
    let counts = CountMatrix::from_path(path)?;
    let counts = if transpose { counts.transposed() } else { counts };
    eprintln!(
        "Loaded {} features x {} samples",
        counts.n_features(),
        counts.n_samples()
    );
    Ok(counts)
}

fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Compute alpha diversity
fn cmd_alpha(counts_path: &Path, transpose: bool, metrics: &str, output_path: &Path) -> Result<()> {
    let counts = load_counts(counts_path, transpose)?;
    let metrics: Vec<AlphaMetric> = parse_list(metrics)
        .iter()
        .map(|m| m.parse())
        .collect::<Result<_>>()?;

    let alpha = alpha_diversity_with(&counts, &metrics);
    eprintln!("Writing alpha diversity to {:?}...", output_path);
    alpha.to_tsv(output_path)?;

    eprintln!("Done! {} samples", alpha.n_samples());
    if !alpha.empty_samples.is_empty() {
        eprintln!("  {} samples without reads: {:?}", alpha.empty_samples.len(), alpha.empty_samples);
    }
    Ok(())
}

/// Dissimilarities, ordination and PERMANOVA
#[allow(clippy::too_many_arguments)]
fn cmd_beta(
    counts_path: &Path,
    transpose: bool,
    output_path: &Path,
    coordinates_path: Option<&Path>,
    method: CliOrdination,
    metadata_path: Option<&Path>,
    group: Option<&str>,
    permutations: usize,
    seed: u64,
) -> Result<()> {
    let counts = load_counts(counts_path, transpose)?;

    let (counts, metadata) = match metadata_path {
        Some(path) => {
            let metadata = Metadata::from_path(path)?;
            let harmonized = harmonize(&counts, &metadata)?;
            let samples = &harmonized.samples;
            eprintln!(
                "Matched {} samples between abundance table and metadata",
                samples.shared.len()
            );
            if !samples.only_in_left.is_empty() {
                eprintln!("  Only in abundance table: {:?}", samples.only_in_left);
            }
            if !samples.only_in_right.is_empty() {
                eprintln!("  Only in metadata: {:?}", samples.only_in_right);
            }
            (harmonized.counts, Some(harmonized.metadata))
        }
        None => (counts, None),
    };

    eprintln!("Computing Bray-Curtis dissimilarities...");
    let dm = bray_curtis_matrix(&counts)?;
    dm.to_tsv(output_path)?;
    eprintln!("Wrote {} x {} matrix to {:?}", dm.len(), dm.len(), output_path);
    if !dm.excluded_samples().is_empty() {
        eprintln!("  Excluded empty samples: {:?}", dm.excluded_samples());
    }

    if let Some(path) = coordinates_path {
        let config = OrdinationConfig::default()
            .with_method(method.into())
            .with_seed(seed);
        let embedding = ordinate(&dm, &config)?;
        embedding.to_tsv(path)?;
        match embedding.stress {
            Some(stress) => eprintln!("{} stress: {:.4}", embedding.method, stress),
            None => eprintln!("{} coordinates written", embedding.method),
        }
        for note in &embedding.notes {
            eprintln!("  Note: {}", note);
        }
    }

    if let Some(metadata) = metadata {
        let column = match group {
            Some(g) => g.to_string(),
            None => metadata
                .grouping_columns()
                .into_iter()
                .next()
                .ok_or_else(|| DivError::MissingColumn("grouping column".to_string()))?,
        };
        let grouping = metadata.grouping(&column, dm.ids())?;
        let config = PermanovaConfig::default()
            .with_permutations(permutations)
            .with_seed(seed);
        let outcome = permanova(&dm, &grouping, &config)?;
        println!("PERMANOVA by '{}': {}", column, outcome);
    }

    Ok(())
}

/// Rarefaction curves
fn cmd_rarefy(
    counts_path: &Path,
    transpose: bool,
    output_path: &Path,
    steps: usize,
    repeats: usize,
    seed: u64,
) -> Result<()> {
    let counts = load_counts(counts_path, transpose)?;
    let config = RarefactionConfig::default()
        .with_steps(steps)
        .with_repeats(repeats)
        .with_seed(seed);

    eprintln!("Rarefying {} samples...", counts.n_samples());
    let curves = rarefaction_curves(&counts, &config)?;
    write_curves_tsv(&curves, output_path)?;
    eprintln!("Done! {} curves written to {:?}", curves.len(), output_path);
    Ok(())
}

/// Rank-level relative abundance
fn cmd_taxa(
    counts_path: &Path,
    transpose: bool,
    taxonomy_path: &Path,
    ranks: Option<&str>,
    top_n: usize,
    output_dir: &Path,
) -> Result<()> {
    let counts = load_counts(counts_path, transpose)?;
    let taxonomy = TaxonomyTable::from_path(taxonomy_path)?;
    let config = TaxonomyConfig::default()
        .with_ranks(ranks.map(parse_list).unwrap_or_default())
        .with_top_n(top_n);

    std::fs::create_dir_all(output_dir)?;
    let mut n_failed = 0;
    for (rank, result) in aggregate_ranks(&counts, &taxonomy, &config) {
        match result {
            Ok(profile) => {
                let path = output_dir.join(format!("{}.tsv", profile.rank.to_lowercase()));
                profile.to_tsv(&path)?;
                eprintln!("{}", profile);
                eprintln!("  Written to {:?}", path);
            }
            Err(e) => {
                n_failed += 1;
                eprintln!("Rank {}: {}", rank, e);
            }
        }
    }
    if n_failed > 0 {
        eprintln!("{} rank(s) could not be aggregated", n_failed);
    }
    Ok(())
}

/// Run the full analysis
fn cmd_run(
    config_path: Option<&Path>,
    counts_path: &Path,
    transpose: bool,
    metadata_path: Option<&Path>,
    taxonomy_path: Option<&Path>,
    output_path: &Path,
    format: &str,
) -> Result<()> {
    let config = match config_path {
        Some(path) => {
            eprintln!("Loading analysis configuration from {:?}...", path);
            AnalysisConfig::from_path(path)?
        }
        None => AnalysisConfig::default(),
    };

    let mut tables = AnalysisTables::new(load_counts(counts_path, transpose)?);
    if let Some(path) = metadata_path {
        tables = tables.with_metadata(Metadata::from_path(path)?);
    }
    if let Some(path) = taxonomy_path {
        tables = tables.with_taxonomy(TaxonomyTable::from_path(path)?);
    }

    eprintln!("Running analysis '{}'...", config.name);
    let report = run_analysis(&tables, &config);

    let text = match format {
        "yaml" => report.to_yaml()?,
        "json" => report.to_json()?,
        other => {
            return Err(DivError::InvalidParameter(format!(
                "Unknown format '{}'. Use json or yaml.",
                other
            )))
        }
    };
    std::fs::write(output_path, text)?;
    eprintln!("Wrote report to {:?}", output_path);
    eprintln!();
    eprint!("{}", report);

    Ok(())
}

/// Write an example configuration
fn cmd_example(output_path: &Path) -> Result<()> {
    let mut config = AnalysisConfig::default()
        .name("example-survey")
        .group_by("treatment")
        .with_permanova(PermanovaConfig::default())
        .with_taxonomy(
            TaxonomyConfig::default()
                .with_ranks(vec!["Phylum".to_string(), "Genus".to_string()])
                .with_top_n(10),
        );
    config.description = Some("Alpha/beta diversity, NMDS and taxonomy by treatment".to_string());
    let yaml = config.to_yaml()?;

    std::fs::write(output_path, &yaml)?;
    eprintln!("Wrote example configuration to {:?}", output_path);
    eprintln!();
    eprintln!("Contents:");
    println!("{}", yaml);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn counts_file() -> NamedTempFile {
        write_file(&[
            "feature_id\tS1\tS2\tS3\tS4",
            "otu1\t10\t12\t1\t2",
            "otu2\t1\t2\t11\t9",
            "otu3\t5\t4\t6\t5",
        ])
    }

    #[test]
    fn test_beta_rejects_disjoint_metadata() {
        let counts = counts_file();
        let metadata = write_file(&["sample_id\tgroup", "X1\ta", "X2\ta", "X3\tb", "X4\tb"]);
        let output = NamedTempFile::new().unwrap();

        let result = cmd_beta(
            counts.path(),
            false,
            output.path(),
            None,
            CliOrdination::Pcoa,
            Some(metadata.path()),
            None,
            99,
            1,
        );
        assert!(matches!(result, Err(DivError::NoOverlap { .. })));
    }

    #[test]
    fn test_beta_restricts_to_shared_samples() {
        let counts = counts_file();
        let metadata = write_file(&["sample_id\tgroup", "s1\ta", "s2\ta", "s3\tb", "extra\tb"]);
        let output = NamedTempFile::new().unwrap();

        cmd_beta(
            counts.path(),
            false,
            output.path(),
            None,
            CliOrdination::Pcoa,
            Some(metadata.path()),
            Some("group"),
            99,
            1,
        )
        .unwrap();

        let written = std::fs::read_to_string(output.path()).unwrap();
        let header = written.lines().next().unwrap();
        assert_eq!(header.split('\t').count(), 4);
        assert!(!header.contains("S4"));
    }
}
