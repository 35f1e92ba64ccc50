//! Basic example demonstrating a diversity analysis.
//!
//! This example shows how to:
//! 1. Create synthetic data
//! 2. Compute alpha and beta diversity
//! 3. Ordinate and test group differences
//! 4. Run the whole analysis from one configuration

use composable_diversity::prelude::*;
use sprs::TriMat;

fn main() -> Result<()> {
    println!("=== Composable Diversity Example ===\n");

    let (counts, metadata, taxonomy) = create_example_data()?;

    println!("Data dimensions:");
    println!("  Features: {}", counts.n_features());
    println!("  Samples:  {}", counts.n_samples());
    println!();

    // Alpha diversity
    println!("=== Alpha Diversity ===\n");
    let alpha = alpha_diversity(&counts);
    println!(
        "{:<10} {:>9} {:>9} {:>9} {:>9}",
        "Sample", "Observed", "Shannon", "Simpson", "Chao1"
    );
    println!("{}", "-".repeat(50));
    for (sid, values) in alpha.sample_ids.iter().zip(&alpha.values).take(6) {
        println!(
            "{:<10} {:>9.0} {:>9.3} {:>9.3} {:>9.1}",
            sid, values[0], values[1], values[2], values[3]
        );
    }
    println!();

    for metric in AlphaMetric::all() {
        let outcome = test_alpha_groups(&alpha, &metadata, "diet", metric)?;
        println!("{} by diet: {}", metric, outcome);
    }
    println!();

    // Beta diversity and ordination
    println!("=== Beta Diversity ===\n");
    let dm = bray_curtis_matrix(&counts)?;
    println!("Mean Bray-Curtis: {:.3}", mean_off_diagonal(&dm));

    let embedding = ordinate(&dm, &OrdinationConfig::default())?;
    if let Some(stress) = embedding.stress {
        println!("NMDS stress: {:.4}", stress);
    }

    let grouping = metadata.grouping("diet", dm.ids())?;
    for group in group_ellipses(&embedding, &grouping) {
        match group.ellipse {
            Some(e) => println!(
                "  {} (n={}): center ({:.3}, {:.3}), {:.3} x {:.3}",
                group.group, group.n_points, e.center.0, e.center.1, e.width, e.height
            ),
            None => println!("  {} (n={}): too few points for an ellipse", group.group, group.n_points),
        }
    }

    let outcome = permanova(&dm, &grouping, &PermanovaConfig::default())?;
    println!("{}", outcome);
    println!();

    // Everything at once
    println!("=== Full Analysis ===\n");
    let tables = AnalysisTables::new(counts)
        .with_metadata(metadata)
        .with_taxonomy(taxonomy);
    let config = AnalysisConfig::default()
        .name("example")
        .group_by("diet")
        .with_taxonomy(TaxonomyConfig::default().with_top_n(3));
    let report = run_analysis(&tables, &config);
    println!("{}", report);

    for profile in &report.taxonomy {
        println!("{}", profile);
    }

    Ok(())
}

fn mean_off_diagonal(dm: &DissimilarityMatrix) -> f64 {
    let n = dm.len();
    let mut sum = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            sum += dm.get(i, j);
        }
    }
    sum / (n * (n - 1) / 2) as f64
}

/// Synthetic data: 12 features, 16 samples on two diets.
fn create_example_data() -> Result<(CountMatrix, Metadata, TaxonomyTable)> {
    let n_features = 12;
    let n_samples = 16;
    let mut tri_mat = TriMat::new((n_features, n_samples));

    let mut seed = 42u64;
    let mut next_rand = || {
        seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
        ((seed >> 16) & 0x7FFF) as f64 / 32768.0
    };

    for feat in 0..n_features {
        for sample in 0..n_samples {
            let fiber = sample >= n_samples / 2;
            let base = match feat {
                0..=3 => if fiber { 120.0 } else { 20.0 },
                4..=7 => if fiber { 15.0 } else { 90.0 },
                _ => 40.0,
            };
            // Rare taxa drop out in some samples
            if feat >= 10 && next_rand() < 0.4 {
                continue;
            }
            let count = (base * (0.6 + 0.8 * next_rand())).round();
            if count > 0.0 {
                tri_mat.add_triplet(feat, sample, count);
            }
        }
    }

    let feature_ids: Vec<String> = (0..n_features).map(|i| format!("ASV{}", i + 1)).collect();
    let sample_ids: Vec<String> = (0..n_samples).map(|i| format!("S{:02}", i + 1)).collect();
    let counts = CountMatrix::new(tri_mat.to_csr(), feature_ids.clone(), sample_ids.clone())?;

    let records = sample_ids
        .iter()
        .enumerate()
        .map(|(i, sid)| {
            let diet = if i >= n_samples / 2 { "fiber" } else { "western" };
            (sid.clone(), vec![diet.to_string(), format!("{}", 20 + i * 3)])
        })
        .collect();
    let metadata = Metadata::from_records(vec!["diet".into(), "age".into()], records)?;

    let lineages = [
        ("Firmicutes", "Faecalibacterium"),
        ("Firmicutes", "Roseburia"),
        ("Firmicutes", "Ruminococcus"),
        ("Firmicutes", "Eubacterium"),
        ("Bacteroidetes", "Bacteroides"),
        ("Bacteroidetes", "Bacteroides"),
        ("Bacteroidetes", "Alistipes"),
        ("Proteobacteria", "Escherichia"),
        ("Actinobacteria", "Bifidobacterium"),
        ("Actinobacteria", "Collinsella"),
        ("Verrucomicrobia", "Akkermansia"),
        ("Firmicutes", "NA"),
    ];
    let rows = feature_ids
        .into_iter()
        .zip(lineages.iter())
        .map(|(id, (phylum, genus))| (id, vec![phylum.to_string(), genus.to_string()]))
        .collect();
    let taxonomy = TaxonomyTable::new(vec!["Phylum".into(), "Genus".into()], rows)?;

    Ok((counts, metadata, taxonomy))
}
