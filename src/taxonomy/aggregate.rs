//! Roll feature counts up to a taxonomic rank.

use super::{RankComposition, TaxonomicProfile, TaxonomyConfig};
use crate::data::{CountMatrix, TaxonomyTable};
use crate::error::{DivError, Result};
use log::{info, warn};
use std::collections::HashMap;

/// Aggregate counts at `rank`, keep the `top_n` most abundant labels and pool the rest.
///
/// Feature IDs of both tables are canonicalized before joining. Features with
/// no taxonomy entry or no label at the rank are left out.
pub fn aggregate_rank(
    counts: &CountMatrix,
    taxonomy: &TaxonomyTable,
    rank: &str,
    config: &TaxonomyConfig,
) -> Result<TaxonomicProfile> {
    let counts = counts.clone().canonicalize_ids()?;
    let taxonomy = taxonomy.clone().canonicalize_ids()?;

    let matched: Vec<(usize, &String)> = counts
        .feature_ids()
        .iter()
        .enumerate()
        .filter(|(_, fid)| taxonomy.contains(fid))
        .collect();
    if matched.is_empty() {
        return Err(DivError::RankJoinEmpty);
    }
    let unmatched = counts.n_features() - matched.len();
    if unmatched > 0 {
        warn!(
            "{} of {} features have no taxonomy entry",
            unmatched,
            counts.n_features()
        );
    }

    let rank_index = taxonomy
        .rank_index(rank)
        .ok_or_else(|| DivError::MissingColumn(rank.to_string()))?;
    let rank = taxonomy.ranks()[rank_index].clone();
    if !taxonomy.is_informative(&rank)? {
        return Err(DivError::NonInformativeRank(rank));
    }

    // label -> per-sample sums
    let n_samples = counts.n_samples();
    let mut sums: HashMap<String, Vec<f64>> = HashMap::new();
    let mut unlabeled = 0usize;
    for (row, fid) in &matched {
        let Some(label) = taxonomy.label(fid, &rank) else {
            unlabeled += 1;
            continue;
        };
        let entry = sums
            .entry(label.to_string())
            .or_insert_with(|| vec![0.0; n_samples]);
        if let Some(row_vec) = counts.data().outer_view(*row) {
            for (col, &val) in row_vec.iter() {
                entry[col] += val;
            }
        }
    }

    let mut ranked: Vec<(String, Vec<f64>)> = sums.into_iter().collect();
    ranked.sort_by(|(la, a), (lb, b)| {
        let (ta, tb): (f64, f64) = (a.iter().sum(), b.iter().sum());
        tb.partial_cmp(&ta)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| la.cmp(lb))
    });

    let rest = if ranked.len() > config.top_n {
        ranked.split_off(config.top_n)
    } else {
        Vec::new()
    };
    let mut taxa: Vec<String> = ranked.iter().map(|(l, _)| l.clone()).collect();
    let mut columns: Vec<Vec<f64>> = ranked.into_iter().map(|(_, v)| v).collect();
    let n_pooled = rest.len();
    if !rest.is_empty() {
        let other_label = pooled_label(&config.other_label, &taxa, &rest);
        let mut other = vec![0.0; n_samples];
        for (_, values) in &rest {
            for (o, v) in other.iter_mut().zip(values) {
                *o += v;
            }
        }
        taxa.push(other_label);
        columns.push(other);
    }

    let compositions = (0..n_samples)
        .map(|s| {
            let total: f64 = columns.iter().map(|c| c[s]).sum();
            if total > 0.0 {
                RankComposition::Percentages(columns.iter().map(|c| c[s] / total * 100.0).collect())
            } else {
                RankComposition::NoData
            }
        })
        .collect();

    info!(
        "Aggregated {} features into {} {} labels ({} pooled)",
        matched.len() - unlabeled,
        taxa.len(),
        rank,
        n_pooled
    );

    Ok(TaxonomicProfile {
        rank,
        sample_ids: counts.sample_ids().to_vec(),
        taxa,
        compositions,
        unmatched_features: unmatched,
        unlabeled_features: unlabeled,
        pooled_labels: n_pooled,
    })
}

/// Label of the pooled bucket, renamed when it collides with a real label.
fn pooled_label(other_label: &str, kept: &[String], rest: &[(String, Vec<f64>)]) -> String {
    let collides = kept.iter().any(|l| l == other_label) || rest.iter().any(|(l, _)| l == other_label);
    if collides {
        format!("{} (pooled)", other_label)
    } else {
        other_label.to_string()
    }
}

/// Aggregate every configured rank, or every informative rank when none is configured.
///
/// Each rank is attempted independently.
pub fn aggregate_ranks(
    counts: &CountMatrix,
    taxonomy: &TaxonomyTable,
    config: &TaxonomyConfig,
) -> Vec<(String, Result<TaxonomicProfile>)> {
    let ranks = if config.ranks.is_empty() {
        taxonomy.informative_ranks()
    } else {
        config.ranks.clone()
    };
    ranks
        .into_iter()
        .map(|rank| {
            let profile = aggregate_rank(counts, taxonomy, &rank, config);
            (rank, profile)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn taxonomy(rows: &[(&str, &str, &str)]) -> TaxonomyTable {
        TaxonomyTable::new(
            vec!["Phylum".into(), "Genus".into()],
            rows.iter()
                .map(|(id, p, g)| (id.to_string(), vec![p.to_string(), g.to_string()]))
                .collect(),
        )
        .unwrap()
    }

    fn counts(rows: &[(&str, &[f64])], samples: &[&str]) -> CountMatrix {
        CountMatrix::from_rows(
            &rows.iter().map(|(_, v)| v.to_vec()).collect::<Vec<_>>(),
            rows.iter().map(|(id, _)| id.to_string()).collect(),
            samples.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_sum_by_label_and_percentages() {
        let c = counts(
            &[("otu1", &[10.0, 0.0]), ("otu2", &[30.0, 0.0]), ("otu3", &[60.0, 0.0])],
            &["S1", "S2"],
        );
        let t = taxonomy(&[("OTU1", "Firmicutes", "A"), ("otu2 ", "Firmicutes", "B"), ("otu3", "Bacteroidetes", "C")]);

        let profile = aggregate_rank(&c, &t, "phylum", &TaxonomyConfig::default()).unwrap();
        assert_eq!(profile.rank, "Phylum");
        assert_eq!(profile.taxa, vec!["Bacteroidetes", "Firmicutes"]);
        let pct = profile.percentages("S1").unwrap();
        assert_relative_eq!(pct[0], 60.0, epsilon = 1e-10);
        assert_relative_eq!(pct[1], 40.0, epsilon = 1e-10);
        assert_eq!(profile.compositions[1], RankComposition::NoData);
        assert!(profile.has_data());
    }

    #[test]
    fn test_top_n_and_other_bucket() {
        let rows: Vec<(String, Vec<f64>)> = (0..5).map(|i| (format!("otu{}", i), vec![(i + 1) as f64])).collect();
        let c = CountMatrix::from_rows(
            &rows.iter().map(|(_, v)| v.clone()).collect::<Vec<_>>(),
            rows.iter().map(|(id, _)| id.clone()).collect(),
            vec!["S1".into()],
        )
        .unwrap();
        let t = TaxonomyTable::new(
            vec!["Genus".into()],
            (0..5).map(|i| (format!("otu{}", i), vec![format!("G{}", i)])).collect(),
        )
        .unwrap();

        let config = TaxonomyConfig::default().with_top_n(2);
        let profile = aggregate_rank(&c, &t, "Genus", &config).unwrap();
        assert_eq!(profile.taxa, vec!["G4", "G3", "Other"]);
        assert_eq!(profile.pooled_labels, 3);
        let pct = profile.percentages("S1").unwrap();
        assert_relative_eq!(pct.iter().sum::<f64>(), 100.0, epsilon = 1e-10);
        assert_relative_eq!(pct[2], 6.0 / 15.0 * 100.0, epsilon = 1e-10);
    }

    #[test]
    fn test_no_other_bucket_when_everything_fits() {
        let c = counts(&[("a", &[1.0]), ("b", &[1.0])], &["S1"]);
        let t = taxonomy(&[("a", "P1", "G1"), ("b", "P2", "G2")]);
        let profile = aggregate_rank(&c, &t, "Genus", &TaxonomyConfig::default()).unwrap();
        // ties broken by label
        assert_eq!(profile.taxa, vec!["G1", "G2"]);
    }

    #[test]
    fn test_other_label_collision() {
        let c = counts(&[("a", &[5.0]), ("b", &[3.0]), ("c", &[1.0])], &["S1"]);
        let t = taxonomy(&[("a", "Other", "G1"), ("b", "P2", "G2"), ("c", "P3", "G3")]);
        let config = TaxonomyConfig::default().with_top_n(2);
        let profile = aggregate_rank(&c, &t, "Phylum", &config).unwrap();
        assert_eq!(profile.taxa, vec!["Other", "P2", "Other (pooled)"]);
    }

    #[test]
    fn test_join_and_rank_errors() {
        let c = counts(&[("a", &[5.0])], &["S1"]);
        let t = taxonomy(&[("x", "P1", "G1"), ("y", "P2", "G1")]);
        assert!(matches!(
            aggregate_rank(&c, &t, "Phylum", &TaxonomyConfig::default()),
            Err(DivError::RankJoinEmpty)
        ));

        let t = taxonomy(&[("a", "P1", "G1"), ("y", "P2", "G1")]);
        assert!(matches!(
            aggregate_rank(&c, &t, "Genus", &TaxonomyConfig::default()),
            Err(DivError::NonInformativeRank(_))
        ));
        assert!(matches!(
            aggregate_rank(&c, &t, "Species", &TaxonomyConfig::default()),
            Err(DivError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_missing_labels_are_dropped() {
        let c = counts(&[("a", &[5.0]), ("b", &[5.0]), ("c", &[10.0])], &["S1"]);
        let t = taxonomy(&[("a", "P1", "G1"), ("b", "P2", "NA"), ("c", "P1", "G2")]);
        let profile = aggregate_rank(&c, &t, "Genus", &TaxonomyConfig::default()).unwrap();
        assert_eq!(profile.unlabeled_features, 1);
        assert_eq!(profile.percentages("S1").unwrap(), &[10.0 / 15.0 * 100.0, 5.0 / 15.0 * 100.0]);
    }

    #[test]
    fn test_aggregate_all_informative_ranks() {
        let c = counts(&[("a", &[5.0]), ("b", &[5.0])], &["S1"]);
        let t = taxonomy(&[("a", "P1", "G1"), ("b", "P2", "G1")]);
        let results = aggregate_ranks(&c, &t, &TaxonomyConfig::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "Phylum");
        assert!(results[0].1.is_ok());
    }
}
