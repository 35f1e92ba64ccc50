//! Group comparison of a scalar per-sample measure (alpha diversity).
//!
//! One-way ANOVA is tried first; when its F statistic cannot be formed (no
//! within-group variance, non-finite F, invalid F distribution) the rank-based
//! Kruskal-Wallis test is used instead.

use super::outcome::{NotComputableReason, TestMethod, TestOutcome, TestResult};
use crate::data::Metadata;
use crate::diversity::{AlphaMetric, AlphaTable};
use crate::error::{DivError, Result};
use log::{debug, info};
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor};
use std::collections::BTreeMap;

/// One-way ANOVA. Fails with a message when F is undefined.
pub fn one_way_anova(groups: &[Vec<f64>]) -> std::result::Result<TestResult, String> {
    let k = groups.len();
    let n: usize = groups.iter().map(|g| g.len()).sum();
    if k < 2 || n <= k {
        return Err(format!("{} observations in {} groups", n, k));
    }

    let grand_mean = groups.iter().flatten().sum::<f64>() / n as f64;
    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    for group in groups {
        let mean = group.iter().sum::<f64>() / group.len() as f64;
        ss_between += group.len() as f64 * (mean - grand_mean).powi(2);
        ss_within += group.iter().map(|x| (x - mean).powi(2)).sum::<f64>();
    }

    if ss_within <= 0.0 {
        return Err("zero within-group variance".to_string());
    }
    let df_between = (k - 1) as f64;
    let df_within = (n - k) as f64;
    let f_stat = (ss_between / df_between) / (ss_within / df_within);
    if !f_stat.is_finite() {
        return Err(format!("non-finite F statistic {}", f_stat));
    }

    let dist = FisherSnedecor::new(df_between, df_within).map_err(|e| e.to_string())?;
    let p_value = (1.0 - dist.cdf(f_stat)).clamp(0.0, 1.0);

    Ok(TestResult {
        method: TestMethod::Anova,
        statistic: f_stat,
        p_value,
        effect_size: ss_between / (ss_between + ss_within),
        n_groups: k,
        n_obs: n,
        permutations: None,
    })
}

/// Average ranks (1-based) of the pooled observations, ties sharing their mean rank.
fn average_ranks(values: &[f64]) -> (Vec<f64>, Vec<usize>) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0.0; values.len()];
    let mut tie_sizes = Vec::new();
    let mut i = 0;
    while i < order.len() {
        let mut j = i + 1;
        while j < order.len() && values[order[j]] == values[order[i]] {
            j += 1;
        }
        // positions i..j share rank mean of (i+1)..=j
        let rank = (i + 1 + j) as f64 / 2.0;
        for &idx in &order[i..j] {
            ranks[idx] = rank;
        }
        tie_sizes.push(j - i);
        i = j;
    }
    (ranks, tie_sizes)
}

/// Kruskal-Wallis H test with tie correction. Fails when every value is tied.
pub fn kruskal_wallis(groups: &[Vec<f64>]) -> std::result::Result<TestResult, String> {
    let k = groups.len();
    let pooled: Vec<f64> = groups.iter().flatten().cloned().collect();
    let n = pooled.len();
    if k < 2 || n < 2 {
        return Err(format!("{} observations in {} groups", n, k));
    }

    let (ranks, tie_sizes) = average_ranks(&pooled);
    let nf = n as f64;
    let mut offset = 0;
    let mut sum_term = 0.0;
    for group in groups {
        let rank_sum: f64 = ranks[offset..offset + group.len()].iter().sum();
        sum_term += rank_sum * rank_sum / group.len() as f64;
        offset += group.len();
    }
    let h_raw = 12.0 / (nf * (nf + 1.0)) * sum_term - 3.0 * (nf + 1.0);

    let ties: f64 = tie_sizes
        .iter()
        .map(|&t| {
            let t = t as f64;
            t * t * t - t
        })
        .sum();
    let correction = 1.0 - ties / (nf * nf * nf - nf);
    if correction <= 0.0 {
        return Err("all values are tied".to_string());
    }
    let h = (h_raw / correction).max(0.0);

    let dist = ChiSquared::new((k - 1) as f64).map_err(|e| e.to_string())?;
    let p_value = (1.0 - dist.cdf(h)).clamp(0.0, 1.0);

    Ok(TestResult {
        method: TestMethod::KruskalWallis,
        statistic: h,
        p_value,
        effect_size: h / (nf - 1.0),
        n_groups: k,
        n_obs: n,
        permutations: None,
    })
}

/// Compare labelled groups of observations.
///
/// NaN observations must already be removed. Preconditions are checked in
/// order: no observations, fewer than two groups, a group with ≤ 1 value.
pub fn test_groups(groups: &BTreeMap<String, Vec<f64>>) -> TestOutcome {
    let groups: Vec<Vec<f64>> = groups.values().filter(|g| !g.is_empty()).cloned().collect();
    if groups.is_empty() {
        return TestOutcome::not_computable(NotComputableReason::AllMissing);
    }
    if groups.len() < 2 {
        return TestOutcome::not_computable(NotComputableReason::TooFewGroups);
    }
    if groups.iter().any(|g| g.len() <= 1) {
        return TestOutcome::not_computable(NotComputableReason::InsufficientReplication);
    }

    match one_way_anova(&groups) {
        Ok(result) => TestOutcome::Computed(result),
        Err(anova_err) => {
            debug!("ANOVA not usable ({}); falling back to Kruskal-Wallis", anova_err);
            match kruskal_wallis(&groups) {
                Ok(result) => TestOutcome::Computed(result),
                Err(_) => TestOutcome::not_computable(NotComputableReason::ZeroVariance),
            }
        }
    }
}

/// Test whether an alpha diversity metric differs between the groups of a metadata column.
///
/// Samples whose metric is NaN or whose group label is missing are ignored.
pub fn test_alpha_groups(
    alpha: &AlphaTable,
    metadata: &Metadata,
    column: &str,
    metric: AlphaMetric,
) -> Result<TestOutcome> {
    let values = alpha.metric(metric).ok_or_else(|| {
        DivError::InvalidParameter(format!("Alpha metric {} was not computed", metric))
    })?;
    let grouping = metadata.grouping(column, &alpha.sample_ids)?;

    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (label, value) in grouping.labels().iter().zip(values) {
        if let Some(label) = label {
            if !value.is_nan() {
                groups.entry(label.clone()).or_default().push(value);
            }
        }
    }

    let outcome = test_groups(&groups);
    info!("{} by '{}': {}", metric, column, outcome);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn groups(data: &[(&str, &[f64])]) -> BTreeMap<String, Vec<f64>> {
        data.iter().map(|(k, v)| (k.to_string(), v.to_vec())).collect()
    }

    #[test]
    fn test_anova_reference_values() {
        // F = 27, df = (2, 6): between SS 54, within SS 6
        let result = one_way_anova(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0], vec![7.0, 8.0, 9.0]]).unwrap();
        assert_relative_eq!(result.statistic, 27.0, epsilon = 1e-10);
        assert_relative_eq!(result.effect_size, 0.9, epsilon = 1e-10);
        // df1 = 2: p = (1 + 2F/6)^-3 = 0.001
        assert_relative_eq!(result.p_value, 0.001, epsilon = 1e-6);
    }

    #[test]
    fn test_kruskal_reference_values() {
        // Ranks 1..6 split in two: H = 12/42 * (36/3 + 225/3) - 21 = 3.857..
        let result = kruskal_wallis(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert_relative_eq!(result.statistic, 27.0 / 7.0, epsilon = 1e-10);
        assert_relative_eq!(result.effect_size, 27.0 / 7.0 / 5.0, epsilon = 1e-10);
        assert!(result.p_value > 0.04 && result.p_value < 0.06);
    }

    #[test]
    fn test_average_ranks_with_ties() {
        let (ranks, ties) = average_ranks(&[10.0, 20.0, 10.0, 30.0]);
        assert_eq!(ranks, vec![1.5, 3.0, 1.5, 4.0]);
        assert_eq!(ties, vec![2, 1, 1]);
    }

    #[test]
    fn test_fallback_to_kruskal_when_within_variance_is_zero() {
        let outcome = test_groups(&groups(&[("a", &[1.0, 1.0]), ("b", &[2.0, 2.0])]));
        let result = outcome.result().unwrap();
        assert_eq!(result.method, TestMethod::KruskalWallis);
    }

    #[test]
    fn test_all_tied_is_zero_variance() {
        let outcome = test_groups(&groups(&[("a", &[3.0, 3.0]), ("b", &[3.0, 3.0])]));
        assert_eq!(outcome.reason(), Some(&NotComputableReason::ZeroVariance));
    }

    #[test]
    fn test_preconditions() {
        let outcome = test_groups(&groups(&[("a", &[1.0, 2.0]), ("b", &[3.0])]));
        assert_eq!(outcome.reason(), Some(&NotComputableReason::InsufficientReplication));

        let outcome = test_groups(&groups(&[("a", &[1.0, 2.0, 3.0])]));
        assert_eq!(outcome.reason(), Some(&NotComputableReason::TooFewGroups));

        let outcome = test_groups(&BTreeMap::new());
        assert_eq!(outcome.reason(), Some(&NotComputableReason::AllMissing));
    }

    #[test]
    fn test_alpha_groups_drop_nan_and_unassigned() {
        let alpha = AlphaTable {
            sample_ids: ["S1", "S2", "S3", "S4", "S5", "S6"].iter().map(|s| s.to_string()).collect(),
            metrics: vec![AlphaMetric::Shannon],
            values: vec![vec![1.0], vec![1.2], vec![f64::NAN], vec![2.0], vec![2.3], vec![5.0]],
            empty_samples: vec!["S3".to_string()],
        };
        let metadata = Metadata::from_records(
            vec!["group".into()],
            vec![
                ("S1".into(), vec!["A".into()]),
                ("S2".into(), vec!["A".into()]),
                ("S3".into(), vec!["A".into()]),
                ("S4".into(), vec!["B".into()]),
                ("S5".into(), vec!["B".into()]),
                ("S6".into(), vec!["NA".into()]),
            ],
        )
        .unwrap();

        let outcome = test_alpha_groups(&alpha, &metadata, "group", AlphaMetric::Shannon).unwrap();
        let result = outcome.result().unwrap();
        assert_eq!(result.method, TestMethod::Anova);
        assert_eq!(result.n_obs, 4);
        assert_eq!(result.n_groups, 2);

        assert!(test_alpha_groups(&alpha, &metadata, "group", AlphaMetric::Chao1).is_err());
        assert!(test_alpha_groups(&alpha, &metadata, "site", AlphaMetric::Shannon).is_err());
    }
}
