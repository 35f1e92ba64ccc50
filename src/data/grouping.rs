//! A metadata column resolved against an ordered list of samples.

use crate::error::{DivError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One optional group label per sample; `None` marks an unassigned sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grouping {
    column: String,
    sample_ids: Vec<String>,
    labels: Vec<Option<String>>,
}

impl Grouping {
    /// Build a grouping; `labels` must be aligned with `sample_ids`.
    pub fn new(column: &str, sample_ids: Vec<String>, labels: Vec<Option<String>>) -> Result<Self> {
        if sample_ids.len() != labels.len() {
            return Err(DivError::DimensionMismatch {
                expected: sample_ids.len(),
                actual: labels.len(),
            });
        }
        Ok(Self {
            column: column.to_string(),
            sample_ids,
            labels,
        })
    }

    /// Convenience constructor from `(sample, label)` pairs where every sample is assigned.
    pub fn from_pairs<S: AsRef<str>, L: AsRef<str>>(column: &str, pairs: &[(S, L)]) -> Self {
        Self {
            column: column.to_string(),
            sample_ids: pairs.iter().map(|(s, _)| s.as_ref().to_string()).collect(),
            labels: pairs.iter().map(|(_, l)| Some(l.as_ref().to_string())).collect(),
        }
    }

    /// Name of the metadata column the labels came from.
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn labels(&self) -> &[Option<String>] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_ids.is_empty()
    }

    /// Label of a sample, `None` when unknown or unassigned.
    pub fn label(&self, sample_id: &str) -> Option<&str> {
        self.sample_ids
            .iter()
            .position(|s| s == sample_id)
            .and_then(|i| self.labels[i].as_deref())
    }

    /// Samples per label, labels sorted, samples in grouping order.
    pub fn groups(&self) -> BTreeMap<String, Vec<String>> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (sid, label) in self.sample_ids.iter().zip(&self.labels) {
            if let Some(label) = label {
                groups.entry(label.clone()).or_default().push(sid.clone());
            }
        }
        groups
    }

    /// Number of assigned samples.
    pub fn n_assigned(&self) -> usize {
        self.labels.iter().filter(|l| l.is_some()).count()
    }

    /// Apply a function to every label, e.g. to sanitize them.
    pub fn map_labels<F: Fn(&str) -> String>(&self, f: F) -> Self {
        Self {
            column: self.column.clone(),
            sample_ids: self.sample_ids.clone(),
            labels: self
                .labels
                .iter()
                .map(|l| l.as_deref().map(&f))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_skip_unassigned() {
        let grouping = Grouping::new(
            "site",
            vec!["S1".into(), "S2".into(), "S3".into()],
            vec![Some("gut".into()), None, Some("gut".into())],
        )
        .unwrap();

        let groups = grouping.groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups["gut"], vec!["S1", "S3"]);
        assert_eq!(grouping.n_assigned(), 2);
        assert_eq!(grouping.label("S2"), None);
    }

    #[test]
    fn test_length_mismatch() {
        let result = Grouping::new("site", vec!["S1".into()], vec![]);
        assert!(matches!(result, Err(DivError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_map_labels() {
        let grouping = Grouping::from_pairs("g", &[("S1", "a b"), ("S2", "c")]);
        let mapped = grouping.map_labels(|l| l.replace(' ', "_"));
        assert_eq!(mapped.label("S1"), Some("a_b"));
    }
}
