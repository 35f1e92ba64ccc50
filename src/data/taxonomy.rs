//! Feature → taxonomic lineage lookup table.

use super::delimited::{is_missing, read_table};
use super::identity::canonicalize_all;
use crate::error::{DivError, Result};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Normalize a rank column name: trimmed, first letter upper-case, rest lower-case.
///
/// `" genus"` and `"GENUS"` both become `"Genus"`.
pub fn normalize_rank_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

/// Taxonomic labels of each feature, one column per rank.
#[derive(Debug, Clone)]
pub struct TaxonomyTable {
    feature_ids: Vec<String>,
    ranks: Vec<String>,
    /// `labels[feature][rank]`, `None` for missing cells.
    labels: Vec<Vec<Option<String>>>,
    index: HashMap<String, usize>,
}

impl TaxonomyTable {
    /// Build a table from rank names and per-feature label rows.
    ///
    /// Rank names are normalized; empty or `NA` labels become missing.
    pub fn new(ranks: Vec<String>, rows: Vec<(String, Vec<String>)>) -> Result<Self> {
        if rows.is_empty() {
            return Err(DivError::EmptyData("No features in taxonomy table".to_string()));
        }
        let ranks: Vec<String> = ranks.iter().map(|r| normalize_rank_name(r)).collect();

        let mut seen = BTreeSet::new();
        for rank in &ranks {
            if !seen.insert(rank.as_str()) {
                return Err(DivError::InvalidParameter(format!(
                    "Rank '{}' appears more than once in the taxonomy table",
                    rank
                )));
            }
        }

        let mut feature_ids = Vec::with_capacity(rows.len());
        let mut labels = Vec::with_capacity(rows.len());
        for (feature_id, cells) in rows {
            let row = (0..ranks.len())
                .map(|i| match cells.get(i) {
                    Some(cell) if !is_missing(cell) => Some(cell.trim().to_string()),
                    _ => None,
                })
                .collect();
            feature_ids.push(feature_id.trim().to_string());
            labels.push(row);
        }

        let index = build_index(&feature_ids, "taxonomy table")?;
        Ok(Self {
            feature_ids,
            ranks,
            labels,
            index,
        })
    }

    /// Load a taxonomy table from a TSV or CSV file.
    ///
    /// The first column holds feature IDs, every other column is a rank.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let table = read_table(path)?;
        if table.header.len() < 2 {
            return Err(DivError::EmptyData(
                "Taxonomy table must have at least one rank column".to_string(),
            ));
        }
        let ranks = table.header[1..].to_vec();
        let rows = table
            .rows
            .into_iter()
            .map(|mut fields| {
                let id = fields.remove(0);
                (id, fields)
            })
            .collect();
        Self::new(ranks, rows)
    }

    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    /// True when the feature has an entry in the table.
    pub fn contains(&self, feature_id: &str) -> bool {
        self.index.contains_key(feature_id)
    }

    /// Normalized rank names in column order.
    pub fn ranks(&self) -> &[String] {
        &self.ranks
    }

    pub fn n_features(&self) -> usize {
        self.feature_ids.len()
    }

    /// Column index of a rank, matched after normalization.
    pub fn rank_index(&self, rank: &str) -> Option<usize> {
        let rank = normalize_rank_name(rank);
        self.ranks.iter().position(|r| *r == rank)
    }

    /// Label of a feature at a rank.
    pub fn label(&self, feature_id: &str, rank: &str) -> Option<&str> {
        let col = self.rank_index(rank)?;
        let row = *self.index.get(feature_id)?;
        self.labels[row][col].as_deref()
    }

    /// Labels of every feature at a rank, in feature order.
    pub fn labels_at(&self, rank: &str) -> Result<Vec<Option<&str>>> {
        let col = self
            .rank_index(rank)
            .ok_or_else(|| DivError::MissingColumn(normalize_rank_name(rank)))?;
        Ok(self.labels.iter().map(|row| row[col].as_deref()).collect())
    }

    /// Sorted distinct non-missing labels at a rank.
    pub fn distinct_labels(&self, rank: &str) -> Result<Vec<String>> {
        let distinct: BTreeSet<&str> = self.labels_at(rank)?.into_iter().flatten().collect();
        Ok(distinct.into_iter().map(String::from).collect())
    }

    /// A rank is informative when it separates features into at least two labels.
    pub fn is_informative(&self, rank: &str) -> Result<bool> {
        Ok(self.distinct_labels(rank)?.len() > 1)
    }

    /// Ranks usable for aggregation, in column order.
    pub fn informative_ranks(&self) -> Vec<String> {
        self.ranks
            .iter()
            .filter(|r| self.is_informative(r).unwrap_or(false))
            .cloned()
            .collect()
    }

    /// Rewrite feature IDs to their canonical form.
    pub fn canonicalize_ids(mut self) -> Result<Self> {
        self.feature_ids = canonicalize_all(&self.feature_ids, "taxonomy table")?;
        self.index = build_index(&self.feature_ids, "taxonomy table")?;
        Ok(self)
    }
}

fn build_index(ids: &[String], table: &str) -> Result<HashMap<String, usize>> {
    let mut index = HashMap::with_capacity(ids.len());
    for (i, id) in ids.iter().enumerate() {
        if let Some(prev) = index.insert(id.clone(), i) {
            return Err(DivError::DuplicateId {
                table: table.to_string(),
                first: ids[prev].clone(),
                second: id.clone(),
                canonical: id.clone(),
            });
        }
    }
    Ok(index)
}
