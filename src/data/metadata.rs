//! Sample metadata handling.

use super::delimited::{is_missing, parse_number, read_table};
use super::grouping::Grouping;
use super::identity::canonicalize_all;
use crate::error::{DivError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// A variable value: categorical, continuous or missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variable {
    /// Categorical variable with string levels.
    Categorical(String),
    /// Continuous numeric variable.
    Continuous(f64),
    /// Missing value.
    Missing,
}

impl Variable {
    /// Check if this is a missing value.
    pub fn is_missing(&self) -> bool {
        matches!(self, Variable::Missing)
    }

    /// Try to get as categorical string.
    pub fn as_categorical(&self) -> Option<&str> {
        match self {
            Variable::Categorical(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as continuous f64.
    pub fn as_continuous(&self) -> Option<f64> {
        match self {
            Variable::Continuous(v) => Some(*v),
            _ => None,
        }
    }

    /// Text label used when the value defines a group; `None` for missing values.
    pub fn label(&self) -> Option<String> {
        match self {
            Variable::Categorical(s) => Some(s.clone()),
            Variable::Continuous(v) => Some(v.to_string()),
            Variable::Missing => None,
        }
    }
}

/// Inferred type of a metadata column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableType {
    Categorical,
    Continuous,
}

/// Sample metadata containing covariates for each sample.
#[derive(Debug, Clone)]
pub struct Metadata {
    /// Sample IDs in order.
    sample_ids: Vec<String>,
    /// Column names.
    column_names: Vec<String>,
    /// Data stored as sample_id -> column_name -> Variable.
    data: HashMap<String, HashMap<String, Variable>>,
    /// Inferred type of each column.
    column_types: HashMap<String, VariableType>,
}

impl Metadata {
    /// Build metadata from in-memory rows of raw cell text.
    ///
    /// Columns are inferred as continuous if every non-missing value parses as a
    /// number (comma decimals accepted), otherwise categorical.
    pub fn from_records(column_names: Vec<String>, records: Vec<(String, Vec<String>)>) -> Result<Self> {
        if records.is_empty() {
            return Err(DivError::EmptyData("No samples in metadata".to_string()));
        }

        let mut column_types = HashMap::new();
        for (col_idx, col_name) in column_names.iter().enumerate() {
            let all_numeric = records.iter().all(|(_, values)| match values.get(col_idx) {
                None => true,
                Some(v) => is_missing(v) || parse_number(v).is_some(),
            });
            let var_type = if all_numeric {
                VariableType::Continuous
            } else {
                VariableType::Categorical
            };
            column_types.insert(col_name.clone(), var_type);
        }

        let mut sample_ids = Vec::new();
        let mut data = HashMap::new();

        for (sample_id, values) in records {
            if data.contains_key(&sample_id) {
                return Err(DivError::InvalidParameter(format!(
                    "Sample '{}' appears more than once in metadata",
                    sample_id
                )));
            }
            sample_ids.push(sample_id.clone());
            let mut sample_data = HashMap::new();

            for (col_idx, col_name) in column_names.iter().enumerate() {
                let var = match values.get(col_idx) {
                    None => Variable::Missing,
                    Some(raw) if is_missing(raw) => Variable::Missing,
                    Some(raw) => match column_types.get(col_name) {
                        Some(VariableType::Continuous) => parse_number(raw)
                            .map(Variable::Continuous)
                            .unwrap_or(Variable::Missing),
                        Some(VariableType::Categorical) | None => {
                            Variable::Categorical(raw.trim().to_string())
                        }
                    },
                };
                sample_data.insert(col_name.clone(), var);
            }
            data.insert(sample_id, sample_data);
        }

        Ok(Self {
            sample_ids,
            column_names,
            data,
            column_types,
        })
    }

    /// Load metadata from a TSV or CSV file.
    ///
    /// Expected format:
    /// - First row: header with column names (first column is sample ID)
    /// - Subsequent rows: sample ID followed by covariate values
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let table = read_table(path)?;
        if table.header.len() < 2 {
            return Err(DivError::EmptyData(
                "Metadata must have at least one variable column".to_string(),
            ));
        }
        let column_names = table.header[1..].to_vec();
        let records = table
            .rows
            .into_iter()
            .map(|mut fields| {
                let sample_id = fields.remove(0).trim().to_string();
                (sample_id, fields)
            })
            .collect();
        Self::from_records(column_names, records)
    }

    /// Sample IDs in order.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Column names.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Number of columns (variables).
    pub fn n_columns(&self) -> usize {
        self.column_names.len()
    }

    /// Get a variable value for a specific sample and column.
    pub fn get(&self, sample_id: &str, column: &str) -> Option<&Variable> {
        self.data.get(sample_id).and_then(|m| m.get(column))
    }

    /// Get all values for a column.
    pub fn column(&self, column: &str) -> Result<Vec<&Variable>> {
        if !self.has_column(column) {
            return Err(DivError::MissingColumn(column.to_string()));
        }
        Ok(self
            .sample_ids
            .iter()
            .map(|sid| {
                self.data
                    .get(sid)
                    .and_then(|m| m.get(column))
                    .unwrap_or(&Variable::Missing)
            })
            .collect())
    }

    /// Get the type of a column.
    pub fn column_type(&self, column: &str) -> Option<VariableType> {
        self.column_types.get(column).copied()
    }

    /// Sorted distinct non-missing labels of a column.
    pub fn levels(&self, column: &str) -> Result<Vec<String>> {
        let levels: BTreeSet<String> = self
            .column(column)?
            .iter()
            .filter_map(|v| v.label())
            .collect();
        Ok(levels.into_iter().collect())
    }

    /// Columns usable as grouping variables.
    ///
    /// A column qualifies when its number of distinct non-missing values `n`
    /// satisfies `1 < n < n_samples`: constants and per-sample identifiers are
    /// excluded.
    pub fn grouping_columns(&self) -> Vec<String> {
        let n_samples = self.n_samples();
        self.column_names
            .iter()
            .filter(|col| {
                let n_levels = self.levels(col).map(|l| l.len()).unwrap_or(0);
                n_levels > 1 && n_levels < n_samples
            })
            .cloned()
            .collect()
    }

    /// Resolve a column into group labels for the given samples.
    ///
    /// Samples absent from the metadata or with a missing value are left unassigned.
    pub fn grouping(&self, column: &str, sample_ids: &[String]) -> Result<Grouping> {
        if !self.has_column(column) {
            return Err(DivError::MissingColumn(column.to_string()));
        }
        let labels = sample_ids
            .iter()
            .map(|sid| self.get(sid, column).and_then(|v| v.label()))
            .collect();
        Grouping::new(column, sample_ids.to_vec(), labels)
    }

    /// Subset metadata to only include specified samples, in the given order.
    pub fn subset_samples(&self, sample_ids: &[String]) -> Result<Self> {
        let mut new_data = HashMap::new();
        let mut new_sample_ids = Vec::new();

        for sid in sample_ids {
            match self.data.get(sid) {
                Some(sample_data) => {
                    new_data.insert(sid.clone(), sample_data.clone());
                    new_sample_ids.push(sid.clone());
                }
                None => {
                    return Err(DivError::InvalidParameter(format!(
                        "Sample '{}' not found in metadata",
                        sid
                    )))
                }
            }
        }

        Ok(Self {
            sample_ids: new_sample_ids,
            column_names: self.column_names.clone(),
            data: new_data,
            column_types: self.column_types.clone(),
        })
    }

    /// Rewrite sample IDs to their canonical form.
    pub fn canonicalize_ids(self) -> Result<Self> {
        let canonical = canonicalize_all(&self.sample_ids, "metadata")?;
        let mut data = self.data;
        let mut new_data = HashMap::with_capacity(data.len());
        for (old, new) in self.sample_ids.iter().zip(&canonical) {
            if let Some(values) = data.remove(old) {
                new_data.insert(new.clone(), values);
            }
        }
        Ok(Self {
            sample_ids: canonical,
            column_names: self.column_names,
            data: new_data,
            column_types: self.column_types,
        })
    }

    /// Check if a sample exists.
    pub fn has_sample(&self, sample_id: &str) -> bool {
        self.data.contains_key(sample_id)
    }

    /// Check if a column exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_tsv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample_id\tsite\tph\tsubject").unwrap();
        writeln!(file, "S1\tgut\t6,5\tP1").unwrap();
        writeln!(file, "S2\tskin\t5.0\tP2").unwrap();
        writeln!(file, "S3\tgut\t7.1\tP3").unwrap();
        writeln!(file, "S4\tskin\t5.0\tP4").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_metadata() {
        let file = create_test_tsv();
        let meta = Metadata::from_path(file.path()).unwrap();

        assert_eq!(meta.n_samples(), 4);
        assert_eq!(meta.n_columns(), 3);
        assert_eq!(meta.sample_ids(), &["S1", "S2", "S3", "S4"]);
        assert_eq!(meta.column_type("site"), Some(VariableType::Categorical));
        assert_eq!(meta.column_type("ph"), Some(VariableType::Continuous));
        assert_eq!(meta.get("S1", "ph").unwrap().as_continuous(), Some(6.5));
    }

    #[test]
    fn test_grouping_columns_exclude_constants_and_identifiers() {
        let file = create_test_tsv();
        let meta = Metadata::from_path(file.path()).unwrap();

        // subject is unique per sample; site and ph have 2 and 3 levels
        assert_eq!(meta.grouping_columns(), vec!["site".to_string(), "ph".to_string()]);
    }

    #[test]
    fn test_grouping_leaves_unknown_samples_unassigned() {
        let file = create_test_tsv();
        let meta = Metadata::from_path(file.path()).unwrap();

        let ids: Vec<String> = vec!["S2".into(), "S9".into(), "S1".into()];
        let grouping = meta.grouping("site", &ids).unwrap();
        assert_eq!(grouping.label("S2"), Some("skin"));
        assert_eq!(grouping.label("S9"), None);
        assert_eq!(grouping.label("S1"), Some("gut"));
        assert!(meta.grouping("missing", &ids).is_err());
    }

    #[test]
    fn test_missing_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample_id\tgroup\tage").unwrap();
        writeln!(file, "S1\tcontrol\t25").unwrap();
        writeln!(file, "S2\ttreatment\tNA").unwrap();
        writeln!(file, "S3\t\t30").unwrap();
        file.flush().unwrap();

        let meta = Metadata::from_path(file.path()).unwrap();

        assert!(meta.get("S2", "age").unwrap().is_missing());
        assert!(meta.get("S3", "group").unwrap().is_missing());
        assert_eq!(meta.levels("group").unwrap(), vec!["control", "treatment"]);
    }

    #[test]
    fn test_canonicalize_and_subset() {
        let meta = Metadata::from_records(
            vec!["group".into()],
            vec![
                (" s1".into(), vec!["A".into()]),
                ("s2.0".into(), vec!["B".into()]),
            ],
        )
        .unwrap()
        .canonicalize_ids()
        .unwrap();

        assert_eq!(meta.sample_ids(), &["S1", "S2"]);
        let subset = meta.subset_samples(&["S2".to_string()]).unwrap();
        assert_eq!(subset.get("S2", "group").unwrap().as_categorical(), Some("B"));
        assert!(meta.subset_samples(&["S3".to_string()]).is_err());
    }
}
