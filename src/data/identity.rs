//! Identifier canonicalization and cross-table matching.
//!
//! Sample and feature identifiers come from three tables prepared by hand,
//! often through spreadsheets. The same sample can appear as `s01`, ` S01 `
//! or, when a numeric column was formatted as a float, `101.0` next to `101`.
//! Every join in the crate goes through [`canonical_id`] so these variants
//! collapse to a single key.

use super::{CountMatrix, Metadata};
use crate::error::{DivError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Canonical form of an identifier: trimmed, upper-cased, with one trailing
/// `".0"` removed.
pub fn canonical_id(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    match upper.strip_suffix(".0") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => upper,
    }
}

/// Outcome of matching the identifiers of two tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdOverlap {
    /// Canonical identifiers present in both tables, in the order of the left table.
    pub shared: Vec<String>,
    /// Canonical identifiers only found in the left table.
    pub only_in_left: Vec<String>,
    /// Canonical identifiers only found in the right table.
    pub only_in_right: Vec<String>,
}

impl IdOverlap {
    /// True when both tables contain exactly the same identifiers.
    pub fn is_complete(&self) -> bool {
        self.only_in_left.is_empty() && self.only_in_right.is_empty()
    }

    /// Number of shared identifiers.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// True when nothing is shared.
    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }
}

/// Canonicalize a list of identifiers, rejecting two raw IDs that collapse together.
pub fn canonicalize_all(ids: &[String], table: &str) -> Result<Vec<String>> {
    let mut seen: HashMap<String, &str> = HashMap::with_capacity(ids.len());
    let mut out = Vec::with_capacity(ids.len());
    for raw in ids {
        let canonical = canonical_id(raw);
        if let Some(first) = seen.get(&canonical) {
            return Err(DivError::DuplicateId {
                table: table.to_string(),
                first: first.to_string(),
                second: raw.clone(),
                canonical,
            });
        }
        seen.insert(canonical.clone(), raw);
        out.push(canonical);
    }
    Ok(out)
}

/// Match two identifier lists after canonicalization.
///
/// `left_name` and `right_name` only label the tables in error messages.
/// Fails with [`DivError::NoOverlap`] when the intersection is empty.
pub fn match_ids(
    left: &[String],
    right: &[String],
    left_name: &str,
    right_name: &str,
) -> Result<IdOverlap> {
    let left = canonicalize_all(left, left_name)?;
    let right = canonicalize_all(right, right_name)?;

    let left_set: HashSet<&String> = left.iter().collect();
    let right_set: HashSet<&String> = right.iter().collect();

    let shared: Vec<String> = left.iter().filter(|id| right_set.contains(id)).cloned().collect();
    if shared.is_empty() {
        return Err(DivError::NoOverlap {
            left: left_name.to_string(),
            right: right_name.to_string(),
        });
    }

    let overlap = IdOverlap {
        only_in_left: left.iter().filter(|id| !right_set.contains(id)).cloned().collect(),
        only_in_right: right.iter().filter(|id| !left_set.contains(id)).cloned().collect(),
        shared,
    };

    if !overlap.is_complete() {
        warn!(
            "{} identifiers shared between {} and {}; {} only in {}, {} only in {}",
            overlap.len(),
            left_name,
            right_name,
            overlap.only_in_left.len(),
            left_name,
            overlap.only_in_right.len(),
            right_name
        );
    }

    Ok(overlap)
}

/// Abundance matrix and metadata restricted to their shared samples.
#[derive(Debug, Clone)]
pub struct Harmonized {
    /// Counts with canonical IDs, columns limited to shared samples.
    pub counts: CountMatrix,
    /// Metadata with canonical IDs, rows aligned to `counts` column order.
    pub metadata: Metadata,
    /// Sample matching diagnostics (left = abundance table, right = metadata).
    pub samples: IdOverlap,
}

/// Canonicalize both tables and restrict them to the samples they share.
pub fn harmonize(counts: &CountMatrix, metadata: &Metadata) -> Result<Harmonized> {
    let samples = match_ids(
        counts.sample_ids(),
        metadata.sample_ids(),
        "abundance table",
        "metadata",
    )?;
    let counts = counts.clone().canonicalize_ids()?.select_samples(&samples.shared)?;
    let metadata = metadata
        .clone()
        .canonicalize_ids()?
        .subset_samples(&samples.shared)?;

    Ok(Harmonized {
        counts,
        metadata,
        samples,
    })
}
