//! Shared reader for the tab/comma separated tables handed over by ingestion.

use crate::error::{DivError, Result};
use std::path::Path;

/// Raw table: header row plus data rows, all cells as text.
#[derive(Debug, Clone)]
pub(crate) struct RawTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Pick the field delimiter from the file extension (`.csv` → comma, anything else → tab).
pub(crate) fn delimiter_for<P: AsRef<Path>>(path: P) -> u8 {
    match path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("csv") => b',',
        _ => b'\t',
    }
}

/// Read a delimited file into a [`RawTable`], skipping blank lines.
pub(crate) fn read_table<P: AsRef<Path>>(path: P) -> Result<RawTable> {
    let delimiter = delimiter_for(&path);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_path(path.as_ref())?;

    let mut records = reader.records();
    let header: Vec<String> = match records.next() {
        Some(record) => record?.iter().map(|s| s.trim().to_string()).collect(),
        None => return Err(DivError::EmptyData("Empty table file".to_string())),
    };

    let mut rows = Vec::new();
    for record in records {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }

    Ok(RawTable { header, rows })
}

/// True for cells that mean "no value".
pub(crate) fn is_missing(raw: &str) -> bool {
    let v = raw.trim();
    v.is_empty() || v.eq_ignore_ascii_case("na") || v.eq_ignore_ascii_case("nan")
}

/// Parse a numeric cell, accepting a comma as decimal separator (`"3,5"` → 3.5).
pub(crate) fn parse_number(raw: &str) -> Option<f64> {
    let v = raw.trim();
    v.parse::<f64>()
        .ok()
        .or_else(|| v.replace(',', ".").parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_delimiter_by_extension() {
        assert_eq!(delimiter_for("table.csv"), b',');
        assert_eq!(delimiter_for("table.CSV"), b',');
        assert_eq!(delimiter_for("table.tsv"), b'\t');
        assert_eq!(delimiter_for("table"), b'\t');
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("3.5"), Some(3.5));
        assert_eq!(parse_number(" 3,5 "), Some(3.5));
        assert_eq!(parse_number("abc"), None);
    }

    #[test]
    fn test_read_csv_skips_blank_lines() {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "id,a,b").unwrap();
        writeln!(file, "x,1,2").unwrap();
        writeln!(file, ",,").unwrap();
        writeln!(file, "y,3,4").unwrap();
        file.flush().unwrap();

        let table = read_table(file.path()).unwrap();
        assert_eq!(table.header, vec!["id", "a", "b"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1][0], "y");
    }
}
