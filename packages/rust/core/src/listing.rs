//! Input listings: the identifier/label map and the global negative list.

use std::path::Path;

use indexmap::IndexSet;
use tracing::{debug, info, instrument, warn};

use goalforge_shared::{Asin, AsinSkuMap, GoalforgeError, Result};
use goalforge_tabular::{Row, open_source};

use crate::asin::{ASIN_COLUMN_VARIANTS, locate_column};

/// Label column names accepted in a listing header.
pub const SKU_COLUMN_VARIANTS: &[&str] = &["SKU", "Seller SKU", "MSKU", "Label"];

/// Load the identifier → label listing from a CSV or XLSX file.
///
/// The header row is optional. Identifiers failing validation are skipped,
/// and the first label wins for duplicates. A blank label falls back to the
/// identifier itself.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_asin_sku_map(path: &Path) -> Result<AsinSkuMap> {
    let mut source = open_source(path)?;
    let sheet = source
        .sheet_names()
        .into_iter()
        .next()
        .ok_or_else(|| GoalforgeError::validation(format!("{} has no sheets", path.display())))?;

    let first_row = source.header(&sheet)?;
    let mut rows: Vec<Row> = Vec::new();
    for batch in source.batches(&sheet, goalforge_shared::DEFAULT_BATCH_SIZE)? {
        rows.extend(batch?);
    }

    let (map, skipped) = build_listing(first_row, rows);
    if skipped > 0 {
        warn!(skipped, "listing entries skipped (not a 10-character identifier)");
    }
    info!(products = map.len(), "listing loaded");
    Ok(map)
}

/// Interpret the first row as header or data, then collect valid pairs.
/// Returns the map and the number of rejected entries.
fn build_listing(first_row: Row, rows: Vec<Row>) -> (AsinSkuMap, usize) {
    let (asin_idx, sku_idx, data) = match locate_column(&first_row, ASIN_COLUMN_VARIANTS) {
        Some(asin_idx) => {
            let sku_idx = locate_column(&first_row, SKU_COLUMN_VARIANTS).unwrap_or(asin_idx + 1);
            debug!(asin_idx, sku_idx, "listing header detected");
            (asin_idx, sku_idx, rows)
        }
        None if first_row.first().is_some_and(|c| Asin::is_valid(c)) => {
            debug!("listing has no header row");
            let mut data = Vec::with_capacity(rows.len() + 1);
            data.push(first_row);
            data.extend(rows);
            (0, 1, data)
        }
        None => {
            debug!(header = ?first_row, "non-standard listing header skipped");
            (0, 1, rows)
        }
    };

    let mut map = AsinSkuMap::new();
    let mut skipped = 0;
    for row in data {
        let raw = row.get(asin_idx).map(String::as_str).unwrap_or_default();
        if raw.trim().is_empty() {
            continue;
        }
        let Some(asin) = Asin::parse(raw) else {
            skipped += 1;
            continue;
        };
        let label = row
            .get(sku_idx)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| asin.to_string());
        map.insert(asin, label);
    }
    (map, skipped)
}

/// Parse a free-form negative list: comma- and/or newline-separated tokens.
/// Only valid identifiers survive; order is preserved, duplicates dropped.
pub fn parse_negative_asins(content: &str) -> Vec<Asin> {
    content
        .split([',', '\n', '\r'])
        .filter_map(Asin::parse)
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

/// Load the global negative list from a text file.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_negative_asins(path: &Path) -> Result<Vec<Asin>> {
    if !path.exists() {
        return Err(GoalforgeError::not_found(path));
    }
    let content = std::fs::read_to_string(path).map_err(|e| GoalforgeError::io(path, e))?;
    let asins = parse_negative_asins(&content);
    info!(count = asins.len(), "global negative identifiers loaded");
    Ok(asins)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Row {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn listing_with_header() {
        let (map, skipped) = build_listing(
            row(&["SKU", "ASIN"]),
            vec![
                row(&["SKU1", "b000000001"]),
                row(&["SKU2", "B00000002"]),
                row(&["SKU3", "B000000001"]),
            ],
        );
        assert_eq!(map.len(), 1);
        assert_eq!(skipped, 1);
        let asin = Asin::parse("B000000001").unwrap();
        assert_eq!(map.get(&asin), Some("SKU1"));
    }

    #[test]
    fn listing_without_header_keeps_first_row() {
        let (map, _) = build_listing(
            row(&["B000000001", "SKU1"]),
            vec![row(&["B000000002", "SKU2"])],
        );
        let asins: Vec<&str> = map.asins().map(Asin::as_str).collect();
        assert_eq!(asins, vec!["B000000001", "B000000002"]);
    }

    #[test]
    fn non_standard_header_is_skipped() {
        let (map, skipped) = build_listing(
            row(&["Product", "Label"]),
            vec![row(&["B000000001", "SKU1"])],
        );
        assert_eq!(map.len(), 1);
        assert_eq!(skipped, 0);
    }

    #[test]
    fn blank_label_falls_back_to_identifier() {
        let (map, _) = build_listing(row(&["ASIN"]), vec![row(&["B000000001"])]);
        let asin = Asin::parse("B000000001").unwrap();
        assert_eq!(map.get(&asin), Some("B000000001"));
    }

    #[test]
    fn every_listed_identifier_is_valid() {
        let (map, skipped) = build_listing(
            row(&["ASIN", "SKU"]),
            vec![
                row(&["B000000001", "a"]),
                row(&["not-an-asin", "b"]),
                row(&["B0000000011", "c"]),
                row(&["  b00000000z ", "d"]),
            ],
        );
        assert_eq!(skipped, 2);
        assert!(map.asins().all(|a| crate::asin::is_valid_identifier(a.as_str())));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn negatives_parse_mixed_delimiters() {
        let asins = parse_negative_asins("B000000001, b000000002\nB000000001\r\nshort,,\nB000000003");
        let got: Vec<&str> = asins.iter().map(Asin::as_str).collect();
        assert_eq!(got, vec!["B000000001", "B000000002", "B000000003"]);
    }

    #[test]
    fn negatives_missing_file_is_not_found() {
        let err = load_negative_asins(Path::new("/nope/negatives.txt")).unwrap_err();
        assert!(matches!(err, GoalforgeError::NotFound { .. }));
    }

    #[test]
    fn loads_csv_listing_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ASINList.csv");
        std::fs::write(&path, "ASIN,SKU\nB000000001,SKU1\nB000000002,SKU2\n").unwrap();
        let map = load_asin_sku_map(&path).expect("load");
        assert_eq!(map.len(), 2);
    }
}
