use std::path::Path;

use goalforge_shared::{GoalforgeError, Result};

/// On-disk formats understood by the tabular layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabularFormat {
    Csv,
    Xlsx,
}

impl TabularFormat {
    /// Pick a format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(TabularFormat::Csv),
            "xlsx" | "xlsm" | "xls" => Ok(TabularFormat::Xlsx),
            _ => Err(GoalforgeError::unsupported_format(path)),
        }
    }

    /// Like [`Self::from_path`], restricted to formats that can be written.
    pub fn for_output(path: &Path) -> Result<Self> {
        let is_legacy_xls = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("xls"));
        if is_legacy_xls {
            return Err(GoalforgeError::unsupported_format(path));
        }
        Self::from_path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_by_extension() {
        assert_eq!(
            TabularFormat::from_path(Path::new("bulk.XLSX")).unwrap(),
            TabularFormat::Xlsx
        );
        assert_eq!(
            TabularFormat::from_path(Path::new("trimmed.csv")).unwrap(),
            TabularFormat::Csv
        );
        assert!(TabularFormat::from_path(Path::new("notes.txt")).is_err());
        assert!(TabularFormat::from_path(Path::new("no_extension")).is_err());
    }

    #[test]
    fn legacy_xls_is_read_only() {
        assert!(TabularFormat::from_path(Path::new("old.xls")).is_ok());
        assert!(TabularFormat::for_output(Path::new("old.xls")).is_err());
        assert!(TabularFormat::for_output(Path::new("goals.xlsx")).is_ok());
    }
}
