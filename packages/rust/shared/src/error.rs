//! Error types for goalforge.
//!
//! Library crates use [`GoalforgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all goalforge operations.
#[derive(Debug, thiserror::Error)]
pub enum GoalforgeError {
    /// An input file (bulk export, listing, negatives) does not exist.
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// No identifier column matched any known variant.
    #[error("schema error: {message}. Available columns: {columns:?}")]
    Schema {
        message: String,
        columns: Vec<String>,
    },

    /// File extension not handled by the tabular layer.
    #[error("unsupported file format '{extension}' for {}: use .csv or .xlsx", path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Spreadsheet/CSV backend failure while reading or writing.
    #[error("tabular error: {0}")]
    Tabular(String),

    /// Data validation error (bad listing, inconsistent options, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GoalforgeError>;

impl GoalforgeError {
    /// Create a not-found error for a path.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a schema error carrying the full discovered column list.
    pub fn schema(msg: impl Into<String>, columns: Vec<String>) -> Self {
        Self::Schema {
            message: msg.into(),
            columns,
        }
    }

    /// Create an unsupported-format error from a path.
    pub fn unsupported_format(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        Self::UnsupportedFormat { path, extension }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a backend error message.
    pub fn tabular(msg: impl std::fmt::Display) -> Self {
        Self::Tabular(msg.to_string())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = GoalforgeError::config("batch_size must be positive");
        assert_eq!(err.to_string(), "config error: batch_size must be positive");

        let err = GoalforgeError::not_found("/tmp/bulk.xlsx");
        assert_eq!(err.to_string(), "file not found: /tmp/bulk.xlsx");
    }

    #[test]
    fn schema_error_lists_columns() {
        let err = GoalforgeError::schema(
            "could not find ASIN column",
            vec!["Campaign Name".into(), "Bid".into()],
        );
        let msg = err.to_string();
        assert!(msg.contains("could not find ASIN column"));
        assert!(msg.contains("Campaign Name"));
        assert!(msg.contains("Bid"));
    }

    #[test]
    fn unsupported_format_carries_extension() {
        let err = GoalforgeError::unsupported_format("export.json");
        assert!(err.to_string().contains("'.json'"));
    }
}
