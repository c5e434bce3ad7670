use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the KPI analytics crates.
#[derive(Error, Debug)]
pub enum KpiError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A CSV document could not be parsed.
    #[error("Failed to parse CSV: {0}")]
    CsvParse(#[from] csv::Error),

    /// A string did not match any recognised period format.
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    /// Normalization produced no canonical record at all.
    #[error("No parseable rows: 0 of {total_rows} input rows could be normalized")]
    NoParseableRows { total_rows: usize },

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An input path does not exist.
    #[error("Data path not found: {0}")]
    DataPathNotFound(PathBuf),

    /// No CSV or JSON files were found under the given directory.
    #[error("No data files found in {0}")]
    NoDataFiles(PathBuf),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the KPI crates.
pub type Result<T> = std::result::Result<T, KpiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = KpiError::FileRead {
            path: PathBuf::from("/data/masterdata.csv"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("/data/masterdata.csv"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_error_display_invalid_period() {
        let err = KpiError::InvalidPeriod("13/2024".to_string());
        assert_eq!(err.to_string(), "Invalid period: 13/2024");
    }

    #[test]
    fn test_error_display_no_parseable_rows() {
        let err = KpiError::NoParseableRows { total_rows: 12 };
        assert_eq!(
            err.to_string(),
            "No parseable rows: 0 of 12 input rows could be normalized"
        );
    }

    #[test]
    fn test_error_display_config() {
        let err = KpiError::Config("metric list is empty".to_string());
        assert_eq!(err.to_string(), "Configuration error: metric list is empty");
    }

    #[test]
    fn test_error_display_no_data_files() {
        let err = KpiError::NoDataFiles(PathBuf::from("/empty/dir"));
        assert_eq!(err.to_string(), "No data files found in /empty/dir");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: KpiError = io_err.into();
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: KpiError = json_err.into();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }
}
