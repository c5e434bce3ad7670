//! CSV/JSON file discovery and loading.
//!
//! Turns spreadsheet exports into [`RawRecord`]s without interpreting any
//! cell: typing, header resolution and validation are the normalizer's job.
//! A row the loader cannot read becomes an empty record, so the normalizer
//! still accounts for it.

use std::path::{Path, PathBuf};

use kpi_core::error::{KpiError, Result};
use kpi_core::models::{CellValue, RawRecord};
use tracing::{debug, info, warn};

/// Extensions the loader understands.
const DATA_EXTENSIONS: [&str; 2] = ["csv", "json"];

// ── Public API ────────────────────────────────────────────────────────────────

/// Find all CSV and JSON files recursively under `data_path`, sorted by path.
pub fn find_data_files(data_path: &Path) -> Vec<PathBuf> {
    if !data_path.exists() {
        warn!("Data path does not exist: {}", data_path.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(data_path)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_data_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Load every input path in order; directories contribute all their data
/// files in sorted order.
///
/// Historical bases and new monthly files are simply concatenated.
pub fn load_rows(paths: &[PathBuf]) -> Result<Vec<RawRecord>> {
    let mut rows = Vec::new();
    for path in paths {
        if !path.exists() {
            return Err(KpiError::DataPathNotFound(path.clone()));
        }
        if path.is_dir() {
            let files = find_data_files(path);
            if files.is_empty() {
                return Err(KpiError::NoDataFiles(path.clone()));
            }
            for file in &files {
                rows.extend(load_file(file)?);
            }
        } else {
            rows.extend(load_file(path)?);
        }
    }
    info!(paths = paths.len(), rows = rows.len(), "Loaded input rows");
    Ok(rows)
}

/// Load one CSV or JSON file.
pub fn load_file(path: &Path) -> Result<Vec<RawRecord>> {
    let bytes = std::fs::read(path).map_err(|source| KpiError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    // Exports from spreadsheet tools are not always UTF-8.
    let content = String::from_utf8_lossy(&bytes);

    let rows = match extension(path).as_deref() {
        Some("csv") => parse_csv(&content)?,
        Some("json") => parse_json(&content)?,
        _ => {
            return Err(KpiError::Config(format!(
                "unsupported data file type: {}",
                path.display()
            )))
        }
    };
    debug!("File {}: {} rows", path.display(), rows.len());
    Ok(rows)
}

/// Parse CSV text. The delimiter (`,` `;` or tab) is guessed from the header
/// line.
pub fn parse_csv(content: &str) -> Result<Vec<RawRecord>> {
    let content = content.trim_start_matches('\u{feff}');
    let delimiter = sniff_delimiter(content);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (line, result) in reader.records().enumerate() {
        match result {
            Ok(record) => rows.push(
                headers
                    .iter()
                    .zip(record.iter())
                    .filter(|(label, _)| !label.is_empty())
                    .map(|(label, cell)| (label.clone(), CellValue::from_text(cell)))
                    .collect(),
            ),
            Err(e) => {
                warn!("Unreadable CSV record {}: {}", line + 1, e);
                rows.push(RawRecord::new());
            }
        }
    }
    Ok(rows)
}

/// Parse a JSON array of objects.
///
/// An element that is not an object becomes an empty record.
pub fn parse_json(content: &str) -> Result<Vec<RawRecord>> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    let items = value.as_array().ok_or_else(|| {
        KpiError::Config("JSON data must be an array of row objects".to_string())
    })?;

    Ok(items
        .iter()
        .enumerate()
        .map(|(i, item)| match item.as_object() {
            Some(object) => object
                .iter()
                .map(|(label, cell)| (label.clone(), CellValue::from(cell)))
                .collect(),
            None => {
                warn!("JSON element {} is not an object", i);
                RawRecord::new()
            }
        })
        .collect())
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn is_data_file(path: &Path) -> bool {
    extension(path).is_some_and(|e| DATA_EXTENSIONS.contains(&e.as_str()))
}

/// The most frequent candidate delimiter on the first line; `,` by default.
fn sniff_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    [b';', b'\t']
        .into_iter()
        .map(|d| (d, header.matches(d as char).count()))
        .filter(|(_, n)| *n > header.matches(',').count())
        .max_by_key(|(_, n)| *n)
        .map_or(b',', |(d, _)| d)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
