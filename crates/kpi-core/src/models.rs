//! Record types shared by the pipeline: raw spreadsheet rows, the canonical
//! records the normalizer emits, and the per-row error log.
//!
//! [`ALL_SCOPE`] labels roll-up buckets and is never a valid category value.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::period::Period;

/// Scope label used for roll-up buckets spanning every brand or every IDH.
pub const ALL_SCOPE: &str = "ALL";

/// Sentinel category assigned when a brand or IDH cannot be matched.
pub const UNKNOWN_CATEGORY: &str = "UNKNOWN";

// ── CellValue ─────────────────────────────────────────────────────────────────

/// One spreadsheet cell, tagged by the shape the loader observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    /// Free text, possibly a locale-formatted number or a date.
    Text(String),
    /// A value the source already typed as numeric.
    Number(f64),
    /// A value the source already typed as a date.
    Date(NaiveDate),
    /// Blank cell.
    Empty,
    /// Something that cannot be any of the above (nested JSON, booleans, ...).
    Malformed(String),
}

impl CellValue {
    /// Classify a raw text cell: whitespace-only text is [`CellValue::Empty`].
    pub fn from_text(s: &str) -> Self {
        if s.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Textual rendering usable as a category label.
    ///
    /// Integral numbers drop their fractional part so that material codes
    /// typed as `12345.0` read as `"12345"`. Empty and malformed cells yield
    /// `None`.
    pub fn as_label(&self) -> Option<String> {
        match self {
            CellValue::Text(s) => {
                let t = s.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
            CellValue::Number(n) if n.is_finite() => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    Some(format!("{}", *n as i64))
                } else {
                    Some(n.to_string())
                }
            }
            CellValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            _ => None,
        }
    }
}

impl From<&serde_json::Value> for CellValue {
    fn from(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => CellValue::Empty,
            Value::String(s) => CellValue::from_text(s),
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.is_finite() => CellValue::Number(f),
                _ => CellValue::Malformed(n.to_string()),
            },
            other => CellValue::Malformed(other.to_string()),
        }
    }
}

// ── RawRecord ─────────────────────────────────────────────────────────────────

/// One untyped input row: column label → cell.
///
/// Labels are kept exactly as the source spelled them; header resolution is
/// the normalizer's job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub cells: BTreeMap<String, CellValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, label: impl Into<String>, value: CellValue) -> Self {
        self.cells.insert(label.into(), value);
        self
    }

    pub fn insert(&mut self, label: impl Into<String>, value: CellValue) {
        self.cells.insert(label.into(), value);
    }

    pub fn get(&self, label: &str) -> Option<&CellValue> {
        self.cells.get(label)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, CellValue)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, CellValue)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

// ── CanonicalRecord ───────────────────────────────────────────────────────────

/// A normalized, validated input row.
///
/// Metric values are finite; a metric with no usable value is absent from
/// the map rather than stored as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub period: Period,
    pub brand: String,
    pub idh: String,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl CanonicalRecord {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

// ── Error log ─────────────────────────────────────────────────────────────────

/// Category of a recoverable normalization problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A cell could not be interpreted; the field (or the whole row) was dropped.
    ParseError,
    /// A brand/IDH did not match the registry and was tagged `UNKNOWN`.
    CategoryUnmatched,
    /// A metric cell was blank.
    MetricMissing,
}

/// One logged normalization event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Zero-based index of the row in the input sequence.
    pub row_index: usize,
    pub kind: ErrorKind,
    /// Canonical field the event concerns, when it is field-level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub detail: String,
    /// `true` when the whole row was skipped because of this event.
    #[serde(default)]
    pub row_dropped: bool,
}

/// Ordered collection of [`ErrorEntry`] values produced by one normalization
/// run. At most one entry per row carries `row_dropped = true`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorLog {
    pub entries: Vec<ErrorEntry>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a field-level event; the row is kept.
    pub fn record(
        &mut self,
        row_index: usize,
        kind: ErrorKind,
        field: Option<&str>,
        detail: impl Into<String>,
    ) {
        self.entries.push(ErrorEntry {
            row_index,
            kind,
            field: field.map(str::to_string),
            detail: detail.into(),
            row_dropped: false,
        });
    }

    /// Record that a row was skipped entirely.
    pub fn record_dropped(&mut self, row_index: usize, detail: impl Into<String>) {
        self.entries.push(ErrorEntry {
            row_index,
            kind: ErrorKind::ParseError,
            field: None,
            detail: detail.into(),
            row_dropped: true,
        });
    }

    /// Number of rows skipped entirely.
    pub fn dropped_rows(&self) -> usize {
        self.entries.iter().filter(|e| e.row_dropped).count()
    }

    /// Number of entries of the given kind.
    pub fn count(&self, kind: ErrorKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    /// All entries concerning one row.
    pub fn for_row(&self, row_index: usize) -> impl Iterator<Item = &ErrorEntry> {
        self.entries.iter().filter(move |e| e.row_index == row_index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
