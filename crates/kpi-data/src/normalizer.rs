//! Raw spreadsheet rows → canonical records plus an error log.
//!
//! Every input row ends up either as exactly one [`CanonicalRecord`] or as
//! exactly one dropped-row entry in the [`ErrorLog`]. Field-level problems
//! are logged but never abort the row, and no row-level problem aborts the
//! batch.

use std::collections::{BTreeMap, HashMap};

use kpi_core::data_processors::{NumberParser, ParsedCell, PeriodParser};
use kpi_core::error::{KpiError, Result};
use kpi_core::fuzzy::{CategoryMatch, CategoryMatcher};
use kpi_core::models::{
    CanonicalRecord, CellValue, ErrorKind, ErrorLog, RawRecord, ALL_SCOPE, UNKNOWN_CATEGORY,
};
use kpi_core::period::Period;
use kpi_core::settings::{AnalyticsConfig, MissingMetricPolicy};
use kpi_core::text::{category_key, normalize_label};
use tracing::{debug, info, warn};

// ── Public types ──────────────────────────────────────────────────────────────

/// Result of one normalization pass.
#[derive(Debug, Clone, Default)]
pub struct NormalizeOutput {
    pub records: Vec<CanonicalRecord>,
    pub errors: ErrorLog,
}

/// Canonical role of an input column.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Column {
    Period,
    Year,
    Month,
    Brand,
    Idh,
    Metric(String),
    Ignored,
}

/// Cells of one row grouped by canonical role.
#[derive(Default)]
struct RowCells<'r> {
    period: Option<&'r CellValue>,
    year: Option<&'r CellValue>,
    month: Option<&'r CellValue>,
    brand: Option<&'r CellValue>,
    idh: Option<&'r CellValue>,
    metrics: BTreeMap<String, &'r CellValue>,
}

/// Keep the first non-blank cell seen for a role.
fn keep_first<'r>(slot: &mut Option<&'r CellValue>, cell: &'r CellValue) {
    if slot.map_or(true, CellValue::is_empty) {
        *slot = Some(cell);
    }
}

// ── Normalizer ────────────────────────────────────────────────────────────────

/// Turns untyped rows into [`CanonicalRecord`]s according to an
/// [`AnalyticsConfig`].
pub struct Normalizer<'c> {
    config: &'c AnalyticsConfig,
    brands: CategoryMatcher,
    idhs: CategoryMatcher,
}

impl<'c> Normalizer<'c> {
    pub fn new(config: &'c AnalyticsConfig) -> Self {
        let distance = config.normalizer.fuzzy_max_distance;
        Self {
            config,
            brands: CategoryMatcher::new(&config.registry.brands, distance),
            idhs: CategoryMatcher::new(&config.registry.idhs, distance),
        }
    }

    /// Normalize `rows` in order.
    ///
    /// Fails only when not a single row could be normalized (this includes
    /// an empty input).
    pub fn normalize(&self, rows: &[RawRecord]) -> Result<NormalizeOutput> {
        let mut output = NormalizeOutput::default();
        let mut columns: HashMap<&str, Column> = HashMap::new();

        for (index, row) in rows.iter().enumerate() {
            let cells = self.group_cells(row, &mut columns);
            if let Some(record) = self.normalize_row(index, &cells, &mut output.errors) {
                output.records.push(record);
            }
        }

        let dropped = output.errors.dropped_rows();
        let unmatched = output.errors.count(ErrorKind::CategoryUnmatched);
        if dropped > 0 || unmatched > 0 {
            warn!(
                rows = rows.len(),
                dropped,
                unmatched,
                "Normalization skipped or re-tagged rows"
            );
        }
        info!(
            rows = rows.len(),
            records = output.records.len(),
            errors = output.errors.len(),
            "Normalized input rows"
        );

        if output.records.is_empty() {
            return Err(KpiError::NoParseableRows {
                total_rows: rows.len(),
            });
        }
        Ok(output)
    }

    // ── Header resolution ─────────────────────────────────────────────────────

    /// Decide what a raw column label carries.
    fn classify(&self, label: &str) -> Column {
        let header = normalize_label(label);
        let aliases = &self.config.normalizer.columns;
        let matches = |list: &[String]| list.iter().any(|a| normalize_label(a) == header);

        if matches(&aliases.period) {
            Column::Period
        } else if matches(&aliases.year) {
            Column::Year
        } else if matches(&aliases.month) {
            Column::Month
        } else if matches(&aliases.brand) {
            Column::Brand
        } else if matches(&aliases.idh) {
            Column::Idh
        } else if let Some(metric) = self.config.registry.metric_for_header(&header) {
            Column::Metric(metric.to_string())
        } else {
            Column::Ignored
        }
    }

    fn group_cells<'r>(
        &self,
        row: &'r RawRecord,
        columns: &mut HashMap<&'r str, Column>,
    ) -> RowCells<'r> {
        let mut cells = RowCells::default();
        for (label, cell) in &row.cells {
            let column = columns.entry(label.as_str()).or_insert_with(|| {
                let column = self.classify(label);
                debug!(label = %label, ?column, "Resolved column header");
                column
            });
            match column {
                Column::Period => keep_first(&mut cells.period, cell),
                Column::Year => keep_first(&mut cells.year, cell),
                Column::Month => keep_first(&mut cells.month, cell),
                Column::Brand => keep_first(&mut cells.brand, cell),
                Column::Idh => keep_first(&mut cells.idh, cell),
                Column::Metric(name) => {
                    let slot = cells.metrics.entry(name.clone()).or_insert(cell);
                    if slot.is_empty() {
                        *slot = cell;
                    }
                }
                Column::Ignored => {}
            }
        }
        cells
    }

    // ── Row normalization ─────────────────────────────────────────────────────

    fn normalize_row(
        &self,
        index: usize,
        cells: &RowCells<'_>,
        errors: &mut ErrorLog,
    ) -> Option<CanonicalRecord> {
        let period = match self.resolve_period(index, cells, errors) {
            Ok(period) => period,
            Err(detail) => {
                debug!(row = index, %detail, "Dropping row");
                errors.record_dropped(index, detail);
                return None;
            }
        };

        let metrics = self.resolve_metrics(index, cells, errors);
        if metrics.is_empty() {
            errors.record_dropped(index, "no usable metric value");
            return None;
        }

        let brand = self.resolve_category(index, "brand", cells.brand, &self.brands, errors);
        let idh = self.resolve_category(index, "idh", cells.idh, &self.idhs, errors);

        Some(CanonicalRecord {
            period,
            brand,
            idh,
            metrics,
        })
    }

    /// Period column first, then the year + month pair.
    ///
    /// An unparseable period cell falls back to year + month when the row
    /// has both; the bad cell is then logged and the row kept.
    fn resolve_period(
        &self,
        index: usize,
        cells: &RowCells<'_>,
        errors: &mut ErrorLog,
    ) -> std::result::Result<Period, String> {
        let mut bad_period = None;
        if let Some(cell) = cells.period.filter(|c| !c.is_empty()) {
            match PeriodParser::parse_cell(cell) {
                ParsedCell::Value(p) => return Ok(p),
                ParsedCell::Invalid(raw) => bad_period = Some(raw),
                ParsedCell::Missing => {}
            }
        }

        let from_parts = match (cells.year, cells.month) {
            (Some(year), Some(month)) => match PeriodParser::from_year_month(year, month) {
                ParsedCell::Value(p) => Ok(p),
                ParsedCell::Invalid(raw) => Err(format!("unparseable year/month '{}'", raw)),
                ParsedCell::Missing => Err("missing period".to_string()),
            },
            _ => Err("missing period".to_string()),
        };

        match (from_parts, bad_period) {
            (Ok(p), Some(raw)) => {
                errors.record(
                    index,
                    ErrorKind::ParseError,
                    Some("period"),
                    format!("unparseable period '{}', used year/month {}", raw, p),
                );
                Ok(p)
            }
            (Ok(p), None) => Ok(p),
            (Err(_), Some(raw)) => Err(format!("unparseable period '{}'", raw)),
            (Err(detail), None) => Err(detail),
        }
    }

    /// Parse every metric cell of the row; problems are logged per field.
    fn resolve_metrics(
        &self,
        index: usize,
        cells: &RowCells<'_>,
        errors: &mut ErrorLog,
    ) -> BTreeMap<String, f64> {
        let options = &self.config.normalizer;
        let mut values = BTreeMap::new();
        let mut blanks = Vec::new();

        for (name, cell) in &cells.metrics {
            match NumberParser::parse_cell(cell, options.decimal) {
                ParsedCell::Value(v) if !v.is_finite() => {
                    errors.record(index, ErrorKind::ParseError, Some(name), "non-finite value");
                }
                ParsedCell::Value(v) if v < 0.0 && !options.allow_negative => {
                    errors.record(
                        index,
                        ErrorKind::ParseError,
                        Some(name),
                        format!("negative value {} dropped", v),
                    );
                }
                ParsedCell::Value(v) => {
                    values.insert(name.clone(), v);
                }
                ParsedCell::Missing => {
                    errors.record(index, ErrorKind::MetricMissing, Some(name), "blank cell");
                    blanks.push(name.clone());
                }
                ParsedCell::Invalid(raw) => {
                    errors.record(
                        index,
                        ErrorKind::ParseError,
                        Some(name),
                        format!("unparseable number '{}'", raw),
                    );
                }
            }
        }

        // Zero-filling only applies to rows that carried at least one value.
        if options.missing_metrics == MissingMetricPolicy::Zero && !values.is_empty() {
            for name in blanks {
                values.insert(name, 0.0);
            }
        }
        values
    }

    /// Registry match, else `UNKNOWN` (logged). Open dimensions accept the
    /// cleaned value as-is.
    fn resolve_category(
        &self,
        index: usize,
        field: &str,
        cell: Option<&CellValue>,
        matcher: &CategoryMatcher,
        errors: &mut ErrorLog,
    ) -> String {
        let Some(raw) = cell.and_then(CellValue::as_label) else {
            errors.record(
                index,
                ErrorKind::CategoryUnmatched,
                Some(field),
                format!("blank {}", field),
            );
            return UNKNOWN_CATEGORY.to_string();
        };

        if matcher.is_open() {
            let key = category_key(&raw);
            if key != ALL_SCOPE {
                return key;
            }
            errors.record(
                index,
                ErrorKind::CategoryUnmatched,
                Some(field),
                format!("'{}' collides with the roll-up label", raw),
            );
            return UNKNOWN_CATEGORY.to_string();
        }

        match matcher.resolve(&raw) {
            CategoryMatch::Exact(canonical) => canonical,
            CategoryMatch::Fuzzy {
                canonical,
                distance,
            } => {
                debug!(row = index, field, raw = %raw, canonical = %canonical, distance, "Fuzzy category match");
                canonical
            }
            CategoryMatch::Unmatched => {
                errors.record(
                    index,
                    ErrorKind::CategoryUnmatched,
                    Some(field),
                    format!("'{}' not in registry", raw),
                );
                UNKNOWN_CATEGORY.to_string()
            }
        }
    }
}

/// Convenience wrapper around [`Normalizer::normalize`].
pub fn normalize(rows: &[RawRecord], config: &AnalyticsConfig) -> Result<NormalizeOutput> {
    Normalizer::new(config).normalize(rows)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
