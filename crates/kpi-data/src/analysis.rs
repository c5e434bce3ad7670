//! Main analysis pipeline.
//!
//! Runs normalization, aggregation and variation computation over one batch
//! of raw rows and returns an immutable [`Snapshot`] for queries and
//! summaries.

use chrono::Utc;
use kpi_core::error::Result;
use kpi_core::models::{CanonicalRecord, ErrorLog, RawRecord};
use kpi_core::period::Period;
use kpi_core::settings::AnalyticsConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregator::{AggregateIndex, KpiAggregator};
use crate::normalizer::Normalizer;
use crate::summary::{Summary, SummaryBuilder};
use crate::variation::{VariationCalculator, VariationSet};

// ── Public types ──────────────────────────────────────────────────────────────

/// Metadata produced alongside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// ISO-8601 timestamp when this snapshot was built.
    pub generated_at: String,
    /// Number of raw rows handed to the normalizer.
    pub rows_processed: usize,
    /// Number of canonical records produced.
    pub records_created: usize,
    /// Rows skipped entirely.
    pub rows_dropped: usize,
    /// Total entries in the error log.
    pub errors_logged: usize,
    /// Number of aggregate buckets, roll-ups included.
    pub buckets: usize,
    /// Number of variation entries.
    pub variations: usize,
    /// Most recent period with data.
    pub latest_period: Option<Period>,
    /// Wall-clock seconds spent normalizing.
    pub normalize_time_seconds: f64,
    /// Wall-clock seconds spent aggregating and computing variations.
    pub aggregate_time_seconds: f64,
}

/// One fully built, read-only dataset version.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub records: Vec<CanonicalRecord>,
    pub errors: ErrorLog,
    pub index: AggregateIndex,
    pub variations: VariationSet,
    pub metadata: SnapshotMetadata,
}

impl Snapshot {
    /// Highlights of `period` (latest when `None`).
    pub fn summary(&self, top_n: usize, period: Option<Period>) -> Summary {
        SummaryBuilder::build(&self.index, &self.variations, top_n, period)
    }
}

// ── Public function ───────────────────────────────────────────────────────────

/// Run the full pipeline.
///
/// 1. Normalize `rows` into canonical records and an error log.
/// 2. Aggregate every registry metric (ratios derived per bucket).
/// 3. Compute period-over-period variations.
///
/// Fails only when no row could be normalized.
pub fn build_snapshot(rows: &[RawRecord], config: &AnalyticsConfig) -> Result<Snapshot> {
    // ── Step 1: Normalize ─────────────────────────────────────────────────────
    let normalize_start = std::time::Instant::now();
    let normalized = Normalizer::new(config).normalize(rows)?;
    let normalize_time = normalize_start.elapsed().as_secs_f64();

    // ── Step 2: Aggregate and compare ─────────────────────────────────────────
    let aggregate_start = std::time::Instant::now();
    let index = KpiAggregator::from_registry(&normalized.records, &config.registry);
    let variations = VariationCalculator::compute(&index);
    let aggregate_time = aggregate_start.elapsed().as_secs_f64();

    // ── Step 3: Build result ──────────────────────────────────────────────────
    let metadata = SnapshotMetadata {
        generated_at: Utc::now().to_rfc3339(),
        rows_processed: rows.len(),
        records_created: normalized.records.len(),
        rows_dropped: normalized.errors.dropped_rows(),
        errors_logged: normalized.errors.len(),
        buckets: index.len(),
        variations: variations.len(),
        latest_period: index.latest_period(),
        normalize_time_seconds: normalize_time,
        aggregate_time_seconds: aggregate_time,
    };

    info!(
        rows = metadata.rows_processed,
        records = metadata.records_created,
        buckets = metadata.buckets,
        variations = metadata.variations,
        "Snapshot built"
    );

    Ok(Snapshot {
        records: normalized.records,
        errors: normalized.errors,
        index,
        variations,
        metadata,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use kpi_core::error::KpiError;
    use kpi_core::models::{CellValue, ALL_SCOPE};
    use kpi_core::registry::{CategoryRegistry, MetricDef, RatioMetric};

    fn config() -> AnalyticsConfig {
        AnalyticsConfig::new(CategoryRegistry {
            brands: vec!["Marca A".into(), "Marca B".into()],
            idhs: vec![],
            metrics: vec![MetricDef::new("L14"), MetricDef::new("VOL")],
            ratios: vec![RatioMetric::new("COSTO_UNITARIO", "L14", "VOL")],
        })
    }

    fn row(period: &str, brand: &str, l14: &str, vol: &str) -> RawRecord {
        RawRecord::new()
            .with("PERIODO", CellValue::from_text(period))
            .with("MARCA", CellValue::from_text(brand))
            .with("IDH", CellValue::from_text("M1"))
            .with("L14", CellValue::from_text(l14))
            .with("VOL", CellValue::from_text(vol))
    }

    #[test]
    fn test_build_snapshot_end_to_end() {
        let rows = vec![
            row("Ene-2024", "Marca A", "100", "10"),
            row("01/2024", "marca b", "50", "5"),
            row("Feb-2024", "Marca A", "150", "10"),
            row("", "Marca A", "1", "1"),
        ];
        let snap = build_snapshot(&rows, &config()).unwrap();

        assert_eq!(snap.metadata.rows_processed, 4);
        assert_eq!(snap.metadata.records_created, 3);
        assert_eq!(snap.metadata.rows_dropped, 1);
        assert_eq!(snap.metadata.latest_period.map(|p| p.to_string()).as_deref(), Some("2024-02"));

        let jan: Period = "2024-01".parse().unwrap();
        assert_eq!(snap.index.value(jan, ALL_SCOPE, ALL_SCOPE, "L14"), Some(150.0));
        assert_eq!(
            snap.index.value(jan, ALL_SCOPE, ALL_SCOPE, "COSTO_UNITARIO"),
            Some(10.0)
        );

        let feb: Period = "2024-02".parse().unwrap();
        let v = snap.variations.find("L14", "Marca A", ALL_SCOPE, feb).unwrap();
        assert_eq!(v.pct_change, Some(0.5));
    }

    #[test]
    fn test_snapshot_summary() {
        let rows = vec![
            row("2024-01", "Marca A", "100", "10"),
            row("2024-02", "Marca A", "80", "10"),
        ];
        let snap = build_snapshot(&rows, &config()).unwrap();
        let summary = snap.summary(5, None);
        assert_eq!(summary.period.map(|p| p.to_string()).as_deref(), Some("2024-02"));
        assert!(!summary.facts.is_empty());
    }

    #[test]
    fn test_build_snapshot_no_parseable_rows() {
        let rows = vec![row("", "Marca A", "1", "1")];
        assert!(matches!(
            build_snapshot(&rows, &config()),
            Err(KpiError::NoParseableRows { total_rows: 1 })
        ));
    }
}
