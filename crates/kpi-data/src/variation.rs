//! Period-over-period variations per `(brand, idh, metric)` series.

use std::collections::BTreeMap;

use kpi_core::period::Period;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregator::{AggregateBucket, AggregateIndex};

// ── VariationResult ───────────────────────────────────────────────────────────

/// Change of one series between two consecutive available periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationResult {
    pub metric: String,
    pub brand: String,
    pub idh: String,
    pub period_from: Period,
    pub period_to: Period,
    pub value_from: f64,
    pub value_to: f64,
    /// `value_to - value_from`.
    pub delta: f64,
    /// `delta / value_from` as a fraction; `None` when `value_from` is zero.
    pub pct_change: Option<f64>,
}

impl VariationResult {
    fn between(
        metric: &str,
        brand: &str,
        idh: &str,
        (period_from, value_from): (Period, f64),
        (period_to, value_to): (Period, f64),
    ) -> Self {
        let delta = value_to - value_from;
        let pct_change = (value_from != 0.0).then(|| delta / value_from);
        Self {
            metric: metric.to_string(),
            brand: brand.to_string(),
            idh: idh.to_string(),
            period_from,
            period_to,
            value_from,
            value_to,
            delta,
            pct_change,
        }
    }
}

// ── VariationSet ──────────────────────────────────────────────────────────────

/// Every variation of one aggregate index.
///
/// Ordered by brand, idh, metric (index order), then period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariationSet {
    pub entries: Vec<VariationResult>,
}

impl VariationSet {
    /// The variation of one series ending at `period_to`.
    pub fn find(
        &self,
        metric: &str,
        brand: &str,
        idh: &str,
        period_to: Period,
    ) -> Option<&VariationResult> {
        self.entries.iter().find(|v| {
            v.period_to == period_to && v.metric == metric && v.brand == brand && v.idh == idh
        })
    }

    /// Variations ending at `period`.
    pub fn ending_at(&self, period: Period) -> impl Iterator<Item = &VariationResult> {
        self.entries.iter().filter(move |v| v.period_to == period)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariationResult> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── VariationCalculator ───────────────────────────────────────────────────────

/// Stateless helper computing deltas from an [`AggregateIndex`].
pub struct VariationCalculator;

impl VariationCalculator {
    /// Compute variations for every tracked series.
    ///
    /// The first available period of a series has no entry. A period missing
    /// from a series is skipped, so `period_from` is the previous period that
    /// carried a value.
    pub fn compute(index: &AggregateIndex) -> VariationSet {
        // (brand, idh) → buckets in period order.
        let mut by_scope: BTreeMap<(&str, &str), Vec<(Period, &AggregateBucket)>> = BTreeMap::new();
        for (key, bucket) in index.iter() {
            by_scope
                .entry((key.brand.as_str(), key.idh.as_str()))
                .or_default()
                .push((key.period, bucket));
        }

        let mut entries = Vec::new();
        for ((brand, idh), buckets) in &by_scope {
            for metric in index.metrics() {
                let series: Vec<(Period, f64)> = buckets
                    .iter()
                    .filter_map(|(period, b)| b.value(metric).map(|v| (*period, v)))
                    .collect();
                entries.extend(
                    series
                        .windows(2)
                        .map(|w| VariationResult::between(metric, brand, idh, w[0], w[1])),
                );
            }
        }

        debug!(
            series = by_scope.len() * index.metrics().len(),
            variations = entries.len(),
            "Computed variations"
        );
        VariationSet { entries }
    }
}

/// Convenience wrapper around [`VariationCalculator::compute`].
pub fn compute_variations(index: &AggregateIndex) -> VariationSet {
    VariationCalculator::compute(index)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::KpiAggregator;
    use kpi_core::models::{CanonicalRecord, ALL_SCOPE};

    fn rec(period: &str, brand: &str, idh: &str, ventas: f64) -> CanonicalRecord {
        CanonicalRecord {
            period: period.parse().unwrap(),
            brand: brand.to_string(),
            idh: idh.to_string(),
            metrics: [("VENTAS".to_string(), ventas)].into_iter().collect(),
        }
    }

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    fn index(records: &[CanonicalRecord]) -> AggregateIndex {
        KpiAggregator::aggregate(records, &["VENTAS".to_string()])
    }

    fn leaf<'a>(set: &'a VariationSet, brand: &str, idh: &str) -> Vec<&'a VariationResult> {
        set.iter().filter(|v| v.brand == brand && v.idh == idh).collect()
    }

    // ── compute ───────────────────────────────────────────────────────────────

    #[test]
    fn test_series_deltas_and_pct() {
        let set = compute_variations(&index(&[
            rec("2024-01", "A", "X", 100.0),
            rec("2024-02", "A", "X", 150.0),
            rec("2024-03", "A", "X", 120.0),
        ]));
        let series = leaf(&set, "A", "X");
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].period_to, p("2024-02"));
        assert_eq!(series[0].delta, 50.0);
        assert_eq!(series[0].pct_change, Some(0.5));
        assert_eq!(series[1].delta, -30.0);
        assert_eq!(series[1].pct_change, Some(-0.2));
    }

    #[test]
    fn test_first_period_has_no_entry() {
        let set = compute_variations(&index(&[rec("2024-01", "A", "X", 100.0)]));
        assert!(set.is_empty());
    }

    #[test]
    fn test_zero_base_has_null_pct() {
        let set = compute_variations(&index(&[
            rec("2024-01", "A", "X", 0.0),
            rec("2024-02", "A", "X", 40.0),
        ]));
        let v = set.find("VENTAS", "A", "X", p("2024-02")).unwrap();
        assert_eq!(v.delta, 40.0);
        assert_eq!(v.pct_change, None);
    }

    #[test]
    fn test_gap_uses_previous_available_period() {
        let set = compute_variations(&index(&[
            rec("2024-01", "A", "X", 100.0),
            rec("2024-04", "A", "X", 90.0),
        ]));
        let v = set.find("VENTAS", "A", "X", p("2024-04")).unwrap();
        assert_eq!(v.period_from, p("2024-01"));
        assert_eq!(v.delta, -10.0);
    }

    #[test]
    fn test_rollup_series_included() {
        let set = compute_variations(&index(&[
            rec("2024-01", "A", "X", 10.0),
            rec("2024-01", "B", "X", 10.0),
            rec("2024-02", "A", "X", 30.0),
        ]));
        let total = set
            .find("VENTAS", ALL_SCOPE, ALL_SCOPE, p("2024-02"))
            .unwrap();
        assert_eq!(total.value_from, 20.0);
        assert_eq!(total.value_to, 30.0);
        // Brand B has no February bucket, so no variation.
        assert!(set.find("VENTAS", "B", ALL_SCOPE, p("2024-02")).is_none());
        assert_eq!(set.ending_at(p("2024-02")).count(), 4);
    }

    #[test]
    fn test_compute_is_deterministic() {
        let records = vec![
            rec("2024-02", "B", "Y", 3.0),
            rec("2024-01", "A", "X", 1.0),
            rec("2024-02", "A", "X", 2.0),
            rec("2024-01", "B", "Y", 5.0),
        ];
        assert_eq!(compute_variations(&index(&records)), compute_variations(&index(&records)));
    }
}
