//! KPI aggregation over `(period, brand, idh)` buckets.
//!
//! Every canonical record feeds four buckets: its own `(brand, idh)` pair,
//! the brand roll-up `(brand, ALL)`, the IDH roll-up `(ALL, idh)` and the
//! grand total `(ALL, ALL)`. Ratio metrics are derived per bucket after
//! summing.

use std::collections::{BTreeMap, BTreeSet};

use kpi_core::models::{CanonicalRecord, ALL_SCOPE};
use kpi_core::period::Period;
use kpi_core::registry::{CategoryRegistry, RatioMetric};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ── AggregateKey ──────────────────────────────────────────────────────────────

/// Bucket key. Ordering is period, then brand, then idh.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AggregateKey {
    pub period: Period,
    pub brand: String,
    pub idh: String,
}

impl AggregateKey {
    pub fn new(period: Period, brand: impl Into<String>, idh: impl Into<String>) -> Self {
        Self {
            period,
            brand: brand.into(),
            idh: idh.into(),
        }
    }

    /// The `(ALL, ALL)` key for `period`.
    pub fn grand_total(period: Period) -> Self {
        Self::new(period, ALL_SCOPE, ALL_SCOPE)
    }
}

// ── AggregateBucket ───────────────────────────────────────────────────────────

/// Summed metric totals for one key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateBucket {
    /// Sum per metric. A metric no contributing record carried is absent.
    pub totals: BTreeMap<String, f64>,
    /// Ratio metrics derived from `totals`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub derived: BTreeMap<String, f64>,
    /// Number of canonical records summed into this bucket.
    pub record_count: usize,
}

impl AggregateBucket {
    fn add_record(&mut self, record: &CanonicalRecord, metrics: &[String]) {
        for name in metrics {
            if let Some(v) = record.metric(name) {
                *self.totals.entry(name.clone()).or_insert(0.0) += v;
            }
        }
        self.record_count += 1;
    }

    fn derive(&mut self, ratios: &[RatioMetric]) {
        for ratio in ratios {
            let num = self.totals.get(&ratio.numerator);
            let den = self.totals.get(&ratio.denominator);
            if let (Some(num), Some(den)) = (num, den) {
                if *den != 0.0 {
                    self.derived.insert(ratio.name.clone(), num / den);
                }
            }
        }
    }

    /// Summed or derived value of `metric`.
    pub fn value(&self, metric: &str) -> Option<f64> {
        self.totals
            .get(metric)
            .or_else(|| self.derived.get(metric))
            .copied()
    }
}

// ── AggregateIndex ────────────────────────────────────────────────────────────

/// Immutable result of one aggregation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateIndex {
    buckets: BTreeMap<AggregateKey, AggregateBucket>,
    /// Summed metrics followed by ratio metrics.
    metrics: Vec<String>,
}

impl AggregateIndex {
    pub fn get(&self, key: &AggregateKey) -> Option<&AggregateBucket> {
        self.buckets.get(key)
    }

    /// Value of `metric` for `(period, brand, idh)`; use `ALL` for roll-ups.
    pub fn value(&self, period: Period, brand: &str, idh: &str, metric: &str) -> Option<f64> {
        self.buckets
            .get(&AggregateKey::new(period, brand, idh))
            .and_then(|b| b.value(metric))
    }

    /// Metric names this index carries.
    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    /// Buckets in display order: period, brand, idh ascending.
    pub fn iter(&self) -> impl Iterator<Item = (&AggregateKey, &AggregateBucket)> {
        self.buckets.iter()
    }

    /// Distinct periods, ascending.
    pub fn periods(&self) -> Vec<Period> {
        let set: BTreeSet<Period> = self.buckets.keys().map(|k| k.period).collect();
        set.into_iter().collect()
    }

    pub fn latest_period(&self) -> Option<Period> {
        self.buckets.keys().next_back().map(|k| k.period)
    }

    pub fn contains_period(&self, period: Period) -> bool {
        self.buckets.contains_key(&AggregateKey::grand_total(period))
    }

    /// Distinct brands (roll-up label excluded), ascending.
    pub fn brands(&self) -> Vec<String> {
        self.distinct(|k| &k.brand)
    }

    /// Distinct IDHs (roll-up label excluded), ascending.
    pub fn idhs(&self) -> Vec<String> {
        self.distinct(|k| &k.idh)
    }

    /// `(period, value)` pairs of one series, ascending by period.
    pub fn series(&self, brand: &str, idh: &str, metric: &str) -> Vec<(Period, f64)> {
        self.buckets
            .iter()
            .filter(|(k, _)| k.brand == brand && k.idh == idh)
            .filter_map(|(k, b)| b.value(metric).map(|v| (k.period, v)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    fn distinct(&self, field: impl Fn(&AggregateKey) -> &String) -> Vec<String> {
        let set: BTreeSet<&String> = self
            .buckets
            .keys()
            .map(field)
            .filter(|v| v.as_str() != ALL_SCOPE)
            .collect();
        set.into_iter().cloned().collect()
    }
}

// ── KpiAggregator ─────────────────────────────────────────────────────────────

/// Stateless helper that groups canonical records into buckets.
pub struct KpiAggregator;

impl KpiAggregator {
    /// Sum `metric_names` per bucket.
    ///
    /// Pure: the same records always produce the same index, and duplicate
    /// rows for one key are summed.
    pub fn aggregate(records: &[CanonicalRecord], metric_names: &[String]) -> AggregateIndex {
        Self::aggregate_with_ratios(records, metric_names, &[])
    }

    /// Sum every registry metric and derive its ratios.
    pub fn from_registry(records: &[CanonicalRecord], registry: &CategoryRegistry) -> AggregateIndex {
        Self::aggregate_with_ratios(records, &registry.metric_names(), &registry.ratios)
    }

    pub fn aggregate_with_ratios(
        records: &[CanonicalRecord],
        metric_names: &[String],
        ratios: &[RatioMetric],
    ) -> AggregateIndex {
        let mut buckets: BTreeMap<AggregateKey, AggregateBucket> = BTreeMap::new();

        for record in records {
            let scopes = [
                (record.brand.as_str(), record.idh.as_str()),
                (record.brand.as_str(), ALL_SCOPE),
                (ALL_SCOPE, record.idh.as_str()),
                (ALL_SCOPE, ALL_SCOPE),
            ];
            for (brand, idh) in scopes {
                buckets
                    .entry(AggregateKey::new(record.period, brand, idh))
                    .or_default()
                    .add_record(record, metric_names);
            }
        }

        for bucket in buckets.values_mut() {
            bucket.derive(ratios);
        }

        let metrics = metric_names
            .iter()
            .cloned()
            .chain(ratios.iter().map(|r| r.name.clone()))
            .collect();

        debug!(
            records = records.len(),
            buckets = buckets.len(),
            "Aggregated canonical records"
        );

        AggregateIndex { buckets, metrics }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(period: &str, brand: &str, idh: &str, metrics: &[(&str, f64)]) -> CanonicalRecord {
        CanonicalRecord {
            period: period.parse().unwrap(),
            brand: brand.to_string(),
            idh: idh.to_string(),
            metrics: metrics.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    // ── aggregate ─────────────────────────────────────────────────────────────

    #[test]
    fn test_duplicates_are_summed() {
        let records = vec![
            rec("2024-01", "A", "X", &[("VENTAS", 50.0)]),
            rec("2024-01", "A", "X", &[("VENTAS", 30.0)]),
        ];
        let index = KpiAggregator::aggregate(&records, &names(&["VENTAS"]));
        assert_eq!(index.value(p("2024-01"), "A", "X", "VENTAS"), Some(80.0));
        assert_eq!(
            index.get(&AggregateKey::new(p("2024-01"), "A", "X")).unwrap().record_count,
            2
        );
    }

    #[test]
    fn test_rollups_materialized() {
        let records = vec![
            rec("2024-01", "A", "X", &[("VENTAS", 10.0)]),
            rec("2024-01", "A", "Y", &[("VENTAS", 20.0)]),
            rec("2024-01", "B", "X", &[("VENTAS", 5.0)]),
        ];
        let index = KpiAggregator::aggregate(&records, &names(&["VENTAS"]));
        let jan = p("2024-01");
        assert_eq!(index.value(jan, "A", ALL_SCOPE, "VENTAS"), Some(30.0));
        assert_eq!(index.value(jan, ALL_SCOPE, "X", "VENTAS"), Some(15.0));
        assert_eq!(index.value(jan, ALL_SCOPE, ALL_SCOPE, "VENTAS"), Some(35.0));
        // 3 pairs + 2 brand roll-ups + 2 idh roll-ups + 1 grand total
        assert_eq!(index.len(), 8);
    }

    #[test]
    fn test_grand_total_equals_sum_of_leaf_buckets() {
        let records = vec![
            rec("2024-01", "A", "X", &[("VENTAS", 1.5)]),
            rec("2024-01", "B", "Y", &[("VENTAS", 2.25)]),
            rec("2024-01", "C", "Z", &[("VENTAS", 4.0)]),
        ];
        let index = KpiAggregator::aggregate(&records, &names(&["VENTAS"]));
        let leaf_sum: f64 = index
            .iter()
            .filter(|(k, _)| k.brand != ALL_SCOPE && k.idh != ALL_SCOPE)
            .filter_map(|(_, b)| b.value("VENTAS"))
            .sum();
        assert_eq!(
            index.value(p("2024-01"), ALL_SCOPE, ALL_SCOPE, "VENTAS"),
            Some(leaf_sum)
        );
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let records = vec![
            rec("2024-02", "B", "Y", &[("VENTAS", 0.1), ("VOL", 3.0)]),
            rec("2024-01", "A", "X", &[("VENTAS", 0.2)]),
            rec("2024-01", "A", "X", &[("VENTAS", 0.3)]),
        ];
        let metrics = names(&["VENTAS", "VOL"]);
        let first = KpiAggregator::aggregate(&records, &metrics);
        let second = KpiAggregator::aggregate(&records, &metrics);
        assert_eq!(first, second);
    }

    #[test]
    fn test_absent_metric_stays_absent() {
        let records = vec![rec("2024-01", "A", "X", &[("VENTAS", 1.0)])];
        let index = KpiAggregator::aggregate(&records, &names(&["VENTAS", "VOL"]));
        assert_eq!(index.value(p("2024-01"), "A", "X", "VOL"), None);
    }

    #[test]
    fn test_unconfigured_metric_ignored() {
        let records = vec![rec("2024-01", "A", "X", &[("OTRO", 1.0)])];
        let index = KpiAggregator::aggregate(&records, &names(&["VENTAS"]));
        assert_eq!(index.value(p("2024-01"), "A", "X", "OTRO"), None);
    }

    // ── ratios ────────────────────────────────────────────────────────────────

    #[test]
    fn test_ratio_derived_after_summing() {
        let records = vec![
            rec("2024-01", "A", "X", &[("L14", 100.0), ("VOL", 10.0)]),
            rec("2024-01", "A", "Y", &[("L14", 50.0), ("VOL", 40.0)]),
            rec("2024-01", "B", "X", &[("L14", 7.0), ("VOL", 0.0)]),
        ];
        let ratios = vec![RatioMetric::new("COSTO_UNITARIO", "L14", "VOL")];
        let index = KpiAggregator::aggregate_with_ratios(&records, &names(&["L14", "VOL"]), &ratios);
        let jan = p("2024-01");
        assert_eq!(index.value(jan, "A", ALL_SCOPE, "COSTO_UNITARIO"), Some(3.0));
        assert_eq!(index.value(jan, "B", "X", "COSTO_UNITARIO"), None);
        assert_eq!(index.metrics(), &names(&["L14", "VOL", "COSTO_UNITARIO"])[..]);
    }

    // ── accessors ─────────────────────────────────────────────────────────────

    #[test]
    fn test_periods_brands_idhs_sorted() {
        let records = vec![
            rec("2024-03", "B", "Y", &[("VENTAS", 1.0)]),
            rec("2024-01", "A", "X", &[("VENTAS", 1.0)]),
        ];
        let index = KpiAggregator::aggregate(&records, &names(&["VENTAS"]));
        assert_eq!(index.periods(), vec![p("2024-01"), p("2024-03")]);
        assert_eq!(index.latest_period(), Some(p("2024-03")));
        assert_eq!(index.brands(), names(&["A", "B"]));
        assert_eq!(index.idhs(), names(&["X", "Y"]));
        assert!(index.contains_period(p("2024-03")));
        assert!(!index.contains_period(p("2024-02")));
    }

    #[test]
    fn test_iteration_order_is_deterministic() {
        let records = vec![
            rec("2024-02", "B", "X", &[("VENTAS", 1.0)]),
            rec("2024-01", "B", "Y", &[("VENTAS", 1.0)]),
            rec("2024-01", "A", "Z", &[("VENTAS", 1.0)]),
        ];
        let index = KpiAggregator::aggregate(&records, &names(&["VENTAS"]));
        let keys: Vec<&AggregateKey> = index.iter().map(|(k, _)| k).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(keys[0].period, p("2024-01"));
        assert_eq!(keys[0].brand, "A");
    }

    #[test]
    fn test_series_skips_missing_periods() {
        let records = vec![
            rec("2024-01", "A", "X", &[("VENTAS", 100.0)]),
            rec("2024-03", "A", "X", &[("VENTAS", 120.0)]),
            rec("2024-02", "B", "X", &[("VENTAS", 1.0)]),
        ];
        let index = KpiAggregator::aggregate(&records, &names(&["VENTAS"]));
        assert_eq!(
            index.series("A", "X", "VENTAS"),
            vec![(p("2024-01"), 100.0), (p("2024-03"), 120.0)]
        );
    }
}
