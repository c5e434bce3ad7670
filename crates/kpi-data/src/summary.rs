//! Executive highlights: grand totals plus the largest moves of a period.
//!
//! The output is structured facts only; turning them into prose is up to
//! whoever presents them.

use std::cmp::Ordering;

use kpi_core::models::ALL_SCOPE;
use kpi_core::period::Period;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::aggregator::AggregateIndex;
use crate::variation::{VariationResult, VariationSet};

// ── Public types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    GrandTotal,
    TopIncrease,
    TopDecrease,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    fn of(delta: Option<f64>) -> Self {
        match delta {
            Some(d) if d > 0.0 => Direction::Up,
            Some(d) if d < 0.0 => Direction::Down,
            _ => Direction::Flat,
        }
    }
}

/// One summary fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub kind: FactKind,
    pub metric: String,
    /// Brand scope, `ALL` for IDH roll-ups and grand totals.
    pub brand: String,
    /// IDH scope, `ALL` for brand roll-ups and grand totals.
    pub idh: String,
    /// Value of the metric in the summarized period.
    pub value: f64,
    /// Grand total for totals, absolute delta for moves.
    pub magnitude: f64,
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pct_change: Option<f64>,
}

impl Highlight {
    fn from_variation(kind: FactKind, v: &VariationResult) -> Self {
        Self {
            kind,
            metric: v.metric.clone(),
            brand: v.brand.clone(),
            idh: v.idh.clone(),
            value: v.value_to,
            magnitude: v.delta.abs(),
            direction: Direction::of(Some(v.delta)),
            delta: Some(v.delta),
            pct_change: v.pct_change,
        }
    }
}

/// Highlights of one period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Period summarized; `None` when the index is empty or the requested
    /// period is unknown.
    pub period: Option<Period>,
    /// Closest earlier period carrying data.
    pub previous_period: Option<Period>,
    pub facts: Vec<Highlight>,
}

// ── SummaryBuilder ────────────────────────────────────────────────────────────

/// Stateless helper that assembles a [`Summary`].
pub struct SummaryBuilder;

impl SummaryBuilder {
    /// Build the highlights of `period` (latest when `None`).
    ///
    /// Per metric: the grand total, then up to `top_n` largest increases and
    /// `top_n` largest decreases among brand and IDH roll-ups.
    pub fn build(
        index: &AggregateIndex,
        variations: &VariationSet,
        top_n: usize,
        period: Option<Period>,
    ) -> Summary {
        let Some(target) = period.or_else(|| index.latest_period()) else {
            return Summary::default();
        };
        if !index.contains_period(target) {
            warn!(period = %target, "Requested summary period has no data");
            return Summary::default();
        }

        let previous_period = index.periods().into_iter().filter(|p| *p < target).next_back();
        let mut facts = Vec::new();

        for metric in index.metrics() {
            if let Some(total) = index.value(target, ALL_SCOPE, ALL_SCOPE, metric) {
                let change = variations.find(metric, ALL_SCOPE, ALL_SCOPE, target);
                let delta = change.map(|v| v.delta);
                facts.push(Highlight {
                    kind: FactKind::GrandTotal,
                    metric: metric.clone(),
                    brand: ALL_SCOPE.to_string(),
                    idh: ALL_SCOPE.to_string(),
                    value: total,
                    magnitude: total,
                    direction: Direction::of(delta),
                    delta,
                    pct_change: change.and_then(|v| v.pct_change),
                });
            }

            let candidates: Vec<&VariationResult> = variations
                .ending_at(target)
                .filter(|v| v.metric == *metric && is_rollup(v))
                .collect();

            let mut ups: Vec<&VariationResult> =
                candidates.iter().copied().filter(|v| v.delta > 0.0).collect();
            ups.sort_by(|a, b| b.delta.partial_cmp(&a.delta).unwrap_or(Ordering::Equal));
            facts.extend(
                ups.into_iter()
                    .take(top_n)
                    .map(|v| Highlight::from_variation(FactKind::TopIncrease, v)),
            );

            let mut downs: Vec<&VariationResult> =
                candidates.iter().copied().filter(|v| v.delta < 0.0).collect();
            downs.sort_by(|a, b| a.delta.partial_cmp(&b.delta).unwrap_or(Ordering::Equal));
            facts.extend(
                downs
                    .into_iter()
                    .take(top_n)
                    .map(|v| Highlight::from_variation(FactKind::TopDecrease, v)),
            );
        }

        debug!(period = %target, facts = facts.len(), "Built summary");
        Summary {
            period: Some(target),
            previous_period,
            facts,
        }
    }
}

/// Brand roll-up `(brand, ALL)` or IDH roll-up `(ALL, idh)`.
fn is_rollup(v: &VariationResult) -> bool {
    (v.brand == ALL_SCOPE) != (v.idh == ALL_SCOPE)
}

/// Convenience wrapper around [`SummaryBuilder::build`].
pub fn build_summary(
    index: &AggregateIndex,
    variations: &VariationSet,
    top_n: usize,
    period: Option<Period>,
) -> Summary {
    SummaryBuilder::build(index, variations, top_n, period)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::KpiAggregator;
    use crate::variation::compute_variations;
    use kpi_core::models::CanonicalRecord;

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

    fn fixture() -> (AggregateIndex, VariationSet) {
        let records = vec![
            rec("2024-01", "A", "X", 100.0),
            rec("2024-01", "B", "Y", 100.0),
            rec("2024-01", "C", "Z", 100.0),
            rec("2024-02", "A", "X", 180.0),
            rec("2024-02", "B", "Y", 60.0),
            rec("2024-02", "C", "Z", 110.0),
        ];
        let index = KpiAggregator::aggregate(&records, &["VENTAS".to_string()]);
        let variations = compute_variations(&index);
        (index, variations)
    }

    fn of_kind(summary: &Summary, kind: FactKind) -> Vec<&Highlight> {
        summary.facts.iter().filter(|f| f.kind == kind).collect()
    }

    // ── build ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_latest_period_by_default() {
        let (index, variations) = fixture();
        let summary = build_summary(&index, &variations, 10, None);
        assert_eq!(summary.period, Some(p("2024-02")));
        assert_eq!(summary.previous_period, Some(p("2024-01")));

        let totals = of_kind(&summary, FactKind::GrandTotal);
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].value, 350.0);
        assert_eq!(totals[0].delta, Some(50.0));
        assert_eq!(totals[0].direction, Direction::Up);
    }

    #[test]
    fn test_top_moves_ranked_and_limited() {
        let (index, variations) = fixture();
        let summary = build_summary(&index, &variations, 1, None);

        let ups = of_kind(&summary, FactKind::TopIncrease);
        assert_eq!(ups.len(), 1);
        assert_eq!(ups[0].magnitude, 80.0);
        assert_eq!(ups[0].direction, Direction::Up);
        // Brand A and IDH X tie on +80; brand roll-ups come first.
        assert_eq!(ups[0].brand, "A");
        assert_eq!(ups[0].idh, ALL_SCOPE);

        let downs = of_kind(&summary, FactKind::TopDecrease);
        assert_eq!(downs.len(), 1);
        assert_eq!(downs[0].delta, Some(-40.0));
        assert_eq!(downs[0].direction, Direction::Down);
    }

    #[test]
    fn test_leaf_pairs_and_grand_total_not_ranked() {
        let (index, variations) = fixture();
        let summary = build_summary(&index, &variations, 10, None);
        for fact in summary.facts.iter().filter(|f| f.kind != FactKind::GrandTotal) {
            assert!((fact.brand == ALL_SCOPE) != (fact.idh == ALL_SCOPE));
        }
        // A, C, X, Z rose; B and Y fell.
        assert_eq!(of_kind(&summary, FactKind::TopIncrease).len(), 4);
        assert_eq!(of_kind(&summary, FactKind::TopDecrease).len(), 2);
    }

    #[test]
    fn test_first_period_has_totals_only() {
        let (index, variations) = fixture();
        let summary = build_summary(&index, &variations, 10, Some(p("2024-01")));
        assert_eq!(summary.previous_period, None);
        assert_eq!(summary.facts.len(), 1);
        assert_eq!(summary.facts[0].direction, Direction::Flat);
        assert_eq!(summary.facts[0].delta, None);
    }

    #[test]
    fn test_unknown_period_yields_empty_summary() {
        let (index, variations) = fixture();
        let summary = build_summary(&index, &variations, 10, Some(p("2023-06")));
        assert_eq!(summary.period, None);
        assert!(summary.facts.is_empty());
    }

    #[test]
    fn test_empty_index() {
        let summary = build_summary(&AggregateIndex::default(), &VariationSet::default(), 5, None);
        assert_eq!(summary, Summary::default());
    }
}
