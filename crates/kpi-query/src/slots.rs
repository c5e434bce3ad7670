//! Slot extraction: metric, brand, IDH and period references in a question.
//!
//! Slots are resolved by dictionary lookup against the configured registry
//! (or, for an open dimension, against the values present in the snapshot).
//! Tokens consumed by one slot are not reused by the next; extraction runs
//! period, metric, brand, then IDH.

use std::collections::BTreeMap;
use std::ops::Range;

use kpi_core::data_processors::{month_from_name, PeriodParser};
use kpi_core::fuzzy::{CategoryMatch, CategoryMatcher};
use kpi_core::period::Period;
use kpi_core::settings::AnalyticsConfig;
use kpi_core::text::tokenize;
use kpi_data::aggregator::AggregateIndex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::intent::is_keyword;
use crate::question::NormalizedQuestion;

/// Words that never form part of a brand or IDH name.
const STOPWORDS: &[&str] = &[
    "a", "al", "and", "ano", "brand", "brands", "by", "como", "con", "cual", "cuales", "de",
    "del", "desde", "el", "en", "entre", "es", "for", "fue", "hasta", "hubo", "idh", "idhs",
    "in", "is", "la", "las", "lo", "los", "marca", "marcas", "mas", "material", "materiales",
    "mayor", "menor", "menos", "mes", "meses", "month", "of", "para", "periodo", "por", "que",
    "se", "son", "the", "tiene", "tuvo", "un", "una", "was", "what", "y",
];

const BRAND_MARKERS: &[&str] = &["marca", "brand"];
const IDH_MARKERS: &[&str] = &["idh", "material"];

/// Relative period expressions and their offset from the latest period.
const RELATIVE_PERIODS: &[(&[&str], i32)] = &[
    (&["ultimo", "mes"], 0),
    (&["ultimo", "periodo"], 0),
    (&["este", "mes"], 0),
    (&["mes", "actual"], 0),
    (&["mas", "reciente"], 0),
    (&["latest", "month"], 0),
    (&["this", "month"], 0),
    (&["mes", "pasado"], -1),
    (&["mes", "anterior"], -1),
    (&["penultimo", "mes"], -1),
    (&["last", "month"], -1),
    (&["previous", "month"], -1),
];

// ── Public types ──────────────────────────────────────────────────────────────

/// Resolved references of one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slots {
    pub metric: String,
    /// `None` means every brand (the `ALL` roll-up).
    pub brand: Option<String>,
    /// `None` means every IDH (the `ALL` roll-up).
    pub idh: Option<String>,
    pub period: Period,
    /// `false` when the period defaulted to the latest available one.
    pub period_explicit: bool,
}

/// A reference the question makes that cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entity", rename_all = "snake_case")]
pub enum SlotError {
    /// Named after a brand marker but not in the registry.
    UnknownBrand(String),
    /// Named after an IDH marker but not in the registry.
    UnknownIdh(String),
    /// The period parsed but the snapshot has no data for it.
    PeriodNotAvailable(String),
    /// The snapshot holds no periods at all.
    NoData,
}

// ── Category dictionary ───────────────────────────────────────────────────────

/// Exact phrases plus per-length fuzzy matchers for one dimension.
struct CategoryDictionary {
    exact: Vec<(Vec<String>, String)>,
    /// Keyed by phrase length in tokens, so a window is only compared with
    /// names of the same length.
    fuzzy: BTreeMap<usize, CategoryMatcher>,
}

impl CategoryDictionary {
    fn new(values: &[String], max_distance: usize) -> Self {
        let exact: Vec<(Vec<String>, String)> = values
            .iter()
            .map(|v| (tokenize(v), v.clone()))
            .filter(|(tokens, _)| !tokens.is_empty())
            .collect();

        let mut by_len: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for (tokens, value) in &exact {
            by_len.entry(tokens.len()).or_default().push(value.clone());
        }
        let fuzzy = by_len
            .into_iter()
            .map(|(len, names)| (len, CategoryMatcher::new(&names, max_distance)))
            .collect();

        Self { exact, fuzzy }
    }

    /// Longest exact phrase first, then the closest fuzzy window.
    fn find(
        &self,
        q: &NormalizedQuestion,
        used: &[bool],
        reserved: &dyn Fn(&str) -> bool,
    ) -> Option<(String, Range<usize>)> {
        let free = |range: &Range<usize>| !used[range.clone()].iter().any(|u| *u);

        let mut best: Option<(String, Range<usize>)> = None;
        for (phrase, canonical) in &self.exact {
            let hit = q
                .find_phrase(phrase.as_slice())
                .into_iter()
                .map(|start| start..start + phrase.len())
                .find(|range| free(range));
            if let Some(range) = hit {
                if best.as_ref().map_or(true, |(_, r)| range.len() > r.len()) {
                    best = Some((canonical.clone(), range));
                }
            }
        }
        if best.is_some() {
            return best;
        }

        let mut closest: Option<(usize, String, Range<usize>)> = None;
        for (len, matcher) in &self.fuzzy {
            if *len > q.tokens.len() {
                continue;
            }
            for start in 0..=q.tokens.len() - len {
                let range = start..start + len;
                let window = &q.tokens[range.clone()];
                let eligible = free(&range)
                    && window.iter().all(|t| {
                        t.chars().count() >= 4
                            && !t.chars().all(|c| c.is_ascii_digit())
                            && !reserved(t)
                    });
                if !eligible {
                    continue;
                }
                let (canonical, distance) = match matcher.resolve(&window.join(" ")) {
                    CategoryMatch::Exact(c) => (c, 0),
                    CategoryMatch::Fuzzy {
                        canonical,
                        distance,
                    } => (canonical, distance),
                    CategoryMatch::Unmatched => continue,
                };
                if closest.as_ref().map_or(true, |(d, _, _)| distance < *d) {
                    closest = Some((distance, canonical, range));
                }
            }
        }
        closest.map(|(_, canonical, range)| (canonical, range))
    }
}

// ── SlotResolver ──────────────────────────────────────────────────────────────

/// Extracts [`Slots`] from questions for one configuration.
pub struct SlotResolver {
    /// `(tokens, canonical)` for every metric spelling.
    metrics: Vec<(Vec<String>, String)>,
    default_metric: String,
    brands: Vec<String>,
    idhs: Vec<String>,
    max_distance: usize,
}

impl SlotResolver {
    pub fn new(config: &AnalyticsConfig) -> Self {
        let registry = &config.registry;
        let mut metrics = Vec::new();
        for m in &registry.metrics {
            metrics.extend(m.spellings().map(|s| (tokenize(s), m.name.clone())));
        }
        for r in &registry.ratios {
            metrics.extend(r.spellings().map(|s| (tokenize(s), r.name.clone())));
        }
        metrics.retain(|(tokens, _)| !tokens.is_empty());

        Self {
            metrics,
            default_metric: registry
                .all_metric_names()
                .into_iter()
                .next()
                .unwrap_or_default(),
            brands: registry.brands.clone(),
            idhs: registry.idhs.clone(),
            max_distance: config.normalizer.fuzzy_max_distance,
        }
    }

    /// Resolve every slot of `q` against `index`.
    ///
    /// With `strict_names`, a word following a brand/IDH marker ("marca X")
    /// that matches nothing is reported instead of silently ignored.
    pub fn resolve(
        &self,
        q: &NormalizedQuestion,
        index: &AggregateIndex,
        strict_names: bool,
    ) -> Result<Slots, SlotError> {
        let mut used = vec![false; q.tokens.len()];

        let explicit = self.find_period(q, index, &mut used)?;
        let (period, period_explicit) = match explicit {
            Some(p) => (p, true),
            None => (index.latest_period().ok_or(SlotError::NoData)?, false),
        };

        let metric = self.find_metric(q, &mut used);
        let reserved = |t: &str| self.is_reserved(t);

        let brand_values = if self.brands.is_empty() {
            index.brands()
        } else {
            self.brands.clone()
        };
        let brand = CategoryDictionary::new(&brand_values, self.max_distance)
            .find(q, &used, &reserved)
            .map(|(name, range)| {
                used[range].iter_mut().for_each(|u| *u = true);
                name
            });
        if brand.is_none() && strict_names {
            if let Some(name) = unresolved_name(q, BRAND_MARKERS, &used, &reserved) {
                return Err(SlotError::UnknownBrand(name));
            }
        }

        let idh_values = if self.idhs.is_empty() {
            index.idhs()
        } else {
            self.idhs.clone()
        };
        let idh = CategoryDictionary::new(&idh_values, self.max_distance)
            .find(q, &used, &reserved)
            .map(|(name, range)| {
                used[range].iter_mut().for_each(|u| *u = true);
                name
            });
        if idh.is_none() && strict_names {
            if let Some(name) = unresolved_name(q, IDH_MARKERS, &used, &reserved) {
                return Err(SlotError::UnknownIdh(name));
            }
        }

        let slots = Slots {
            metric,
            brand,
            idh,
            period,
            period_explicit,
        };
        debug!(?slots, "Resolved slots");
        Ok(slots)
    }

    // ── Metric ────────────────────────────────────────────────────────────────

    fn find_metric(&self, q: &NormalizedQuestion, used: &mut [bool]) -> String {
        let mut best: Option<(&String, Range<usize>)> = None;
        for (phrase, canonical) in &self.metrics {
            let hit = q
                .find_phrase(phrase.as_slice())
                .into_iter()
                .map(|start| start..start + phrase.len())
                .find(|range| !used[range.clone()].iter().any(|u| *u));
            if let Some(range) = hit {
                if best.as_ref().map_or(true, |(_, r)| range.len() > r.len()) {
                    best = Some((canonical, range));
                }
            }
        }
        match best {
            Some((canonical, range)) => {
                used[range].iter_mut().for_each(|u| *u = true);
                canonical.clone()
            }
            None => self.default_metric.clone(),
        }
    }

    fn is_reserved(&self, token: &str) -> bool {
        STOPWORDS.contains(&token)
            || is_keyword(token)
            || month_from_name(token).is_some()
            || self.metrics.iter().any(|(tokens, _)| tokens.iter().any(|t| t == token))
    }

    // ── Period ────────────────────────────────────────────────────────────────

    /// An explicit period reference, checked against the snapshot.
    fn find_period(
        &self,
        q: &NormalizedQuestion,
        index: &AggregateIndex,
        used: &mut [bool],
    ) -> Result<Option<Period>, SlotError> {
        let Some((period, range)) = self.parse_period(q, index)? else {
            return Ok(None);
        };
        used[range].iter_mut().for_each(|u| *u = true);
        if !index.contains_period(period) {
            return Err(SlotError::PeriodNotAvailable(period.to_string()));
        }
        Ok(Some(period))
    }

    fn parse_period(
        &self,
        q: &NormalizedQuestion,
        index: &AggregateIndex,
    ) -> Result<Option<(Period, Range<usize>)>, SlotError> {
        let tokens = &q.tokens;

        // Whole words in a date format: "2024-01", "01/2024", "Ene-2024".
        for (i, word) in q.words().iter().enumerate() {
            if word.chars().any(|c| c.is_ascii_digit()) {
                if let Some(p) = PeriodParser::parse_str(word) {
                    return Ok(Some((p, q.token_range(i))));
                }
            }
        }

        // Month name followed by a four-digit year: "enero 2024", "enero de 2024".
        for (i, token) in tokens.iter().enumerate() {
            let Some(month) = month_from_name(token) else {
                continue;
            };
            let mut j = i + 1;
            if tokens.get(j).is_some_and(|t| t == "de" || t == "del") {
                j += 1;
            }
            let year = tokens
                .get(j)
                .filter(|t| t.len() == 4)
                .and_then(|t| t.parse::<i32>().ok());
            if let Some(year) = year {
                if let Some(p) = Period::new(year, month) {
                    return Ok(Some((p, i..j + 1)));
                }
            }
        }

        // Relative to the latest period with data.
        if let Some(latest) = index.latest_period() {
            for (phrase, offset) in RELATIVE_PERIODS {
                if let Some(&start) = q.find_phrase(*phrase).first() {
                    if let Some(p) = latest.offset_months(*offset) {
                        return Ok(Some((p, start..start + phrase.len())));
                    }
                }
            }
            // "hace 3 meses"
            for start in q.find_phrase(&["hace"]) {
                let n = tokens.get(start + 1).and_then(|t| t.parse::<i32>().ok());
                let unit = tokens.get(start + 2).is_some_and(|t| t == "mes" || t == "meses");
                if let (Some(n), true) = (n, unit) {
                    if let Some(p) = latest.offset_months(-n) {
                        return Ok(Some((p, start..start + 3)));
                    }
                }
            }
        }

        // A full month name alone: the most recent period in that month.
        for (i, token) in tokens.iter().enumerate() {
            if token.len() < 4 {
                continue;
            }
            if let Some(month) = month_from_name(token) {
                return match index.periods().into_iter().rev().find(|p| p.month() == month) {
                    Some(p) => Ok(Some((p, i..i + 1))),
                    None => Err(SlotError::PeriodNotAvailable(q.original(i, i + 1))),
                };
            }
        }

        Ok(None)
    }
}

/// The words following a marker token that no dictionary consumed.
fn unresolved_name(
    q: &NormalizedQuestion,
    markers: &[&str],
    used: &[bool],
    reserved: &dyn Fn(&str) -> bool,
) -> Option<String> {
    for (i, token) in q.tokens.iter().enumerate() {
        if used[i] || !markers.contains(&token.as_str()) {
            continue;
        }
        let mut end = i + 1;
        while end < q.tokens.len()
            && end < i + 4
            && !used[end]
            && !reserved(&q.tokens[end])
            && !q.tokens[end].chars().all(|c| c.is_ascii_digit())
        {
            end += 1;
        }
        if end > i + 1 {
            return Some(q.original(i + 1, end));
        }
    }
    None
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use kpi_core::models::CanonicalRecord;
    use kpi_core::registry::{CategoryRegistry, MetricDef, RatioMetric};
    use kpi_data::aggregator::KpiAggregator;

    fn config() -> AnalyticsConfig {
        AnalyticsConfig::new(CategoryRegistry {
            brands: vec!["Marca A".into(), "Nutriplus".into()],
            idhs: vec![],
            metrics: vec![
                MetricDef::new("VENTAS").with_aliases(&["L14"]),
                MetricDef::new("VOL").with_aliases(&["volumen"]),
            ],
            ratios: vec![RatioMetric::new("COSTO_UNITARIO", "VENTAS", "VOL")],
        })
    }

    fn index() -> AggregateIndex {
        let rec = |period: &str, brand: &str, idh: &str| CanonicalRecord {
            period: period.parse().unwrap(),
            brand: brand.to_string(),
            idh: idh.to_string(),
            metrics: [("VENTAS".to_string(), 1.0), ("VOL".to_string(), 1.0)]
                .into_iter()
                .collect(),
        };
        KpiAggregator::from_registry(
            &[
                rec("2023-06", "Marca A", "M100"),
                rec("2024-01", "Marca A", "M100"),
                rec("2024-02", "Nutriplus", "M200"),
            ],
            &config().registry,
        )
    }

    fn resolve(q: &str) -> Result<Slots, SlotError> {
        SlotResolver::new(&config()).resolve(&NormalizedQuestion::new(q), &index(), true)
    }

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    // ── metric ────────────────────────────────────────────────────────────────

    #[test]
    fn test_metric_by_name_alias_and_default() {
        assert_eq!(resolve("total de volumen").unwrap().metric, "VOL");
        assert_eq!(resolve("total l14").unwrap().metric, "VENTAS");
        assert_eq!(resolve("costo unitario").unwrap().metric, "COSTO_UNITARIO");
        assert_eq!(resolve("total").unwrap().metric, "VENTAS");
    }

    // ── period ────────────────────────────────────────────────────────────────

    #[test]
    fn test_period_forms() {
        assert_eq!(resolve("ventas en enero 2024").unwrap().period, p("2024-01"));
        assert_eq!(resolve("ventas en enero de 2024").unwrap().period, p("2024-01"));
        assert_eq!(resolve("ventas 2024-01").unwrap().period, p("2024-01"));
        assert_eq!(resolve("ventas 01/2024").unwrap().period, p("2024-01"));
        assert_eq!(resolve("ventas Ene-2024").unwrap().period, p("2024-01"));
    }

    #[test]
    fn test_period_defaults_to_latest() {
        let slots = resolve("total de ventas").unwrap();
        assert_eq!(slots.period, p("2024-02"));
        assert!(!slots.period_explicit);
    }

    #[test]
    fn test_relative_periods() {
        assert_eq!(resolve("ventas del último mes").unwrap().period, p("2024-02"));
        assert_eq!(resolve("ventas del mes pasado").unwrap().period, p("2024-01"));
        assert_eq!(resolve("ventas de hace 8 meses").unwrap().period, p("2023-06"));
    }

    #[test]
    fn test_month_alone_picks_most_recent() {
        assert_eq!(resolve("ventas de junio").unwrap().period, p("2023-06"));
        assert_eq!(
            resolve("ventas de agosto"),
            Err(SlotError::PeriodNotAvailable("agosto".to_string()))
        );
    }

    #[test]
    fn test_period_without_data() {
        assert_eq!(
            resolve("ventas en marzo 2022"),
            Err(SlotError::PeriodNotAvailable("2022-03".to_string()))
        );
        // Relative offsets falling outside the data are reported too.
        assert_eq!(
            resolve("ventas de hace 20 meses"),
            Err(SlotError::PeriodNotAvailable("2022-06".to_string()))
        );
    }

    // ── brand / idh ───────────────────────────────────────────────────────────

    #[test]
    fn test_brand_exact_and_fuzzy() {
        assert_eq!(resolve("total de marca a").unwrap().brand.as_deref(), Some("Marca A"));
        assert_eq!(resolve("total de Nutriplsu").unwrap().brand.as_deref(), Some("Nutriplus"));
        assert_eq!(resolve("total de ventas").unwrap().brand, None);
    }

    #[test]
    fn test_unknown_brand_named() {
        assert_eq!(
            resolve("¿Cuál fue el total de la marca Zeta en enero 2024?"),
            Err(SlotError::UnknownBrand("Zeta".to_string()))
        );
    }

    #[test]
    fn test_unknown_brand_ignored_when_not_strict() {
        let slots = SlotResolver::new(&config())
            .resolve(&NormalizedQuestion::new("marca Zeta"), &index(), false)
            .unwrap();
        assert_eq!(slots.brand, None);
    }

    #[test]
    fn test_open_idh_from_snapshot() {
        let slots = resolve("total del idh m200").unwrap();
        assert_eq!(slots.idh.as_deref(), Some("M200"));
        assert_eq!(
            resolve("total del idh X999"),
            Err(SlotError::UnknownIdh("X999".to_string()))
        );
    }

    #[test]
    fn test_marker_followed_by_stopword_is_fine() {
        assert!(resolve("total por marca en enero 2024").is_ok());
    }

    #[test]
    fn test_no_data() {
        let r = SlotResolver::new(&config()).resolve(
            &NormalizedQuestion::new("total"),
            &AggregateIndex::default(),
            true,
        );
        assert_eq!(r, Err(SlotError::NoData));
    }
}
