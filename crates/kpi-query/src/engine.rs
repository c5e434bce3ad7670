//! Question answering over one snapshot.
//!
//! Classification picks the intent, slot resolution binds metric, scope and
//! period, and a per-intent handler reads the aggregate index. Every path
//! ends in an [`Answer`]; nothing here returns an error.

use std::cmp::Ordering;

use kpi_core::models::ALL_SCOPE;
use kpi_core::settings::AnalyticsConfig;
use kpi_data::aggregator::AggregateIndex;
use kpi_data::summary::SummaryBuilder;
use kpi_data::variation::VariationSet;
use tracing::debug;

use crate::answer::{
    format_number, format_pct, Answer, AnswerContext, FallbackReason, RankingEntry,
};
use crate::intent::{is_change_word, Intent, IntentClassifier};
use crate::question::NormalizedQuestion;
use crate::slots::{SlotError, SlotResolver, Slots};

/// Words that switch a ranking to the IDH dimension.
const IDH_WORDS: &[&str] = &["idh", "idhs", "material", "materiales"];

/// Words that flip a ranking to ascending order.
const ASCENDING_WORDS: &[&str] = &[
    "peor", "peores", "menor", "menores", "menos", "worst", "lowest", "caida", "caidas", "cayo",
    "cayeron", "bajo", "bajaron", "bajada", "bajadas", "disminucion", "disminuyo", "disminuyeron",
];

/// Tokens after a count that confirm it is a ranking size ("5 marcas").
const COUNT_FOLLOWERS: &[&str] = &[
    "marcas", "brands", "idh", "idhs", "materiales", "mejores", "peores", "primeras", "primeros",
];

const MAX_RANKING: usize = 100;

// ── QueryEngine ───────────────────────────────────────────────────────────────

/// Answers natural-language questions for one configuration.
pub struct QueryEngine {
    classifier: IntentClassifier,
    slots: SlotResolver,
    default_metric: Option<String>,
    top_n: usize,
    summary_top_n: usize,
}

impl QueryEngine {
    pub fn new(config: &AnalyticsConfig) -> Self {
        Self::with_classifier(config, IntentClassifier::default())
    }

    pub fn with_classifier(config: &AnalyticsConfig, classifier: IntentClassifier) -> Self {
        Self {
            classifier,
            slots: SlotResolver::new(config),
            default_metric: config.registry.all_metric_names().into_iter().next(),
            top_n: config.query_top_n.max(1),
            summary_top_n: config.summary_top_n,
        }
    }

    /// Answer `question` from `index` and `variations`.
    pub fn answer(&self, question: &str, index: &AggregateIndex, variations: &VariationSet) -> Answer {
        let q = NormalizedQuestion::new(question);
        let intent = self.classifier.classify(&q);
        debug!(?intent, tokens = q.tokens.len(), "Classified question");

        if intent == Intent::Unknown {
            return Answer::fallback(
                question,
                intent,
                FallbackReason::IntentUnrecognized,
                self.help_message(),
            );
        }

        let strict_names = matches!(intent, Intent::Total | Intent::Variation);
        let slots = match self.slots.resolve(&q, index, strict_names) {
            Ok(slots) => slots,
            Err(e) => {
                let message = slot_error_message(&e);
                return Answer::fallback(
                    question,
                    intent,
                    FallbackReason::SlotResolution(e),
                    message,
                );
            }
        };

        match intent {
            Intent::Total => self.total(question, &slots, index),
            Intent::Variation => self.variation(question, &slots, variations),
            Intent::TopBrand => self.top_brand(question, &q, &slots, index, variations),
            Intent::Summary => self.summary(question, &slots, index, variations),
            Intent::Unknown => Answer::fallback(
                question,
                intent,
                FallbackReason::IntentUnrecognized,
                self.help_message(),
            ),
        }
    }

    // ── TOTAL ─────────────────────────────────────────────────────────────────

    fn total(&self, question: &str, slots: &Slots, index: &AggregateIndex) -> Answer {
        let context = context_of(slots);
        let brand = slots.brand.as_deref().unwrap_or(ALL_SCOPE);
        let idh = slots.idh.as_deref().unwrap_or(ALL_SCOPE);

        let Some(value) = index.value(slots.period, brand, idh, &slots.metric) else {
            let message = format!(
                "No hay datos de {} para {} en {}.",
                slots.metric,
                context.scope_label(),
                slots.period
            );
            return Answer {
                context: Some(context),
                ..Answer::fallback(question, Intent::Total, FallbackReason::NoValue, message)
            };
        };

        let message = format!(
            "Total de {} ({}) en {}: {}",
            slots.metric,
            context.scope_label(),
            slots.period,
            format_number(value)
        );
        Answer {
            value: Some(value),
            context: Some(context),
            ..Answer::answered(question, Intent::Total, message)
        }
    }

    // ── VARIATION ─────────────────────────────────────────────────────────────

    fn variation(&self, question: &str, slots: &Slots, variations: &VariationSet) -> Answer {
        let mut context = context_of(slots);
        let brand = slots.brand.as_deref().unwrap_or(ALL_SCOPE);
        let idh = slots.idh.as_deref().unwrap_or(ALL_SCOPE);

        let Some(v) = variations.find(&slots.metric, brand, idh, slots.period) else {
            let message = format!(
                "No hay un periodo anterior para comparar {} ({}) en {}.",
                slots.metric,
                context.scope_label(),
                slots.period
            );
            return Answer {
                context: Some(context),
                ..Answer::fallback(question, Intent::Variation, FallbackReason::NoValue, message)
            };
        };

        context.period_from = Some(v.period_from);
        let pct = match v.pct_change {
            Some(pct) => format_pct(pct),
            None => "sin % por base cero".to_string(),
        };
        let sign = if v.delta > 0.0 { "+" } else { "" };
        let message = format!(
            "Variación de {} ({}) de {} a {}: {}{} ({}). {} → {}",
            slots.metric,
            context.scope_label(),
            v.period_from,
            v.period_to,
            sign,
            format_number(v.delta),
            pct,
            format_number(v.value_from),
            format_number(v.value_to)
        );
        Answer {
            value: Some(v.delta),
            pct_change: v.pct_change,
            context: Some(context),
            ..Answer::answered(question, Intent::Variation, message)
        }
    }

    // ── TOP_BRAND ─────────────────────────────────────────────────────────────

    fn top_brand(
        &self,
        question: &str,
        q: &NormalizedQuestion,
        slots: &Slots,
        index: &AggregateIndex,
        variations: &VariationSet,
    ) -> Answer {
        let by_idh = q.has_any(IDH_WORDS);
        let by_change = q.tokens.iter().any(|t| is_change_word(t));
        let ascending = q.has_any(ASCENDING_WORDS);
        let count = ranking_count(q).unwrap_or(self.top_n);

        // The ranked dimension is open; the other one scopes the ranking.
        let (labels, scope) = if by_idh {
            (index.idhs(), slots.brand.as_deref().unwrap_or(ALL_SCOPE))
        } else {
            (index.brands(), slots.idh.as_deref().unwrap_or(ALL_SCOPE))
        };
        let lookup = |label: &str| {
            if by_idh {
                (scope.to_string(), label.to_string())
            } else {
                (label.to_string(), scope.to_string())
            }
        };

        let mut entries: Vec<RankingEntry> = labels
            .iter()
            .filter_map(|label| {
                let (brand, idh) = lookup(label.as_str());
                if by_change {
                    let v = variations.find(&slots.metric, &brand, &idh, slots.period)?;
                    Some(RankingEntry {
                        rank: 0,
                        label: label.clone(),
                        value: v.value_to,
                        delta: Some(v.delta),
                        pct_change: v.pct_change,
                    })
                } else {
                    let value = index.value(slots.period, &brand, &idh, &slots.metric)?;
                    Some(RankingEntry {
                        rank: 0,
                        label: label.clone(),
                        value,
                        delta: None,
                        pct_change: None,
                    })
                }
            })
            .collect();

        let key = |e: &RankingEntry| e.delta.unwrap_or(e.value);
        entries.sort_by(|a, b| {
            let ord = key(a).partial_cmp(&key(b)).unwrap_or(Ordering::Equal);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        entries.truncate(count);
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.rank = i + 1;
        }

        let mut context = AnswerContext::new(Some(&slots.metric), None, None, slots.period);
        if by_idh {
            context.brand = scope.to_string();
        } else {
            context.idh = scope.to_string();
        }
        let dimension = if by_idh { "IDH" } else { "marcas" };
        let measure = if by_change {
            format!("variación de {}", slots.metric)
        } else {
            slots.metric.clone()
        };

        let Some(first) = entries.first() else {
            let message = format!(
                "No hay {} con datos de {} en {}.",
                dimension, measure, slots.period
            );
            return Answer {
                context: Some(context),
                ..Answer::fallback(question, Intent::TopBrand, FallbackReason::NoValue, message)
            };
        };

        let (top_value, top_pct) = (key(first), first.pct_change);
        let order = if ascending { "Últimas" } else { "Top" };
        let lines: Vec<String> = entries
            .iter()
            .map(|e| match e.delta {
                Some(d) => format!("{}. {} ({})", e.rank, e.label, format_number(d)),
                None => format!("{}. {} ({})", e.rank, e.label, format_number(e.value)),
            })
            .collect();
        let message = format!(
            "{} {} {} por {} en {}: {}",
            order,
            entries.len(),
            dimension,
            measure,
            slots.period,
            lines.join(", ")
        );
        Answer {
            value: Some(top_value),
            pct_change: top_pct,
            context: Some(context),
            ranking: entries,
            ..Answer::answered(question, Intent::TopBrand, message)
        }
    }

    // ── SUMMARY ───────────────────────────────────────────────────────────────

    fn summary(
        &self,
        question: &str,
        slots: &Slots,
        index: &AggregateIndex,
        variations: &VariationSet,
    ) -> Answer {
        let summary = SummaryBuilder::build(index, variations, self.summary_top_n, Some(slots.period));
        let period = summary.period.unwrap_or(slots.period);
        let message = match summary.previous_period {
            Some(prev) => format!(
                "Resumen de {} frente a {}: {} hechos destacados.",
                period,
                prev,
                summary.facts.len()
            ),
            None => format!(
                "Resumen de {}: {} hechos destacados (sin periodo anterior).",
                period,
                summary.facts.len()
            ),
        };
        let mut context = AnswerContext::new(None, None, None, period);
        context.period_from = summary.previous_period;
        Answer {
            context: Some(context),
            highlights: summary.facts,
            ..Answer::answered(question, Intent::Summary, message)
        }
    }

    fn help_message(&self) -> String {
        let metric = self.default_metric.as_deref().unwrap_or("ventas").to_lowercase();
        format!(
            "No entendí la pregunta. Prueba: 'total de {m} en enero 2024', \
             'variación de {m} del último mes', 'top 5 marcas por {m}' o 'resumen'.",
            m = metric
        )
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn context_of(slots: &Slots) -> AnswerContext {
    AnswerContext::new(
        Some(&slots.metric),
        slots.brand.as_deref(),
        slots.idh.as_deref(),
        slots.period,
    )
}

fn slot_error_message(error: &SlotError) -> String {
    match error {
        SlotError::UnknownBrand(name) => format!("No encontré la marca '{}'.", name),
        SlotError::UnknownIdh(name) => format!("No encontré el IDH '{}'.", name),
        SlotError::PeriodNotAvailable(period) => {
            format!("No hay datos para el periodo {}.", period)
        }
        SlotError::NoData => "No hay datos cargados.".to_string(),
    }
}

/// A ranking size such as "top 3" or "5 marcas".
fn ranking_count(q: &NormalizedQuestion) -> Option<usize> {
    q.tokens.iter().enumerate().find_map(|(i, token)| {
        let n = token.parse::<usize>().ok().filter(|n| (1..=MAX_RANKING).contains(n))?;
        let after_top = i > 0 && q.tokens[i - 1] == "top";
        let before_noun = q
            .tokens
            .get(i + 1)
            .is_some_and(|next| COUNT_FOLLOWERS.contains(&next.as_str()));
        (after_top || before_noun).then_some(n)
    })
}

/// Answer one question with a throwaway engine.
pub fn answer(
    question: &str,
    index: &AggregateIndex,
    variations: &VariationSet,
    config: &AnalyticsConfig,
) -> Answer {
    QueryEngine::new(config).answer(question, index, variations)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
