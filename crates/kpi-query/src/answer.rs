//! Structured answers returned by the query engine.

use kpi_core::models::ALL_SCOPE;
use kpi_core::period::Period;
use kpi_data::summary::Highlight;
use serde::{Deserialize, Serialize};

use crate::intent::Intent;
use crate::slots::SlotError;

/// Why a question got a fallback instead of a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum FallbackReason {
    /// No intent rule matched.
    IntentUnrecognized,
    /// A slot the question mentions could not be resolved.
    SlotResolution(SlotError),
    /// Everything resolved but the snapshot holds no value for it.
    NoValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "fallback", rename_all = "snake_case")]
pub enum AnswerStatus {
    Answered,
    Fallback(FallbackReason),
}

/// What an answer refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    pub brand: String,
    pub idh: String,
    pub period: Period,
    /// Comparison base for variations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_from: Option<Period>,
}

impl AnswerContext {
    pub fn new(
        metric: Option<&str>,
        brand: Option<&str>,
        idh: Option<&str>,
        period: Period,
    ) -> Self {
        Self {
            metric: metric.map(str::to_string),
            brand: brand.unwrap_or(ALL_SCOPE).to_string(),
            idh: idh.unwrap_or(ALL_SCOPE).to_string(),
            period,
            period_from: None,
        }
    }

    /// Human description of the brand/IDH scope.
    pub fn scope_label(&self) -> String {
        match (self.brand.as_str(), self.idh.as_str()) {
            (ALL_SCOPE, ALL_SCOPE) => "todas las marcas".to_string(),
            (brand, ALL_SCOPE) => format!("marca {}", brand),
            (ALL_SCOPE, idh) => format!("IDH {}", idh),
            (brand, idh) => format!("marca {}, IDH {}", brand, idh),
        }
    }
}

/// One line of a ranking answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub rank: usize,
    pub label: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pct_change: Option<f64>,
}

/// The engine's reply to one question. Always well-formed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    pub intent: Intent,
    #[serde(flatten)]
    pub status: AnswerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pct_change: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<AnswerContext>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranking: Vec<RankingEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<Highlight>,
    /// Short plain-text rendering for chat surfaces.
    pub message: String,
}

impl Answer {
    pub(crate) fn answered(question: &str, intent: Intent, message: String) -> Self {
        Self {
            question: question.to_string(),
            intent,
            status: AnswerStatus::Answered,
            value: None,
            pct_change: None,
            context: None,
            ranking: Vec::new(),
            highlights: Vec::new(),
            message,
        }
    }

    pub(crate) fn fallback(
        question: &str,
        intent: Intent,
        reason: FallbackReason,
        message: String,
    ) -> Self {
        Self {
            status: AnswerStatus::Fallback(reason),
            ..Self::answered(question, intent, message)
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.status, AnswerStatus::Fallback(_))
    }
}

/// Two decimals with `.` thousands grouping and `,` decimals.
pub fn format_number(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    let sign = if value < 0.0 && fixed.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    format!("{}{},{}", sign, grouped, frac_part)
}

/// Fraction as a signed percentage: `0.5` → `+50,00%`.
pub fn format_pct(fraction: f64) -> String {
    let sign = if fraction > 0.0 { "+" } else { "" };
    format!("{}{}%", sign, format_number(fraction * 100.0))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
