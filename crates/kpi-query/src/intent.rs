//! Rule-based intent classification.
//!
//! Each rule is a token phrase. Every rule whose phrase occurs in the
//! question is a candidate; the longest phrase wins and equal lengths fall
//! back to intent priority. A phrase token ending in `*` matches any token
//! with that prefix, so one rule covers a verb's inflections.

use serde::{Deserialize, Serialize};

use crate::question::NormalizedQuestion;

/// What a question asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Total,
    Variation,
    TopBrand,
    Summary,
    Unknown,
}

impl Intent {
    /// Tie-break rank; higher wins.
    fn priority(self) -> u8 {
        match self {
            Intent::TopBrand => 4,
            Intent::Variation => 3,
            Intent::Summary => 2,
            Intent::Total => 1,
            Intent::Unknown => 0,
        }
    }
}

/// One keyword rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentRule {
    pub intent: Intent,
    pub phrase: Vec<String>,
}

impl IntentRule {
    pub fn new(intent: Intent, phrase: &str) -> Self {
        Self {
            intent,
            phrase: phrase.split_whitespace().map(str::to_string).collect(),
        }
    }

    /// Whether the phrase occurs as consecutive tokens of `question`.
    pub fn matches(&self, question: &NormalizedQuestion) -> bool {
        let n = self.phrase.len();
        if n == 0 || n > question.tokens.len() {
            return false;
        }
        question.tokens.windows(n).any(|window| {
            window
                .iter()
                .zip(&self.phrase)
                .all(|(token, pattern)| token_matches(token, pattern))
        })
    }
}

/// Tokens a stem would catch that carry no sense of change.
const STEM_EXCEPTIONS: &[&str] = &["varios", "varias", "variedad", "variedades"];

fn token_matches(token: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(stem) => token.starts_with(stem) && !STEM_EXCEPTIONS.contains(&token),
        None => token == pattern,
    }
}

const TOP_BRAND_PHRASES: &[&str] = &[
    "top",
    "ranking",
    "mejor",
    "mejores",
    "peor",
    "peores",
    "best",
    "worst",
    "lider",
    "lidera",
    "cual marca",
    "que marca",
    "cuales marcas",
    "que marcas",
    "cual idh",
    "que idh",
    "marca con mayor",
    "marca con menor",
    "marcas con mayor",
    "marcas con menor",
    "idh con mayor",
    "idh con menor",
    "which brand",
];

const VARIATION_PHRASES: &[&str] = &[
    "vari*",
    "cambi*",
    "crec*",
    "cay*",
    "caid*",
    "aument*",
    "disminu*",
    "subio",
    "subieron",
    "subida",
    "subidas",
    "bajo",
    "bajaron",
    "bajada",
    "bajadas",
    "change*",
    "grow*",
    "growth",
    "increase*",
    "decrease*",
    "comparado con",
    "respecto al",
    "vs",
    "mes contra mes",
];

const SUMMARY_PHRASES: &[&str] = &[
    "resumen",
    "resumir",
    "resume",
    "reporte",
    "informe",
    "destacados",
    "summary",
    "report",
    "highlights",
    "resumen ejecutivo",
    "que paso",
];

const TOTAL_PHRASES: &[&str] = &[
    "total",
    "totales",
    "suma",
    "cuanto",
    "cuanta",
    "cuantos",
    "cuantas",
    "valor",
    "monto",
    "how much",
];

/// Every single token pattern used by the built-in rules.
fn keyword_patterns() -> impl Iterator<Item = &'static str> {
    TOP_BRAND_PHRASES
        .iter()
        .chain(VARIATION_PHRASES)
        .chain(SUMMARY_PHRASES)
        .chain(TOTAL_PHRASES)
        .flat_map(|phrase| phrase.split_whitespace())
}

/// Whether `token` is claimed by any built-in rule.
pub(crate) fn is_keyword(token: &str) -> bool {
    keyword_patterns().any(|pattern| token_matches(token, pattern))
}

/// Whether `token` speaks of a period-over-period change.
pub(crate) fn is_change_word(token: &str) -> bool {
    VARIATION_PHRASES
        .iter()
        .filter(|phrase| !phrase.contains(' ') && **phrase != "vs")
        .any(|pattern| token_matches(token, pattern))
}

/// Ordered rule list plus the classification procedure.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    rules: Vec<IntentRule>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        let groups = [
            (Intent::TopBrand, TOP_BRAND_PHRASES),
            (Intent::Variation, VARIATION_PHRASES),
            (Intent::Summary, SUMMARY_PHRASES),
            (Intent::Total, TOTAL_PHRASES),
        ];
        let rules = groups
            .iter()
            .flat_map(|(intent, phrases)| phrases.iter().map(|p| IntentRule::new(*intent, p)))
            .collect();
        Self { rules }
    }
}

impl IntentClassifier {
    pub fn with_rules(rules: Vec<IntentRule>) -> Self {
        Self { rules }
    }

    /// The winning intent, `Unknown` when no rule matches.
    pub fn classify(&self, question: &NormalizedQuestion) -> Intent {
        self.rules
            .iter()
            .filter(|r| r.matches(question))
            .max_by_key(|r| (r.phrase.len(), r.intent.priority()))
            .map_or(Intent::Unknown, |r| r.intent)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(q: &str) -> Intent {
        IntentClassifier::default().classify(&NormalizedQuestion::new(q))
    }

    #[test]
    fn test_total() {
        assert_eq!(classify("¿Cuál fue el total de ventas en enero 2024?"), Intent::Total);
        assert_eq!(classify("Cuánto vendió Marca A"), Intent::Total);
    }

    #[test]
    fn test_variation_beats_total() {
        assert_eq!(classify("¿Cuál fue la variación del total en febrero?"), Intent::Variation);
        assert_eq!(classify("crecimiento de ventas"), Intent::Variation);
        assert_eq!(
            classify("¿Cuánto varió la venta de Marca A en febrero 2024?"),
            Intent::Variation
        );
        assert_eq!(classify("¿Cuánto aumentaron las ventas en marzo?"), Intent::Variation);
        assert_eq!(classify("cuánto crecieron las ventas"), Intent::Variation);
        assert_eq!(classify("cuánto cayeron las ventas de Marca B"), Intent::Variation);
        assert_eq!(classify("cuánto bajó el volumen"), Intent::Variation);
        assert_eq!(classify("cuánto cambiaron las ventas"), Intent::Variation);
    }

    #[test]
    fn test_stem_exceptions_stay_total() {
        assert_eq!(classify("total de varias marcas"), Intent::Total);
        assert_eq!(classify("cuánto suma la variedad clásica"), Intent::Total);
    }

    #[test]
    fn test_keyword_and_change_words() {
        assert!(is_keyword("vario"));
        assert!(is_keyword("total"));
        assert!(!is_keyword("nutriplus"));
        assert!(is_change_word("aumentaron"));
        assert!(!is_change_word("vs"));
        assert!(!is_change_word("ventas"));
    }

    #[test]
    fn test_top_brand() {
        assert_eq!(classify("top 5 marcas por ventas"), Intent::TopBrand);
        assert_eq!(classify("¿Qué marca tuvo la mayor variación?"), Intent::TopBrand);
        assert_eq!(classify("peor marca del último mes"), Intent::TopBrand);
    }

    #[test]
    fn test_summary() {
        assert_eq!(classify("Dame un resumen de febrero"), Intent::Summary);
        // Longer phrase wins over single-token VARIATION/TOTAL matches.
        assert_eq!(classify("resumen ejecutivo con el total"), Intent::Summary);
    }

    #[test]
    fn test_unknown() {
        assert_eq!(classify("hola, ¿cómo estás?"), Intent::Unknown);
        assert_eq!(classify(""), Intent::Unknown);
    }

    #[test]
    fn test_custom_rules() {
        let c = IntentClassifier::with_rules(vec![IntentRule::new(Intent::Summary, "foo bar")]);
        assert_eq!(c.classify(&NormalizedQuestion::new("Foo, bar!")), Intent::Summary);
        assert_eq!(c.classify(&NormalizedQuestion::new("total")), Intent::Unknown);
    }
}
