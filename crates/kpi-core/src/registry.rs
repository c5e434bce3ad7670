//! Canonical category registry: the brands, IDHs and metrics the engine
//! knows about. Supplied as configuration, never embedded in code.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{KpiError, Result};
use crate::models::ALL_SCOPE;
use crate::text::{category_key, normalize_label};

// ── MetricDef ─────────────────────────────────────────────────────────────────

/// A summable metric and the header spellings that carry it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDef {
    /// Canonical metric name (e.g. `"VOL"`).
    pub name: String,
    /// Alternative header spellings and question words (`"VOLUMEN"`, `"QTY"`).
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Substrings that identify the column when no alias matches exactly
    /// (`"VOL"` catches `"VOL_KG"`).
    #[serde(default)]
    pub contains: Vec<String>,
}

impl MetricDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            contains: Vec::new(),
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_contains(mut self, parts: &[&str]) -> Self {
        self.contains = parts.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Name followed by every alias.
    pub fn spellings(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

// ── RatioMetric ───────────────────────────────────────────────────────────────

/// A metric derived per bucket as `numerator / denominator` after summing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioMetric {
    pub name: String,
    pub numerator: String,
    pub denominator: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl RatioMetric {
    pub fn new(
        name: impl Into<String>,
        numerator: impl Into<String>,
        denominator: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            numerator: numerator.into(),
            denominator: denominator.into(),
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn spellings(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

// ── CategoryRegistry ──────────────────────────────────────────────────────────

/// Canonical brands, IDHs and metrics.
///
/// An empty `brands` or `idhs` list marks that dimension as open: cleaned
/// values are accepted as they come.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryRegistry {
    #[serde(default)]
    pub brands: Vec<String>,
    #[serde(default)]
    pub idhs: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<MetricDef>,
    #[serde(default)]
    pub ratios: Vec<RatioMetric>,
}

impl CategoryRegistry {
    /// Names of the summed metrics, in registry order.
    pub fn metric_names(&self) -> Vec<String> {
        self.metrics.iter().map(|m| m.name.clone()).collect()
    }

    /// Summed metrics followed by ratio metrics.
    pub fn all_metric_names(&self) -> Vec<String> {
        self.metrics
            .iter()
            .map(|m| m.name.clone())
            .chain(self.ratios.iter().map(|r| r.name.clone()))
            .collect()
    }

    /// Map a normalized column header to a metric name.
    ///
    /// Exact name/alias matches win over `contains` matches; within each
    /// pass registry order decides.
    pub fn metric_for_header(&self, header: &str) -> Option<&str> {
        let exact = self.metrics.iter().find(|m| {
            m.spellings()
                .any(|spelling| normalize_label(spelling) == header)
        });
        if let Some(m) = exact {
            return Some(&m.name);
        }
        self.metrics
            .iter()
            .find(|m| {
                m.contains
                    .iter()
                    .any(|part| header.contains(&normalize_label(part)))
            })
            .map(|m| m.name.as_str())
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.metrics.is_empty() {
            return Err(KpiError::Config("registry defines no metrics".to_string()));
        }
        let mut seen = HashSet::new();
        for name in self.all_metric_names() {
            if !seen.insert(name.clone()) {
                return Err(KpiError::Config(format!("duplicate metric name: {}", name)));
            }
        }
        for (dimension, values) in [("brands", &self.brands), ("idhs", &self.idhs)] {
            if let Some(v) = values.iter().find(|v| category_key(v) == ALL_SCOPE) {
                return Err(KpiError::Config(format!(
                    "{} entry '{}' collides with the roll-up label {}",
                    dimension, v, ALL_SCOPE
                )));
            }
        }
        let summed: HashSet<&str> = self.metrics.iter().map(|m| m.name.as_str()).collect();
        for ratio in &self.ratios {
            for part in [&ratio.numerator, &ratio.denominator] {
                if !summed.contains(part.as_str()) {
                    return Err(KpiError::Config(format!(
                        "ratio {} references unknown metric {}",
                        ratio.name, part
                    )));
                }
            }
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
