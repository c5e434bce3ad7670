use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data_processors::DecimalConvention;
use crate::error::{KpiError, Result};
use crate::period::Period;
use crate::registry::CategoryRegistry;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// KPI analytics over monthly brand/IDH spreadsheets
#[derive(Parser, Debug, Clone)]
#[command(
    name = "kpi-analytics",
    about = "KPI analytics over monthly brand/IDH spreadsheets",
    version
)]
pub struct Settings {
    /// CSV/JSON files or directories to load (historical base first)
    #[arg(long, short, required = true, num_args = 1..)]
    pub input: Vec<PathBuf>,

    /// Analytics configuration file (registry + normalizer options)
    #[arg(long, env = "KPI_ANALYTICS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Answer a free-text question against the loaded data
    #[arg(long)]
    pub ask: Option<String>,

    /// Print the executive highlight summary
    #[arg(long)]
    pub summary: bool,

    /// Period (YYYY-MM) for the summary; defaults to the latest
    #[arg(long)]
    pub period: Option<Period>,

    /// Number of top increases/decreases in the summary
    #[arg(long)]
    pub top_n: Option<usize>,

    /// Project the next period of this metric from its grand-total trend
    #[arg(long)]
    pub project: Option<String>,

    /// Include the normalization error log in the output
    #[arg(long)]
    pub errors: bool,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Settings {
    /// Parse process arguments and resolve derived values.
    pub fn load() -> Self {
        Self::resolve(Settings::parse())
    }

    /// Same as [`Settings::load`] with an explicit argument list.
    pub fn load_from_args<I, T>(args: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Settings::try_parse_from(args).map(Self::resolve)
    }

    /// `--debug` overrides the log level.
    fn resolve(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }
}

// ── Normalizer options ─────────────────────────────────────────────────────────

/// What to do with metric cells that are blank in an otherwise valid row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingMetricPolicy {
    /// Leave the metric absent ("no data" is not zero).
    #[default]
    Exclude,
    /// Record the metric as `0.0`.
    Zero,
}

/// Header spellings for the non-metric columns.
///
/// Compared after [`crate::text::normalize_label`], so `"Año"` and `"ANO"`
/// are the same alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnAliases {
    #[serde(default = "default_period_aliases")]
    pub period: Vec<String>,
    #[serde(default = "default_year_aliases")]
    pub year: Vec<String>,
    #[serde(default = "default_month_aliases")]
    pub month: Vec<String>,
    #[serde(default = "default_brand_aliases")]
    pub brand: Vec<String>,
    #[serde(default = "default_idh_aliases")]
    pub idh: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn default_period_aliases() -> Vec<String> {
    strings(&["PERIODO", "PERIOD", "FECHA", "DATE"])
}

fn default_year_aliases() -> Vec<String> {
    strings(&["AÑO", "ANO", "ANIO", "YEAR"])
}

fn default_month_aliases() -> Vec<String> {
    strings(&["MES", "MONTH"])
}

fn default_brand_aliases() -> Vec<String> {
    strings(&["MARCA", "PSV_BRAND", "BRAND"])
}

fn default_idh_aliases() -> Vec<String> {
    strings(&["IDH", "MAIN_MATERIAL_CODE", "MATERIAL_CODE", "MAIN_MATERIAL"])
}

impl Default for ColumnAliases {
    fn default() -> Self {
        Self {
            period: default_period_aliases(),
            year: default_year_aliases(),
            month: default_month_aliases(),
            brand: default_brand_aliases(),
            idh: default_idh_aliases(),
        }
    }
}

fn default_fuzzy_max_distance() -> usize {
    2
}

/// Knobs for the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Largest Levenshtein distance accepted for a fuzzy category match.
    #[serde(default = "default_fuzzy_max_distance")]
    pub fuzzy_max_distance: usize,
    #[serde(default)]
    pub missing_metrics: MissingMetricPolicy,
    #[serde(default)]
    pub decimal: DecimalConvention,
    /// Keep negative metric values instead of logging and dropping them.
    #[serde(default)]
    pub allow_negative: bool,
    #[serde(default)]
    pub columns: ColumnAliases,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            fuzzy_max_distance: default_fuzzy_max_distance(),
            missing_metrics: MissingMetricPolicy::default(),
            decimal: DecimalConvention::default(),
            allow_negative: false,
            columns: ColumnAliases::default(),
        }
    }
}

// ── AnalyticsConfig ────────────────────────────────────────────────────────────

fn default_summary_top_n() -> usize {
    10
}

fn default_query_top_n() -> usize {
    5
}

/// Everything the engine needs besides the data itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub registry: CategoryRegistry,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default = "default_summary_top_n")]
    pub summary_top_n: usize,
    #[serde(default = "default_query_top_n")]
    pub query_top_n: usize,
}

impl AnalyticsConfig {
    /// Config with default options around `registry`.
    pub fn new(registry: CategoryRegistry) -> Self {
        Self {
            registry,
            normalizer: NormalizerConfig::default(),
            summary_top_n: default_summary_top_n(),
            query_top_n: default_query_top_n(),
        }
    }

    /// `~/.kpi-analytics/config.json`.
    pub fn default_path() -> PathBuf {
        Self::default_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// The config path rooted at `base_dir` (used for testing).
    pub fn default_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".kpi-analytics").join("config.json")
    }

    /// Read and validate a JSON config file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| KpiError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AnalyticsConfig = serde_json::from_str(&content)?;
        config.registry.validate()?;
        Ok(config)
    }

    /// Resolve the config for a CLI run: `--config` wins, then the default path.
    pub fn for_settings(settings: &Settings) -> Result<Self> {
        match &settings.config {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    Err(KpiError::Config(format!(
                        "no configuration given and {} does not exist",
                        path.display()
                    )))
                }
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(tmp: &TempDir, body: &str) -> PathBuf {
        let path = AnalyticsConfig::default_path_in(tmp.path());
        std::fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
        std::fs::write(&path, body).expect("write");
        path
    }

    // ── Settings ──────────────────────────────────────────────────────────────

    #[test]
    fn test_settings_default_values() {
        let settings = Settings::load_from_args(["kpi-analytics", "--input", "data.csv"]).unwrap();
        assert_eq!(settings.input, vec![PathBuf::from("data.csv")]);
        assert!(settings.config.is_none());
        assert!(settings.ask.is_none());
        assert!(!settings.summary);
        assert!(settings.period.is_none());
        assert_eq!(settings.log_level, "INFO");
        assert!(!settings.debug);
    }

    #[test]
    fn test_settings_requires_input() {
        assert!(Settings::load_from_args(["kpi-analytics"]).is_err());
    }

    #[test]
    fn test_settings_multiple_inputs_and_period() {
        let settings = Settings::load_from_args([
            "kpi-analytics",
            "--input",
            "base.csv",
            "nuevo.csv",
            "--period",
            "2024-02",
            "--summary",
        ])
        .unwrap();
        assert_eq!(settings.input.len(), 2);
        assert_eq!(settings.period.map(|p| p.to_string()).as_deref(), Some("2024-02"));
        assert!(settings.summary);
    }

    #[test]
    fn test_settings_rejects_bad_period() {
        assert!(
            Settings::load_from_args(["kpi-analytics", "-i", "a.csv", "--period", "Feb"]).is_err()
        );
    }

    #[test]
    fn test_settings_debug_overrides_log_level() {
        let settings =
            Settings::load_from_args(["kpi-analytics", "-i", "a.csv", "--debug"]).unwrap();
        assert_eq!(settings.log_level, "DEBUG");
    }

    // ── AnalyticsConfig ───────────────────────────────────────────────────────

    #[test]
    fn test_config_defaults_fill_in() {
        let tmp = TempDir::new().expect("tempdir");
        let path = write_config(&tmp, r#"{"registry": {"metrics": [{"name": "L14"}]}}"#);

        let config = AnalyticsConfig::load_from(&path).expect("load");
        assert_eq!(config.summary_top_n, 10);
        assert_eq!(config.query_top_n, 5);
        assert_eq!(config.normalizer.fuzzy_max_distance, 2);
        assert_eq!(config.normalizer.missing_metrics, MissingMetricPolicy::Exclude);
        assert_eq!(config.normalizer.decimal, DecimalConvention::Comma);
        assert!(config.normalizer.columns.brand.contains(&"PSV_BRAND".to_string()));
    }

    #[test]
    fn test_config_overrides() {
        let tmp = TempDir::new().expect("tempdir");
        let path = write_config(
            &tmp,
            r#"{
                "registry": {"metrics": [{"name": "L14"}]},
                "normalizer": {"fuzzy_max_distance": 0, "missing_metrics": "zero", "decimal": "dot"},
                "summary_top_n": 3
            }"#,
        );

        let config = AnalyticsConfig::load_from(&path).expect("load");
        assert_eq!(config.normalizer.fuzzy_max_distance, 0);
        assert_eq!(config.normalizer.missing_metrics, MissingMetricPolicy::Zero);
        assert_eq!(config.normalizer.decimal, DecimalConvention::Dot);
        assert_eq!(config.summary_top_n, 3);
    }

    #[test]
    fn test_config_invalid_registry_rejected() {
        let tmp = TempDir::new().expect("tempdir");
        let path = write_config(&tmp, r#"{"registry": {"metrics": []}}"#);
        let err = AnalyticsConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, KpiError::Config(_)));
    }

    #[test]
    fn test_config_missing_file() {
        let tmp = TempDir::new().expect("tempdir");
        let err = AnalyticsConfig::load_from(&tmp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, KpiError::FileRead { .. }));
    }

    #[test]
    fn test_config_malformed_json() {
        let tmp = TempDir::new().expect("tempdir");
        let path = write_config(&tmp, "{not json");
        let err = AnalyticsConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, KpiError::JsonParse(_)));
    }

    #[test]
    fn test_for_settings_uses_explicit_path() {
        let tmp = TempDir::new().expect("tempdir");
        let path = write_config(&tmp, r#"{"registry": {"metrics": [{"name": "VOL"}]}}"#);
        let settings = Settings::load_from_args([
            "kpi-analytics".into(),
            "-i".into(),
            "a.csv".into(),
            "--config".into(),
            path.into_os_string(),
        ])
        .unwrap();
        let config = AnalyticsConfig::for_settings(&settings).expect("config");
        assert_eq!(config.registry.metric_names(), vec!["VOL"]);
    }
}
