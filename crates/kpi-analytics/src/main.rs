mod bootstrap;

use anyhow::{bail, Context, Result};
use kpi_core::models::ALL_SCOPE;
use kpi_core::settings::{AnalyticsConfig, Settings};
use kpi_data::projection::project_next_period;
use kpi_runtime::SnapshotStore;
use serde_json::{Map, Value};

fn main() -> Result<()> {
    let settings = Settings::load();

    bootstrap::setup_logging(&settings.log_level)?;
    tracing::info!("KPI Analytics v{} starting", env!("CARGO_PKG_VERSION"));

    if settings.config.is_none() {
        bootstrap::ensure_config_dir()?;
    }
    let config =
        AnalyticsConfig::for_settings(&settings).context("loading analytics configuration")?;

    let report = run(&settings, config)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Load the inputs, build one snapshot and collect every requested output.
///
/// The snapshot metadata is always present; `answer`, `summary`,
/// `projection` and `errors` appear when asked for.
fn run(settings: &Settings, mut config: AnalyticsConfig) -> Result<Value> {
    if let Some(n) = settings.top_n {
        config.summary_top_n = n;
        config.query_top_n = n.max(1);
    }
    let projected_metric = match &settings.project {
        Some(name) => match config
            .registry
            .all_metric_names()
            .into_iter()
            .find(|m| m.eq_ignore_ascii_case(name))
        {
            Some(metric) => Some(metric),
            None => bail!("unknown metric '{}' for --project", name),
        },
        None => None,
    };

    let store = SnapshotStore::new(config);
    let snapshot = store
        .refresh_from_paths(&settings.input)
        .context("building KPI snapshot")?;

    let mut report = Map::new();
    report.insert("metadata".into(), serde_json::to_value(&snapshot.metadata)?);

    if let Some(question) = &settings.ask {
        let answer = store.answer(question);
        tracing::info!(intent = ?answer.intent, fallback = answer.is_fallback(), "Question answered");
        report.insert("answer".into(), serde_json::to_value(&answer)?);
    }

    if settings.summary {
        report.insert("summary".into(), serde_json::to_value(store.summary(settings.period))?);
    }

    if let Some(metric) = projected_metric {
        let projection = project_next_period(&snapshot.index, &metric, ALL_SCOPE, ALL_SCOPE);
        if projection.is_none() {
            tracing::warn!(metric = %metric, "Not enough periods to project");
        }
        report.insert("projection".into(), serde_json::to_value(projection)?);
    }

    if settings.errors {
        report.insert("errors".into(), serde_json::to_value(&snapshot.errors)?);
    }

    Ok(Value::Object(report))
}

// ── Tests ──────────────────────────────────────────────────────────────────────
