//! Atomic snapshot holder for the query runtime.
//!
//! A refresh runs the full pipeline off to the side and then replaces the
//! current [`Snapshot`] under a write lock held only for the pointer swap.
//! Readers clone the `Arc` and work on it without any lock, so a query always
//! sees one complete snapshot, old or new. A failed refresh keeps the previous
//! snapshot and records the error.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use kpi_core::error::Result;
use kpi_core::models::RawRecord;
use kpi_core::period::Period;
use kpi_core::settings::AnalyticsConfig;
use kpi_data::aggregator::AggregateIndex;
use kpi_data::analysis::{build_snapshot, Snapshot};
use kpi_data::reader::load_rows;
use kpi_data::summary::Summary;
use kpi_data::variation::VariationSet;
use kpi_query::{Answer, QueryEngine};
use serde::Serialize;
use tracing::{debug, warn};

// ── Status ────────────────────────────────────────────────────────────────────

/// Point-in-time view of the store, for health output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStatus {
    /// Number of successful refreshes so far.
    pub version: u64,
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

struct Current {
    snapshot: Arc<Snapshot>,
    loaded_at: Instant,
    version: u64,
}

// ── SnapshotStore ─────────────────────────────────────────────────────────────

/// Holds the current snapshot and answers queries against it.
///
/// # Example
/// ```no_run
/// use std::path::PathBuf;
/// use kpi_core::registry::CategoryRegistry;
/// use kpi_core::settings::AnalyticsConfig;
/// use kpi_runtime::snapshot_store::SnapshotStore;
///
/// let store = SnapshotStore::new(AnalyticsConfig::new(CategoryRegistry::default()));
/// store.refresh_from_paths(&[PathBuf::from("data")]).ok();
/// println!("{}", store.answer("total de ventas").message);
/// ```
pub struct SnapshotStore {
    config: AnalyticsConfig,
    engine: QueryEngine,
    current: RwLock<Option<Current>>,
    last_error: RwLock<Option<String>>,
}

impl SnapshotStore {
    pub fn new(config: AnalyticsConfig) -> Self {
        let engine = QueryEngine::new(&config);
        Self {
            config,
            engine,
            current: RwLock::new(None),
            last_error: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    // ── Refresh ───────────────────────────────────────────────────────────────

    /// Build a snapshot from `rows` and swap it in.
    ///
    /// On failure the previous snapshot stays current.
    pub fn refresh(&self, rows: &[RawRecord]) -> Result<Arc<Snapshot>> {
        match build_snapshot(rows, &self.config) {
            Ok(snapshot) => Ok(self.install(snapshot)),
            Err(e) => {
                warn!(error = %e, "refresh failed; keeping previous snapshot");
                self.set_error(Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Load every file under `paths` and refresh from the rows.
    pub fn refresh_from_paths(&self, paths: &[PathBuf]) -> Result<Arc<Snapshot>> {
        let rows = match load_rows(paths) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "loading rows failed; keeping previous snapshot");
                self.set_error(Some(e.to_string()));
                return Err(e);
            }
        };
        self.refresh(&rows)
    }

    fn install(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        let version = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            let version = current.as_ref().map_or(0, |c| c.version) + 1;
            *current = Some(Current {
                snapshot: Arc::clone(&snapshot),
                loaded_at: Instant::now(),
                version,
            });
            self.set_error(None);
            version
        };
        debug!(
            version,
            records = snapshot.metadata.records_created,
            "snapshot swapped in"
        );
        snapshot
    }

    fn set_error(&self, error: Option<String>) {
        *self.last_error.write().unwrap_or_else(PoisonError::into_inner) = error;
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    /// The current snapshot, `None` before the first successful refresh.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| Arc::clone(&c.snapshot))
    }

    pub fn version(&self) -> u64 {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, |c| c.version)
    }

    /// Time since the current snapshot was swapped in.
    pub fn snapshot_age(&self) -> Option<Duration> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| c.loaded_at.elapsed())
    }

    /// Description of the last failed refresh, cleared by a successful one.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn status(&self) -> StoreStatus {
        let snapshot = self.snapshot();
        StoreStatus {
            version: self.version(),
            loaded: snapshot.is_some(),
            generated_at: snapshot.map(|s| s.metadata.generated_at.clone()),
            last_error: self.last_error(),
        }
    }

    /// Answer `question` against the current snapshot.
    ///
    /// Before any data is loaded the engine sees an empty index and replies
    /// with a no-data fallback.
    pub fn answer(&self, question: &str) -> Answer {
        match self.snapshot() {
            Some(s) => self.engine.answer(question, &s.index, &s.variations),
            None => self
                .engine
                .answer(question, &AggregateIndex::default(), &VariationSet::default()),
        }
    }

    /// Highlights of `period` (latest when `None`) with the configured size.
    pub fn summary(&self, period: Option<Period>) -> Option<Summary> {
        self.snapshot()
            .map(|s| s.summary(self.config.summary_top_n, period))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
