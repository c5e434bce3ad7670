//! Runtime layer: holds the current KPI snapshot and serves queries on it.
//!
//! Refreshes swap in whole snapshots; reads never block on a rebuild.

pub mod snapshot_store;

pub use kpi_core as core;
pub use kpi_data as data;
pub use kpi_query as query;

pub use snapshot_store::{SnapshotStore, StoreStatus};
