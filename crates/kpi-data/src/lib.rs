//! Data layer for KPI analytics.
//!
//! Loads CSV/JSON exports, normalizes raw rows into canonical records,
//! aggregates them into `(period, brand, idh)` buckets, computes
//! period-over-period variations and highlights, and projects trends.

pub mod aggregator;
pub mod analysis;
pub mod normalizer;
pub mod projection;
pub mod reader;
pub mod summary;
pub mod variation;

pub use kpi_core as core;
