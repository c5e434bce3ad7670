//! Core types for KPI analytics.
//!
//! Periods, raw and canonical records, the normalization error log, the
//! category registry, cell parsers, fuzzy category matching and the
//! configuration layer shared by every other crate.

pub mod data_processors;
pub mod error;
pub mod fuzzy;
pub mod models;
pub mod period;
pub mod registry;
pub mod settings;
pub mod text;
