//! Rule-based question answering over KPI snapshots.

pub mod answer;
pub mod engine;
pub mod intent;
pub mod question;
pub mod slots;

pub use answer::{Answer, AnswerStatus, FallbackReason};
pub use engine::{answer, QueryEngine};
pub use intent::Intent;
