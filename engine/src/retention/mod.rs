//! Retention store (spec §4.6).

mod store;

pub use store::{guard_job_id, EffectiveRetention, RetentionRecord, RetentionStore};
