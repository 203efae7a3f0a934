//! Activity logging: JSONL file sink and the background thread feeding it.

pub mod activity;
pub mod jsonl;
