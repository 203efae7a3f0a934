//! Core types: errors, configuration, byte formatting.

pub mod config;
pub mod errors;
pub mod units;
