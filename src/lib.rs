#![forbid(unsafe_code)]

//! Storage sufficiency monitor (ssm): answers "does this model still fit on
//! disk?" and keeps answering it while free space and the model change.
//!
//! Two periodic loops share one observable state:
//! 1. **Free-space poller**: refreshes the latest free-space reading
//! 2. **Sufficiency evaluator**: turns the reading and an artifact description
//!    into an ok/not-ok status with a human-readable message
//!
//! Every evaluator run belongs to an epoch; results that arrive after their
//! epoch has been superseded are dropped.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use storage_sufficiency::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use storage_sufficiency::core::config::Config;
//! use storage_sufficiency::monitor::storage_check::StorageMonitor;
//! ```

pub mod prelude;

pub mod core;
pub mod logger;
pub mod monitor;
pub mod platform;
