//! Storage-sufficiency monitoring: the free-space poller, the sufficiency
//! evaluator, the status they publish, and the epochs that keep stale async
//! results from landing.

pub mod artifact;
pub mod epoch;
pub mod evaluator;
pub mod free_space;
pub mod poller;
pub mod status;
pub mod storage_check;
pub mod sufficiency;

#[cfg(test)]
mod test_support;
