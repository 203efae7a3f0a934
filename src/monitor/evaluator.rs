//! Sufficiency evaluator: decides and publishes the storage status for one artifact.
//!
//! A run is predicate, then (only when the predicate says no) a fresh
//! free-space query, then a publish. Every await is followed by an epoch check;
//! a superseded run stops right there and writes nothing.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};

use crate::core::errors::SsmError;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::monitor::artifact::Artifact;
use crate::monitor::epoch::EpochToken;
use crate::monitor::free_space::{FreeSpaceProbe, StorageMode};
use crate::monitor::status::{StatusPublisher, StatusWriter, StorageStatus};
use crate::monitor::sufficiency::SufficiencyCheck;

/// What one evaluation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationOutcome {
    /// The artifact is already on the device; nothing was queried or published.
    Skipped,
    /// This status was written (possibly identical to the previous one).
    Committed(StorageStatus),
    /// The epoch ended during an await; the result was dropped.
    Superseded,
}

#[derive(Clone)]
pub struct SufficiencyEvaluator {
    check: Arc<dyn SufficiencyCheck>,
    probe: Arc<dyn FreeSpaceProbe>,
    mode: StorageMode,
    interval: Duration,
    writer: StatusWriter,
    logger: ActivityLoggerHandle,
}

impl SufficiencyEvaluator {
    pub fn new(
        check: Arc<dyn SufficiencyCheck>,
        probe: Arc<dyn FreeSpaceProbe>,
        mode: StorageMode,
        interval: Duration,
        publisher: &StatusPublisher,
        logger: ActivityLoggerHandle,
    ) -> Self {
        Self {
            check,
            probe,
            mode,
            interval: interval.max(Duration::from_millis(1)),
            writer: publisher.status_writer(),
            logger,
        }
    }

    pub async fn evaluate_once(&self, artifact: &Artifact, token: &EpochToken) -> EvaluationOutcome {
        if artifact.is_on_device() {
            return EvaluationOutcome::Skipped;
        }

        let enough = self.check.has_enough_space(artifact).await;
        if !token.is_current() {
            return EvaluationOutcome::Superseded;
        }
        let status = match enough {
            Ok(true) => StorageStatus::ok(),
            Ok(false) => {
                let free = self.probe.query_free_disk_storage(self.mode).await;
                if !token.is_current() {
                    return EvaluationOutcome::Superseded;
                }
                match free {
                    Ok(free) => StorageStatus::low(artifact.size, free),
                    Err(error) => self.check_failed(artifact, &error),
                }
            }
            Err(error) => self.check_failed(artifact, &error),
        };

        if self.writer.publish(status.clone()) {
            self.logger.send(ActivityEvent::StatusChanged {
                artifact_id: artifact.id.clone(),
                is_ok: status.is_ok(),
                message: status.message().to_string(),
                size_bytes: artifact.size,
            });
        }
        EvaluationOutcome::Committed(status)
    }

    fn check_failed(&self, artifact: &Artifact, error: &SsmError) -> StorageStatus {
        eprintln!(
            "[SSM-EVALUATOR] storage check for {} failed: {error}",
            artifact.id
        );
        self.logger.send(ActivityEvent::StorageCheckFailed {
            artifact_id: artifact.id.clone(),
            code: error.code().to_string(),
            message: error.to_string(),
        });
        StorageStatus::check_failed()
    }

    /// Evaluate immediately, then every interval, until `token` is superseded.
    /// An on-device artifact ends the run after the first pass.
    pub async fn run(self, artifact: Artifact, token: EpochToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = token.superseded() => break,
                _ = ticker.tick() => {}
            }
            match self.evaluate_once(&artifact, &token).await {
                EvaluationOutcome::Committed(_) => {}
                EvaluationOutcome::Skipped | EvaluationOutcome::Superseded => break,
            }
        }
    }
}
