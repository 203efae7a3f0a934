//! Free-space poller: keeps `free_disk_storage` fresh on a fixed cadence.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};

use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::monitor::epoch::EpochToken;
use crate::monitor::free_space::{FreeSpaceProbe, StorageMode};
use crate::monitor::status::{FreeSpaceWriter, StatusPublisher};

/// What one poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Published(u64),
    /// The query failed; the previous reading stays in place.
    Failed,
    /// The epoch ended while the query was in flight.
    Discarded,
}

#[derive(Clone)]
pub struct FreeSpacePoller {
    probe: Arc<dyn FreeSpaceProbe>,
    mode: StorageMode,
    interval: Duration,
    writer: FreeSpaceWriter,
    logger: ActivityLoggerHandle,
}

impl FreeSpacePoller {
    pub fn new(
        probe: Arc<dyn FreeSpaceProbe>,
        mode: StorageMode,
        interval: Duration,
        publisher: &StatusPublisher,
        logger: ActivityLoggerHandle,
    ) -> Self {
        Self {
            probe,
            mode,
            interval: interval.max(Duration::from_millis(1)),
            writer: publisher.free_space_writer(),
            logger,
        }
    }

    /// Query once and publish the reading if `token` is still current afterwards.
    pub async fn poll_once(&self, token: &EpochToken) -> PollOutcome {
        let result = self.probe.query_free_disk_storage(self.mode).await;
        if !token.is_current() {
            return PollOutcome::Discarded;
        }
        match result {
            Ok(bytes) => {
                self.writer.publish(bytes);
                PollOutcome::Published(bytes)
            }
            Err(error) => {
                eprintln!("[SSM-POLLER] free-space query failed: {error}");
                self.logger.send(ActivityEvent::FreeSpaceQueryFailed {
                    code: error.code().to_string(),
                    message: error.to_string(),
                });
                PollOutcome::Failed
            }
        }
    }

    /// Poll immediately, then every interval, until `token` is superseded.
    pub async fn run(self, token: EpochToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = token.superseded() => break,
                _ = ticker.tick() => {}
            }
            if self.poll_once(&token).await == PollOutcome::Discarded {
                break;
            }
        }
    }
}
