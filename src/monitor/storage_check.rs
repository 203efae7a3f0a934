//! The storage monitor: wires the poller, the evaluator and the status
//! publisher together behind an explicit `start`/`stop` lifecycle.
//!
//! Two epoch clocks are involved. The lifecycle clock covers the poller and the
//! free-space watcher and is advanced by `start` and retired by `stop`. The
//! evaluation clock covers one evaluator run and is advanced on every restart:
//! `start`, an artifact change, or (when enabled) a changed free-space reading.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::core::config::MonitorConfig;
use crate::core::errors::{Result, SsmError};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::monitor::artifact::Artifact;
use crate::monitor::epoch::{EpochClock, EpochToken};
use crate::monitor::evaluator::SufficiencyEvaluator;
use crate::monitor::free_space::FreeSpaceProbe;
use crate::monitor::poller::FreeSpacePoller;
use crate::monitor::status::{StatusPublisher, StorageStatus};
use crate::monitor::sufficiency::SufficiencyCheck;

struct SlotState {
    artifact: Option<Artifact>,
    /// Set while the monitor runs; evaluator runs are spawned onto it.
    runtime: Option<Handle>,
}

/// The evaluator plus the artifact it currently watches.
struct EvaluationSlot {
    evaluator: SufficiencyEvaluator,
    clock: EpochClock,
    state: Mutex<SlotState>,
}

impl EvaluationSlot {
    /// Supersede the current run and, if running with an artifact, start a new one.
    fn restart(&self) {
        let state = self.state.lock();
        match (&state.runtime, &state.artifact) {
            (Some(runtime), Some(artifact)) => {
                let token = self.clock.advance();
                runtime.spawn(self.evaluator.clone().run(artifact.clone(), token));
            }
            _ => self.clock.retire(),
        }
    }

    fn activate(&self, runtime: Handle) {
        self.state.lock().runtime = Some(runtime);
        self.restart();
    }

    fn halt(&self) {
        let mut state = self.state.lock();
        state.runtime = None;
        self.clock.retire();
    }

    fn replace_artifact(&self, artifact: Artifact) -> bool {
        let mut state = self.state.lock();
        state.artifact = Some(artifact);
        state.runtime.is_some()
    }

    fn artifact(&self) -> Option<Artifact> {
        self.state.lock().artifact.clone()
    }
}

/// Periodic storage-sufficiency monitor for one artifact at a time.
///
/// Must be started from inside a tokio runtime; both loops are spawned onto it.
/// Dropping the monitor stops it.
pub struct StorageMonitor {
    publisher: StatusPublisher,
    poller: FreeSpacePoller,
    slot: Arc<EvaluationSlot>,
    lifecycle: EpochClock,
    restart_on_free_space_change: bool,
    started_at: Mutex<Option<Instant>>,
    logger: ActivityLoggerHandle,
}

impl StorageMonitor {
    pub fn new(
        config: &MonitorConfig,
        probe: Arc<dyn FreeSpaceProbe>,
        check: Arc<dyn SufficiencyCheck>,
        logger: ActivityLoggerHandle,
    ) -> Self {
        let publisher = StatusPublisher::new();
        let poller = FreeSpacePoller::new(
            Arc::clone(&probe),
            config.storage_mode,
            config.poll_interval(),
            &publisher,
            logger.clone(),
        );
        let evaluator = SufficiencyEvaluator::new(
            check,
            probe,
            config.storage_mode,
            config.evaluate_interval(),
            &publisher,
            logger.clone(),
        );
        Self {
            publisher,
            poller,
            slot: Arc::new(EvaluationSlot {
                evaluator,
                clock: EpochClock::new(),
                state: Mutex::new(SlotState {
                    artifact: None,
                    runtime: None,
                }),
            }),
            lifecycle: EpochClock::new(),
            restart_on_free_space_change: config.restart_on_free_space_change,
            started_at: Mutex::new(None),
            logger,
        }
    }

    /// Start both loops on the current tokio runtime. Each runs once right away.
    /// Starting a running monitor restarts it.
    pub fn start(&self) -> Result<()> {
        let runtime = Handle::try_current().map_err(|error| SsmError::Runtime {
            details: format!("storage monitor needs a tokio runtime: {error}"),
        })?;
        if self.is_running() {
            self.stop();
        }

        let token = self.lifecycle.advance();
        if self.restart_on_free_space_change {
            runtime.spawn(restart_on_free_space_change(
                Arc::clone(&self.slot),
                self.publisher.subscribe_free_disk_storage(),
                token.clone(),
            ));
        }
        runtime.spawn(self.poller.clone().run(token));
        self.slot.activate(runtime);

        *self.started_at.lock() = Some(Instant::now());
        self.logger.send(ActivityEvent::MonitorStarted {
            artifact_id: self.slot.artifact().map(|artifact| artifact.id),
        });
        Ok(())
    }

    /// Stop both loops. No status or reading is published after this returns;
    /// the last published values stay readable.
    pub fn stop(&self) {
        self.lifecycle.retire();
        self.slot.halt();
        if let Some(started) = self.started_at.lock().take() {
            self.logger.send(ActivityEvent::MonitorStopped {
                uptime_secs: started.elapsed().as_secs(),
            });
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.started_at.lock().is_some()
    }

    /// Hand over a new artifact description. A running monitor abandons the
    /// evaluation in flight and evaluates the new artifact immediately.
    pub fn set_artifact(&self, artifact: Artifact) {
        self.logger.send(ActivityEvent::ArtifactChanged {
            artifact_id: artifact.id.clone(),
            size_bytes: artifact.size,
        });
        if self.slot.replace_artifact(artifact) {
            self.slot.restart();
        }
    }

    #[must_use]
    pub fn artifact(&self) -> Option<Artifact> {
        self.slot.artifact()
    }

    #[must_use]
    pub fn storage_status(&self) -> StorageStatus {
        self.publisher.storage_status()
    }

    /// Latest poller reading, `None` until the first successful poll.
    #[must_use]
    pub fn free_disk_storage(&self) -> Option<u64> {
        self.publisher.free_disk_storage()
    }

    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<StorageStatus> {
        self.publisher.subscribe_status()
    }

    #[must_use]
    pub fn subscribe_free_disk_storage(&self) -> watch::Receiver<Option<u64>> {
        self.publisher.subscribe_free_disk_storage()
    }
}

impl Drop for StorageMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Restart the evaluator whenever the poller's reading takes a new value.
async fn restart_on_free_space_change(
    slot: Arc<EvaluationSlot>,
    mut readings: watch::Receiver<Option<u64>>,
    token: EpochToken,
) {
    let mut last = *readings.borrow_and_update();
    loop {
        tokio::select! {
            biased;
            () = token.superseded() => break,
            changed = readings.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        let reading = *readings.borrow_and_update();
        if reading != last && token.is_current() {
            last = reading;
            slot.restart();
        }
    }
}
