//! Scriptable collaborators for the monitor's unit tests.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::errors::{Result, SsmError};
use crate::monitor::artifact::Artifact;
use crate::monitor::free_space::{FreeSpaceProbe, StorageMode};
use crate::monitor::sufficiency::SufficiencyCheck;

fn scripted_failure() -> SsmError {
    SsmError::FsStats {
        path: PathBuf::from("/scripted"),
        details: "scripted failure".to_string(),
    }
}

/// Free-space probe answering from a script. `None` entries fail.
/// Once the script runs out every call returns the fallback answer.
pub(crate) struct ScriptedProbe {
    script: Mutex<VecDeque<Option<u64>>>,
    fallback: Mutex<Option<u64>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
    modes: Mutex<Vec<StorageMode>>,
}

impl ScriptedProbe {
    pub(crate) fn sequence(steps: impl IntoIterator<Item = Option<u64>>, then: Option<u64>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            fallback: Mutex::new(then),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
            modes: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn constant(bytes: u64) -> Self {
        Self::sequence([], Some(bytes))
    }

    pub(crate) fn failing() -> Self {
        Self::sequence([], None)
    }

    /// Drop any remaining script and answer `answer` from now on.
    pub(crate) fn set(&self, answer: Option<u64>) {
        self.script.lock().clear();
        *self.fallback.lock() = answer;
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn modes(&self) -> Vec<StorageMode> {
        self.modes.lock().clone()
    }
}

#[async_trait]
impl FreeSpaceProbe for ScriptedProbe {
    async fn query_free_disk_storage(&self, mode: StorageMode) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.modes.lock().push(mode);
        let answer = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| *self.fallback.lock());
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        answer.ok_or_else(scripted_failure)
    }
}

/// Sufficiency predicate with a settable answer and latency. `None` fails.
pub(crate) struct ScriptedCheck {
    answer: Mutex<Option<bool>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl ScriptedCheck {
    pub(crate) fn answering(answer: Option<bool>) -> Self {
        Self {
            answer: Mutex::new(answer),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set(&self, answer: Option<bool>) {
        *self.answer.lock() = answer;
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SufficiencyCheck for ScriptedCheck {
    async fn has_enough_space(&self, _artifact: &Artifact) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = *self.answer.lock();
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        answer.ok_or_else(scripted_failure)
    }
}
