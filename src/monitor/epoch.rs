//! Cooperative cancellation scopes ("epochs") for the monitor loops.
//!
//! Every (re)start of a loop takes a fresh [`EpochToken`] from an
//! [`EpochClock`]. Advancing or retiring the clock supersedes all tokens handed
//! out before. Async work checks [`EpochToken::is_current`] right after each
//! suspension point and drops its result when the answer is no; loops race
//! their timers against [`EpochToken::superseded`] so they end promptly.

use std::sync::Arc;

use tokio::sync::watch;

/// Monotonic epoch counter shared by one loop and its controller.
#[derive(Debug, Clone)]
pub struct EpochClock {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for EpochClock {
    fn default() -> Self {
        Self::new()
    }
}

impl EpochClock {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Current epoch number.
    #[must_use]
    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Open a new epoch, superseding every earlier token.
    pub fn advance(&self) -> EpochToken {
        let mut id = 0;
        self.tx.send_modify(|epoch| {
            *epoch = epoch.wrapping_add(1);
            id = *epoch;
        });
        EpochToken {
            id,
            rx: self.tx.subscribe(),
        }
    }

    /// Supersede the current epoch without opening one for new work.
    pub fn retire(&self) {
        self.tx.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
    }
}

/// Handle proving membership in one epoch.
#[derive(Debug, Clone)]
pub struct EpochToken {
    id: u64,
    rx: watch::Receiver<u64>,
}

impl EpochToken {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether no newer epoch has started since this token was issued.
    #[must_use]
    pub fn is_current(&self) -> bool {
        *self.rx.borrow() == self.id
    }

    /// Resolve once this epoch has been superseded (or its clock dropped).
    pub async fn superseded(&self) {
        let mut rx = self.rx.clone();
        let id = self.id;
        let _ = rx.wait_for(|epoch| *epoch != id).await;
    }
}
