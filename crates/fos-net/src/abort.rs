//! Abort Signals
//!
//! Cancellation for in-flight fetches. Aborting closes a channel, which wakes
//! every task awaiting the signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use smol::channel::{self, Receiver, Sender};

#[derive(Debug)]
struct AbortState {
    aborted: AtomicBool,
    sender: Sender<()>,
}

/// Owner side of an abort signal
#[derive(Debug, Clone)]
pub struct AbortController {
    state: Arc<AbortState>,
    receiver: Receiver<()>,
}

impl AbortController {
    pub fn new() -> Self {
        let (sender, receiver) = channel::bounded(1);
        Self {
            state: Arc::new(AbortState {
                aborted: AtomicBool::new(false),
                sender,
            }),
            receiver,
        }
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            state: self.state.clone(),
            receiver: self.receiver.clone(),
        }
    }

    /// Abort; repeated calls are no-ops
    pub fn abort(&self) {
        if !self.state.aborted.swap(true, Ordering::SeqCst) {
            self.state.sender.close();
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::SeqCst)
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of an abort signal
#[derive(Debug, Clone)]
pub struct AbortSignal {
    state: Arc<AbortState>,
    receiver: Receiver<()>,
}

impl AbortSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        AbortController::new().signal()
    }

    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::SeqCst)
    }

    /// Resolves once the controller aborts
    pub async fn aborted(&self) {
        if self.is_aborted() {
            return;
        }
        // Nothing is ever sent; recv only returns once the channel is closed
        let _ = self.receiver.recv().await;
    }
}
