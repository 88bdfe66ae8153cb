//! Process-wide shutdown signalling.
//!
//! The server owns one [`Shutdown`] and hands a [`ShutdownSignal`] to every
//! background task (the log flusher, the liveness sweeper). Triggering it wakes
//! all of them so that each can run its final pass before exiting.

use tokio::sync::watch;

/// Sender side of the shutdown signal.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// Receiver side handed to background tasks. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Create a new receiver for a background task.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Fire the signal. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
        tracing::debug!("Shutdown signal triggered");
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// Resolve once shutdown has been triggered.
    ///
    /// Also resolves when the [`Shutdown`] owner was dropped, so tasks never
    /// outlive the server that spawned them.
    pub async fn recv(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}
