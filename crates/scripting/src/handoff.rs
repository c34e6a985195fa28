//! Rendezvous used to pass the execution token between the driver and a script thread.
//!
//! Both channels are zero-capacity, so every send completes only when the
//! other side is receiving. Exactly one side runs at a time and everything
//! written before a send is visible to the receiver.

use crossbeam_channel::{bounded, Receiver, Sender};

/// Why a script thread handed the token back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Handback {
    /// Suspended in a tick pass, waiting to be resumed.
    Blocked,
    /// Body returned and cleanup ran.
    Finished,
}

pub(crate) struct Handoff {
    resume_tx: Sender<()>,
    resume_rx: Receiver<()>,
    handback_tx: Sender<Handback>,
    handback_rx: Receiver<Handback>,
}

impl Handoff {
    pub(crate) fn new() -> Self {
        let (resume_tx, resume_rx) = bounded(0);
        let (handback_tx, handback_rx) = bounded(0);
        Self {
            resume_tx,
            resume_rx,
            handback_tx,
            handback_rx,
        }
    }

    /// Driver side: release a blocked thread and wait for it to hand back.
    pub(crate) fn resume(&self) -> Handback {
        if self.resume_tx.send(()).is_err() {
            return Handback::Finished;
        }
        self.wait()
    }

    /// Driver side: wait for the next hand-back without releasing first.
    pub(crate) fn wait(&self) -> Handback {
        self.handback_rx.recv().unwrap_or(Handback::Finished)
    }

    /// Script side: hand the token back and block until resumed.
    ///
    /// Returns `false` if the driver side is gone.
    pub(crate) fn block(&self) -> bool {
        if self.handback_tx.send(Handback::Blocked).is_err() {
            return false;
        }
        self.resume_rx.recv().is_ok()
    }

    /// Script side: final hand-back after cleanup.
    pub(crate) fn finish(&self) {
        let _ = self.handback_tx.send(Handback::Finished);
    }
}

impl std::fmt::Debug for Handoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handoff").finish_non_exhaustive()
    }
}
