//! Where uncaught script failures are reported.

use std::sync::{Mutex, PoisonError};

/// Receives one message per unexpected script failure.
///
/// Never called for the interruption used to unwind killed threads.
pub trait ErrorSink: Send + Sync {
    /// Surface `message` to the user.
    fn report_error(&self, message: &str);
}

/// Sink that only logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report_error(&self, message: &str) {
        tracing::error!(%message, "script error");
    }
}

/// Sink that keeps every reported message, in order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    messages: Mutex<Vec<String>>,
}

impl CollectingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the messages reported so far.
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ErrorSink for CollectingSink {
    fn report_error(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}
