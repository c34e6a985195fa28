//! Errors surfaced by the script scheduler.

use thiserror::Error;

/// Failure raised by a script thread or by misuse of the scheduler API.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Unwind signal for a killed or cancelled thread.
    ///
    /// Bodies must propagate this untouched; it is never reported as a failure.
    #[error("script thread interrupted")]
    Interrupted,

    /// A tick pass was requested outside the thread that currently holds the token.
    #[error("tick() may only be called from inside a running script thread")]
    NotInScriptThread,

    /// A thread tried to wait for itself to finish.
    #[error("a script thread cannot wait for itself")]
    WaitOnSelf,

    /// `run()` on a thread whose body already ran to completion.
    #[error("script thread {0} has already finished")]
    AlreadyFinished(u64),

    /// Error raised by script code.
    #[error("{0}")]
    Runtime(String),

    /// The OS refused to spawn the backing thread.
    #[error("failed to spawn script thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// Host-side failure bubbled through a script call.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScriptError {
    /// Build a runtime failure from any displayable message.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    /// True for the unwind signal used by killed/cancelled threads.
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    /// True for programming misuse of the scheduler API.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::NotInScriptThread | Self::WaitOnSelf | Self::AlreadyFinished(_)
        )
    }
}

/// Result alias used across the scheduler.
pub type ScriptResult<T = ()> = Result<T, ScriptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interruption_is_not_misuse() {
        assert!(ScriptError::Interrupted.is_interruption());
        assert!(!ScriptError::Interrupted.is_misuse());
        assert!(ScriptError::WaitOnSelf.is_misuse());
        assert!(ScriptError::AlreadyFinished(3).is_misuse());
    }

    #[test]
    fn runtime_message_is_displayed_verbatim() {
        let err = ScriptError::runtime("boom");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn anyhow_errors_convert_transparently() {
        let err: ScriptError = anyhow::anyhow!("host went away").into();
        assert_eq!(err.to_string(), "host went away");
        assert!(!err.is_interruption());
    }
}
