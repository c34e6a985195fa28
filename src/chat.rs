use std::sync::{Mutex, MutexGuard, PoisonError};
use tickscript_scripting::ErrorSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    /// `print` from a script.
    Print,
    /// `chat` from a script.
    Chat,
    /// Command feedback.
    Feedback,
    /// Uncaught script failure or command error.
    Error,
}

impl ChatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::Chat => "chat",
            Self::Feedback => "feedback",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub kind: ChatKind,
    pub text: String,
}

/// Lines shown to the player, buffered until the host drains them.
#[derive(Debug, Default)]
pub struct ChatLog {
    pending: Mutex<Vec<ChatLine>>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, Vec<ChatLine>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, kind: ChatKind, text: impl Into<String>) {
        let text = text.into();
        match kind {
            ChatKind::Error => tracing::warn!(target: "chat", kind = kind.as_str(), "{text}"),
            _ => tracing::info!(target: "chat", kind = kind.as_str(), "{text}"),
        }
        self.pending().push(ChatLine { kind, text });
    }

    /// Take every line pushed since the last drain.
    pub fn drain(&self) -> Vec<ChatLine> {
        std::mem::take(&mut *self.pending())
    }
}

impl ErrorSink for ChatLog {
    fn report_error(&self, message: &str) {
        self.push(ChatKind::Error, message);
    }
}
