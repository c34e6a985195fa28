//! Host-side bookkeeping of long-running script tasks.
//!
//! Every started script thread registers a [`TaskToken`] under a task group.
//! The host can list or abort groups; aborting cancels the token, and the
//! thread unwinds at its next tick pass.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cancellable token whose alive state mirrors a script thread's `running` flag.
#[derive(Debug, Default)]
pub struct TaskToken {
    alive: AtomicBool,
    cancelled: AtomicBool,
}

impl TaskToken {
    /// Create a token that is not yet alive.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// True while the owning thread runs and nobody cancelled it.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.is_cancelled()
    }

    /// Inverse of [`TaskToken::is_alive`].
    pub fn is_completed(&self) -> bool {
        !self.is_alive()
    }

    /// Ask the owning thread to stop at its next tick pass.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// True once [`TaskToken::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Collaborator the scheduler reports started threads to.
pub trait TaskRegistry: Send + Sync {
    /// Track `token` under `group`. Deregistration is implicit once the token
    /// stops reporting alive.
    fn register(&self, group: &str, token: Arc<TaskToken>);
}

/// Registry that ignores every registration.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTaskRegistry;

impl TaskRegistry for NullTaskRegistry {
    fn register(&self, _group: &str, _token: Arc<TaskToken>) {}
}

/// Task registry kept in memory, grouped by name.
#[derive(Debug, Default)]
pub struct InMemoryTaskRegistry {
    groups: Mutex<BTreeMap<String, Vec<Arc<TaskToken>>>>,
}

impl InMemoryTaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn groups(&self) -> MutexGuard<'_, BTreeMap<String, Vec<Arc<TaskToken>>>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop tokens that are no longer alive. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut groups = self.groups();
        let mut removed = 0;
        for tokens in groups.values_mut() {
            let before = tokens.len();
            tokens.retain(|token| token.is_alive());
            removed += before - tokens.len();
        }
        groups.retain(|_, tokens| !tokens.is_empty());
        removed
    }

    /// Number of live tasks in `group`.
    pub fn count(&self, group: &str) -> usize {
        self.groups()
            .get(group)
            .map(|tokens| tokens.iter().filter(|token| token.is_alive()).count())
            .unwrap_or(0)
    }

    /// Live task count per group, sorted by group name.
    pub fn summary(&self) -> Vec<(String, usize)> {
        self.groups()
            .iter()
            .map(|(name, tokens)| {
                let live = tokens.iter().filter(|token| token.is_alive()).count();
                (name.clone(), live)
            })
            .filter(|(_, live)| *live > 0)
            .collect()
    }

    /// Cancel every live task in `group`. Returns how many were cancelled.
    pub fn abort_group(&self, group: &str) -> usize {
        self.groups()
            .get(group)
            .map(|tokens| cancel_all(tokens))
            .unwrap_or(0)
    }

    /// Cancel every live task in every group.
    pub fn abort_all(&self) -> usize {
        self.groups().values().map(|tokens| cancel_all(tokens)).sum()
    }
}

fn cancel_all(tokens: &[Arc<TaskToken>]) -> usize {
    let mut cancelled = 0;
    for token in tokens.iter().filter(|token| token.is_alive()) {
        token.cancel();
        cancelled += 1;
    }
    cancelled
}

impl TaskRegistry for InMemoryTaskRegistry {
    fn register(&self, group: &str, token: Arc<TaskToken>) {
        self.groups()
            .entry(group.to_string())
            .or_default()
            .push(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_token() -> Arc<TaskToken> {
        let token = Arc::new(TaskToken::new());
        token.set_alive(true);
        token
    }

    #[test]
    fn token_is_completed_until_alive() {
        let token = TaskToken::new();
        assert!(token.is_completed());
        token.set_alive(true);
        assert!(token.is_alive());
        token.cancel();
        assert!(token.is_completed());
        assert!(token.is_cancelled());
    }

    #[test]
    fn prune_drops_dead_tokens_and_empty_groups() {
        let registry = InMemoryTaskRegistry::new();
        let a = live_token();
        let b = live_token();
        registry.register("cscript", Arc::clone(&a));
        registry.register("cscript", Arc::clone(&b));
        assert_eq!(registry.count("cscript"), 2);

        a.set_alive(false);
        assert_eq!(registry.prune(), 1);
        assert_eq!(registry.count("cscript"), 1);

        b.set_alive(false);
        assert_eq!(registry.prune(), 1);
        assert!(registry.summary().is_empty());
    }

    #[test]
    fn abort_group_only_touches_that_group() {
        let registry = InMemoryTaskRegistry::new();
        let script = live_token();
        let other = live_token();
        registry.register("cscript", Arc::clone(&script));
        registry.register("pathfind", Arc::clone(&other));

        assert_eq!(registry.abort_group("cscript"), 1);
        assert!(script.is_cancelled());
        assert!(!other.is_cancelled());
        assert_eq!(
            registry.summary(),
            vec![("pathfind".to_string(), 1)]
        );
        assert_eq!(registry.abort_all(), 1);
        assert!(other.is_cancelled());
    }
}
