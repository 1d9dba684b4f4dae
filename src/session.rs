//! Session registry
//!
//! Holds the id of the current interaction and its cancellation token. Every
//! new manual, wake or typed interaction bumps the id and cancels the token of
//! whatever came before, so stale follow-up loops stop and their in-flight
//! transcription or skill calls are aborted.

use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Snapshot of a session handed to a loop or turn
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub id: u64,
    pub cancel: CancellationToken,
}

impl SessionToken {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Debug)]
struct Current {
    id: u64,
    cancel: CancellationToken,
}

/// Process-wide session counter, starting at id 0
#[derive(Debug)]
pub struct SessionRegistry {
    current: Mutex<Current>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Current {
                id: 0,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Start a new session, superseding the current one
    pub fn begin(&self) -> SessionToken {
        let mut current = self.current.lock().unwrap();
        current.cancel.cancel();
        current.id += 1;
        current.cancel = CancellationToken::new();
        tracing::debug!(session_id = current.id, "Session started");
        SessionToken {
            id: current.id,
            cancel: current.cancel.clone(),
        }
    }

    /// The session currently in force
    pub fn current(&self) -> SessionToken {
        let current = self.current.lock().unwrap();
        SessionToken {
            id: current.id,
            cancel: current.cancel.clone(),
        }
    }

    pub fn current_id(&self) -> u64 {
        self.current.lock().unwrap().id
    }

    pub fn is_current(&self, id: u64) -> bool {
        self.current_id() == id
    }

    /// Token for `id`, or `None` if a newer session has started
    pub fn token_if_current(&self, id: u64) -> Option<SessionToken> {
        let current = self.current.lock().unwrap();
        (current.id == id).then(|| SessionToken {
            id,
            cancel: current.cancel.clone(),
        })
    }

    /// Run `emit` only while `id` is current. The registry lock is held for
    /// the duration, so a concurrent `begin` cannot slip in between the check
    /// and the emission.
    pub fn if_current<R>(&self, id: u64, emit: impl FnOnce() -> R) -> Option<R> {
        let current = self.current.lock().unwrap();
        if current.id == id {
            Some(emit())
        } else {
            None
        }
    }

    /// Cancel whatever is in flight without starting a new interaction.
    /// Every call bumps the id so loops holding an older one stop; cancelling
    /// a token that is already cancelled is a no-op.
    pub fn interrupt(&self) -> u64 {
        self.begin().id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_zero() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.current_id(), 0);
        assert!(registry.is_current(0));
    }

    #[test]
    fn test_begin_supersedes_and_cancels() {
        let registry = SessionRegistry::new();
        let first = registry.begin();
        assert_eq!(first.id, 1);
        assert!(!first.is_cancelled());

        let second = registry.begin();
        assert_eq!(second.id, 2);
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(!registry.is_current(first.id));
        assert!(registry.token_if_current(first.id).is_none());
        assert!(registry.token_if_current(second.id).is_some());
    }

    #[test]
    fn test_if_current_skips_stale() {
        let registry = SessionRegistry::new();
        let stale = registry.begin();
        registry.begin();
        let mut emitted = false;
        assert!(registry.if_current(stale.id, || emitted = true).is_none());
        assert!(!emitted);
    }

    #[test]
    fn test_interrupt_bumps_id_and_tolerates_cancelled_token() {
        let registry = SessionRegistry::new();
        let token = registry.begin();
        token.cancel.cancel();
        token.cancel.cancel();
        registry.interrupt();
        assert!(token.is_cancelled());
        assert_eq!(registry.current_id(), 2);
    }
}
