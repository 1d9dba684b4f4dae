//! Core state broadcaster
//!
//! Owns the process-visible `CoreState` and fans changes out to observers
//! (web sockets, SSE streams, the CLI echo). Sends never block: a slow
//! observer lags and drops events rather than holding up a turn.

use crate::session::SessionRegistry;
use crate::state_machine::CoreState;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// How long `tool` stays visible before reverting
pub const TOOL_IMPULSE: Duration = Duration::from_millis(650);

const CHANNEL_CAPACITY: usize = 128;

/// Events pushed to UI observers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    StateChange {
        state: CoreState,
    },
    Transcription {
        text: String,
    },
    Reply {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        audio_url: Option<String>,
    },
    Skill {
        skill: String,
    },
}

#[derive(Debug)]
struct Inner {
    current: CoreState,
    /// State to restore once the tool impulse expires
    pre_tool: Option<CoreState>,
    revert: Option<CancellationToken>,
    /// Bumped on every change so a late revert can tell it lost the race
    generation: u64,
}

/// Session a tool impulse was raised under. Its revert is dropped once a
/// newer session starts.
#[derive(Debug, Clone)]
struct Scope {
    sessions: Arc<SessionRegistry>,
    session_id: u64,
}

/// Cheaply cloneable handle to the shared state
#[derive(Debug, Clone)]
pub struct StateBroadcaster {
    inner: Arc<Mutex<Inner>>,
    tx: broadcast::Sender<UiEvent>,
    impulse: Duration,
}

impl Default for StateBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl StateBroadcaster {
    pub fn new() -> Self {
        Self::with_impulse(TOOL_IMPULSE)
    }

    pub fn with_impulse(impulse: Duration) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                current: CoreState::Idle,
                pre_tool: None,
                revert: None,
                generation: 0,
            })),
            tx,
            impulse,
        }
    }

    pub fn current(&self) -> CoreState {
        self.inner.lock().unwrap().current
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }

    /// Update the state and notify observers.
    ///
    /// Entering `tool` schedules a revert to whatever was active before the
    /// impulse started. Any later call cancels that revert; re-entering `tool`
    /// installs a fresh one against the same pre-tool state.
    pub fn set_state(&self, next: CoreState) {
        self.update(next, None);
    }

    fn update(&self, next: CoreState, scope: Option<Scope>) {
        let mut inner = self.inner.lock().unwrap();
        inner.generation += 1;
        if let Some(pending) = inner.revert.take() {
            pending.cancel();
        }

        if next == CoreState::Tool {
            if inner.current != CoreState::Tool {
                inner.pre_tool = Some(inner.current);
            }
            let restore = inner.pre_tool.unwrap_or_default();
            let token = CancellationToken::new();
            inner.revert = Some(token.clone());
            self.schedule_revert(inner.generation, restore, token, scope);
        } else {
            inner.pre_tool = None;
        }

        inner.current = next;
        tracing::debug!(state = %next, "State change");
        // Sent under the lock so observers see changes in issue order
        let _ = self.tx.send(UiEvent::StateChange { state: next });
    }

    /// Push a non-state event to observers
    pub fn publish(&self, event: UiEvent) {
        let _guard = self.inner.lock().unwrap();
        let _ = self.tx.send(event);
    }

    fn schedule_revert(
        &self,
        generation: u64,
        restore: CoreState,
        token: CancellationToken,
        scope: Option<Scope>,
    ) {
        let inner = Arc::clone(&self.inner);
        let tx = self.tx.clone();
        let impulse = self.impulse;
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => return,
                () = tokio::time::sleep(impulse) => {}
            }
            let revert = || {
                let mut inner = inner.lock().unwrap();
                if inner.generation != generation {
                    return;
                }
                inner.generation += 1;
                inner.current = restore;
                inner.pre_tool = None;
                inner.revert = None;
                tracing::debug!(state = %restore, "Tool impulse reverted");
                let _ = tx.send(UiEvent::StateChange { state: restore });
            };
            match scope {
                Some(scope) => {
                    if scope.sessions.if_current(scope.session_id, revert).is_none() {
                        tracing::debug!(session_id = scope.session_id, "Tool revert dropped for stale session");
                    }
                }
                None => revert(),
            }
        });
    }
}

/// Broadcast handle bound to one session. Emissions are dropped once the
/// session is superseded, so a stale loop can never be observed.
#[derive(Debug, Clone)]
pub struct SessionEmitter {
    sessions: Arc<SessionRegistry>,
    states: StateBroadcaster,
    session_id: u64,
}

impl SessionEmitter {
    pub fn new(sessions: Arc<SessionRegistry>, states: StateBroadcaster, session_id: u64) -> Self {
        Self {
            sessions,
            states,
            session_id,
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn is_current(&self) -> bool {
        self.sessions.is_current(self.session_id)
    }

    /// Returns false if the session was stale and nothing was sent
    /// A `tool` impulse set here only reverts while this session is current.
    pub fn set_state(&self, state: CoreState) -> bool {
        let scope = Scope {
            sessions: Arc::clone(&self.sessions),
            session_id: self.session_id,
        };
        self.sessions
            .if_current(self.session_id, || self.states.update(state, Some(scope)))
            .is_some()
    }

    pub fn publish(&self, event: UiEvent) -> bool {
        self.sessions
            .if_current(self.session_id, || self.states.publish(event))
            .is_some()
    }

    pub fn states(&self) -> &StateBroadcaster {
        &self.states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    async fn next_state(rx: &mut broadcast::Receiver<UiEvent>) -> CoreState {
        loop {
            if let UiEvent::StateChange { state } = rx.recv().await.unwrap() {
                return state;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_reverts_after_exact_delay() {
        let states = StateBroadcaster::new();
        states.set_state(CoreState::Thinking);
        let mut rx = states.subscribe();

        let started = Instant::now();
        states.set_state(CoreState::Tool);
        assert_eq!(next_state(&mut rx).await, CoreState::Tool);

        assert_eq!(next_state(&mut rx).await, CoreState::Thinking);
        assert_eq!(started.elapsed(), TOOL_IMPULSE);
        assert_eq!(states.current(), CoreState::Thinking);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_never_reverts_early() {
        let states = StateBroadcaster::new();
        states.set_state(CoreState::Thinking);
        states.set_state(CoreState::Tool);

        tokio::time::sleep(TOOL_IMPULSE - Duration::from_millis(1)).await;
        assert_eq!(states.current(), CoreState::Tool);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reentering_tool_restarts_timer() {
        let states = StateBroadcaster::new();
        states.set_state(CoreState::Thinking);
        states.set_state(CoreState::Tool);
        tokio::time::sleep(Duration::from_millis(400)).await;

        let mut rx = states.subscribe();
        let restarted = Instant::now();
        states.set_state(CoreState::Tool);
        assert_eq!(next_state(&mut rx).await, CoreState::Tool);

        // Restores the state from before the first impulse, not `tool`
        assert_eq!(next_state(&mut rx).await, CoreState::Thinking);
        assert_eq!(restarted.elapsed(), TOOL_IMPULSE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_state_cancels_pending_revert() {
        let states = StateBroadcaster::new();
        states.set_state(CoreState::Thinking);
        states.set_state(CoreState::Tool);
        states.set_state(CoreState::Speaking);

        tokio::time::sleep(TOOL_IMPULSE * 2).await;
        assert_eq!(states.current(), CoreState::Speaking);
    }

    #[tokio::test]
    async fn test_observers_see_issue_order() {
        let states = StateBroadcaster::new();
        let mut rx = states.subscribe();
        for state in [
            CoreState::Listening,
            CoreState::Thinking,
            CoreState::Speaking,
            CoreState::Idle,
        ] {
            states.set_state(state);
        }
        let mut seen = vec![];
        for _ in 0..4 {
            seen.push(next_state(&mut rx).await);
        }
        assert_eq!(
            seen,
            vec![
                CoreState::Listening,
                CoreState::Thinking,
                CoreState::Speaking,
                CoreState::Idle
            ]
        );
    }

    #[tokio::test]
    async fn test_stale_emitter_is_silent() {
        let sessions = Arc::new(SessionRegistry::new());
        let states = StateBroadcaster::new();
        let old = sessions.begin();
        let emitter = SessionEmitter::new(Arc::clone(&sessions), states.clone(), old.id);
        sessions.begin();

        let mut rx = states.subscribe();
        assert!(!emitter.set_state(CoreState::Listening));
        assert!(!emitter.publish(UiEvent::Skill {
            skill: "clock".into()
        }));
        assert!(rx.try_recv().is_err());
        assert_eq!(states.current(), CoreState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_session_tool_never_reverts() {
        let sessions = Arc::new(SessionRegistry::new());
        let states = StateBroadcaster::new();
        let old = sessions.begin();
        let emitter = SessionEmitter::new(Arc::clone(&sessions), states.clone(), old.id);
        assert!(emitter.set_state(CoreState::Thinking));
        assert!(emitter.set_state(CoreState::Tool));

        let mut rx = states.subscribe();
        sessions.begin();
        tokio::time::sleep(TOOL_IMPULSE * 2).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(states.current(), CoreState::Tool);
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_session_tool_reverts() {
        let sessions = Arc::new(SessionRegistry::new());
        let states = StateBroadcaster::new();
        let session = sessions.begin();
        let emitter = SessionEmitter::new(Arc::clone(&sessions), states.clone(), session.id);
        emitter.set_state(CoreState::Thinking);
        emitter.set_state(CoreState::Tool);

        tokio::time::sleep(TOOL_IMPULSE * 2).await;
        assert_eq!(states.current(), CoreState::Thinking);
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_value(UiEvent::StateChange {
            state: CoreState::Tool,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "state_change", "state": "tool"}));
    }
}
