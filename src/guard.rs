//! Capture/playback conflict guard
//!
//! One microphone capture or one playback may be active at a time. Capture
//! fails fast when audio is playing; playback waits briefly for a capture
//! that is still releasing the device.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Longest a caller waits for another capture to hand the device over
pub const CAPTURE_HANDOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Activity {
    #[default]
    Free,
    Capturing,
    Playing,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("Playback in progress")]
    PlaybackInProgress,
    #[error("Audio device busy")]
    Busy,
    #[error("Cancelled")]
    Cancelled,
}

#[derive(Debug, Default)]
struct Shared {
    activity: Mutex<Activity>,
    released: Notify,
}

/// Process-wide capture/playback exclusion, owned by one assistant instance
#[derive(Debug, Clone, Default)]
pub struct PlaybackLock {
    shared: Arc<Shared>,
}

/// Held for the duration of a capture or playback; releases on drop
#[derive(Debug)]
pub struct AudioGuard {
    shared: Arc<Shared>,
}

impl Drop for AudioGuard {
    fn drop(&mut self) {
        *self.shared.activity.lock().unwrap() = Activity::Free;
        self.shared.released.notify_waiters();
    }
}

impl PlaybackLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn activity(&self) -> Activity {
        *self.shared.activity.lock().unwrap()
    }

    pub fn is_playing(&self) -> bool {
        self.activity() == Activity::Playing
    }

    pub fn is_held(&self) -> bool {
        self.activity() != Activity::Free
    }

    fn try_take(&self, want: Activity) -> Result<AudioGuard, Activity> {
        let mut activity = self.shared.activity.lock().unwrap();
        match *activity {
            Activity::Free => {
                *activity = want;
                Ok(AudioGuard {
                    shared: Arc::clone(&self.shared),
                })
            }
            held => Err(held),
        }
    }

    /// Claim the device for capture. Never queues behind playback.
    pub async fn acquire_capture(&self, cancel: &CancellationToken) -> Result<AudioGuard, GuardError> {
        self.acquire(Activity::Capturing, cancel).await
    }

    /// Claim the device for playback, waiting out a capture handoff
    pub async fn acquire_playback(&self, cancel: &CancellationToken) -> Result<AudioGuard, GuardError> {
        self.acquire(Activity::Playing, cancel).await
    }

    async fn acquire(&self, want: Activity, cancel: &CancellationToken) -> Result<AudioGuard, GuardError> {
        let deadline = tokio::time::Instant::now() + CAPTURE_HANDOFF;
        loop {
            // Register interest before checking so a release between the
            // check and the wait is not missed
            let released = self.shared.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            match self.try_take(want) {
                Ok(guard) => return Ok(guard),
                Err(Activity::Playing) => return Err(GuardError::PlaybackInProgress),
                Err(_) => {}
            }

            tokio::select! {
                () = cancel.cancelled() => return Err(GuardError::Cancelled),
                () = tokio::time::sleep_until(deadline) => return Err(GuardError::Busy),
                () = &mut released => {}
            }
        }
    }
}
