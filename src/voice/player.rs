//! Playback through an external audio player

use super::{kill_process_group, own_process_group, SpeechError};
use crate::runtime::AudioPlayer;
use crate::turn::AudioHandle;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Players tried in order when none is configured
const CANDIDATES: &[(&str, &[&str])] = &[
    ("ffplay", &["-nodisp", "-autoexit", "-loglevel", "quiet"]),
    ("mpg123", &["-q"]),
    ("afplay", &[]),
];

#[derive(Debug, Clone)]
pub struct CommandPlayer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandPlayer {
    /// Use `preferred` (a command line; the clip path is appended) if given,
    /// otherwise the first known player found on `PATH`.
    pub fn detect(preferred: Option<&str>) -> Option<Self> {
        if let Some(preferred) = preferred {
            let mut parts = preferred.split_whitespace();
            let program = which::which(parts.next()?).ok()?;
            return Some(Self {
                program,
                args: parts.map(String::from).collect(),
            });
        }

        CANDIDATES.iter().find_map(|(name, args)| {
            which::which(name).ok().map(|program| Self {
                program,
                args: args.iter().map(|a| (*a).to_string()).collect(),
            })
        })
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }
}

#[async_trait]
impl AudioPlayer for CommandPlayer {
    async fn play(&self, audio: &AudioHandle, cancel: CancellationToken) -> Result<(), SpeechError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&audio.path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        own_process_group(&mut cmd);

        let mut child = cmd.spawn()?;
        let pid = child.id();

        let status = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                kill_process_group(pid);
                return Err(SpeechError::cancelled());
            }
            status = child.wait() => status?,
        };

        if status.success() {
            Ok(())
        } else {
            Err(SpeechError::io(format!("Player exited with {status}")))
        }
    }
}

/// Stand-in used when no player binary exists: the reply has already been
/// shown as text, so playback succeeds immediately.
#[derive(Debug, Default)]
pub struct SilentPlayer;

#[async_trait]
impl AudioPlayer for SilentPlayer {
    async fn play(&self, audio: &AudioHandle, _cancel: CancellationToken) -> Result<(), SpeechError> {
        tracing::debug!(id = %audio.id, "No player available; skipping playback");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn clip(path: PathBuf) -> AudioHandle {
        AudioHandle {
            id: "clip.mp3".into(),
            path,
            url: "/audio/clip.mp3".into(),
            mime: "audio/mpeg".into(),
        }
    }

    #[tokio::test]
    async fn test_preferred_player() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp3");
        std::fs::write(&path, b"x").unwrap();
        let player = CommandPlayer::detect(Some("cat")).unwrap();
        player.play(&clip(path), CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_player_is_error() {
        let player = CommandPlayer::detect(Some("cat")).unwrap();
        let err = player
            .play(&clip(PathBuf::from("/nonexistent/clip.mp3")), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, super::super::SpeechErrorKind::Io);
    }

    #[tokio::test]
    async fn test_cancel_stops_playback() {
        let player = CommandPlayer::detect(Some("sleep 30")).unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        // Runs `sleep 30 30`; the clip path doubles as a duration
        let err = player
            .play(&clip(PathBuf::from("30")), cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_unknown_preferred_player() {
        assert!(CommandPlayer::detect(Some("no-such-player-binary")).is_none());
    }
}
