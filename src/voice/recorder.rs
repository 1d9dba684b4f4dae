//! Microphone capture through an external recorder command
//!
//! The recorder runs in its own process group so a cancelled or superseded
//! capture can take down the whole pipeline at once.

use super::{kill_process_group, own_process_group};
use crate::capture::{CaptureError, CapturedAudio};
use crate::runtime::AudioSource;
use crate::state_machine::CaptureMode;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// sox: start on speech, stop after 1.5 s of silence, never past the window
pub const DEFAULT_RECORDER: &str =
    "sox -d -q -r 16000 -c 1 -b 16 {out} silence 1 0.1 1% 1 1.5 1% trim 0 {secs}";

/// A WAV file no larger than its header holds no audio
const WAV_HEADER_LEN: usize = 44;

pub struct CommandRecorder {
    template: Vec<String>,
    scratch_dir: PathBuf,
}

impl CommandRecorder {
    /// Build from a whitespace-separated template with `{out}` and `{secs}`
    /// placeholders. Returns `None` if the program is not on `PATH`.
    pub fn new(template: &str, scratch_dir: &Path) -> Option<Self> {
        let template: Vec<String> = template.split_whitespace().map(String::from).collect();
        let program = template.first()?;
        if let Err(e) = which::which(program) {
            tracing::warn!(%program, error = %e, "Recorder not found");
            return None;
        }
        Some(Self {
            template,
            scratch_dir: scratch_dir.to_path_buf(),
        })
    }

    fn command(&self, out: &Path, window: Duration) -> Command {
        let out = out.display().to_string();
        let secs = format!("{:.1}", window.as_secs_f32());
        let args: Vec<String> = self
            .template
            .iter()
            .map(|arg| arg.replace("{out}", &out).replace("{secs}", &secs))
            .collect();

        let mut cmd = Command::new(&args[0]);
        cmd.args(&args[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        own_process_group(&mut cmd);
        cmd
    }
}

/// One capture's scratch file and recorder group. Dropping it kills the
/// group and removes the file, so a capture abandoned mid-window by its
/// caller leaves nothing behind.
struct Scratch {
    path: PathBuf,
    pid: Option<u32>,
}

impl Scratch {
    /// The recorder exited; its pid may be reused from here on
    fn exited(&mut self) {
        self.pid = None;
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        kill_process_group(self.pid.take());
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove recording"),
        }
    }
}

#[async_trait]
impl AudioSource for CommandRecorder {
    async fn record(
        &self,
        mode: CaptureMode,
        window: Duration,
        cancel: CancellationToken,
    ) -> Result<CapturedAudio, CaptureError> {
        let path = self
            .scratch_dir
            .join(format!("capture-{}.wav", uuid::Uuid::new_v4().simple()));
        let mut child = self
            .command(&path, window)
            .spawn()
            .map_err(|e| CaptureError::Failed(format!("Failed to start recorder: {e}")))?;
        let mut scratch = Scratch {
            path,
            pid: child.id(),
        };
        tracing::debug!(%mode, pid = ?scratch.pid, "Recorder started");

        let status = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CaptureError::Cancelled),
            status = child.wait() => status,
        };
        scratch.exited();

        let status = status.map_err(|e| CaptureError::Failed(format!("Recorder failed: {e}")))?;
        if !status.success() {
            return Err(CaptureError::Failed(format!("Recorder exited with {status}")));
        }
        match tokio::fs::read(&scratch.path).await {
            Ok(bytes) if bytes.len() > WAV_HEADER_LEN => Ok(CapturedAudio::Wav(bytes)),
            Ok(_) => Ok(CapturedAudio::Silence),
            Err(e) => Err(CaptureError::Failed(format!("Recording missing: {e}"))),
        }
    }
}
