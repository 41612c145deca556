use std::path::Path;

use tracing::debug;

use crate::capture::recording::{Recorder, RecordingOutput, SessionState};
use crate::capture::{Backends, CaptureTarget};
use crate::config::RecorderConfig;
use crate::error::Result;

/// Control surface for UI and CLI collaborators.
///
/// Reusable across sessions: every `start` builds a fresh [`Recorder`].
pub struct SessionController {
    backends: Backends,
    recorder: Option<Recorder>,
    last_output: Option<RecordingOutput>,
}

impl SessionController {
    pub fn new(backends: Backends) -> Self {
        Self {
            backends,
            recorder: None,
            last_output: None,
        }
    }

    /// Starts a session for `target`. A no-op while one is already active.
    pub fn start(&mut self, config: RecorderConfig, target: CaptureTarget) -> Result<()> {
        if let Some(recorder) = &self.recorder
            && matches!(
                recorder.state(),
                SessionState::Running | SessionState::Paused
            )
        {
            debug!("session already active, ignoring start");
            return Ok(());
        }

        // A session that died on its own still holds its output; collect it first.
        if self.recorder.is_some() {
            self.stop()?;
        }

        let rect = target.to_rect().or(config.capture_rect);
        let config = config.with_capture_rect(rect);
        debug!("starting {} session", target.slug());

        let mut recorder = Recorder::new(config, self.backends.clone());
        recorder.start()?;
        self.recorder = Some(recorder);
        Ok(())
    }

    /// Stops the active session. Returns `Ok(None)` if nothing was running.
    pub fn stop(&mut self) -> Result<Option<RecordingOutput>> {
        let Some(mut recorder) = self.recorder.take() else {
            return Ok(None);
        };

        let output = recorder.stop()?;
        if let Some(output) = &output {
            self.last_output = Some(output.clone());
        }
        Ok(output)
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.recorder
            .as_mut()
            .is_some_and(|recorder| recorder.toggle_pause())
    }

    pub fn is_paused(&self) -> bool {
        self.state() == SessionState::Paused
    }

    pub fn state(&self) -> SessionState {
        match &self.recorder {
            Some(recorder) => recorder.state(),
            None if self.last_output.is_some() => SessionState::Stopped,
            None => SessionState::Idle,
        }
    }

    /// Configuration of the active session.
    pub fn config(&self) -> Option<&RecorderConfig> {
        self.recorder.as_ref().map(Recorder::config)
    }

    /// Video path of the active session, or of the last finished one.
    pub fn output_path(&self) -> Option<&Path> {
        if let Some(paths) = self.recorder.as_ref().and_then(Recorder::output_paths) {
            return Some(&paths.video);
        }
        self.last_output
            .as_ref()
            .map(|output| output.video_path.as_path())
    }

    pub fn last_output(&self) -> Option<&RecordingOutput> {
        self.last_output.as_ref()
    }
}
