use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::config::CaptureRect;
use crate::error::RecorderError;

const GIF_FILTER: &str = "fps=12,scale=960:-1:flags=lanczos";

pub(crate) fn run_command(mut command: Command, context_message: &str) -> Result<()> {
    let output = command
        .output()
        .with_context(|| format!("{context_message}: failed to launch command"))?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        bail!("{context_message}: exit status {}", output.status);
    }

    bail!("{context_message}: {stderr}");
}

/// Asks slurp for a region and parses its `X,Y WxH` answer.
pub fn pick_region_geometry() -> Result<CaptureRect> {
    let output = Command::new("slurp")
        .output()
        .context("failed to launch slurp; make sure it is installed")?;

    if !output.status.success() {
        bail!("region selection was cancelled or slurp failed");
    }

    let geometry = String::from_utf8(output.stdout).context("slurp output is not valid UTF-8")?;
    let geometry = geometry.trim();

    if geometry.is_empty() {
        bail!("slurp returned no region");
    }

    geometry.parse::<CaptureRect>().map_err(anyhow::Error::msg)
}

/// Looks `name` up in the directories listed in `PATH`.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|path| path.is_file())
}

/// Post-processing step that turns the finished video into a GIF.
pub trait GifConverter: Send + Sync {
    /// Returns `Ok(false)` when the converter is not available and the step was skipped.
    fn convert(&self, video: &Path, gif: &Path) -> crate::error::Result<bool>;
}

#[derive(Clone, Debug)]
pub struct FfmpegGifConverter {
    pub program: String,
}

impl Default for FfmpegGifConverter {
    fn default() -> Self {
        Self {
            program: "ffmpeg".into(),
        }
    }
}

impl GifConverter for FfmpegGifConverter {
    fn convert(&self, video: &Path, gif: &Path) -> crate::error::Result<bool> {
        let Some(program) = find_in_path(&self.program) else {
            debug!("{} not found in PATH, skipping GIF export", self.program);
            return Ok(false);
        };

        let mut command = Command::new(program);
        command
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(video)
            .args(["-vf", GIF_FILTER])
            .arg(gif)
            .stdin(Stdio::null());

        run_command(command, "GIF conversion failed")
            .map_err(|err| RecorderError::PostProcess(format!("{err:#}")))?;

        info!("GIF written to {}", gif.display());
        Ok(true)
    }
}
