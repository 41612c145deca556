use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::Value;

const CLI_RECORDING_STATE_FILE: &str = "recording.json";
const STATE_DIR_NAME: &str = "zoomcap";

/// A recording started from the CLI and controlled through signals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CliRecordingState {
    pub pid: u32,
    pub output_path: PathBuf,
}

pub fn write_cli_recording_state(state: &CliRecordingState) -> Result<()> {
    write_state_in(&cli_state_dir()?, state)
}

pub fn read_cli_recording_state() -> Result<CliRecordingState> {
    read_state_in(&cli_state_dir()?)
}

pub fn clear_cli_recording_state() {
    if let Ok(dir) = cli_state_dir() {
        clear_state_in(&dir);
    }
}

fn write_state_in(state_dir: &Path, state: &CliRecordingState) -> Result<()> {
    fs::create_dir_all(state_dir)
        .with_context(|| format!("cannot create state directory {}", state_dir.display()))?;

    let output_path = state.output_path.to_str().with_context(|| {
        format!(
            "output path {} is not valid UTF-8",
            state.output_path.display()
        )
    })?;

    let file_path = state_dir.join(CLI_RECORDING_STATE_FILE);
    let data = serde_json::json!({
        "pid": state.pid,
        "output_path": output_path,
    });

    fs::write(&file_path, data.to_string())
        .with_context(|| format!("cannot write state file {}", file_path.display()))?;

    Ok(())
}

fn read_state_in(state_dir: &Path) -> Result<CliRecordingState> {
    let file_path = state_dir.join(CLI_RECORDING_STATE_FILE);
    let data = fs::read_to_string(&file_path)
        .with_context(|| format!("no recording state at {}", file_path.display()))?;

    let value: Value = serde_json::from_str(&data).context("recording state file is corrupt")?;
    let pid = value
        .get("pid")
        .and_then(Value::as_u64)
        .and_then(|pid| u32::try_from(pid).ok())
        .context("recording state has no pid")?;

    let output_path = value
        .get("output_path")
        .and_then(Value::as_str)
        .context("recording state has no output_path")?;

    Ok(CliRecordingState {
        pid,
        output_path: PathBuf::from(output_path),
    })
}

fn clear_state_in(state_dir: &Path) {
    let _ = fs::remove_file(state_dir.join(CLI_RECORDING_STATE_FILE));
}

fn cli_state_dir() -> Result<PathBuf> {
    if let Some(state_dir) = dirs::state_dir() {
        return Ok(state_dir.join(STATE_DIR_NAME));
    }

    if let Some(home_dir) = dirs::home_dir() {
        return Ok(home_dir.join(".local").join("state").join(STATE_DIR_NAME));
    }

    bail!("cannot locate a state directory")
}
