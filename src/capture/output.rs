use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::Result;

const PREFIX: &str = "recording";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputPaths {
    pub video: PathBuf,
    pub gif: PathBuf,
}

/// Creates `output_dir` and picks `recording-<timestamp>.mp4` plus its GIF sibling.
pub fn build_output_paths(output_dir: &Path) -> Result<OutputPaths> {
    fs::create_dir_all(output_dir)?;

    let timestamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let mut paths = paths_for(output_dir, &timestamp);

    // Two sessions started within the same second must not share a file.
    let mut suffix = 1;
    while paths.video.exists() {
        paths = paths_for(output_dir, &format!("{timestamp}-{suffix}"));
        suffix += 1;
    }

    Ok(paths)
}

fn paths_for(output_dir: &Path, stamp: &str) -> OutputPaths {
    OutputPaths {
        video: output_dir.join(format!("{PREFIX}-{stamp}.mp4")),
        gif: output_dir.join(format!("{PREFIX}-{stamp}.gif")),
    }
}
