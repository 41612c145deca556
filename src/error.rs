use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("zoom factor {0} is outside the supported range 1.0..=4.0")]
    ZoomOutOfRange(f64),

    #[error("frame rate {0} is outside the supported range 10..=60")]
    FpsOutOfRange(u32),

    #[error("capture rectangle must have positive size, got {width}x{height}")]
    EmptyCaptureRect { width: i32, height: i32 },

    #[error("no output directory could be determined")]
    MissingOutputDir,
}

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("encoder failed: {0}")]
    Encoder(String),

    #[error("input listener failed: {0}")]
    Input(String),

    #[error("post-processing failed: {0}")]
    PostProcess(String),

    #[error("session already finished; start a new one to record again")]
    AlreadyFinished,

    #[error("capture loop did not exit within the stop timeout")]
    StopTimeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = RecorderError> = std::result::Result<T, E>;
