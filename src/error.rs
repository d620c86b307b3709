use thiserror::Error;

/// Failures surfaced on the startup and discovery paths.
///
/// Render-loop hardware faults are not represented here; once the driver is
/// up, a failed render aborts the process rather than propagating.
#[derive(Error, Debug)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("logging init failed: {0}")]
    Log(#[from] fern::InitError),

    #[error("network setup failed: {0}")]
    Net(String),

    #[error("led driver error: {0}")]
    Led(String),
}

pub type Result<T> = std::result::Result<T, Error>;
