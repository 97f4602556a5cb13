use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine process not running")]
    NotRunning,

    #[error("Failed to spawn engine host: {0}")]
    SpawnFailed(String),

    #[error("Host dependency install failed: {0}")]
    InstallFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Engine command failed: {0}")]
    Command(String),

    #[error("Initialization failed after {attempts} attempts: {last_error}")]
    InitFailed { attempts: u32, last_error: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;
