use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not resolve a data directory")]
    NoDataDir,

    #[error("Account not found: {0}")]
    AccountNotFound(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
