use thiserror::Error;

use wren_core::AccountId;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Engine error: {0}")]
    Engine(#[from] wren_engine::EngineError),

    #[error("Store error: {0}")]
    Store(#[from] wren_store::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("No account selected")]
    NoActiveAccount,

    #[error("Session for {0} is not ready")]
    NotReady(AccountId),

    #[error("{0}")]
    Validation(String),
}

impl WorkerError {
    /// Whether the client should be offered a retry action.
    pub fn retryable(&self) -> bool {
        !matches!(
            self,
            WorkerError::Validation(_) | WorkerError::AccountNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
