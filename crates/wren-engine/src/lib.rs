mod classify;
mod cleanup;
mod client;
mod error;
mod lifecycle;
mod process;

pub use classify::{
    ErrorKind, RetryDecision, RetryFsm, RetryPolicy, RetryState, classify, is_teardown_noise,
};
pub use cleanup::{CleanupReport, cleanup_orphans};
pub use client::{
    AVATAR_TIMEOUT, Engine, EngineClient, LIST_TIMEOUT, MESSAGES_TIMEOUT, SEND_TIMEOUT,
};
pub use error::{EngineError, Result};
pub use lifecycle::LifecycleManager;
