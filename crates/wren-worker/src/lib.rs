mod avatar;
mod cache;
mod error;
mod registry;
mod search;
mod sync;
#[cfg(test)]
mod testutil;
mod worker;

pub use avatar::{AVATAR_TTL, AvatarCache};
pub use cache::ChatCache;
pub use error::{Result, WorkerError};
pub use registry::{Session, SessionRegistry};
pub use search::SearchOptions;
pub use sync::{BATCH_SIZE, QUICK_SYNC_LIMIT, SyncOptions, SyncOutcome, SyncTracker};
pub use worker::{DEFAULT_ACCOUNT_ID, WorkerConfig, WrenWorker};
