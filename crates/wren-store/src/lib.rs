mod error;
mod models;
mod repository;
mod schema;
mod snapshot;
mod write_behind;

pub use error::{Result, StoreError};
pub use models::{AccountRow, ChatRow, EventLogRow, SessionRow, SyncStatusRow};
pub use repository::Store;
pub use snapshot::{ChatSnapshot, SnapshotStore};
pub use write_behind::{StoreWrite, WriteBehind};
