use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;

use wren_core::{Account, AccountId, Conversation, SyncStatus};

use crate::repository::Store;
use crate::snapshot::SnapshotStore;

const QUEUE_DEPTH: usize = 1024;
const WRITE_RETRIES: u32 = 3;
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// A mutation bound for the slow tiers (disk snapshot, durable store).
#[derive(Debug)]
pub enum StoreWrite {
    PersistChats {
        account_id: AccountId,
        chats: Vec<Conversation>,
    },
    ClearChats {
        account_id: AccountId,
    },
    SyncStatus {
        account_id: AccountId,
        status: SyncStatus,
    },
    UpsertAccount {
        account: Account,
    },
    DeleteAccount {
        account_id: AccountId,
    },
    AccountsSnapshot {
        accounts: Vec<Account>,
    },
    SetActive {
        account_id: AccountId,
    },
    SetPhone {
        account_id: AccountId,
        phone: String,
    },
    SessionConnected {
        account_id: AccountId,
        authenticated: bool,
    },
    SessionReady {
        account_id: AccountId,
        ready: bool,
    },
    SessionDisconnected {
        account_id: AccountId,
        reason: String,
    },
    Credentials {
        account_id: AccountId,
        credentials: String,
    },
    ClearSession {
        account_id: AccountId,
    },
    Event {
        account_id: Option<AccountId>,
        event: String,
        detail: Option<String>,
    },
}

/// The single fire-and-forget path to the slow tiers.
///
/// Every durable write in the system goes through this queue so the retry
/// and swallow-and-log policy lives in exactly one place. `enqueue` never
/// blocks and never surfaces an error to the caller.
#[derive(Clone)]
pub struct WriteBehind {
    tx: mpsc::Sender<StoreWrite>,
}

impl WriteBehind {
    pub fn spawn(store: Option<Arc<Store>>, snapshots: SnapshotStore) -> Self {
        let (tx, mut rx) = mpsc::channel(QUEUE_DEPTH);
        tokio::spawn(async move {
            while let Some(write) = rx.recv().await {
                apply_snapshot(&snapshots, &write);
                if let Some(store) = store.as_deref() {
                    apply_store_with_retry(store, &write).await;
                }
            }
        });
        Self { tx }
    }

    pub fn enqueue(&self, write: StoreWrite) {
        if let Err(e) = self.tx.try_send(write) {
            warn!(error = %e, "Write-behind queue rejected a write");
        }
    }
}

fn apply_snapshot(snapshots: &SnapshotStore, write: &StoreWrite) {
    let result = match write {
        StoreWrite::PersistChats { account_id, chats } => snapshots.save_chats(account_id, chats),
        StoreWrite::ClearChats { account_id } => snapshots.clear_chats(account_id),
        StoreWrite::AccountsSnapshot { accounts } => snapshots.save_accounts(accounts),
        _ => return,
    };
    if let Err(e) = result {
        warn!(error = %e, "Disk snapshot write failed");
    }
}

async fn apply_store_with_retry(store: &Store, write: &StoreWrite) {
    for attempt in 1..=WRITE_RETRIES {
        match apply_store(store, write).await {
            Ok(()) => return,
            Err(e) if attempt < WRITE_RETRIES => {
                warn!(attempt, error = %e, "Durable write failed, retrying");
                tokio::time::sleep(WRITE_RETRY_DELAY).await;
            }
            Err(e) => {
                warn!(error = %e, write = ?write, "Durable write dropped after retries");
            }
        }
    }
}

async fn apply_store(store: &Store, write: &StoreWrite) -> crate::error::Result<()> {
    match write {
        StoreWrite::PersistChats { account_id, chats } => {
            store.replace_chats(account_id, chats).await
        }
        StoreWrite::ClearChats { account_id } => store.clear_chats(account_id).await,
        StoreWrite::SyncStatus { account_id, status } => {
            store.save_sync_status(account_id, status).await
        }
        StoreWrite::UpsertAccount { account } => store.upsert_account(account).await,
        StoreWrite::DeleteAccount { account_id } => store.delete_account(account_id).await,
        StoreWrite::AccountsSnapshot { .. } => Ok(()),
        StoreWrite::SetActive { account_id } => store.set_active(account_id).await,
        StoreWrite::SetPhone { account_id, phone } => store.set_phone(account_id, phone).await,
        StoreWrite::SessionConnected {
            account_id,
            authenticated,
        } => store.mark_session_connected(account_id, *authenticated).await,
        StoreWrite::SessionReady { account_id, ready } => {
            store.mark_session_ready(account_id, *ready).await
        }
        StoreWrite::SessionDisconnected { account_id, reason } => {
            store.mark_session_disconnected(account_id, reason).await
        }
        StoreWrite::Credentials {
            account_id,
            credentials,
        } => store.save_credentials(account_id, credentials).await,
        StoreWrite::ClearSession { account_id } => store.clear_session(account_id).await,
        StoreWrite::Event {
            account_id,
            event,
            detail,
        } => {
            store
                .log_event(account_id.as_ref(), event, detail.as_deref())
                .await
        }
    }
}
