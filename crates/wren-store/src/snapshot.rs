use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use wren_core::{Account, AccountId, Conversation};

use crate::error::Result;

/// Last-resort on-disk cache tier: one JSON snapshot per account plus an
/// accounts directory-of-record for when the durable store is unavailable.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSnapshot {
    pub account_id: AccountId,
    pub saved_at: i64,
    pub chats: Vec<Conversation>,
}

impl SnapshotStore {
    pub fn new(dir: PathBuf) -> io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn chats_path(&self, account_id: &AccountId) -> PathBuf {
        self.dir.join(format!("chats-{}.json", account_id))
    }

    fn accounts_path(&self) -> PathBuf {
        self.dir.join("accounts.json")
    }

    pub fn save_chats(&self, account_id: &AccountId, chats: &[Conversation]) -> Result<()> {
        let snapshot = ChatSnapshot {
            account_id: account_id.clone(),
            saved_at: chrono::Utc::now().timestamp(),
            chats: chats.to_vec(),
        };
        let json = serde_json::to_string(&snapshot)?;
        std::fs::write(self.chats_path(account_id), json)?;
        Ok(())
    }

    /// Missing or unreadable snapshots are `None`, not errors: this tier
    /// only ever improves on an empty result.
    pub fn load_chats(&self, account_id: &AccountId) -> Option<Vec<Conversation>> {
        let contents = std::fs::read_to_string(self.chats_path(account_id)).ok()?;
        match serde_json::from_str::<ChatSnapshot>(&contents) {
            Ok(snapshot) => Some(snapshot.chats),
            Err(e) => {
                tracing::warn!(account_id = %account_id, error = %e, "Discarding corrupt chat snapshot");
                None
            }
        }
    }

    pub fn clear_chats(&self, account_id: &AccountId) -> Result<()> {
        match std::fs::remove_file(self.chats_path(account_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save_accounts(&self, accounts: &[Account]) -> Result<()> {
        let json = serde_json::to_string(accounts)?;
        std::fs::write(self.accounts_path(), json)?;
        Ok(())
    }

    pub fn load_accounts(&self) -> Option<Vec<Account>> {
        let contents = std::fs::read_to_string(self.accounts_path()).ok()?;
        match serde_json::from_str(&contents) {
            Ok(accounts) => Some(accounts),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding corrupt accounts snapshot");
                None
            }
        }
    }
}
