use std::path::PathBuf;

use sqlx::{Pool, Sqlite, SqlitePool};

use wren_core::{Account, AccountId, Conversation, SyncStatus};

use crate::error::{Result, StoreError};
use crate::models::{AccountRow, ChatRow, SessionRow, SyncStatusRow, sync_state_str};
use crate::schema::SCHEMA;

/// Durable store for accounts, sessions, cached chats and sync status.
///
/// Always optional for the rest of the system: mutations flow in through
/// the write-behind queue and reads fall back to faster tiers, so a
/// missing or broken database never blocks the dashboard.
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    pub async fn new() -> Result<Self> {
        let db_path = Self::default_db_path()?;

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let store = Self::connect(&db_url).await?;
        tracing::info!("Database initialized at: {}", db_path.display());
        Ok(store)
    }

    pub async fn new_with_path(path: &str) -> Result<Self> {
        Self::connect(&format!("sqlite:{}?mode=rwc", path)).await
    }

    /// Throwaway database for tests.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    async fn connect(db_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(db_url).await?;
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    fn default_db_path() -> Result<PathBuf> {
        let dirs =
            directories::ProjectDirs::from("dev", "wren", "wren").ok_or(StoreError::NoDataDir)?;
        Ok(dirs.data_dir().join("wren.db"))
    }

    // accounts

    pub async fn upsert_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            "INSERT INTO accounts (id, name, phone, is_active, owner, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               phone = excluded.phone,
               is_active = excluded.is_active,
               owner = excluded.owner,
               updated_at = excluded.updated_at",
        )
        .bind(account.id.as_str())
        .bind(&account.name)
        .bind(&account.phone)
        .bind(account.is_active)
        .bind(&account.owner)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_account(&self, id: &AccountId) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(AccountRow::into_account))
    }

    /// Accounts visible to `owner`; legacy rows without an owner are
    /// visible to everyone.
    pub async fn list_accounts(&self, owner: Option<&str>) -> Result<Vec<Account>> {
        let rows = match owner {
            Some(owner) => {
                sqlx::query_as::<_, AccountRow>(
                    "SELECT * FROM accounts WHERE owner = ? OR owner IS NULL ORDER BY created_at",
                )
                .bind(owner)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts ORDER BY created_at")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows.into_iter().map(AccountRow::into_account).collect())
    }

    /// Makes `id` the single active account.
    pub async fn set_active(&self, id: &AccountId) -> Result<()> {
        let now = timestamp();
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE accounts SET is_active = 0, updated_at = ? WHERE is_active = 1")
            .bind(now)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE accounts SET is_active = 1, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn set_phone(&self, id: &AccountId, phone: &str) -> Result<()> {
        sqlx::query("UPDATE accounts SET phone = ?, updated_at = ? WHERE id = ?")
            .bind(phone)
            .bind(timestamp())
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes an account and everything hanging off it.
    pub async fn delete_account(&self, id: &AccountId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in ["chats", "sessions", "sync_status"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE account_id = ?"))
                .bind(id.as_str())
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    // sessions

    pub async fn mark_session_connected(&self, id: &AccountId, authenticated: bool) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (account_id, authenticated, last_connected_at)
             VALUES (?, ?, ?)
             ON CONFLICT(account_id) DO UPDATE SET
               authenticated = excluded.authenticated,
               last_connected_at = excluded.last_connected_at",
        )
        .bind(id.as_str())
        .bind(authenticated)
        .bind(timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `ready` implies `authenticated`; the update keeps the invariant.
    pub async fn mark_session_ready(&self, id: &AccountId, ready: bool) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (account_id, authenticated, ready)
             VALUES (?, ?, ?)
             ON CONFLICT(account_id) DO UPDATE SET
               ready = excluded.ready,
               authenticated = CASE WHEN excluded.ready THEN 1 ELSE authenticated END",
        )
        .bind(id.as_str())
        .bind(ready)
        .bind(ready)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_session_disconnected(&self, id: &AccountId, reason: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (account_id, ready, last_disconnected_at, disconnect_reason)
             VALUES (?, 0, ?, ?)
             ON CONFLICT(account_id) DO UPDATE SET
               ready = 0,
               last_disconnected_at = excluded.last_disconnected_at,
               disconnect_reason = excluded.disconnect_reason",
        )
        .bind(id.as_str())
        .bind(timestamp())
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_credentials(&self, id: &AccountId, credentials: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (account_id, credentials) VALUES (?, ?)
             ON CONFLICT(account_id) DO UPDATE SET credentials = excluded.credentials",
        )
        .bind(id.as_str())
        .bind(credentials)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn clear_session(&self, id: &AccountId) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET authenticated = 0, ready = 0, credentials = NULL
             WHERE account_id = ?",
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_session(&self, id: &AccountId) -> Result<Option<SessionRow>> {
        Ok(
            sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE account_id = ?")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    // chats

    /// Replaces the cached chat list for an account in one transaction.
    pub async fn replace_chats(&self, id: &AccountId, chats: &[Conversation]) -> Result<()> {
        let now = timestamp();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chats WHERE account_id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        for chat in chats {
            let last = chat.last_message.as_ref();
            sqlx::query(
                "INSERT INTO chats (account_id, chat_id, name, phone, avatar_url, is_group,
                                    participant_count, unread_count, last_body, last_sender,
                                    last_timestamp, last_kind, last_from_me, sort_timestamp,
                                    updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(id.as_str())
            .bind(chat.id.as_str())
            .bind(&chat.name)
            .bind(&chat.phone)
            .bind(&chat.avatar_url)
            .bind(chat.is_group)
            .bind(chat.participant_count.map(|n| n as i64))
            .bind(chat.unread_count as i64)
            .bind(last.map(|m| m.body.clone()))
            .bind(last.and_then(|m| m.sender.clone()))
            .bind(last.map(|m| m.timestamp))
            .bind(last.map(|m| m.kind.as_str()))
            .bind(last.map(|m| m.from_me))
            .bind(chat.timestamp)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_chats(&self, id: &AccountId) -> Result<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, ChatRow>(
            "SELECT * FROM chats WHERE account_id = ? ORDER BY sort_timestamp DESC",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ChatRow::into_conversation).collect())
    }

    pub async fn clear_chats(&self, id: &AccountId) -> Result<()> {
        sqlx::query("DELETE FROM chats WHERE account_id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // sync status

    pub async fn save_sync_status(&self, id: &AccountId, status: &SyncStatus) -> Result<()> {
        sqlx::query(
            "INSERT INTO sync_status (account_id, state, progress, total, synced, current_item,
                                      message, error, started_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(account_id) DO UPDATE SET
               state = excluded.state,
               progress = excluded.progress,
               total = excluded.total,
               synced = excluded.synced,
               current_item = excluded.current_item,
               message = excluded.message,
               error = excluded.error,
               started_at = excluded.started_at,
               completed_at = excluded.completed_at",
        )
        .bind(id.as_str())
        .bind(sync_state_str(status.state))
        .bind(status.progress as i64)
        .bind(status.total as i64)
        .bind(status.synced as i64)
        .bind(&status.current)
        .bind(&status.message)
        .bind(&status.error)
        .bind(status.started_at)
        .bind(status.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_sync_status(&self, id: &AccountId) -> Result<Option<SyncStatus>> {
        let row =
            sqlx::query_as::<_, SyncStatusRow>("SELECT * FROM sync_status WHERE account_id = ?")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(SyncStatusRow::into_status))
    }

    // event log

    pub async fn log_event(
        &self,
        id: Option<&AccountId>,
        event: &str,
        detail: Option<&str>,
    ) -> Result<()> {
        sqlx::query("INSERT INTO event_log (account_id, event, detail, created_at) VALUES (?, ?, ?, ?)")
            .bind(id.map(AccountId::as_str))
            .bind(event)
            .bind(detail)
            .bind(timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
