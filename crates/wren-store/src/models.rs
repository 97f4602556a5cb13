use serde::{Deserialize, Serialize};

use wren_core::{
    Account, AccountId, ChatId, Conversation, LastMessage, MessageKind, SyncState, SyncStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccountRow {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub owner: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl AccountRow {
    pub fn into_account(self) -> Account {
        Account {
            id: AccountId::new(self.id),
            name: self.name,
            phone: self.phone,
            is_active: self.is_active,
            owner: self.owner,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SessionRow {
    pub account_id: String,
    pub authenticated: bool,
    pub ready: bool,
    pub credentials: Option<String>,
    pub last_connected_at: Option<i64>,
    pub last_disconnected_at: Option<i64>,
    pub disconnect_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatRow {
    pub id: i64,
    pub account_id: String,
    pub chat_id: String,
    pub name: String,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub is_group: bool,
    pub participant_count: Option<i64>,
    pub unread_count: i64,
    pub last_body: Option<String>,
    pub last_sender: Option<String>,
    pub last_timestamp: Option<i64>,
    pub last_kind: Option<String>,
    pub last_from_me: Option<bool>,
    pub sort_timestamp: i64,
    pub updated_at: i64,
}

impl ChatRow {
    pub fn into_conversation(self) -> Conversation {
        let last_message = self.last_timestamp.map(|timestamp| LastMessage {
            body: self.last_body.unwrap_or_default(),
            sender: self.last_sender,
            timestamp,
            kind: self
                .last_kind
                .as_deref()
                .map(MessageKind::parse)
                .unwrap_or(MessageKind::Text),
            from_me: self.last_from_me.unwrap_or(false),
        });

        Conversation {
            id: ChatId::new(self.chat_id),
            name: self.name,
            phone: self.phone,
            avatar_url: self.avatar_url,
            is_group: self.is_group,
            participant_count: self.participant_count.map(|n| n as u32),
            unread_count: self.unread_count.max(0) as u32,
            last_message,
            timestamp: self.sort_timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SyncStatusRow {
    pub account_id: String,
    pub state: String,
    pub progress: i64,
    pub total: i64,
    pub synced: i64,
    pub current_item: Option<String>,
    pub message: String,
    pub error: Option<String>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl SyncStatusRow {
    pub fn into_status(self) -> SyncStatus {
        let state = match self.state.as_str() {
            "syncing" => SyncState::Syncing,
            "completed" => SyncState::Completed,
            "failed" => SyncState::Failed,
            _ => SyncState::Idle,
        };
        SyncStatus {
            state,
            progress: self.progress.clamp(0, 100) as u8,
            total: self.total.max(0) as usize,
            synced: self.synced.max(0) as usize,
            current: self.current_item,
            message: self.message,
            error: self.error,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

pub(crate) fn sync_state_str(state: SyncState) -> &'static str {
    match state {
        SyncState::Idle => "idle",
        SyncState::Syncing => "syncing",
        SyncState::Completed => "completed",
        SyncState::Failed => "failed",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventLogRow {
    pub id: i64,
    pub account_id: Option<String>,
    pub event: String,
    pub detail: Option<String>,
    pub created_at: i64,
}
