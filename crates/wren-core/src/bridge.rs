use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::chat::{ChatMessage, Conversation};
use crate::ids::{AccountId, ChatId};
use crate::sync::{SyncState, SyncStatus};

pub const DEFAULT_MESSAGE_LIMIT: u32 = 50;
pub const DEFAULT_SEARCH_CHATS: usize = 20;
pub const DEFAULT_SEARCH_MESSAGES_PER_CHAT: u32 = 50;

/// Commands a connected dashboard client may issue over the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientCommand {
    GetAccounts {
        #[serde(default)]
        user_id: Option<String>,
    },
    AddAccount {
        name: String,
        #[serde(default)]
        user_id: Option<String>,
    },
    SwitchAccount {
        account_id: AccountId,
    },
    DeleteAccount {
        account_id: AccountId,
    },
    SyncAllChats {
        #[serde(default)]
        max_chats: Option<usize>,
        #[serde(default)]
        incremental_only: bool,
    },
    CancelSync,
    QuickSync,
    GetChats,
    GetMessages {
        chat_id: ChatId,
        #[serde(default = "default_message_limit")]
        limit: u32,
    },
    SendMessage {
        chat_id: String,
        message: String,
    },
    SearchMessages {
        query: String,
        #[serde(default = "default_search_chats")]
        max_chats: usize,
        #[serde(default = "default_search_messages")]
        max_messages_per_chat: u32,
    },
    Logout,
    ClearSessions,
    RequestReconnect,
}

fn default_message_limit() -> u32 {
    DEFAULT_MESSAGE_LIMIT
}

fn default_search_chats() -> usize {
    DEFAULT_SEARCH_CHATS
}

fn default_search_messages() -> u32 {
    DEFAULT_SEARCH_MESSAGES_PER_CHAT
}

/// One search match, scoped to the requesting connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub chat_id: ChatId,
    pub chat_name: String,
    pub message: ChatMessage,
}

/// Coarse bridge health derived from consecutive failed heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Error,
}

/// Events the bridge pushes to dashboard clients.
///
/// Request/response events (`Accounts`, `Chats`, `Messages`, search and
/// send results) go only to the requesting connection; lifecycle and sync
/// streaming events fan out to every subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Status {
        is_ready: bool,
    },
    Qr {
        payload: String,
    },
    Ready,
    Disconnected {
        reason: String,
    },
    Accounts {
        list: Vec<Account>,
    },
    CurrentAccount {
        id: Option<AccountId>,
    },
    SyncProgress {
        status: SyncState,
        message: String,
        progress: u8,
        total: usize,
        current: Option<String>,
    },
    SyncChat {
        chat: Conversation,
        index: usize,
        total: usize,
    },
    SyncClear,
    SyncComplete {
        total: usize,
        success: usize,
        errors: usize,
    },
    Chats {
        list: Vec<Conversation>,
    },
    Messages {
        chat_id: ChatId,
        messages: Vec<ChatMessage>,
    },
    NewMessage {
        chat_id: ChatId,
        message: ChatMessage,
    },
    MessageSent {
        chat_id: ChatId,
        message: ChatMessage,
    },
    SendMessageError {
        error: String,
        retryable: bool,
    },
    SearchProgress {
        current: String,
        index: usize,
        total: usize,
    },
    SearchResults {
        results: Vec<SearchHit>,
        query: String,
    },
    SessionsCleared {
        success: bool,
        error: Option<String>,
    },
    Error {
        message: String,
        retryable: bool,
    },
    Health {
        state: HealthState,
    },
}

impl ServerEvent {
    /// Projects a sync status into the wire shape subscribers expect.
    pub fn sync_progress(status: &SyncStatus) -> Self {
        ServerEvent::SyncProgress {
            status: status.state,
            message: status.message.clone(),
            progress: status.progress,
            total: status.total,
            current: status.current.clone(),
        }
    }
}
