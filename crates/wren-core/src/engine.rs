use serde::{Deserialize, Serialize};

use crate::chat::MessageKind;

/// Commands sent to the automation host process, one line of JSON each.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineCommand {
    Connect { session_id: String },
    ListConversations,
    GetConversation { chat_id: String },
    FetchMessages { chat_id: String, limit: u32 },
    SendMessage { chat_id: String, text: String },
    FetchAvatar { chat_id: String },
    DownloadAttachment { message_id: String },
    Logout,
    Shutdown,
}

/// Events emitted by the automation host process.
///
/// Lifecycle events arrive unsolicited; `CommandResult` answers a command
/// by id, with the operation payload in `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    Qr {
        qr: String,
    },
    Authenticated,
    Ready {
        phone_number: Option<String>,
    },
    Disconnected {
        reason: String,
    },
    /// Serialized credential blob to back up outside the profile dir.
    CredentialsUpdated {
        credentials: String,
    },
    Message {
        message: MessageData,
    },
    Error {
        error: String,
    },
    CommandResult {
        command_id: String,
        success: bool,
        data: Option<serde_json::Value>,
        error: Option<String>,
    },
}

/// Raw conversation record as the engine reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationData {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub participant_count: Option<u32>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub last_message: Option<LastMessageData>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessageData {
    #[serde(default)]
    pub body: String,
    pub sender: Option<String>,
    pub timestamp: i64,
    pub kind: MessageKind,
    #[serde(default)]
    pub from_me: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageData {
    pub id: String,
    pub chat_id: String,
    pub sender: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub body: String,
    pub kind: MessageKind,
    pub timestamp: i64,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub has_media: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarData {
    pub url: Option<String>,
}

/// Attachment bytes travel base64-encoded over the line protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentData {
    pub base64: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}
