use serde::{Deserialize, Serialize};

use crate::ids::ChatId;

/// Message payload kind as reported by the automation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Voice,
    Document,
    Sticker,
    Location,
    Contact,
    Revoked,
    #[serde(other)]
    Other,
}

impl MessageKind {
    /// Human label used in chat-list previews for non-text messages.
    pub fn label(&self) -> &'static str {
        match self {
            MessageKind::Text => "Text",
            MessageKind::Image => "Photo",
            MessageKind::Video => "Video",
            MessageKind::Audio => "Audio",
            MessageKind::Voice => "Voice message",
            MessageKind::Document => "Document",
            MessageKind::Sticker => "Sticker",
            MessageKind::Location => "Location",
            MessageKind::Contact => "Contact card",
            MessageKind::Revoked => "Deleted message",
            MessageKind::Other => "Message",
        }
    }

    /// Preview text for a chat list entry: the body for text messages,
    /// a bracketed label otherwise.
    pub fn preview(&self, body: &str) -> String {
        match self {
            MessageKind::Text if !body.is_empty() => body.to_string(),
            kind => format!("[{}]", kind.label()),
        }
    }

    /// Wire/storage form, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Video => "video",
            MessageKind::Audio => "audio",
            MessageKind::Voice => "voice",
            MessageKind::Document => "document",
            MessageKind::Sticker => "sticker",
            MessageKind::Location => "location",
            MessageKind::Contact => "contact",
            MessageKind::Revoked => "revoked",
            MessageKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "text" => MessageKind::Text,
            "image" => MessageKind::Image,
            "video" => MessageKind::Video,
            "audio" => MessageKind::Audio,
            "voice" => MessageKind::Voice,
            "document" => MessageKind::Document,
            "sticker" => MessageKind::Sticker,
            "location" => MessageKind::Location,
            "contact" => MessageKind::Contact,
            "revoked" => MessageKind::Revoked,
            _ => MessageKind::Other,
        }
    }
}

/// Summary of the newest message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub body: String,
    pub sender: Option<String>,
    pub timestamp: i64,
    pub kind: MessageKind,
    pub from_me: bool,
}

/// A chat thread (private or group) normalized from the engine's view.
///
/// Unique per `(account, chat id)`. `timestamp` drives the sort order of
/// the chat list and tracks the newest activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ChatId,
    pub name: String,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub is_group: bool,
    pub participant_count: Option<u32>,
    pub unread_count: u32,
    pub last_message: Option<LastMessage>,
    pub timestamp: i64,
}

/// A single message inside a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub chat_id: ChatId,
    pub sender: String,
    pub sender_name: Option<String>,
    pub body: String,
    pub kind: MessageKind,
    pub timestamp: i64,
    pub from_me: bool,
    pub has_media: bool,
}
