use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use wren_core::{
    AttachmentData, ChatId, ConversationData, LastMessageData, MessageData, MessageKind,
};
use wren_engine::{Engine, EngineError, Result};

/// Scripted engine for pipeline and worker tests: a fixed conversation
/// list, queued list failures, per-chat message scripts, call counters
/// and an optional hook that trips a cancel flag mid-batch.
pub struct ScriptedEngine {
    pub conversations: Mutex<Vec<ConversationData>>,
    pub list_failures: Mutex<VecDeque<String>>,
    pub messages: Mutex<HashMap<String, Vec<MessageData>>>,
    pub avatars: Mutex<HashMap<String, Option<String>>>,
    pub list_calls: AtomicUsize,
    pub avatar_calls: AtomicUsize,
    pub send_calls: AtomicUsize,
    pub shutdown_calls: AtomicUsize,
    pub fail_avatars: AtomicBool,
    /// When the n-th avatar fetch (1-based) happens, set `cancel_flag`.
    pub cancel_on_avatar_call: AtomicUsize,
    pub cancel_flag: Mutex<Option<Arc<AtomicBool>>>,
}

impl ScriptedEngine {
    pub fn new(conversations: Vec<ConversationData>) -> Arc<Self> {
        Arc::new(Self {
            conversations: Mutex::new(conversations),
            list_failures: Mutex::new(VecDeque::new()),
            messages: Mutex::new(HashMap::new()),
            avatars: Mutex::new(HashMap::new()),
            list_calls: AtomicUsize::new(0),
            avatar_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            shutdown_calls: AtomicUsize::new(0),
            fail_avatars: AtomicBool::new(false),
            cancel_on_avatar_call: AtomicUsize::new(0),
            cancel_flag: Mutex::new(None),
        })
    }

    pub fn with_avatars(avatars: &[(&str, Option<&str>)]) -> Arc<Self> {
        let engine = Self::new(Vec::new());
        *engine.avatars.lock().unwrap() = avatars
            .iter()
            .map(|(id, url)| (id.to_string(), url.map(str::to_string)))
            .collect();
        engine
    }

    pub fn push_list_failure(&self, message: &str) {
        self.list_failures
            .lock()
            .unwrap()
            .push_back(message.to_string());
    }

    pub fn script_messages(&self, chat_id: &str, messages: Vec<MessageData>) {
        self.messages
            .lock()
            .unwrap()
            .insert(chat_id.to_string(), messages);
    }
}

pub fn convo(id: &str, ts: i64) -> ConversationData {
    ConversationData {
        id: id.to_string(),
        name: Some(format!("Chat {id}")),
        is_group: id.ends_with("@g.us"),
        participant_count: if id.ends_with("@g.us") { Some(3) } else { None },
        unread_count: 0,
        last_message: Some(LastMessageData {
            body: format!("message {ts}"),
            sender: None,
            timestamp: ts,
            kind: MessageKind::Text,
            from_me: false,
        }),
        timestamp: Some(ts),
    }
}

pub fn msg(chat_id: &str, id: &str, body: &str, ts: i64) -> MessageData {
    MessageData {
        id: id.to_string(),
        chat_id: chat_id.to_string(),
        sender: "someone@c.us".to_string(),
        sender_name: Some("Someone".to_string()),
        body: body.to_string(),
        kind: MessageKind::Text,
        timestamp: ts,
        from_me: false,
        has_media: false,
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn list_conversations(&self) -> Result<Vec<ConversationData>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.list_failures.lock().unwrap().pop_front() {
            return Err(EngineError::Command(error));
        }
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn get_conversation(&self, chat_id: &ChatId) -> Result<ConversationData> {
        self.conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == chat_id.as_str())
            .cloned()
            .ok_or_else(|| EngineError::Command(format!("no such chat {chat_id}")))
    }

    async fn fetch_messages(&self, chat_id: &ChatId, limit: u32) -> Result<Vec<MessageData>> {
        let messages = self
            .messages
            .lock()
            .unwrap()
            .get(chat_id.as_str())
            .cloned()
            .unwrap_or_default();
        Ok(messages.into_iter().take(limit as usize).collect())
    }

    async fn send_message(&self, chat_id: &ChatId, text: &str) -> Result<MessageData> {
        let n = self.send_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MessageData {
            id: format!("sent-{n}"),
            chat_id: chat_id.to_string(),
            sender: "me@c.us".to_string(),
            sender_name: None,
            body: text.to_string(),
            kind: MessageKind::Text,
            timestamp: 1_700_000_000 + n as i64,
            from_me: true,
            has_media: false,
        })
    }

    async fn fetch_avatar(&self, chat_id: &ChatId) -> Result<Option<String>> {
        let call = self.avatar_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.cancel_on_avatar_call.load(Ordering::SeqCst) {
            if let Some(flag) = self.cancel_flag.lock().unwrap().as_ref() {
                flag.store(true, Ordering::SeqCst);
            }
        }
        if self.fail_avatars.load(Ordering::SeqCst) {
            return Err(EngineError::Timeout("avatar"));
        }
        Ok(self
            .avatars
            .lock()
            .unwrap()
            .get(chat_id.as_str())
            .cloned()
            .flatten())
    }

    async fn download_attachment(&self, _message_id: &str) -> Result<AttachmentData> {
        Ok(AttachmentData {
            base64: String::new(),
            mime_type: None,
            file_name: None,
        })
    }

    async fn logout(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
