use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, warn};

use wren_core::{
    AccountId, AttachmentData, AvatarData, ChatId, ConversationData, EngineCommand, EngineEvent,
    EngineMessage, EngineMessageContent, MessageData,
};

use crate::error::{EngineError, Result};
use crate::process::ProcessHandle;

/// Per-operation timeouts. Optional enrichment (avatars) gets a short
/// leash; mandatory calls get room for a slow page.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const LIST_TIMEOUT: Duration = Duration::from_secs(30);
pub const CONVERSATION_TIMEOUT: Duration = Duration::from_secs(10);
pub const MESSAGES_TIMEOUT: Duration = Duration::from_secs(15);
pub const SEND_TIMEOUT: Duration = Duration::from_secs(20);
pub const AVATAR_TIMEOUT: Duration = Duration::from_millis(1500);
pub const ATTACHMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Operations the orchestration layer needs from one account's live
/// engine session. `EngineClient` is the production implementation;
/// pipeline tests substitute scripted ones.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<ConversationData>>;
    async fn get_conversation(&self, chat_id: &ChatId) -> Result<ConversationData>;
    async fn fetch_messages(&self, chat_id: &ChatId, limit: u32) -> Result<Vec<MessageData>>;
    async fn send_message(&self, chat_id: &ChatId, text: &str) -> Result<MessageData>;
    async fn fetch_avatar(&self, chat_id: &ChatId) -> Result<Option<String>>;
    async fn download_attachment(&self, message_id: &str) -> Result<AttachmentData>;
    async fn logout(&self) -> Result<()>;
    /// Graceful teardown of the session and its host process.
    async fn shutdown(&self) -> Result<()>;
}

struct CommandOutcome {
    success: bool,
    data: Option<serde_json::Value>,
    error: Option<String>,
}

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<CommandOutcome>>>>;

/// One account's automation session, spoken to over line-delimited JSON.
///
/// Commands are correlated to `CommandResult` events by message id;
/// unsolicited lifecycle events are forwarded, tagged with the account,
/// onto the shared worker queue.
pub struct EngineClient {
    account_id: AccountId,
    process: Mutex<Option<ProcessHandle>>,
    pending: PendingMap,
}

impl EngineClient {
    /// Spawn the host process bound to `profile_dir` and start pumping its
    /// event stream. The session is not connected yet; call [`connect`].
    ///
    /// [`connect`]: EngineClient::connect
    pub async fn spawn(
        host_dir: &Path,
        profile_dir: &Path,
        account_id: AccountId,
        event_tx: mpsc::Sender<(AccountId, EngineEvent)>,
    ) -> Result<Arc<Self>> {
        let (line_tx, mut line_rx) = mpsc::channel::<String>(1000);

        let profile = profile_dir.display().to_string();
        let process = ProcessHandle::spawn(
            host_dir,
            profile_dir,
            "bun",
            &["run", "host.ts", "--profile", &profile],
            line_tx,
        )
        .await?;

        let client = Arc::new(Self {
            account_id: account_id.clone(),
            process: Mutex::new(Some(process)),
            pending: Arc::new(Mutex::new(HashMap::new())),
        });

        let pending = client.pending.clone();
        tokio::spawn(async move {
            while let Some(line) = line_rx.recv().await {
                let Some(message) = EngineMessage::from_line(&line) else {
                    debug!(account_id = %account_id, "Skipping unparseable engine line");
                    continue;
                };
                match message.content {
                    EngineMessageContent::Event(EngineEvent::CommandResult {
                        command_id,
                        success,
                        data,
                        error,
                    }) => {
                        let waiter = pending.lock().await.remove(&command_id);
                        if let Some(tx) = waiter {
                            let _ = tx.send(CommandOutcome {
                                success,
                                data,
                                error,
                            });
                        } else {
                            debug!(account_id = %account_id, command_id, "Late engine reply dropped");
                        }
                    }
                    EngineMessageContent::Event(event) => {
                        if event_tx.send((account_id.clone(), event)).await.is_err() {
                            break;
                        }
                    }
                    EngineMessageContent::Command(_) => {}
                }
            }
        });

        Ok(client)
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    /// Bind the session to this account's credential store. Readiness is
    /// reported asynchronously through the event stream.
    pub async fn connect(&self) -> Result<()> {
        self.request(
            EngineCommand::Connect {
                session_id: self.account_id.to_string(),
            },
            CONNECT_TIMEOUT,
            "connect",
        )
        .await?;
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        let mut process = self.process.lock().await;
        match process.as_mut().map(|p| p.try_wait()) {
            Some(Ok(None)) => true,
            Some(_) => {
                *process = None;
                false
            }
            None => false,
        }
    }

    async fn request(
        &self,
        command: EngineCommand,
        timeout: Duration,
        op: &'static str,
    ) -> Result<Option<serde_json::Value>> {
        let message = EngineMessage::command(command);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(message.id.clone(), tx);

        let sent = {
            let process = self.process.lock().await;
            match process.as_ref() {
                Some(p) => p.send(&message.to_line()).await,
                None => Err(EngineError::NotRunning),
            }
        };
        if let Err(e) = sent {
            self.pending.lock().await.remove(&message.id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => {
                if outcome.success {
                    Ok(outcome.data)
                } else {
                    Err(EngineError::Command(
                        outcome.error.unwrap_or_else(|| "unknown engine error".into()),
                    ))
                }
            }
            Ok(Err(_)) => Err(EngineError::ChannelClosed),
            Err(_) => {
                self.pending.lock().await.remove(&message.id);
                Err(EngineError::Timeout(op))
            }
        }
    }

    fn decode<T: DeserializeOwned>(data: Option<serde_json::Value>, op: &str) -> Result<T> {
        let value =
            data.ok_or_else(|| EngineError::Command(format!("{op} returned no data")))?;
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl Engine for EngineClient {
    async fn list_conversations(&self) -> Result<Vec<ConversationData>> {
        let data = self
            .request(EngineCommand::ListConversations, LIST_TIMEOUT, "list")
            .await?;
        Self::decode(data, "list")
    }

    async fn get_conversation(&self, chat_id: &ChatId) -> Result<ConversationData> {
        let data = self
            .request(
                EngineCommand::GetConversation {
                    chat_id: chat_id.to_string(),
                },
                CONVERSATION_TIMEOUT,
                "conversation",
            )
            .await?;
        Self::decode(data, "conversation")
    }

    async fn fetch_messages(&self, chat_id: &ChatId, limit: u32) -> Result<Vec<MessageData>> {
        let data = self
            .request(
                EngineCommand::FetchMessages {
                    chat_id: chat_id.to_string(),
                    limit,
                },
                MESSAGES_TIMEOUT,
                "messages",
            )
            .await?;
        Self::decode(data, "messages")
    }

    async fn send_message(&self, chat_id: &ChatId, text: &str) -> Result<MessageData> {
        let data = self
            .request(
                EngineCommand::SendMessage {
                    chat_id: chat_id.to_string(),
                    text: text.to_string(),
                },
                SEND_TIMEOUT,
                "send",
            )
            .await?;
        Self::decode(data, "send")
    }

    async fn fetch_avatar(&self, chat_id: &ChatId) -> Result<Option<String>> {
        let data = self
            .request(
                EngineCommand::FetchAvatar {
                    chat_id: chat_id.to_string(),
                },
                AVATAR_TIMEOUT,
                "avatar",
            )
            .await?;
        let avatar: AvatarData = Self::decode(data, "avatar")?;
        Ok(avatar.url)
    }

    async fn download_attachment(&self, message_id: &str) -> Result<AttachmentData> {
        let data = self
            .request(
                EngineCommand::DownloadAttachment {
                    message_id: message_id.to_string(),
                },
                ATTACHMENT_TIMEOUT,
                "attachment",
            )
            .await?;
        Self::decode(data, "attachment")
    }

    async fn logout(&self) -> Result<()> {
        self.request(EngineCommand::Logout, SEND_TIMEOUT, "logout")
            .await?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        // Best-effort polite shutdown first; the host closes the browser
        // cleanly when it can.
        {
            let process = self.process.lock().await;
            if let Some(p) = process.as_ref() {
                let line = EngineMessage::command(EngineCommand::Shutdown).to_line();
                if let Err(e) = p.send(&line).await {
                    warn!(account_id = %self.account_id, error = %e, "Shutdown command not delivered");
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        if let Some(mut process) = self.process.lock().await.take() {
            process.kill().await?;
        }
        Ok(())
    }
}

impl Drop for EngineClient {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.process.try_lock() {
            // kill_on_drop covers the child itself once the handle goes.
            guard.take();
        }
    }
}
