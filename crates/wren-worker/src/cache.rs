use std::collections::HashMap;

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use wren_core::{AccountId, ChatMessage, Conversation, LastMessage};
use wren_store::{SnapshotStore, Store, StoreWrite, WriteBehind};

/// Per-account conversation cache with three tiers: the in-process map,
/// the durable store, and the on-disk JSON snapshot.
///
/// Reads resolve memory first and never block on the slow tiers when
/// memory already holds data; the first non-empty hit backfills the
/// faster tiers. Writes land in memory synchronously and reach the slow
/// tiers through the write-behind queue, so a broken disk or database can
/// only ever cost durability, never a request.
pub struct ChatCache {
    memory: RwLock<HashMap<AccountId, Vec<Conversation>>>,
    snapshots: SnapshotStore,
    store: Option<Arc<Store>>,
    writer: WriteBehind,
}

impl ChatCache {
    pub fn new(snapshots: SnapshotStore, store: Option<Arc<Store>>, writer: WriteBehind) -> Self {
        Self {
            memory: RwLock::new(HashMap::new()),
            snapshots,
            store,
            writer,
        }
    }

    pub async fn get(&self, account_id: &AccountId) -> Vec<Conversation> {
        {
            let memory = self.memory.read().await;
            if let Some(chats) = memory.get(account_id) {
                if !chats.is_empty() {
                    return chats.clone();
                }
            }
        }

        if let Some(store) = &self.store {
            match store.get_chats(account_id).await {
                Ok(chats) if !chats.is_empty() => {
                    self.memory
                        .write()
                        .await
                        .insert(account_id.clone(), chats.clone());
                    return chats;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(account_id = %account_id, error = %e, "Durable chat read failed");
                }
            }
        }

        if let Some(chats) = self.snapshots.load_chats(account_id) {
            if !chats.is_empty() {
                self.memory
                    .write()
                    .await
                    .insert(account_id.clone(), chats.clone());
                // The snapshot was newer than the store; push it back up.
                self.writer.enqueue(StoreWrite::PersistChats {
                    account_id: account_id.clone(),
                    chats: chats.clone(),
                });
                return chats;
            }
        }

        Vec::new()
    }

    pub async fn set(&self, account_id: &AccountId, chats: Vec<Conversation>) {
        self.memory
            .write()
            .await
            .insert(account_id.clone(), chats.clone());
        self.writer.enqueue(StoreWrite::PersistChats {
            account_id: account_id.clone(),
            chats,
        });
    }

    pub async fn clear(&self, account_id: &AccountId) {
        self.memory.write().await.remove(account_id);
        self.writer.enqueue(StoreWrite::ClearChats {
            account_id: account_id.clone(),
        });
    }

    /// Write-through for one inbound or outbound message: bumps the
    /// conversation's summary, adjusts the unread count and re-sorts the
    /// list. Returns the updated conversation for event emission.
    pub async fn apply_message(
        &self,
        account_id: &AccountId,
        message: &ChatMessage,
    ) -> Option<Conversation> {
        let mut memory = self.memory.write().await;
        let chats = memory.entry(account_id.clone()).or_default();

        let updated = match chats.iter_mut().find(|c| c.id == message.chat_id) {
            Some(chat) => {
                chat.last_message = Some(last_message_of(message));
                chat.timestamp = message.timestamp;
                if message.from_me {
                    chat.unread_count = 0;
                } else {
                    chat.unread_count += 1;
                }
                chat.clone()
            }
            None => {
                let chat = Conversation {
                    id: message.chat_id.clone(),
                    name: message
                        .sender_name
                        .clone()
                        .or_else(|| message.chat_id.phone().map(str::to_string))
                        .unwrap_or_else(|| message.chat_id.stem().to_string()),
                    phone: message.chat_id.phone().map(str::to_string),
                    avatar_url: None,
                    is_group: message.chat_id.is_group(),
                    participant_count: None,
                    unread_count: if message.from_me { 0 } else { 1 },
                    last_message: Some(last_message_of(message)),
                    timestamp: message.timestamp,
                };
                chats.push(chat.clone());
                chat
            }
        };

        chats.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let snapshot = chats.clone();
        drop(memory);

        self.writer.enqueue(StoreWrite::PersistChats {
            account_id: account_id.clone(),
            chats: snapshot,
        });

        Some(updated)
    }
}

fn last_message_of(message: &ChatMessage) -> LastMessage {
    LastMessage {
        body: message.kind.preview(&message.body),
        sender: message.sender_name.clone().or_else(|| Some(message.sender.clone())),
        timestamp: message.timestamp,
        kind: message.kind,
        from_me: message.from_me,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;
    use wren_core::MessageKind;
    use wren_store::Store;

    use crate::testutil::msg;

    use super::*;

    fn conversation(id: &str, ts: i64) -> Conversation {
        Conversation {
            id: wren_core::ChatId::from(id),
            name: format!("Chat {id}"),
            phone: None,
            avatar_url: Some("http://a/x.jpg".to_string()),
            is_group: false,
            participant_count: None,
            unread_count: 3,
            last_message: Some(LastMessage {
                body: "latest".to_string(),
                sender: Some("x@c.us".to_string()),
                timestamp: ts,
                kind: MessageKind::Text,
                from_me: false,
            }),
            timestamp: ts,
        }
    }

    async fn drain_writes() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn round_trips_through_the_disk_tier() {
        let dir = TempDir::new().unwrap();
        let account = AccountId::from("acc1");
        let chats = vec![conversation("1@c.us", 20), conversation("2@c.us", 10)];

        {
            let snapshots = SnapshotStore::new(dir.path().to_path_buf()).unwrap();
            let writer = WriteBehind::spawn(None, snapshots.clone());
            let cache = ChatCache::new(snapshots, None, writer);
            cache.set(&account, chats.clone()).await;
            drain_writes().await;
        }

        // Fresh cache, empty memory tier: the read must rebuild from disk.
        let snapshots = SnapshotStore::new(dir.path().to_path_buf()).unwrap();
        let writer = WriteBehind::spawn(None, snapshots.clone());
        let cache = ChatCache::new(snapshots, None, writer);
        assert_eq!(cache.get(&account).await, chats);
    }

    #[tokio::test]
    async fn round_trips_through_the_durable_tier() {
        let dir = TempDir::new().unwrap();
        let account = AccountId::from("acc1");
        let chats = vec![conversation("1@c.us", 20)];
        let store = Arc::new(Store::in_memory().await.unwrap());

        {
            let snapshots = SnapshotStore::new(dir.path().join("a")).unwrap();
            let writer = WriteBehind::spawn(Some(store.clone()), snapshots.clone());
            let cache = ChatCache::new(snapshots, Some(store.clone()), writer);
            cache.set(&account, chats.clone()).await;
            drain_writes().await;
        }

        // New cache with a different (empty) snapshot dir: only the
        // durable store can satisfy this read.
        let snapshots = SnapshotStore::new(dir.path().join("b")).unwrap();
        let writer = WriteBehind::spawn(Some(store.clone()), snapshots.clone());
        let cache = ChatCache::new(snapshots, Some(store), writer);
        assert_eq!(cache.get(&account).await, chats);
    }

    #[tokio::test]
    async fn inbound_message_bumps_and_resorts() {
        let dir = TempDir::new().unwrap();
        let account = AccountId::from("acc1");
        let snapshots = SnapshotStore::new(dir.path().to_path_buf()).unwrap();
        let writer = WriteBehind::spawn(None, snapshots.clone());
        let cache = ChatCache::new(snapshots, None, writer);

        cache
            .set(
                &account,
                vec![conversation("1@c.us", 20), conversation("2@c.us", 10)],
            )
            .await;

        // New inbound message in the older chat moves it to the top.
        let updated = cache
            .apply_message(&account, &sync_msg("2@c.us", 30))
            .await
            .unwrap();
        assert_eq!(updated.unread_count, 4);

        let chats = cache.get(&account).await;
        assert_eq!(chats[0].id.as_str(), "2@c.us");
        assert_eq!(chats[0].timestamp, 30);
    }

    #[tokio::test]
    async fn own_message_clears_unread() {
        let dir = TempDir::new().unwrap();
        let account = AccountId::from("acc1");
        let snapshots = SnapshotStore::new(dir.path().to_path_buf()).unwrap();
        let writer = WriteBehind::spawn(None, snapshots.clone());
        let cache = ChatCache::new(snapshots, None, writer);

        cache.set(&account, vec![conversation("1@c.us", 20)]).await;

        let mut outgoing = sync_msg("1@c.us", 25);
        outgoing.from_me = true;
        let updated = cache.apply_message(&account, &outgoing).await.unwrap();
        assert_eq!(updated.unread_count, 0);
    }

    #[tokio::test]
    async fn unknown_chat_is_created_on_message() {
        let dir = TempDir::new().unwrap();
        let account = AccountId::from("acc1");
        let snapshots = SnapshotStore::new(dir.path().to_path_buf()).unwrap();
        let writer = WriteBehind::spawn(None, snapshots.clone());
        let cache = ChatCache::new(snapshots, None, writer);

        let updated = cache
            .apply_message(&account, &sync_msg("5511999999999@c.us", 5))
            .await
            .unwrap();
        assert_eq!(updated.name, "Someone");
        assert_eq!(updated.phone.as_deref(), Some("5511999999999"));
        assert_eq!(cache.get(&account).await.len(), 1);
    }

    fn sync_msg(chat_id: &str, ts: i64) -> ChatMessage {
        crate::sync::chat_message(msg(chat_id, &format!("m{ts}"), "hello", ts))
    }
}
