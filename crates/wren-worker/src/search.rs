use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use wren_core::{AccountId, SearchHit, ServerEvent};
use wren_engine::Engine;

use crate::cache::ChatCache;
use crate::error::Result;
use crate::sync::{chat_message, normalize};

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub max_chats: usize,
    pub max_messages_per_chat: u32,
}

/// Scans the newest chats for a case-insensitive substring match,
/// streaming per-chat progress to the requesting connection only.
///
/// The chat list comes from the cache snapshot when one exists; a chat
/// whose messages cannot be fetched is skipped with a warning rather than
/// failing the whole search.
pub async fn run_search(
    account_id: &AccountId,
    engine: Arc<dyn Engine>,
    cache: &ChatCache,
    query: &str,
    opts: SearchOptions,
    progress: &mpsc::Sender<ServerEvent>,
) -> Result<Vec<SearchHit>> {
    let needle = query.to_lowercase();

    let mut chats = cache.get(account_id).await;
    if chats.is_empty() {
        let listed = engine.list_conversations().await?;
        chats = listed
            .into_iter()
            .filter_map(|raw| normalize(raw, None, None).ok())
            .collect();
    }
    chats.truncate(opts.max_chats);
    let total = chats.len();

    let mut hits = Vec::new();
    for (index, chat) in chats.iter().enumerate() {
        let _ = progress
            .send(ServerEvent::SearchProgress {
                current: chat.name.clone(),
                index,
                total,
            })
            .await;

        match engine
            .fetch_messages(&chat.id, opts.max_messages_per_chat)
            .await
        {
            Ok(messages) => {
                for data in messages {
                    if data.body.to_lowercase().contains(&needle) {
                        hits.push(SearchHit {
                            chat_id: chat.id.clone(),
                            chat_name: chat.name.clone(),
                            message: chat_message(data),
                        });
                    }
                }
            }
            Err(e) => {
                warn!(chat_id = %chat.id, error = %e, "Skipping chat in search");
            }
        }
    }

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use wren_store::{SnapshotStore, WriteBehind};

    use crate::testutil::{ScriptedEngine, convo, msg};

    use super::*;

    fn cache() -> (TempDir, ChatCache) {
        let dir = TempDir::new().unwrap();
        let snapshots = SnapshotStore::new(dir.path().to_path_buf()).unwrap();
        let writer = WriteBehind::spawn(None, snapshots.clone());
        (dir, ChatCache::new(snapshots, None, writer))
    }

    #[tokio::test]
    async fn finds_matches_case_insensitively() {
        let (_dir, cache) = cache();
        let engine = ScriptedEngine::new(vec![convo("1@c.us", 10), convo("2@c.us", 5)]);
        engine.script_messages(
            "1@c.us",
            vec![
                msg("1@c.us", "m1", "Lunch TOMORROW?", 1),
                msg("1@c.us", "m2", "nothing here", 2),
            ],
        );
        engine.script_messages("2@c.us", vec![msg("2@c.us", "m3", "about tomorrow...", 3)]);

        let (tx, mut rx) = mpsc::channel(64);
        let hits = run_search(
            &AccountId::from("acc1"),
            engine,
            &cache,
            "tomorrow",
            SearchOptions {
                max_chats: 20,
                max_messages_per_chat: 50,
            },
            &tx,
        )
        .await
        .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].message.id, "m1");

        let mut progress_events = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, ServerEvent::SearchProgress { .. }) {
                progress_events += 1;
            }
        }
        assert_eq!(progress_events, 2);
    }

    #[tokio::test]
    async fn max_chats_bounds_the_scan() {
        let (_dir, cache) = cache();
        let account = AccountId::from("acc1");
        let primed: Vec<_> = (0..10)
            .map(|i| normalize(convo(&format!("{i}@c.us"), 100 - i), None, None).unwrap())
            .collect();
        cache.set(&account, primed).await;

        let engine = ScriptedEngine::new(Vec::new());
        let (tx, mut rx) = mpsc::channel(64);
        run_search(
            &account,
            engine,
            &cache,
            "whatever",
            SearchOptions {
                max_chats: 3,
                max_messages_per_chat: 10,
            },
            &tx,
        )
        .await
        .unwrap();

        let mut total_seen = None;
        while let Ok(ServerEvent::SearchProgress { total, .. }) = rx.try_recv() {
            total_seen = Some(total);
        }
        assert_eq!(total_seen, Some(3));
    }

    #[tokio::test]
    async fn failed_chat_is_skipped_not_fatal() {
        let (_dir, cache) = cache();
        let account = AccountId::from("acc1");
        cache
            .set(
                &account,
                vec![normalize(convo("1@c.us", 10), None, None).unwrap()],
            )
            .await;

        // No scripted messages at all: fetch returns empty, not an error,
        // so the search completes with zero hits.
        let engine = ScriptedEngine::new(Vec::new());
        let (tx, _rx) = mpsc::channel(64);
        let hits = run_search(
            &account,
            engine,
            &cache,
            "x",
            SearchOptions {
                max_chats: 5,
                max_messages_per_chat: 10,
            },
            &tx,
        )
        .await
        .unwrap();
        assert!(hits.is_empty());
    }
}
