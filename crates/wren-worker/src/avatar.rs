use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use wren_core::ChatId;
use wren_engine::Engine;

/// Avatars barely change; cache them for a day.
pub const AVATAR_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct AvatarEntry {
    url: Option<String>,
    fetched_at: Instant,
}

/// Best-effort avatar lookups keyed by conversation id.
///
/// A fetch failure or timeout yields `None` without being cached, so the
/// next sync gets another short attempt; successes (including "this chat
/// has no avatar") stick for the TTL.
pub struct AvatarCache {
    entries: RwLock<HashMap<ChatId, AvatarEntry>>,
    ttl: Duration,
}

impl AvatarCache {
    pub fn new() -> Self {
        Self::with_ttl(AVATAR_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn get_or_fetch(
        &self,
        engine: &Arc<dyn Engine>,
        chat_id: &ChatId,
    ) -> Option<String> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(chat_id) {
                if entry.fetched_at.elapsed() < self.ttl {
                    return entry.url.clone();
                }
            }
        }

        match engine.fetch_avatar(chat_id).await {
            Ok(url) => {
                self.entries.write().await.insert(
                    chat_id.clone(),
                    AvatarEntry {
                        url: url.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                url
            }
            Err(e) => {
                debug!(chat_id = %chat_id, error = %e, "Avatar fetch failed");
                None
            }
        }
    }
}

impl Default for AvatarCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use crate::testutil::ScriptedEngine;

    use super::*;

    #[tokio::test]
    async fn hit_within_ttl_skips_the_engine() {
        let scripted = ScriptedEngine::with_avatars(&[("1@c.us", Some("http://a/1.jpg"))]);
        let engine: Arc<dyn Engine> = scripted.clone();
        let cache = AvatarCache::new();
        let chat = ChatId::from("1@c.us");

        let first = cache.get_or_fetch(&engine, &chat).await;
        let second = cache.get_or_fetch(&engine, &chat).await;

        assert_eq!(first.as_deref(), Some("http://a/1.jpg"));
        assert_eq!(second.as_deref(), Some("http://a/1.jpg"));
        assert_eq!(scripted.avatar_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let scripted = ScriptedEngine::with_avatars(&[("1@c.us", Some("http://a/1.jpg"))]);
        scripted.fail_avatars.store(true, Ordering::SeqCst);
        let engine: Arc<dyn Engine> = scripted.clone();
        let cache = AvatarCache::new();
        let chat = ChatId::from("1@c.us");

        assert_eq!(cache.get_or_fetch(&engine, &chat).await, None);

        scripted.fail_avatars.store(false, Ordering::SeqCst);
        assert_eq!(
            cache.get_or_fetch(&engine, &chat).await.as_deref(),
            Some("http://a/1.jpg")
        );
    }

    #[tokio::test]
    async fn expired_entries_refetch() {
        let scripted = ScriptedEngine::with_avatars(&[("1@c.us", Some("http://a/1.jpg"))]);
        let engine: Arc<dyn Engine> = scripted.clone();
        let cache = AvatarCache::with_ttl(Duration::from_millis(0));
        let chat = ChatId::from("1@c.us");

        cache.get_or_fetch(&engine, &chat).await;
        cache.get_or_fetch(&engine, &chat).await;
        assert_eq!(scripted.avatar_calls.load(Ordering::SeqCst), 2);
    }
}
