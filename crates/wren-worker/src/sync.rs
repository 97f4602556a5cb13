use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::future;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use wren_core::{
    AccountId, ChatId, ChatMessage, Conversation, ConversationData, LastMessage, MessageData,
    ServerEvent, SyncState, SyncStatus, batch_progress,
};
use wren_engine::{Engine, ErrorKind, RetryDecision, RetryFsm, RetryPolicy, classify};
use wren_store::{StoreWrite, WriteBehind};

use crate::avatar::AvatarCache;
use crate::cache::ChatCache;
use crate::error::{Result, WorkerError};

/// Conversations are materialized in batches of this size: small enough to
/// bound memory and keep the event loop responsive, large enough that the
/// per-batch engine round-trips overlap usefully.
pub const BATCH_SIZE: usize = 25;

/// Cap for quick incremental refreshes.
pub const QUICK_SYNC_LIMIT: usize = 30;

/// The single list fetch per run gets three attempts, backing off 2s, 4s.
const LIST_RETRY: RetryPolicy = RetryPolicy::exponential(2, Duration::from_secs(2));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    pub max_chats: Option<usize>,
    pub incremental: bool,
}

/// Terminal accounting for one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub total: usize,
    pub success: usize,
    pub errors: usize,
    pub unchanged: usize,
}

/// Owns the per-account sync status map and guards the one-active-run
/// invariant. Every update is mirrored to the durable store best-effort.
pub struct SyncTracker {
    statuses: RwLock<HashMap<AccountId, SyncStatus>>,
    writer: WriteBehind,
}

impl SyncTracker {
    pub fn new(writer: WriteBehind) -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
            writer,
        }
    }

    pub async fn status(&self, account_id: &AccountId) -> SyncStatus {
        self.statuses
            .read()
            .await
            .get(account_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Atomically moves idle/terminal -> syncing. `None` means a run is
    /// already active and the caller must back off.
    pub async fn begin(&self, account_id: &AccountId) -> Option<SyncStatus> {
        let mut statuses = self.statuses.write().await;
        let status = statuses.entry(account_id.clone()).or_default();
        if status.is_syncing() {
            return None;
        }
        *status = SyncStatus {
            state: SyncState::Syncing,
            progress: 1,
            message: "Starting sync".to_string(),
            started_at: Some(chrono::Utc::now().timestamp()),
            ..SyncStatus::idle()
        };
        self.persist(account_id, status);
        Some(status.clone())
    }

    pub async fn update(
        &self,
        account_id: &AccountId,
        apply: impl FnOnce(&mut SyncStatus),
    ) -> SyncStatus {
        let mut statuses = self.statuses.write().await;
        let status = statuses.entry(account_id.clone()).or_default();
        apply(status);
        self.persist(account_id, status);
        status.clone()
    }

    /// The terminal -> idle reset, used when an account is switched away
    /// or deleted.
    pub async fn reset(&self, account_id: &AccountId) {
        let mut statuses = self.statuses.write().await;
        statuses.insert(account_id.clone(), SyncStatus::idle());
        self.persist(account_id, &SyncStatus::idle());
    }

    fn persist(&self, account_id: &AccountId, status: &SyncStatus) {
        self.writer.enqueue(StoreWrite::SyncStatus {
            account_id: account_id.clone(),
            status: status.clone(),
        });
    }
}

/// Everything one sync run needs. The pipeline owns no persistent state;
/// it is a transient process parameterized by the account.
pub struct SyncContext {
    pub account_id: AccountId,
    pub engine: Arc<dyn Engine>,
    pub cache: Arc<ChatCache>,
    pub avatars: Arc<AvatarCache>,
    pub tracker: Arc<SyncTracker>,
    pub events: broadcast::Sender<ServerEvent>,
    pub cancel: Arc<AtomicBool>,
}

enum ListResult {
    Listed(Vec<ConversationData>),
    SessionGone,
    Failed(String),
}

/// Runs one streaming sync. The caller has already verified readiness and
/// moved the tracker into `syncing`; this function drives the run to a
/// terminal state no matter what the engine does.
pub async fn run_sync(ctx: SyncContext, opts: SyncOptions) -> SyncOutcome {
    let started = Instant::now();
    let account_id = ctx.account_id.clone();

    if !opts.incremental {
        let _ = ctx.events.send(ServerEvent::SyncClear);
    }
    let status = ctx
        .tracker
        .update(&account_id, |s| {
            s.message = "Fetching conversation list".to_string();
        })
        .await;
    let _ = ctx.events.send(ServerEvent::sync_progress(&status));

    let listed = match fetch_list(&ctx).await {
        ListResult::Listed(list) => list,
        ListResult::SessionGone => return complete_from_cache(&ctx).await,
        ListResult::Failed(error) => {
            fail(&ctx, error).await;
            return SyncOutcome::default();
        }
    };

    let total = listed.len().min(opts.max_chats.unwrap_or(usize::MAX));
    if total == 0 {
        return complete_empty(&ctx).await;
    }

    // Previous snapshot keyed by chat id, for incremental comparison.
    let previous: HashMap<ChatId, (i64, u32)> = if opts.incremental {
        ctx.cache
            .get(&account_id)
            .await
            .into_iter()
            .map(|c| {
                let ts = c
                    .last_message
                    .as_ref()
                    .map(|m| m.timestamp)
                    .unwrap_or(c.timestamp);
                (c.id, (ts, c.unread_count))
            })
            .collect()
    } else {
        HashMap::new()
    };

    let status = ctx
        .tracker
        .update(&account_id, |s| {
            s.total = total;
            s.message = format!("Syncing {total} chats");
        })
        .await;
    let _ = ctx.events.send(ServerEvent::sync_progress(&status));

    let mut outcome = SyncOutcome {
        total,
        ..Default::default()
    };
    let mut synced: Vec<Conversation> = Vec::with_capacity(total);
    let mut cancelled = false;

    'batches: for (batch_index, batch) in listed[..total].chunks(BATCH_SIZE).enumerate() {
        if ctx.cancel.load(Ordering::SeqCst) {
            cancelled = true;
            break;
        }
        let batch_start = batch_index * BATCH_SIZE;

        // Enrichment calls within a batch run concurrently; batches stay
        // sequential and in list order.
        let mut tasks = Vec::with_capacity(batch.len());
        for raw in batch {
            if ctx.cancel.load(Ordering::SeqCst) {
                cancelled = true;
                break 'batches;
            }
            tasks.push(materialize(&ctx, raw.clone()));
        }
        let results = future::join_all(tasks).await;

        for (offset, result) in results.into_iter().enumerate() {
            let index = batch_start + offset;
            match result {
                Ok(chat) => {
                    if opts.incremental && is_unchanged(&previous, &chat) {
                        outcome.unchanged += 1;
                    } else {
                        outcome.success += 1;
                    }
                    let _ = ctx.events.send(ServerEvent::SyncChat {
                        chat: chat.clone(),
                        index,
                        total,
                    });
                    synced.push(chat);
                }
                Err(e) => {
                    outcome.errors += 1;
                    warn!(account_id = %account_id, error = %e, "Conversation skipped");
                }
            }
        }

        let done = (batch_start + batch.len()).min(total);
        let status = ctx
            .tracker
            .update(&account_id, |s| {
                s.progress = batch_progress(done, total);
                s.synced = done;
                s.current = synced.last().map(|c| c.name.clone());
                s.message = format!("Synced {done} of {total} chats");
            })
            .await;
        let _ = ctx.events.send(ServerEvent::sync_progress(&status));

        // Hand control back so queued commands (cancellation included)
        // get a chance to run before the next batch.
        tokio::task::yield_now().await;
    }

    if cancelled {
        info!(account_id = %account_id, synced = synced.len(), "Sync cancelled");
        let status = ctx
            .tracker
            .update(&account_id, |s| {
                s.state = SyncState::Failed;
                s.progress = 0;
                s.message = "Sync cancelled".to_string();
                s.error = Some("Cancelled".to_string());
                s.completed_at = Some(chrono::Utc::now().timestamp());
            })
            .await;
        let _ = ctx.events.send(ServerEvent::sync_progress(&status));
        // Already-emitted batches stand; the cache keeps its last full
        // snapshot rather than a truncated one.
        return outcome;
    }

    synced.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    ctx.cache.set(&account_id, synced.clone()).await;

    let elapsed = started.elapsed().as_secs_f32();
    info!(
        account_id = %account_id,
        total,
        success = outcome.success,
        unchanged = outcome.unchanged,
        errors = outcome.errors,
        elapsed,
        "Sync completed"
    );
    let status = ctx
        .tracker
        .update(&account_id, |s| {
            s.state = SyncState::Completed;
            s.progress = 100;
            s.synced = total;
            s.current = None;
            s.error = None;
            s.message = format!("Synced {total} chats in {elapsed:.1}s");
            s.completed_at = Some(chrono::Utc::now().timestamp());
        })
        .await;
    let _ = ctx.events.send(ServerEvent::sync_progress(&status));
    let _ = ctx.events.send(ServerEvent::Chats { list: synced });
    let _ = ctx.events.send(ServerEvent::SyncComplete {
        total,
        success: outcome.success,
        errors: outcome.errors,
    });

    outcome
}

/// One conversation-list fetch per run. Transient failures back off
/// exponentially; a destroyed page/session aborts straight to the cache
/// fallback because no retry can revive it within this run.
async fn fetch_list(ctx: &SyncContext) -> ListResult {
    let mut fsm = RetryFsm::new(LIST_RETRY, LIST_RETRY);
    loop {
        let attempt = fsm.begin();
        match ctx.engine.list_conversations().await {
            Ok(list) => return ListResult::Listed(list),
            Err(e) => {
                if classify(&e.to_string()) == ErrorKind::SessionGone {
                    warn!(account_id = %ctx.account_id, error = %e, "Engine session gone");
                    return ListResult::SessionGone;
                }
                warn!(account_id = %ctx.account_id, attempt, error = %e, "Conversation list fetch failed");
                match fsm.fail(ErrorKind::Transient) {
                    RetryDecision::Retry { delay, .. } => tokio::time::sleep(delay).await,
                    RetryDecision::GiveUp => return ListResult::Failed(e.to_string()),
                }
            }
        }
    }
}

async fn complete_from_cache(ctx: &SyncContext) -> SyncOutcome {
    let cached = ctx.cache.get(&ctx.account_id).await;
    let total = cached.len();
    info!(account_id = %ctx.account_id, total, "Completing sync from cached snapshot");

    let status = ctx
        .tracker
        .update(&ctx.account_id, |s| {
            s.state = SyncState::Completed;
            s.progress = 100;
            s.total = total;
            s.synced = total;
            s.current = None;
            s.message = format!("Loaded {total} chats from cache");
            s.completed_at = Some(chrono::Utc::now().timestamp());
        })
        .await;
    let _ = ctx.events.send(ServerEvent::sync_progress(&status));
    let _ = ctx.events.send(ServerEvent::Chats {
        list: cached.clone(),
    });
    let _ = ctx.events.send(ServerEvent::SyncComplete {
        total,
        success: total,
        errors: 0,
    });

    SyncOutcome {
        total,
        success: total,
        ..Default::default()
    }
}

async fn complete_empty(ctx: &SyncContext) -> SyncOutcome {
    let status = ctx
        .tracker
        .update(&ctx.account_id, |s| {
            s.state = SyncState::Completed;
            s.progress = 100;
            s.total = 0;
            s.synced = 0;
            s.current = None;
            s.message = "No conversations to sync".to_string();
            s.completed_at = Some(chrono::Utc::now().timestamp());
        })
        .await;
    let _ = ctx.events.send(ServerEvent::sync_progress(&status));
    ctx.cache.set(&ctx.account_id, Vec::new()).await;
    let _ = ctx.events.send(ServerEvent::Chats { list: Vec::new() });
    let _ = ctx.events.send(ServerEvent::SyncComplete {
        total: 0,
        success: 0,
        errors: 0,
    });
    SyncOutcome::default()
}

async fn fail(ctx: &SyncContext, error: String) {
    warn!(account_id = %ctx.account_id, error = %error, "Sync failed");
    let status = ctx
        .tracker
        .update(&ctx.account_id, |s| {
            s.state = SyncState::Failed;
            s.progress = 0;
            s.message = "Sync failed".to_string();
            s.error = Some(error);
            s.completed_at = Some(chrono::Utc::now().timestamp());
        })
        .await;
    let _ = ctx.events.send(ServerEvent::sync_progress(&status));
}

/// Materializes one raw engine record into a normalized conversation.
/// Group participant counts and avatars are best-effort enrichment; a
/// failure there degrades the record, never the batch.
async fn materialize(ctx: &SyncContext, raw: ConversationData) -> Result<Conversation> {
    if raw.id.is_empty() {
        return Err(WorkerError::Validation(
            "engine returned a conversation without an id".to_string(),
        ));
    }
    let chat_id = ChatId::new(raw.id.clone());

    let participant_count = if chat_id.is_group() && raw.participant_count.is_none() {
        match ctx.engine.get_conversation(&chat_id).await {
            Ok(detail) => detail.participant_count,
            Err(e) => {
                debug!(chat_id = %chat_id, error = %e, "Participant enrichment failed");
                None
            }
        }
    } else {
        raw.participant_count
    };

    let avatar_url = ctx.avatars.get_or_fetch(&ctx.engine, &chat_id).await;

    normalize(raw, participant_count, avatar_url)
}

/// Pure normalization: name falls back to phone, then the id stem; the
/// last-message body is replaced with a kind label for media.
pub(crate) fn normalize(
    raw: ConversationData,
    participant_count: Option<u32>,
    avatar_url: Option<String>,
) -> Result<Conversation> {
    if raw.id.is_empty() {
        return Err(WorkerError::Validation(
            "engine returned a conversation without an id".to_string(),
        ));
    }
    let chat_id = ChatId::new(raw.id);
    let phone = chat_id.phone().map(str::to_string);
    let name = raw
        .name
        .filter(|n| !n.is_empty())
        .or_else(|| phone.clone())
        .unwrap_or_else(|| chat_id.stem().to_string());

    let last_message = raw.last_message.map(|m| LastMessage {
        body: m.kind.preview(&m.body),
        sender: m.sender,
        timestamp: m.timestamp,
        kind: m.kind,
        from_me: m.from_me,
    });
    let timestamp = raw
        .timestamp
        .or_else(|| last_message.as_ref().map(|m| m.timestamp))
        .unwrap_or(0);

    Ok(Conversation {
        is_group: raw.is_group || chat_id.is_group(),
        id: chat_id,
        name,
        phone,
        avatar_url,
        participant_count,
        unread_count: raw.unread_count,
        last_message,
        timestamp,
    })
}

fn is_unchanged(previous: &HashMap<ChatId, (i64, u32)>, chat: &Conversation) -> bool {
    previous.get(&chat.id).is_some_and(|(ts, unread)| {
        let chat_ts = chat
            .last_message
            .as_ref()
            .map(|m| m.timestamp)
            .unwrap_or(chat.timestamp);
        chat_ts == *ts && chat.unread_count == *unread
    })
}

pub(crate) fn chat_message(data: MessageData) -> ChatMessage {
    ChatMessage {
        id: data.id,
        chat_id: ChatId::new(data.chat_id),
        sender: data.sender,
        sender_name: data.sender_name,
        body: data.body,
        kind: data.kind,
        timestamp: data.timestamp,
        from_me: data.from_me,
        has_media: data.has_media,
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use wren_core::MessageKind;
    use wren_store::{SnapshotStore, WriteBehind};

    use crate::testutil::{ScriptedEngine, convo};

    use super::*;

    struct Fixture {
        _dir: TempDir,
        cache: Arc<ChatCache>,
        avatars: Arc<AvatarCache>,
        tracker: Arc<SyncTracker>,
        events: broadcast::Sender<ServerEvent>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let snapshots = SnapshotStore::new(dir.path().to_path_buf()).unwrap();
        let writer = WriteBehind::spawn(None, snapshots.clone());
        let cache = Arc::new(ChatCache::new(snapshots, None, writer.clone()));
        let tracker = Arc::new(SyncTracker::new(writer));
        let (events, _) = broadcast::channel(4096);
        Fixture {
            _dir: dir,
            cache,
            avatars: Arc::new(AvatarCache::new()),
            tracker,
            events,
        }
    }

    fn context(
        fx: &Fixture,
        engine: Arc<ScriptedEngine>,
        cancel: Arc<AtomicBool>,
    ) -> SyncContext {
        SyncContext {
            account_id: AccountId::from("acc1"),
            engine,
            cache: fx.cache.clone(),
            avatars: fx.avatars.clone(),
            tracker: fx.tracker.clone(),
            events: fx.events.clone(),
            cancel,
        }
    }

    fn drain(rx: &mut broadcast::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn begin(fx: &Fixture) {
        assert!(fx.tracker.begin(&AccountId::from("acc1")).await.is_some());
    }

    #[tokio::test]
    async fn cap_limits_streamed_chats() {
        let fx = fixture();
        let engine = ScriptedEngine::new((0..25).map(|i| convo(&format!("{i}@c.us"), i)).collect());
        let mut rx = fx.events.subscribe();
        begin(&fx).await;

        let outcome = run_sync(
            context(&fx, engine, Arc::new(AtomicBool::new(false))),
            SyncOptions {
                max_chats: Some(10),
                incremental: false,
            },
        )
        .await;

        assert_eq!(outcome.total, 10);
        assert_eq!(outcome.success, 10);

        let events = drain(&mut rx);
        let streamed: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ServerEvent::SyncChat { .. }))
            .collect();
        assert_eq!(streamed.len(), 10);
        for event in &events {
            if let ServerEvent::SyncProgress { total, .. } = event {
                if *total > 0 {
                    assert_eq!(*total, 10);
                }
            }
        }
        let snapshot = events.iter().rev().find_map(|e| match e {
            ServerEvent::Chats { list } => Some(list.len()),
            _ => None,
        });
        assert_eq!(snapshot, Some(10));
    }

    #[tokio::test]
    async fn empty_fetch_completes_immediately() {
        let fx = fixture();
        let engine = ScriptedEngine::new(Vec::new());
        let mut rx = fx.events.subscribe();
        begin(&fx).await;

        let outcome = run_sync(
            context(&fx, engine, Arc::new(AtomicBool::new(false))),
            SyncOptions::default(),
        )
        .await;

        assert_eq!(outcome.total, 0);
        let status = fx.tracker.status(&AccountId::from("acc1")).await;
        assert_eq!(status.state, SyncState::Completed);
        assert_eq!(status.progress, 100);
        assert_eq!(status.total, 0);

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::SyncComplete { total: 0, .. })));
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_ends_at_100() {
        let fx = fixture();
        let engine = ScriptedEngine::new((0..60).map(|i| convo(&format!("{i}@c.us"), i)).collect());
        let mut rx = fx.events.subscribe();
        begin(&fx).await;

        run_sync(
            context(&fx, engine, Arc::new(AtomicBool::new(false))),
            SyncOptions::default(),
        )
        .await;

        let mut last = 0u8;
        let mut final_progress = 0u8;
        for event in drain(&mut rx) {
            if let ServerEvent::SyncProgress { progress, .. } = event {
                assert!(progress >= last, "{progress} < {last}");
                last = progress;
                final_progress = progress;
            }
        }
        assert_eq!(final_progress, 100);
    }

    #[tokio::test]
    async fn cancellation_stops_before_the_next_batch() {
        let fx = fixture();
        let cancel = Arc::new(AtomicBool::new(false));
        let engine = ScriptedEngine::new((0..75).map(|i| convo(&format!("{i}@c.us"), i)).collect());
        // Trip the flag while batch 2 is materializing.
        engine
            .cancel_on_avatar_call
            .store(26, Ordering::SeqCst);
        *engine.cancel_flag.lock().unwrap() = Some(cancel.clone());

        let mut rx = fx.events.subscribe();
        begin(&fx).await;

        let outcome = run_sync(
            context(&fx, engine, cancel),
            SyncOptions::default(),
        )
        .await;

        // Batches 1 and 2 (50 chats) were emitted; batch 3 never started.
        assert_eq!(outcome.success, 50);
        let streamed = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::SyncChat { .. }))
            .count();
        assert_eq!(streamed, 50);

        let status = fx.tracker.status(&AccountId::from("acc1")).await;
        assert_eq!(status.state, SyncState::Failed);
        assert_eq!(status.progress, 0);
        assert_eq!(status.error.as_deref(), Some("Cancelled"));
    }

    #[tokio::test]
    async fn incremental_counts_unchanged_but_keeps_them() {
        let fx = fixture();
        let account = AccountId::from("acc1");
        let listed: Vec<_> = (0..8).map(|i| convo(&format!("{i}@c.us"), i)).collect();

        // Prime the cache with the same snapshot the engine will report.
        let primed: Vec<_> = listed
            .clone()
            .into_iter()
            .map(|raw| normalize(raw, None, None).unwrap())
            .collect();
        fx.cache.set(&account, primed).await;

        let engine = ScriptedEngine::new(listed);
        begin(&fx).await;

        let outcome = run_sync(
            context(&fx, engine, Arc::new(AtomicBool::new(false))),
            SyncOptions {
                max_chats: None,
                incremental: true,
            },
        )
        .await;

        assert_eq!(outcome.unchanged, 8);
        assert_eq!(outcome.success, 0);
        assert_eq!(fx.cache.get(&account).await.len(), 8);
    }

    #[tokio::test]
    async fn session_gone_falls_back_to_cache() {
        let fx = fixture();
        let account = AccountId::from("acc1");
        let primed: Vec<_> = (0..5)
            .map(|i| normalize(convo(&format!("{i}@c.us"), i), None, None).unwrap())
            .collect();
        fx.cache.set(&account, primed).await;

        let engine = ScriptedEngine::new(Vec::new());
        engine.push_list_failure("Protocol error: Session closed. the page has been closed");
        let mut rx = fx.events.subscribe();
        begin(&fx).await;

        let outcome = run_sync(
            context(&fx, engine.clone(), Arc::new(AtomicBool::new(false))),
            SyncOptions::default(),
        )
        .await;

        // One failed list call, no retries, completed from the snapshot.
        assert_eq!(engine.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.total, 5);
        let status = fx.tracker.status(&account).await;
        assert_eq!(status.state, SyncState::Completed);
        assert_eq!(status.progress, 100);
        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            ServerEvent::Chats { list } if list.len() == 5
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_list_failures_are_retried() {
        let fx = fixture();
        let engine = ScriptedEngine::new(vec![convo("1@c.us", 1)]);
        engine.push_list_failure("Navigation timeout of 30000 ms exceeded");
        begin(&fx).await;

        let outcome = run_sync(
            context(&fx, engine.clone(), Arc::new(AtomicBool::new(false))),
            SyncOptions::default(),
        )
        .await;

        assert_eq!(engine.list_calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.success, 1);
    }

    #[test]
    fn normalize_name_fallback_chain() {
        let mut raw = convo("5511999999999@c.us", 10);
        raw.name = None;
        let chat = normalize(raw, None, None).unwrap();
        assert_eq!(chat.name, "5511999999999");
        assert_eq!(chat.phone.as_deref(), Some("5511999999999"));

        let mut raw = convo("group-1@g.us", 10);
        raw.name = None;
        let chat = normalize(raw, Some(12), None).unwrap();
        assert_eq!(chat.name, "group-1");
        assert!(chat.is_group);
        assert_eq!(chat.participant_count, Some(12));
    }

    #[test]
    fn normalize_labels_media_previews() {
        let mut raw = convo("1@c.us", 10);
        if let Some(last) = raw.last_message.as_mut() {
            last.kind = MessageKind::Image;
            last.body = String::new();
        }
        let chat = normalize(raw, None, None).unwrap();
        assert_eq!(chat.last_message.unwrap().body, "[Photo]");
    }
}
