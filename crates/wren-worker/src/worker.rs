use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, RwLock, broadcast, mpsc};
use tracing::{debug, error, info, warn};

use wren_core::{
    Account, AccountId, ChatId, ChatMessage, Conversation, EngineEvent, SearchHit, ServerEvent,
    SyncStatus,
};
use wren_engine::{Engine, LifecycleManager, is_teardown_noise};
use wren_store::{SnapshotStore, Store, StoreWrite, WriteBehind};

use crate::avatar::AvatarCache;
use crate::cache::ChatCache;
use crate::error::{Result, WorkerError};
use crate::registry::SessionRegistry;
use crate::search::{self, SearchOptions};
use crate::sync::{self, QUICK_SYNC_LIMIT, SyncContext, SyncOptions, SyncTracker};

/// First-run account id, so a fresh install always has one account.
pub const DEFAULT_ACCOUNT_ID: &str = "default";

const EVENT_CHANNEL_DEPTH: usize = 1024;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory of the automation host (package.json lives here).
    pub host_dir: PathBuf,
    /// Root for the database, disk snapshots and per-account profiles.
    pub data_dir: PathBuf,
}

/// The orchestration core: owns the session registry, chat cache, sync
/// tracker and lifecycle manager, dispatches client commands, and pumps
/// the single inbound engine-event queue.
pub struct WrenWorker {
    lifecycle: LifecycleManager,
    registry: RwLock<SessionRegistry>,
    accounts: RwLock<Vec<Account>>,
    cache: Arc<ChatCache>,
    avatars: Arc<AvatarCache>,
    tracker: Arc<SyncTracker>,
    writer: WriteBehind,
    events: broadcast::Sender<ServerEvent>,
    cancel_flags: RwLock<HashMap<AccountId, Arc<AtomicBool>>>,
    engine_rx: Mutex<Option<mpsc::Receiver<(AccountId, EngineEvent)>>>,
}

impl WrenWorker {
    /// Wires the cache tiers, write-behind queue and lifecycle manager.
    /// The durable store is optional: a connection failure downgrades to
    /// disk snapshots with a warning, never an error.
    pub async fn new(config: WorkerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let db_path = config.data_dir.join("wren.db");
        let store = match Store::new_with_path(&db_path.to_string_lossy()).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                warn!(error = %e, "Durable store unavailable, falling back to disk snapshots");
                None
            }
        };

        let snapshots = SnapshotStore::new(config.data_dir.join("snapshots"))?;
        let writer = WriteBehind::spawn(store.clone(), snapshots.clone());

        let accounts = match &store {
            Some(store) => match store.list_accounts(None).await {
                Ok(accounts) if !accounts.is_empty() => accounts,
                Ok(_) => snapshots.load_accounts().unwrap_or_default(),
                Err(e) => {
                    warn!(error = %e, "Account load failed, using accounts snapshot");
                    snapshots.load_accounts().unwrap_or_default()
                }
            },
            None => snapshots.load_accounts().unwrap_or_default(),
        };

        let (lifecycle, engine_rx) =
            LifecycleManager::new(config.host_dir, config.data_dir.join("profiles"));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_DEPTH);

        let cache = Arc::new(ChatCache::new(snapshots, store, writer.clone()));
        let tracker = Arc::new(SyncTracker::new(writer.clone()));

        Ok(Self {
            lifecycle,
            registry: RwLock::new(SessionRegistry::new()),
            accounts: RwLock::new(accounts),
            cache,
            avatars: Arc::new(AvatarCache::new()),
            tracker,
            writer,
            events,
            cancel_flags: RwLock::new(HashMap::new()),
            engine_rx: Mutex::new(Some(engine_rx)),
        })
    }

    /// Fan-out channel for bridge connections and the CLI.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Starts the engine-event pump. Call once after construction.
    pub async fn start(self: &Arc<Self>) {
        let Some(mut rx) = self.engine_rx.lock().await.take() else {
            return;
        };
        let worker = self.clone();
        tokio::spawn(async move {
            while let Some((account_id, event)) = rx.recv().await {
                worker.handle_engine_event(account_id, event).await;
            }
        });
    }

    /// Destroys every live session; used on process shutdown.
    pub async fn shutdown(&self) {
        let sessions = self.registry.write().await.drain_all();
        for (account_id, session) in sessions {
            self.lifecycle.destroy(&account_id, session.engine).await;
        }
    }

    // accounts

    /// Lists accounts, creating the first-run default when none exist yet.
    pub async fn get_accounts(&self, owner: Option<&str>) -> Vec<Account> {
        {
            let accounts = self.accounts.read().await;
            if !accounts.is_empty() {
                return filter_by_owner(&accounts, owner);
            }
        }
        let account = self
            .create_account_record(DEFAULT_ACCOUNT_ID, "Account 1", None, true)
            .await;
        vec![account]
    }

    pub async fn add_account(&self, name: &str, owner: Option<String>) -> Result<Account> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WorkerError::Validation("account name is required".into()));
        }
        let id = uuid::Uuid::new_v4().to_string();
        let account = self
            .create_account_record(&id, name, owner, false)
            .await;
        self.broadcast_accounts().await;
        Ok(account)
    }

    pub async fn delete_account(&self, account_id: &AccountId) -> Result<()> {
        {
            let mut accounts = self.accounts.write().await;
            let before = accounts.len();
            accounts.retain(|a| &a.id != account_id);
            if accounts.len() == before {
                return Err(WorkerError::AccountNotFound(account_id.clone()));
            }
            self.persist_accounts(&accounts);
        }

        let session = self.registry.write().await.remove(account_id);
        if let Some(session) = session {
            self.lifecycle.destroy(account_id, session.engine).await;
        }
        if let Some(flag) = self.cancel_flags.write().await.remove(account_id) {
            flag.store(true, Ordering::SeqCst);
        }
        self.tracker.reset(account_id).await;
        self.cache.clear(account_id).await;
        if let Err(e) = self.lifecycle.purge_profile(account_id) {
            warn!(account_id = %account_id, error = %e, "Profile purge failed");
        }

        {
            let mut registry = self.registry.write().await;
            if registry.current() == Some(account_id) {
                registry.set_current(None);
                drop(registry);
                let _ = self.events.send(ServerEvent::CurrentAccount { id: None });
                let _ = self.events.send(ServerEvent::Status { is_ready: false });
            }
        }

        self.writer.enqueue(StoreWrite::DeleteAccount {
            account_id: account_id.clone(),
        });
        self.log_event(Some(account_id), "account_deleted", None);
        self.broadcast_accounts().await;
        info!(account_id = %account_id, "Account deleted");
        Ok(())
    }

    /// Selects an account, tearing every other live session down first:
    /// the engine runs one browser at a time, so exclusivity is enforced
    /// on every switch, not discovered by accident. Re-selecting the
    /// already-ready current account only re-emits state.
    pub async fn switch_account(self: &Arc<Self>, account_id: &AccountId) -> Result<()> {
        let exists = self
            .accounts
            .read()
            .await
            .iter()
            .any(|a| &a.id == account_id);
        if !exists {
            return Err(WorkerError::AccountNotFound(account_id.clone()));
        }

        {
            let registry = self.registry.read().await;
            if registry.current() == Some(account_id) && registry.is_ready(account_id) {
                drop(registry);
                let _ = self.events.send(ServerEvent::CurrentAccount {
                    id: Some(account_id.clone()),
                });
                let _ = self.events.send(ServerEvent::Status { is_ready: true });
                return Ok(());
            }
        }

        info!(account_id = %account_id, "Switching account");

        {
            let mut accounts = self.accounts.write().await;
            for account in accounts.iter_mut() {
                account.is_active = &account.id == account_id;
            }
            self.persist_accounts(&accounts);
        }
        self.writer.enqueue(StoreWrite::SetActive {
            account_id: account_id.clone(),
        });

        self.registry
            .write()
            .await
            .set_current(Some(account_id.clone()));
        let _ = self.events.send(ServerEvent::CurrentAccount {
            id: Some(account_id.clone()),
        });
        let _ = self.events.send(ServerEvent::Status { is_ready: false });

        self.ensure_exclusive(account_id).await;

        // Initialization runs in the background; readiness arrives through
        // the engine event stream once the browser authenticates.
        let worker = self.clone();
        let account = account_id.clone();
        tokio::spawn(async move {
            match worker.lifecycle.initialize(&account).await {
                Ok(client) => {
                    let mut registry = worker.registry.write().await;
                    if registry.current() == Some(&account) {
                        registry.insert(account.clone(), client);
                    } else {
                        // Selection moved on while the browser started.
                        drop(registry);
                        worker.lifecycle.destroy(&account, client).await;
                    }
                }
                Err(e) => {
                    error!(account_id = %account, error = %e, "Engine initialization failed");
                    let _ = worker.events.send(ServerEvent::Error {
                        message: format!("Could not start session: {e}"),
                        retryable: true,
                    });
                }
            }
        });

        self.broadcast_accounts().await;
        Ok(())
    }

    /// The single enforcement point for the one-live-browser constraint.
    async fn ensure_exclusive(&self, keep: &AccountId) {
        let others = self.registry.write().await.drain_except(keep);
        for (account_id, session) in others {
            info!(account_id = %account_id, "Tearing down session for exclusive switch");
            self.lifecycle.destroy(&account_id, session.engine).await;
            self.writer.enqueue(StoreWrite::SessionDisconnected {
                account_id,
                reason: "switched account".to_string(),
            });
        }
    }

    // chats and messages

    pub async fn get_chats(&self) -> Result<Vec<Conversation>> {
        let current = self.current_account().await.ok_or(WorkerError::NoActiveAccount)?;
        Ok(self.cache.get(&current).await)
    }

    pub async fn get_messages(&self, chat_id: &ChatId, limit: u32) -> Result<Vec<ChatMessage>> {
        if chat_id.is_empty() {
            return Err(WorkerError::Validation("chatId is required".into()));
        }
        let (_account_id, engine) = self.ready_engine().await?;
        let limit = limit.clamp(1, 500);
        let messages = engine.fetch_messages(chat_id, limit).await?;
        Ok(messages.into_iter().map(sync::chat_message).collect())
    }

    /// Validation failures never reach the engine.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<ChatMessage> {
        if chat_id.trim().is_empty() {
            return Err(WorkerError::Validation("chatId is required".into()));
        }
        if text.trim().is_empty() {
            return Err(WorkerError::Validation("message is empty".into()));
        }

        let (account_id, engine) = self.ready_engine().await?;
        let chat_id = ChatId::from(chat_id);
        let sent = engine.send_message(&chat_id, text).await?;
        let message = sync::chat_message(sent);
        self.cache.apply_message(&account_id, &message).await;
        Ok(message)
    }

    // sync

    /// Kicks off a streaming sync for the current account. A sync already
    /// in flight is reported, not queued.
    pub async fn start_sync(self: &Arc<Self>, opts: SyncOptions) -> Result<()> {
        let (account_id, engine) = self.ready_engine().await?;

        let Some(begin_status) = self.tracker.begin(&account_id).await else {
            let mut status = self.tracker.status(&account_id).await;
            status.message = "Sync already in progress".to_string();
            let _ = self.events.send(ServerEvent::sync_progress(&status));
            return Ok(());
        };
        let _ = self.events.send(ServerEvent::sync_progress(&begin_status));

        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel_flags
            .write()
            .await
            .insert(account_id.clone(), cancel.clone());

        let ctx = SyncContext {
            account_id: account_id.clone(),
            engine,
            cache: self.cache.clone(),
            avatars: self.avatars.clone(),
            tracker: self.tracker.clone(),
            events: self.events.clone(),
            cancel,
        };
        let worker = self.clone();
        tokio::spawn(async move {
            let outcome = sync::run_sync(ctx, opts).await;
            worker.cancel_flags.write().await.remove(&account_id);
            worker.log_event(
                Some(&account_id),
                "sync_finished",
                Some(&format!(
                    "total={} success={} errors={} unchanged={}",
                    outcome.total, outcome.success, outcome.errors, outcome.unchanged
                )),
            );
        });
        Ok(())
    }

    pub async fn quick_sync(self: &Arc<Self>) -> Result<()> {
        self.start_sync(SyncOptions {
            max_chats: Some(QUICK_SYNC_LIMIT),
            incremental: true,
        })
        .await
    }

    /// Cooperative: sets the flag; the pipeline observes it at the next
    /// batch or item boundary.
    pub async fn cancel_sync(&self) -> Result<()> {
        let current = self.current_account().await.ok_or(WorkerError::NoActiveAccount)?;
        if let Some(flag) = self.cancel_flags.read().await.get(&current) {
            flag.store(true, Ordering::SeqCst);
            info!(account_id = %current, "Sync cancellation requested");
        }
        Ok(())
    }

    pub async fn sync_status(&self) -> Result<SyncStatus> {
        let current = self.current_account().await.ok_or(WorkerError::NoActiveAccount)?;
        Ok(self.tracker.status(&current).await)
    }

    // search

    pub async fn search_messages(
        &self,
        query: &str,
        opts: SearchOptions,
        progress: &mpsc::Sender<ServerEvent>,
    ) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(WorkerError::Validation("search query is empty".into()));
        }
        let (account_id, engine) = self.ready_engine().await?;
        search::run_search(&account_id, engine, &self.cache, query, opts, progress).await
    }

    // session teardown

    /// Logs the current account out of WhatsApp and forgets its
    /// credentials; the account record itself stays.
    pub async fn logout(&self) -> Result<()> {
        let current = self.current_account().await.ok_or(WorkerError::NoActiveAccount)?;
        let session = self.registry.write().await.remove(&current);
        if let Some(session) = session {
            if let Err(e) = session.engine.logout().await {
                warn!(account_id = %current, error = %e, "Engine logout failed");
            }
            self.lifecycle.destroy(&current, session.engine).await;
        }
        if let Err(e) = self.lifecycle.purge_profile(&current) {
            warn!(account_id = %current, error = %e, "Profile purge failed");
        }
        self.writer.enqueue(StoreWrite::ClearSession {
            account_id: current.clone(),
        });
        self.log_event(Some(&current), "logout", None);
        let _ = self.events.send(ServerEvent::Status { is_ready: false });
        let _ = self.events.send(ServerEvent::Disconnected {
            reason: "logout".to_string(),
        });
        Ok(())
    }

    /// Global session reset: stop every live session and wipe all
    /// credential directories.
    pub async fn clear_sessions(&self) -> Result<()> {
        let sessions = self.registry.write().await.drain_all();
        for (account_id, session) in sessions {
            self.lifecycle.destroy(&account_id, session.engine).await;
            self.writer.enqueue(StoreWrite::ClearSession { account_id });
        }
        self.lifecycle.purge_all_profiles()?;
        self.log_event(None, "sessions_cleared", None);
        let _ = self.events.send(ServerEvent::Status { is_ready: false });
        Ok(())
    }

    /// Initial state replayed to a newly connected client.
    pub async fn snapshot(&self) -> Vec<ServerEvent> {
        let registry = self.registry.read().await;
        let current = registry.current().cloned();
        let is_ready = current
            .as_ref()
            .map(|id| registry.is_ready(id))
            .unwrap_or(false);
        drop(registry);
        vec![
            ServerEvent::CurrentAccount { id: current },
            ServerEvent::Status { is_ready },
        ]
    }

    // engine events

    pub(crate) async fn handle_engine_event(&self, account_id: AccountId, event: EngineEvent) {
        match event {
            EngineEvent::Qr { qr } => {
                debug!(account_id = %account_id, "QR code received");
                let _ = self.events.send(ServerEvent::Qr { payload: qr });
            }
            EngineEvent::Authenticated => {
                info!(account_id = %account_id, "Session authenticated");
                self.writer.enqueue(StoreWrite::SessionConnected {
                    account_id,
                    authenticated: true,
                });
            }
            EngineEvent::Ready { phone_number } => {
                info!(account_id = %account_id, phone = ?phone_number, "Session ready");
                self.registry.write().await.mark_ready(&account_id, true);
                self.writer.enqueue(StoreWrite::SessionReady {
                    account_id: account_id.clone(),
                    ready: true,
                });

                if let Some(phone) = phone_number {
                    self.record_phone(&account_id, phone).await;
                }

                if self.registry.read().await.current() == Some(&account_id) {
                    let _ = self.events.send(ServerEvent::Ready);
                    let _ = self.events.send(ServerEvent::Status { is_ready: true });
                }
                self.log_event(Some(&account_id), "session_ready", None);
                self.broadcast_accounts().await;
            }
            EngineEvent::CredentialsUpdated { credentials } => {
                debug!(account_id = %account_id, "Credential blob updated");
                self.writer.enqueue(StoreWrite::Credentials {
                    account_id,
                    credentials,
                });
            }
            EngineEvent::Disconnected { reason } => {
                warn!(account_id = %account_id, reason = %reason, "Session disconnected");
                self.registry.write().await.mark_ready(&account_id, false);
                self.writer.enqueue(StoreWrite::SessionDisconnected {
                    account_id: account_id.clone(),
                    reason: reason.clone(),
                });
                if self.registry.read().await.current() == Some(&account_id) {
                    let _ = self.events.send(ServerEvent::Status { is_ready: false });
                    let _ = self.events.send(ServerEvent::Disconnected { reason });
                }
            }
            EngineEvent::Message { message } => {
                let message = sync::chat_message(message);
                self.cache.apply_message(&account_id, &message).await;
                let _ = self.events.send(ServerEvent::NewMessage {
                    chat_id: message.chat_id.clone(),
                    message,
                });
            }
            EngineEvent::Error { error } => {
                // Browser teardown noise is routine and must never take the
                // process down; only unknown errors get surfaced.
                if is_teardown_noise(&error) {
                    debug!(account_id = %account_id, error = %error, "Engine teardown noise");
                } else {
                    error!(account_id = %account_id, error = %error, "Engine error");
                    let _ = self.events.send(ServerEvent::Error {
                        message: error,
                        retryable: true,
                    });
                }
            }
            // Correlated replies are consumed by the client layer.
            EngineEvent::CommandResult { .. } => {}
        }
    }

    // helpers

    async fn record_phone(&self, account_id: &AccountId, phone: String) {
        let mut accounts = self.accounts.write().await;
        let Some(account) = accounts.iter_mut().find(|a| &a.id == account_id) else {
            return;
        };
        if account.phone.as_deref() == Some(phone.as_str()) {
            return;
        }
        account.phone = Some(phone.clone());
        account.updated_at = chrono::Utc::now().timestamp();
        self.persist_accounts(&accounts);
        self.writer.enqueue(StoreWrite::SetPhone {
            account_id: account_id.clone(),
            phone,
        });
    }

    async fn create_account_record(
        &self,
        id: &str,
        name: &str,
        owner: Option<String>,
        active: bool,
    ) -> Account {
        let now = chrono::Utc::now().timestamp();
        let account = Account {
            id: AccountId::from(id),
            name: name.to_string(),
            phone: None,
            is_active: active,
            owner,
            created_at: now,
            updated_at: now,
        };

        {
            let mut accounts = self.accounts.write().await;
            if active {
                for existing in accounts.iter_mut() {
                    existing.is_active = false;
                }
            }
            accounts.push(account.clone());
            self.persist_accounts(&accounts);
        }

        self.writer.enqueue(StoreWrite::UpsertAccount {
            account: account.clone(),
        });
        if active {
            self.writer.enqueue(StoreWrite::SetActive {
                account_id: account.id.clone(),
            });
        }
        info!(account_id = %account.id, name = %account.name, "Account created");
        account
    }

    fn persist_accounts(&self, accounts: &[Account]) {
        self.writer.enqueue(StoreWrite::AccountsSnapshot {
            accounts: accounts.to_vec(),
        });
    }

    fn log_event(&self, account_id: Option<&AccountId>, event: &str, detail: Option<&str>) {
        self.writer.enqueue(StoreWrite::Event {
            account_id: account_id.cloned(),
            event: event.to_string(),
            detail: detail.map(str::to_string),
        });
    }

    async fn current_account(&self) -> Option<AccountId> {
        self.registry.read().await.current().cloned()
    }

    async fn ready_engine(&self) -> Result<(AccountId, Arc<dyn Engine>)> {
        let registry = self.registry.read().await;
        let current = registry
            .current()
            .cloned()
            .ok_or(WorkerError::NoActiveAccount)?;
        if !registry.is_ready(&current) {
            return Err(WorkerError::NotReady(current));
        }
        let engine = registry
            .engine(&current)
            .ok_or_else(|| WorkerError::NotReady(current.clone()))?;
        Ok((current, engine))
    }

    #[cfg(test)]
    pub(crate) async fn inject_session(
        &self,
        account_id: &AccountId,
        engine: Arc<dyn Engine>,
        ready: bool,
        current: bool,
    ) {
        let mut registry = self.registry.write().await;
        registry.insert(account_id.clone(), engine);
        registry.mark_ready(account_id, ready);
        if current {
            registry.set_current(Some(account_id.clone()));
        }
    }

    #[cfg(test)]
    pub(crate) async fn ready_accounts(&self) -> Vec<AccountId> {
        self.registry.read().await.ready_accounts()
    }
}

fn filter_by_owner(accounts: &[Account], owner: Option<&str>) -> Vec<Account> {
    match owner {
        Some(owner) => accounts
            .iter()
            .filter(|a| a.owner.is_none() || a.owner.as_deref() == Some(owner))
            .cloned()
            .collect(),
        None => accounts.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use tempfile::TempDir;
    use wren_core::ServerEvent;

    use crate::testutil::{ScriptedEngine, convo};

    use super::*;

    async fn worker() -> (TempDir, Arc<WrenWorker>) {
        let dir = TempDir::new().unwrap();
        let worker = WrenWorker::new(WorkerConfig {
            host_dir: dir.path().join("host"),
            data_dir: dir.path().join("data"),
        })
        .await
        .unwrap();
        (dir, Arc::new(worker))
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn first_run_creates_a_default_account() {
        let (_dir, worker) = worker().await;
        let accounts = worker.get_accounts(None).await;

        assert_eq!(accounts.len(), 1);
        let account = &accounts[0];
        assert_eq!(account.id.as_str(), DEFAULT_ACCOUNT_ID);
        assert!(account.is_active);
        assert_eq!(account.phone, None);

        // Second call returns the same record instead of minting another.
        assert_eq!(worker.get_accounts(None).await.len(), 1);
    }

    #[tokio::test]
    async fn empty_send_message_never_reaches_the_engine() {
        let (_dir, worker) = worker().await;
        let engine = ScriptedEngine::new(Vec::new());
        worker
            .inject_session(&AccountId::from("acc1"), engine.clone(), true, true)
            .await;

        let err = worker.send_message("123@c.us", "   ").await.unwrap_err();
        assert!(matches!(err, WorkerError::Validation(_)));
        assert!(!err.retryable());

        let err = worker.send_message("", "hello").await.unwrap_err();
        assert!(matches!(err, WorkerError::Validation(_)));

        assert_eq!(engine.send_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn switching_to_the_ready_current_account_is_a_no_op() {
        let (_dir, worker) = worker().await;
        worker.get_accounts(None).await;
        let account = AccountId::from(DEFAULT_ACCOUNT_ID);
        let engine = ScriptedEngine::new(Vec::new());
        worker
            .inject_session(&account, engine.clone(), true, true)
            .await;

        let mut rx = worker.subscribe();
        worker.switch_account(&account).await.unwrap();

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::Status { is_ready: true })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, ServerEvent::Status { is_ready: false })));
        // The live session was not torn down.
        assert_eq!(engine.shutdown_calls.load(Ordering::SeqCst), 0);
        assert_eq!(worker.ready_accounts().await.len(), 1);
    }

    #[tokio::test]
    async fn switching_accounts_tears_down_the_previous_session() {
        let (_dir, worker) = worker().await;
        worker.get_accounts(None).await;
        worker.add_account("Second", None).await.unwrap();
        let accounts = worker.get_accounts(None).await;
        let second = accounts
            .iter()
            .find(|a| a.name == "Second")
            .unwrap()
            .id
            .clone();

        let first = AccountId::from(DEFAULT_ACCOUNT_ID);
        let engine = ScriptedEngine::new(Vec::new());
        worker
            .inject_session(&first, engine.clone(), true, true)
            .await;

        let mut rx = worker.subscribe();
        worker.switch_account(&second).await.unwrap();

        // The old handle is gone and was shut down; at most one account
        // can ever be ready under the single-browser constraint.
        assert_eq!(engine.shutdown_calls.load(Ordering::SeqCst), 1);
        assert!(worker.ready_accounts().await.is_empty());

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::Status { is_ready: false })));
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::CurrentAccount { id: Some(id) } if id == &second
        )));
    }

    #[tokio::test]
    async fn sync_streams_and_persists_through_the_cache() {
        let (_dir, worker) = worker().await;
        worker.get_accounts(None).await;
        let account = AccountId::from(DEFAULT_ACCOUNT_ID);
        let engine =
            ScriptedEngine::new((0..30).map(|i| convo(&format!("{i}@c.us"), i)).collect());
        worker
            .inject_session(&account, engine, true, true)
            .await;

        let mut rx = worker.subscribe();
        worker
            .start_sync(SyncOptions {
                max_chats: Some(10),
                incremental: false,
            })
            .await
            .unwrap();

        // Wait for the background run to finish.
        let mut complete = None;
        for _ in 0..200 {
            for event in drain(&mut rx) {
                if let ServerEvent::SyncComplete { total, .. } = event {
                    complete = Some(total);
                }
            }
            if complete.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(complete, Some(10));
        assert_eq!(worker.get_chats().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn sync_requires_a_ready_session() {
        let (_dir, worker) = worker().await;
        worker.get_accounts(None).await;
        let account = AccountId::from(DEFAULT_ACCOUNT_ID);
        let engine = ScriptedEngine::new(Vec::new());
        worker
            .inject_session(&account, engine, false, true)
            .await;

        let err = worker.start_sync(SyncOptions::default()).await.unwrap_err();
        assert!(matches!(err, WorkerError::NotReady(_)));
    }

    #[tokio::test]
    async fn ready_event_marks_session_and_discovers_phone() {
        let (_dir, worker) = worker().await;
        worker.get_accounts(None).await;
        let account = AccountId::from(DEFAULT_ACCOUNT_ID);
        let engine = ScriptedEngine::new(Vec::new());
        worker
            .inject_session(&account, engine, false, true)
            .await;

        let mut rx = worker.subscribe();
        worker
            .handle_engine_event(
                account.clone(),
                EngineEvent::Ready {
                    phone_number: Some("5511999999999".to_string()),
                },
            )
            .await;

        assert_eq!(worker.ready_accounts().await, vec![account]);
        let accounts = worker.get_accounts(None).await;
        assert_eq!(accounts[0].phone.as_deref(), Some("5511999999999"));
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, ServerEvent::Status { is_ready: true })));
    }

    #[tokio::test]
    async fn inbound_message_updates_the_cache_write_through() {
        let (_dir, worker) = worker().await;
        worker.get_accounts(None).await;
        let account = AccountId::from(DEFAULT_ACCOUNT_ID);
        let engine = ScriptedEngine::new(Vec::new());
        worker
            .inject_session(&account, engine, true, true)
            .await;

        let mut rx = worker.subscribe();
        worker
            .handle_engine_event(
                account.clone(),
                EngineEvent::Message {
                    message: crate::testutil::msg("77@c.us", "m1", "hello there", 42),
                },
            )
            .await;

        let chats = worker.get_chats().await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].unread_count, 1);
        assert_eq!(chats[0].last_message.as_ref().unwrap().body, "hello there");
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, ServerEvent::NewMessage { .. })));
    }
}
