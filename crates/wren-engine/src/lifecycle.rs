use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{info, warn};

use wren_core::{AccountId, EngineEvent};

use crate::classify::{RetryDecision, RetryFsm, RetryPolicy, classify};
use crate::cleanup::cleanup_orphans;
use crate::client::{Engine, EngineClient};
use crate::error::{EngineError, Result};

/// Retries for "another process holds this profile": clean up, short
/// fixed wait, try again.
const CONTENTION_POLICY: RetryPolicy = RetryPolicy::fixed(2, Duration::from_secs(2));
/// Retries for navigation/protocol hiccups: 3s x attempt.
const TRANSIENT_POLICY: RetryPolicy = RetryPolicy::linear(2, Duration::from_secs(3));

/// Owns the OS-level side of engine sessions: spawning the host bound to a
/// per-account profile directory, classified-retry initialization, graceful
/// or forced teardown, and credential purges.
///
/// The deployment can run one live browser at a time; which account holds
/// it is tracked by the session registry, and every switch tears other
/// sessions down before an initialize reaches this manager.
pub struct LifecycleManager {
    host_dir: PathBuf,
    profiles_dir: PathBuf,
    event_tx: mpsc::Sender<(AccountId, EngineEvent)>,
}

impl LifecycleManager {
    /// Returns the manager plus the single inbound queue every session's
    /// lifecycle events are funneled into.
    pub fn new(
        host_dir: PathBuf,
        profiles_dir: PathBuf,
    ) -> (Self, mpsc::Receiver<(AccountId, EngineEvent)>) {
        let (event_tx, event_rx) = mpsc::channel(1000);
        (
            Self {
                host_dir,
                profiles_dir,
                event_tx,
            },
            event_rx,
        )
    }

    pub fn profile_dir(&self, account_id: &AccountId) -> PathBuf {
        self.profiles_dir.join(account_id.as_str())
    }

    pub async fn ensure_dependencies(&self) -> Result<()> {
        let package_json = self.host_dir.join("package.json");
        let node_modules = self.host_dir.join("node_modules");

        if !package_json.exists() {
            return Err(EngineError::InstallFailed(
                "package.json not found".to_string(),
            ));
        }

        if !node_modules.exists() {
            info!("Installing automation host dependencies with bun");
            self.run_bun_install().await?;
        }

        Ok(())
    }

    async fn run_bun_install(&self) -> Result<()> {
        let output = Command::new("bun")
            .arg("install")
            .current_dir(&self.host_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| EngineError::InstallFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::InstallFailed(stderr.to_string()));
        }

        info!("bun install completed successfully");
        Ok(())
    }

    /// Spawn and connect one account's session.
    ///
    /// Failures are classified: profile contention triggers orphan cleanup
    /// and a short retry, transient navigation errors back off linearly,
    /// anything else gives up. Never fatal to the caller's process; the
    /// account simply stays un-ready.
    pub async fn initialize(&self, account_id: &AccountId) -> Result<Arc<EngineClient>> {
        self.ensure_dependencies().await?;

        let profile_dir = self.profile_dir(account_id);
        std::fs::create_dir_all(&profile_dir)?;

        let mut fsm = RetryFsm::new(CONTENTION_POLICY, TRANSIENT_POLICY);
        loop {
            let attempt = fsm.begin();
            info!(account_id = %account_id, attempt, "Initializing engine session");

            match self.try_start(account_id, &profile_dir).await {
                Ok(client) => {
                    fsm.succeed();
                    info!(account_id = %account_id, attempt, "Engine session started");
                    return Ok(client);
                }
                Err(e) => {
                    let kind = classify(&e.to_string());
                    warn!(
                        account_id = %account_id,
                        attempt,
                        kind = ?kind,
                        error = %e,
                        "Engine initialization failed"
                    );
                    match fsm.fail(kind) {
                        RetryDecision::Retry { delay, cleanup } => {
                            if cleanup {
                                match cleanup_orphans(&profile_dir) {
                                    Ok(report) => info!(
                                        account_id = %account_id,
                                        killed = report.killed,
                                        locks = report.removed_locks,
                                        "Cleaned up orphaned session"
                                    ),
                                    Err(e) => warn!(
                                        account_id = %account_id,
                                        error = %e,
                                        "Orphan cleanup failed"
                                    ),
                                }
                            }
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::GiveUp => {
                            return Err(EngineError::InitFailed {
                                attempts: attempt,
                                last_error: e.to_string(),
                            });
                        }
                    }
                }
            }
        }
    }

    async fn try_start(
        &self,
        account_id: &AccountId,
        profile_dir: &std::path::Path,
    ) -> Result<Arc<EngineClient>> {
        let client = EngineClient::spawn(
            &self.host_dir,
            profile_dir,
            account_id.clone(),
            self.event_tx.clone(),
        )
        .await?;

        if let Err(e) = client.connect().await {
            let _ = client.shutdown().await;
            return Err(e);
        }

        Ok(client)
    }

    /// Gracefully close a session; fall back to force-killing the recorded
    /// process tree and unlocking the profile when the engine hangs.
    pub async fn destroy(&self, account_id: &AccountId, client: Arc<dyn Engine>) {
        info!(account_id = %account_id, "Destroying engine session");
        if let Err(e) = client.shutdown().await {
            warn!(account_id = %account_id, error = %e, "Graceful shutdown failed, force-killing");
            let profile_dir = self.profile_dir(account_id);
            match cleanup_orphans(&profile_dir) {
                Ok(report) => info!(
                    account_id = %account_id,
                    killed = report.killed,
                    locks = report.removed_locks,
                    "Forced session cleanup"
                ),
                Err(e) => warn!(account_id = %account_id, error = %e, "Forced cleanup failed"),
            }
        }
    }

    /// Remove an account's credential directory (logout / session reset).
    pub fn purge_profile(&self, account_id: &AccountId) -> std::io::Result<()> {
        let dir = self.profile_dir(account_id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Remove every credential directory under the profiles root.
    pub fn purge_all_profiles(&self) -> std::io::Result<()> {
        if self.profiles_dir.exists() {
            for entry in std::fs::read_dir(&self.profiles_dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    std::fs::remove_dir_all(&path)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn profile_dirs_are_per_account() {
        let root = TempDir::new().unwrap();
        let (manager, _rx) = LifecycleManager::new(
            root.path().join("host"),
            root.path().join("profiles"),
        );
        let a = manager.profile_dir(&AccountId::from("acc1"));
        let b = manager.profile_dir(&AccountId::from("acc2"));
        assert_ne!(a, b);
        assert!(a.ends_with("acc1"));
    }

    #[tokio::test]
    async fn missing_host_fails_dependency_check() {
        let root = TempDir::new().unwrap();
        let (manager, _rx) = LifecycleManager::new(
            root.path().join("host"),
            root.path().join("profiles"),
        );
        let err = manager.ensure_dependencies().await.unwrap_err();
        assert!(matches!(err, EngineError::InstallFailed(_)));
    }

    #[test]
    fn purge_profile_removes_credentials() {
        let root = TempDir::new().unwrap();
        let (manager, _rx) =
            LifecycleManager::new(root.path().join("host"), root.path().join("profiles"));
        let account = AccountId::from("acc1");
        let dir = manager.profile_dir(&account);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("creds.json"), "{}").unwrap();

        manager.purge_profile(&account).unwrap();
        assert!(!dir.exists());
    }
}
