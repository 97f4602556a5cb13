use serde::{Deserialize, Serialize};

/// Lifecycle of one sync run. Transitions are strict:
/// idle -> syncing -> {completed | failed} -> idle (reset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Idle,
    Syncing,
    Completed,
    Failed,
}

/// Per-account sync status, mirrored to subscribers on every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncState,
    pub progress: u8,
    pub total: usize,
    pub synced: usize,
    pub current: Option<String>,
    pub message: String,
    pub error: Option<String>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl SyncStatus {
    pub fn idle() -> Self {
        Self {
            state: SyncState::Idle,
            progress: 0,
            total: 0,
            synced: 0,
            current: None,
            message: String::new(),
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.state == SyncState::Syncing
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self::idle()
    }
}

/// Progress after `done` of `total` conversations are through the pipeline.
///
/// Batches map onto the 5..=98 band; 1 is the just-started floor and 100 is
/// reserved for the completed status, so emitted progress stays monotonic.
pub fn batch_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = 5.0 + (done.min(total) as f64 / total as f64) * 93.0;
    (pct.round() as u8).min(98)
}
