use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::store::{BlobStore, StoreError, COMPLETED_UNITS_KEY};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RecordState {
    completed: BTreeSet<u32>,
    /// Completed units whose sync action has not been queued yet.
    #[serde(default)]
    unqueued: BTreeSet<u32>,
}

/// Local fact of which units are complete. Monotonically growing and persisted
/// independently of the action queue, which only records the intent to sync.
pub struct CompletionRecord {
    store: Arc<dyn BlobStore>,
    state: Mutex<RecordState>,
}

impl CompletionRecord {
    pub async fn load(store: Arc<dyn BlobStore>) -> Result<Self, StoreError> {
        let state = match store.read_blob(COMPLETED_UNITS_KEY).await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Discarding malformed completed-units blob: {e}");
                RecordState::default()
            }),
            Ok(None) => RecordState::default(),
            Err(StoreError::Serialize(e)) => {
                warn!("Discarding corrupt completed-units blob: {e}");
                RecordState::default()
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            store,
            state: Mutex::new(state),
        })
    }

    /// Records `unit_id` as complete and awaiting enqueue, in one write.
    /// Returns `false` when it already was complete, in which case nothing
    /// is written.
    pub async fn mark(&self, unit_id: u32) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        if state.completed.contains(&unit_id) {
            return Ok(false);
        }

        state.completed.insert(unit_id);
        state.unqueued.insert(unit_id);
        if let Err(e) = self.persist(&state).await {
            state.completed.remove(&unit_id);
            state.unqueued.remove(&unit_id);
            return Err(e);
        }
        Ok(true)
    }

    /// Clears the awaiting-enqueue flag once the sync action is durably queued.
    /// The in-memory flag is dropped even if the write fails; the worst case
    /// after a restart is one redundant check against the queue.
    pub async fn confirm_queued(&self, unit_id: u32) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.unqueued.remove(&unit_id) {
            return Ok(());
        }
        self.persist(&state).await
    }

    pub async fn awaits_enqueue(&self, unit_id: u32) -> bool {
        self.state.lock().await.unqueued.contains(&unit_id)
    }

    /// Units marked complete whose sync action was never confirmed queued.
    pub async fn awaiting_enqueue(&self) -> Vec<u32> {
        self.state.lock().await.unqueued.iter().copied().collect()
    }

    pub async fn contains(&self, unit_id: u32) -> bool {
        self.state.lock().await.completed.contains(&unit_id)
    }

    /// Completed unit ids in ascending order.
    pub async fn completed(&self) -> Vec<u32> {
        self.state.lock().await.completed.iter().copied().collect()
    }

    async fn persist(&self, state: &RecordState) -> Result<(), StoreError> {
        let value = serde_json::to_value(state)?;
        self.store.write_blob(COMPLETED_UNITS_KEY, &value).await
    }
}
