//! Action Queue: the durable, ordered list of mutations awaiting remote
//! confirmation.
//!
//! `enqueue` persists before returning and surfaces storage failures: losing a
//! queued action means losing user intent. Removal only ever happens as a
//! whole-prefix commit after a fully successful replay (see `sync`).

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::{BlobStore, StoreError, ACTION_QUEUE_KEY};

pub mod progress;

pub use progress::CompletionRecord;

/// Mutation carried by a queued action, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ActionPayload {
    CompleteUnitOfWork { unit_id: u32 },
}

impl ActionPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            ActionPayload::CompleteUnitOfWork { .. } => "complete-unit-of-work",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
    pub id: Uuid,
    /// Strictly increasing, also across restarts.
    pub seq: u64,
    #[serde(flatten)]
    pub action: ActionPayload,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueState {
    next_seq: u64,
    actions: VecDeque<QueuedAction>,
}

pub struct ActionQueue {
    store: Arc<dyn BlobStore>,
    state: Mutex<QueueState>,
}

impl ActionQueue {
    /// Loads the persisted queue. A malformed blob is logged and replaced by an
    /// empty queue so it cannot take the completion record or cache down with it.
    pub async fn load(store: Arc<dyn BlobStore>) -> Result<Self, StoreError> {
        let state = match store.read_blob(ACTION_QUEUE_KEY).await {
            Ok(Some(value)) => serde_json::from_value::<QueueState>(value).unwrap_or_else(|e| {
                warn!("Discarding malformed action queue blob: {e}");
                QueueState::default()
            }),
            Ok(None) => QueueState::default(),
            Err(StoreError::Serialize(e)) => {
                warn!("Discarding corrupt action queue blob: {e}");
                QueueState::default()
            }
            Err(e) => return Err(e),
        };

        let mut state = state;
        // Guard against a blob whose counter lags its contents.
        if let Some(max_seq) = state.actions.iter().map(|a| a.seq).max() {
            state.next_seq = state.next_seq.max(max_seq + 1);
        }

        if !state.actions.is_empty() {
            info!("Restored {} pending action(s)", state.actions.len());
        }

        Ok(Self {
            store,
            state: Mutex::new(state),
        })
    }

    /// Appends and persists. On a storage failure the in-memory queue is rolled
    /// back so memory never claims more than disk holds.
    pub async fn enqueue(&self, action: ActionPayload) -> Result<QueuedAction, StoreError> {
        let mut state = self.state.lock().await;

        let queued = QueuedAction {
            id: Uuid::new_v4(),
            seq: state.next_seq,
            action,
            enqueued_at: Utc::now(),
        };
        state.actions.push_back(queued.clone());
        state.next_seq += 1;

        if let Err(e) = persist(self.store.as_ref(), &state).await {
            state.actions.pop_back();
            state.next_seq -= 1;
            return Err(e);
        }

        debug!(
            "Enqueued {} (seq {}, {} pending)",
            queued.action.kind(),
            queued.seq,
            state.actions.len()
        );
        Ok(queued)
    }

    /// Ordered copy of everything pending.
    pub async fn snapshot(&self) -> Vec<QueuedAction> {
        self.state.lock().await.actions.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.actions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.actions.is_empty()
    }

    /// Removes the replayed prefix, i.e. every action with `seq <= through_seq`.
    /// Actions enqueued while the replay was running stay queued.
    pub async fn commit_through(&self, through_seq: u64) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;

        let keep: VecDeque<QueuedAction> = state
            .actions
            .iter()
            .filter(|a| a.seq > through_seq)
            .cloned()
            .collect();
        let removed = state.actions.len() - keep.len();
        if removed == 0 {
            return Ok(0);
        }

        let previous = std::mem::replace(&mut state.actions, keep);
        if let Err(e) = persist(self.store.as_ref(), &state).await {
            state.actions = previous;
            return Err(e);
        }
        Ok(removed)
    }

    /// Drops every pending action.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let previous = std::mem::take(&mut state.actions);
        if let Err(e) = persist(self.store.as_ref(), &state).await {
            state.actions = previous;
            return Err(e);
        }
        Ok(())
    }
}

async fn persist(store: &dyn BlobStore, state: &QueueState) -> Result<(), StoreError> {
    let value = serde_json::to_value(state)?;
    store.write_blob(ACTION_QUEUE_KEY, &value).await
}
