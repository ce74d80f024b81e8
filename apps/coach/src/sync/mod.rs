//! Sync Reconciler: replays the action queue against the remote service.
//!
//! Flushes are opportunistic: the reconciler subscribes to connectivity events
//! and tries a flush whenever some unrelated remote call succeeds. A flush is
//! all-or-nothing: actions are replayed strictly in order, the first failure
//! stops the pass, and the queue is only trimmed after every action in the
//! pass was acknowledged. Failures are silent; the queue simply waits for the
//! next opportunity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::queue::{ActionPayload, ActionQueue, QueuedAction};
use crate::remote::{RemoteError, RemoteService};
use crate::resilience::{call_with_resilience, ConnectivityEvent, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FlushOutcome {
    /// Nothing was pending.
    Idle,
    /// Another flush was in progress; this trigger was dropped.
    AlreadyRunning,
    /// Every pending action was acknowledged and removed.
    Drained { replayed: usize },
    /// The pass stopped at action `attempted` of `pending`; nothing was removed.
    Stalled {
        attempted: usize,
        pending: usize,
        error: String,
    },
}

pub struct SyncReconciler {
    queue: Arc<ActionQueue>,
    remote: Arc<dyn RemoteService>,
    policy: RetryPolicy,
    in_flight: AtomicBool,
    outcomes: broadcast::Sender<FlushOutcome>,
}

/// Clears the in-flight flag however the flush ends, including cancellation.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncReconciler {
    pub fn new(queue: Arc<ActionQueue>, remote: Arc<dyn RemoteService>, policy: RetryPolicy) -> Self {
        let (outcomes, _) = broadcast::channel(32);
        Self {
            queue,
            remote,
            policy,
            in_flight: AtomicBool::new(false),
            outcomes,
        }
    }

    /// Every flush outcome, including suppressed duplicate triggers.
    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<FlushOutcome> {
        self.outcomes.subscribe()
    }

    pub fn is_flushing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn flush(&self) -> FlushOutcome {
        let outcome = if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Flush already in progress, skipping trigger");
            FlushOutcome::AlreadyRunning
        } else {
            let _guard = InFlightGuard(&self.in_flight);
            self.drain().await
        };

        let _ = self.outcomes.send(outcome.clone());
        outcome
    }

    async fn drain(&self) -> FlushOutcome {
        let batch = self.queue.snapshot().await;
        let Some(last) = batch.last() else {
            return FlushOutcome::Idle;
        };
        let through_seq = last.seq;
        let pending = batch.len();

        for (index, action) in batch.iter().enumerate() {
            let label = format!("sync {} #{}", action.action.kind(), action.seq);
            let result =
                call_with_resilience(&label, &self.policy, || self.replay(action)).await;

            if let Err(e) = result {
                info!(
                    "Sync stalled at action {}/{}; {} action(s) remain queued",
                    index + 1,
                    pending,
                    pending
                );
                return FlushOutcome::Stalled {
                    attempted: index + 1,
                    pending,
                    error: e.to_string(),
                };
            }
        }

        match self.queue.commit_through(through_seq).await {
            Ok(replayed) => {
                info!("Sync drained {} action(s)", replayed);
                FlushOutcome::Drained { replayed }
            }
            Err(e) => {
                // Everything was acknowledged but the trim was not persisted; the
                // next flush replays the batch, which idempotent actions allow.
                error!("Failed to persist drained queue: {e}");
                FlushOutcome::Stalled {
                    attempted: pending,
                    pending,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn replay(&self, action: &QueuedAction) -> Result<(), RemoteError> {
        match &action.action {
            ActionPayload::CompleteUnitOfWork { unit_id } => {
                self.remote.submit_unit_complete(*unit_id).await
            }
        }
    }

    /// Runs a flush in the background.
    pub fn trigger(self: &Arc<Self>) -> JoinHandle<FlushOutcome> {
        let reconciler = Arc::clone(self);
        tokio::spawn(async move { reconciler.flush().await })
    }

    /// Flushes after every `Healthy` connectivity event until the bus closes.
    pub fn spawn_listener(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<ConnectivityEvent>,
    ) -> JoinHandle<()> {
        let reconciler = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ConnectivityEvent::Healthy { label }) => {
                        debug!("Connectivity healthy after '{label}', attempting sync");
                        reconciler.flush().await;
                    }
                    Ok(ConnectivityEvent::Degraded { .. }) => {}
                    Err(RecvError::Lagged(missed)) => {
                        debug!("Sync listener lagged by {missed} event(s)");
                        reconciler.flush().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Sync listener stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::remote::testing::{Behavior, StubRemote};
    use crate::resilience::ConnectivityBus;
    use crate::store::MemoryBlobStore;

    async fn setup(behavior: Behavior) -> (Arc<SyncReconciler>, Arc<ActionQueue>, Arc<StubRemote>) {
        let queue = Arc::new(
            ActionQueue::load(Arc::new(MemoryBlobStore::new()))
                .await
                .unwrap(),
        );
        let remote = Arc::new(StubRemote::new(behavior));
        let reconciler = Arc::new(SyncReconciler::new(
            queue.clone(),
            remote.clone(),
            RetryPolicy::sync_replay(),
        ));
        (reconciler, queue, remote)
    }

    async fn enqueue_units(queue: &ActionQueue, units: &[u32]) {
        for &unit_id in units {
            queue
                .enqueue(ActionPayload::CompleteUnitOfWork { unit_id })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_empty_queue_is_idle() {
        let (reconciler, _, remote) = setup(Behavior::Up).await;
        assert_eq!(reconciler.flush().await, FlushOutcome::Idle);
        assert_eq!(remote.submit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_midway_keeps_whole_queue() {
        let (reconciler, queue, remote) = setup(Behavior::Up).await;
        enqueue_units(&queue, &[1, 2, 3]).await;
        remote.fail_units(&[2]);

        let outcome = reconciler.flush().await;
        assert!(matches!(
            outcome,
            FlushOutcome::Stalled {
                attempted: 2,
                pending: 3,
                ..
            }
        ));
        assert_eq!(queue.len().await, 3);
        assert_eq!(remote.submit_calls.load(Ordering::SeqCst), 2);

        remote.fail_units(&[]);
        assert_eq!(
            reconciler.flush().await,
            FlushOutcome::Drained { replayed: 3 }
        );
        assert!(queue.is_empty().await);
        assert_eq!(remote.confirmed(), vec![1, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_replay_is_fifo() {
        let (reconciler, queue, remote) = setup(Behavior::Up).await;
        enqueue_units(&queue, &[9, 4, 7]).await;

        reconciler.flush().await;
        assert_eq!(remote.confirmed(), vec![9, 4, 7]);
    }

    #[tokio::test]
    async fn test_remote_down_is_silent_and_keeps_queue() {
        let (reconciler, queue, remote) = setup(Behavior::Down).await;
        enqueue_units(&queue, &[1]).await;

        assert!(matches!(
            reconciler.flush().await,
            FlushOutcome::Stalled { attempted: 1, .. }
        ));
        assert_eq!(queue.len().await, 1);
        assert!(remote.confirmed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_trigger_is_suppressed() {
        let (reconciler, queue, remote) = setup(Behavior::Hang).await;
        enqueue_units(&queue, &[1]).await;

        let first = reconciler.trigger();
        tokio::task::yield_now().await;
        assert!(reconciler.is_flushing());
        assert_eq!(reconciler.flush().await, FlushOutcome::AlreadyRunning);

        let outcome = first.await.unwrap();
        assert!(matches!(outcome, FlushOutcome::Stalled { .. }));
        assert!(!reconciler.is_flushing());
        assert_eq!(remote.submit_calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_listener_flushes_on_healthy_event() {
        let (reconciler, queue, remote) = setup(Behavior::Up).await;
        enqueue_units(&queue, &[3]).await;

        let bus = ConnectivityBus::default();
        let mut outcomes = reconciler.subscribe_outcomes();
        let listener = reconciler.spawn_listener(bus.subscribe());

        bus.publish(ConnectivityEvent::Degraded {
            label: "quiz".to_string(),
        });
        bus.publish(ConnectivityEvent::Healthy {
            label: "quiz".to_string(),
        });

        let outcome = tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
            .await
            .expect("flush outcome")
            .unwrap();
        assert_eq!(outcome, FlushOutcome::Drained { replayed: 1 });
        assert!(queue.is_empty().await);
        assert_eq!(remote.confirmed(), vec![3]);

        drop(bus);
        listener.await.unwrap();
    }
}
