//! The coaching client context: one instance per process, constructed at
//! startup and shared by reference with every consumer.
//!
//! Read paths (`request_quiz`, `request_plan`) always return usable content:
//! remote through the orchestrator, then the validated cache, then the fuzzy
//! resolver. The write path (`mark_unit_complete`) records the local fact,
//! enqueues the intent to sync, and forwards it best-effort in the background.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ResilienceTuning;
use crate::content::cache::{serve_questions, CacheLookup, ContentCache};
use crate::content::models::{
    normalize_topic, CachedContent, ContentSource, QuizQuestion, StudyPlan,
};
use crate::content::resolver::FuzzyResolver;
use crate::content::validation::MismatchPolicy;
use crate::queue::{ActionPayload, ActionQueue, CompletionRecord, QueuedAction};
use crate::remote::{RemoteError, RemoteService};
use crate::resilience::Orchestrator;
use crate::store::{BlobStore, StoreError};
use crate::sync::{FlushOutcome, SyncReconciler};

pub mod handlers;


pub const MAX_QUIZ_QUESTIONS: usize = 50;
pub const DEFAULT_QUIZ_QUESTIONS: usize = 10;
pub const DEGRADED_NOTICE: &str = "Operating in offline/degraded mode";

#[derive(Debug, Error)]
pub enum CoachError {
    #[error("Local storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Built-in topic catalog is invalid: {0}")]
    Catalog(#[from] serde_json::Error),
}

/// Content handed to the UI together with its provenance.
#[derive(Debug, Clone, Serialize)]
pub struct Served<T> {
    pub topic: String,
    pub content: T,
    pub source: ContentSource,
    pub from_cache: bool,
    /// Remote retries were exhausted for this request.
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

pub type QuizResponse = Served<Vec<QuizQuestion>>;
pub type PlanResponse = Served<StudyPlan>;

impl<T> Served<T> {
    fn new(topic: String, content: T, source: ContentSource) -> Self {
        Self {
            topic,
            content,
            source,
            from_cache: false,
            degraded: false,
            notice: None,
        }
    }

    fn cached(mut self) -> Self {
        self.from_cache = true;
        self
    }

    fn degraded_if(mut self, degraded: bool) -> Self {
        self.degraded = degraded;
        self.notice = degraded.then(|| DEGRADED_NOTICE.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionReceipt {
    pub unit_id: u32,
    /// False when the unit was already complete and nothing changed.
    pub newly_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queued_seq: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub pending: Vec<QueuedAction>,
    pub flushing: bool,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

pub struct Coach {
    remote: Arc<dyn RemoteService>,
    orchestrator: Orchestrator,
    cache: ContentCache,
    resolver: FuzzyResolver,
    progress: CompletionRecord,
    queue: Arc<ActionQueue>,
    reconciler: Arc<SyncReconciler>,
    tuning: ResilienceTuning,
    /// Serializes mark-then-enqueue so a unit is never queued twice.
    marking: Mutex<()>,
    listener: JoinHandle<()>,
}

impl Coach {
    /// Loads the three persisted blobs and subscribes the reconciler to
    /// connectivity events. Must run inside a tokio runtime.
    pub async fn start(
        store: Arc<dyn BlobStore>,
        remote: Arc<dyn RemoteService>,
        tuning: ResilienceTuning,
        mismatch_policy: MismatchPolicy,
    ) -> Result<Self, CoachError> {
        let resolver = FuzzyResolver::builtin()?;
        let detector = mismatch_policy.build(resolver.keyword_aliases());

        let cache = ContentCache::load(store.clone(), detector).await?;
        let progress = CompletionRecord::load(store.clone()).await?;
        let queue = Arc::new(ActionQueue::load(store).await?);

        let orchestrator = Orchestrator::default();
        let reconciler = Arc::new(SyncReconciler::new(
            queue.clone(),
            remote.clone(),
            tuning.sync,
        ));
        requeue_unconfirmed(&progress, &queue).await;
        let listener = reconciler.spawn_listener(orchestrator.bus().subscribe());

        info!(
            "Coach ready: {} cached entries, {} completed units, {} pending actions",
            cache.len().await,
            progress.completed().await.len(),
            queue.len().await
        );

        Ok(Self {
            remote,
            orchestrator,
            cache,
            resolver,
            progress,
            queue,
            reconciler,
            tuning,
            marking: Mutex::new(()),
            listener,
        })
    }

    /// Returns `count` quiz questions for `topic` (clamped to `1..=50`).
    pub async fn request_quiz(&self, topic: &str, count: usize) -> QuizResponse {
        let topic_key = normalize_topic(topic);
        let count = count.clamp(1, MAX_QUIZ_QUESTIONS);

        let fetched = self
            .orchestrator
            .call("quiz fetch", &self.tuning.quiz, || {
                self.fetch_quiz(&topic_key, count)
            })
            .await;

        let degraded = match fetched {
            Ok(questions) => {
                let served = serve_questions(&questions, count);
                let content = CachedContent::Quiz { questions };
                if self.cache.looks_mismatched(&content, &topic_key) {
                    warn!("Remote quiz for '{topic_key}' looks like another topic, not caching");
                    false
                } else {
                    if let Err(e) = self.cache.save(&topic_key, content).await {
                        error!("Failed to cache quiz for '{topic_key}': {e}");
                    }
                    return Served::new(topic_key, served, ContentSource::RemoteGenerated);
                }
            }
            Err(e) => {
                debug!("Falling back for quiz '{topic_key}': {e}");
                true
            }
        };

        let lookup = self.cache.get_quiz(&topic_key, count).await;
        let response = match lookup {
            CacheLookup::Hit(questions, source) => {
                Served::new(topic_key, questions, source).cached()
            }
            CacheLookup::Miss(reason) => {
                debug!("Quiz cache miss for '{topic_key}': {reason:?}");
                let resolution = self.resolver.resolve(topic);
                let source = resolution.source();
                let questions = serve_questions(&resolution.bundle.questions, count);
                Served::new(resolution.bundle.topic, questions, source)
            }
        };
        response.degraded_if(degraded)
    }

    pub async fn request_plan(&self, topic: &str) -> PlanResponse {
        let topic_key = normalize_topic(topic);

        let fetched = self
            .orchestrator
            .call("plan fetch", &self.tuning.plan, || self.fetch_plan(&topic_key))
            .await;

        let degraded = match fetched {
            Ok(plan) => {
                let content = CachedContent::Plan(plan.clone());
                if self.cache.looks_mismatched(&content, &topic_key) {
                    warn!("Remote plan for '{topic_key}' looks like another topic, not caching");
                    false
                } else {
                    if let Err(e) = self.cache.save(&topic_key, content).await {
                        error!("Failed to cache plan for '{topic_key}': {e}");
                    }
                    return Served::new(topic_key, plan, ContentSource::RemoteGenerated);
                }
            }
            Err(e) => {
                debug!("Falling back for plan '{topic_key}': {e}");
                true
            }
        };

        let lookup = self.cache.get_plan(&topic_key).await;
        let response = match lookup {
            CacheLookup::Hit(plan, source) => Served::new(topic_key, plan, source).cached(),
            CacheLookup::Miss(reason) => {
                debug!("Plan cache miss for '{topic_key}': {reason:?}");
                let resolution = self.resolver.resolve(topic);
                let source = resolution.source();
                Served::new(resolution.bundle.topic, resolution.bundle.plan, source)
            }
        };
        response.degraded_if(degraded)
    }

    /// Records the unit locally, then queues it for sync. The local write
    /// happens first and flags the unit as awaiting enqueue, so a failed
    /// enqueue is retried by the next mark or the next startup; only a
    /// storage failure is surfaced.
    pub async fn mark_unit_complete(&self, unit_id: u32) -> Result<CompletionReceipt, StoreError> {
        let guard = self.marking.lock().await;

        let newly_completed = self.progress.mark(unit_id).await?;
        if !newly_completed && !self.progress.awaits_enqueue(unit_id).await {
            debug!("Unit {unit_id} already complete");
            return Ok(CompletionReceipt {
                unit_id,
                newly_completed,
                queued_seq: None,
            });
        }

        let queued = self
            .queue
            .enqueue(ActionPayload::CompleteUnitOfWork { unit_id })
            .await?;
        if let Err(e) = self.progress.confirm_queued(unit_id).await {
            warn!("Unit {unit_id} queued but confirmation not persisted: {e}");
        }
        drop(guard);

        // Immediate best-effort forward; the queue keeps it if this fails.
        self.reconciler.trigger();

        Ok(CompletionReceipt {
            unit_id,
            newly_completed,
            queued_seq: Some(queued.seq),
        })
    }

    pub async fn progress(&self) -> Vec<u32> {
        self.progress.completed().await
    }

    pub async fn sync_status(&self) -> SyncStatus {
        let degraded = self.orchestrator.is_degraded();
        SyncStatus {
            pending: self.queue.snapshot().await,
            flushing: self.reconciler.is_flushing(),
            degraded,
            notice: degraded.then(|| DEGRADED_NOTICE.to_string()),
        }
    }

    pub async fn flush_now(&self) -> FlushOutcome {
        self.reconciler.flush().await
    }

    pub fn subscribe_flush_outcomes(&self) -> broadcast::Receiver<FlushOutcome> {
        self.reconciler.subscribe_outcomes()
    }

    /// One remote attempt. Malformed questions are dropped; nothing usable
    /// left counts as a failed attempt.
    async fn fetch_quiz(
        &self,
        topic_key: &str,
        count: usize,
    ) -> Result<Vec<QuizQuestion>, RemoteError> {
        let quiz = self.remote.fetch_quiz(topic_key, count).await?;
        let total = quiz.questions.len();
        let questions: Vec<QuizQuestion> = quiz
            .questions
            .into_iter()
            .filter(QuizQuestion::is_well_formed)
            .collect();

        if questions.len() < total {
            warn!(
                "Dropped {} malformed question(s) from remote quiz for '{topic_key}'",
                total - questions.len()
            );
        }
        if questions.is_empty() {
            return Err(RemoteError::EmptyContent);
        }
        Ok(questions)
    }

    async fn fetch_plan(&self, topic_key: &str) -> Result<StudyPlan, RemoteError> {
        let plan = self.remote.fetch_plan(topic_key).await?;
        if plan.units.is_empty() {
            return Err(RemoteError::EmptyContent);
        }
        Ok(plan)
    }
}

/// Queues completions recorded before a crash or a failed enqueue. A unit
/// already present in the queue is only confirmed, never queued twice.
async fn requeue_unconfirmed(progress: &CompletionRecord, queue: &ActionQueue) {
    let unconfirmed = progress.awaiting_enqueue().await;
    if unconfirmed.is_empty() {
        return;
    }

    let queued = queue.snapshot().await;
    for unit_id in unconfirmed {
        let payload = ActionPayload::CompleteUnitOfWork { unit_id };
        if !queued.iter().any(|action| action.action == payload) {
            match queue.enqueue(payload).await {
                Ok(action) => info!("Re-queued unit {unit_id} as action {}", action.seq),
                Err(e) => {
                    warn!("Unit {unit_id} still awaits enqueue: {e}");
                    continue;
                }
            }
        }
        if let Err(e) = progress.confirm_queued(unit_id).await {
            warn!("Failed to confirm unit {unit_id} as queued: {e}");
        }
    }
}

impl Drop for Coach {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
