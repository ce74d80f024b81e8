//! Content Cache: topic-keyed store of previously fetched quizzes and plans.
//!
//! Entries are retained indefinitely (content is evergreen for its topic) but
//! re-validated on every read. A poisoned or degenerate entry is evicted and
//! reported as a miss so the caller falls through to the fuzzy resolver.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::content::models::{
    normalize_topic, CacheEntry, CachedContent, ContentKind, ContentSource, QuizQuestion,
    StudyPlan,
};
use crate::content::validation::{check_diversity, MismatchDetector};
use crate::store::{BlobStore, StoreError, CONTENT_CACHE_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    Absent,
    Poisoned,
    LowDiversity { distinct: usize, required: usize },
    Empty,
}

/// A validated hit carries the provenance recorded when the entry was stored.
#[derive(Debug)]
pub enum CacheLookup<T> {
    Hit(T, ContentSource),
    Miss(MissReason),
}

impl<T> CacheLookup<T> {
    pub fn hit(self) -> Option<T> {
        match self {
            CacheLookup::Hit(value, _) => Some(value),
            CacheLookup::Miss(_) => None,
        }
    }

    pub fn source(&self) -> Option<ContentSource> {
        match self {
            CacheLookup::Hit(_, source) => Some(*source),
            CacheLookup::Miss(_) => None,
        }
    }

    pub fn miss_reason(&self) -> Option<MissReason> {
        match self {
            CacheLookup::Hit(..) => None,
            CacheLookup::Miss(reason) => Some(*reason),
        }
    }
}

pub struct ContentCache {
    store: Arc<dyn BlobStore>,
    detector: Arc<dyn MismatchDetector>,
    entries: Mutex<BTreeMap<String, CacheEntry>>,
}

impl ContentCache {
    /// Loads the persisted cache map. An unreadable or malformed blob is
    /// logged and replaced by an empty cache rather than failing startup.
    pub async fn load(
        store: Arc<dyn BlobStore>,
        detector: Arc<dyn MismatchDetector>,
    ) -> Result<Self, StoreError> {
        let entries = match store.read_blob(CONTENT_CACHE_KEY).await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Discarding malformed content cache blob: {e}");
                BTreeMap::new()
            }),
            Ok(None) => BTreeMap::new(),
            Err(StoreError::Serialize(e)) => {
                warn!("Discarding corrupt content cache blob: {e}");
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };

        debug!(
            "Content cache loaded with {} entries (mismatch policy: {})",
            entries.len(),
            detector.name()
        );

        Ok(Self {
            store,
            detector,
            entries: Mutex::new(entries),
        })
    }

    /// Stores remote-generated content under the normalized topic key.
    pub async fn save(&self, topic: &str, content: CachedContent) -> Result<(), StoreError> {
        let topic_key = normalize_topic(topic);
        let slot = slot_key(content.kind(), &topic_key);
        let entry = CacheEntry {
            topic_key,
            content,
            source: ContentSource::RemoteGenerated,
            cached_at: Utc::now(),
        };

        let mut entries = self.entries.lock().await;
        let previous = entries.insert(slot.clone(), entry);

        if let Err(e) = self.persist(&entries).await {
            match previous {
                Some(previous) => entries.insert(slot, previous),
                None => entries.remove(&slot),
            };
            return Err(e);
        }
        Ok(())
    }

    pub async fn save_quiz(
        &self,
        topic: &str,
        questions: Vec<QuizQuestion>,
    ) -> Result<(), StoreError> {
        self.save(topic, CachedContent::Quiz { questions }).await
    }

    pub async fn save_plan(&self, topic: &str, plan: StudyPlan) -> Result<(), StoreError> {
        self.save(topic, CachedContent::Plan(plan)).await
    }

    /// Returns a freshly shuffled selection of `desired_count` distinct
    /// questions from a validated entry.
    pub async fn get_quiz(
        &self,
        topic: &str,
        desired_count: usize,
    ) -> CacheLookup<Vec<QuizQuestion>> {
        let topic_key = normalize_topic(topic);
        let slot = slot_key(ContentKind::Quiz, &topic_key);
        let mut entries = self.entries.lock().await;

        let Some(entry) = entries.get(&slot) else {
            return CacheLookup::Miss(MissReason::Absent);
        };

        let verdict = self.validate(entry, &topic_key);
        if let Some(reason) = verdict {
            self.evict_locked(&mut entries, &slot, reason).await;
            return CacheLookup::Miss(reason);
        }

        match &entry.content {
            CachedContent::Quiz { questions } => {
                CacheLookup::Hit(serve_questions(questions, desired_count), entry.source)
            }
            CachedContent::Plan(_) => CacheLookup::Miss(MissReason::Absent),
        }
    }

    pub async fn get_plan(&self, topic: &str) -> CacheLookup<StudyPlan> {
        let topic_key = normalize_topic(topic);
        let slot = slot_key(ContentKind::Plan, &topic_key);
        let mut entries = self.entries.lock().await;

        let Some(entry) = entries.get(&slot) else {
            return CacheLookup::Miss(MissReason::Absent);
        };

        if let Some(reason) = self.validate(entry, &topic_key) {
            self.evict_locked(&mut entries, &slot, reason).await;
            return CacheLookup::Miss(reason);
        }

        match &entry.content {
            CachedContent::Plan(plan) => CacheLookup::Hit(plan.clone(), entry.source),
            CachedContent::Quiz { .. } => CacheLookup::Miss(MissReason::Absent),
        }
    }

    pub async fn contains(&self, kind: ContentKind, topic: &str) -> bool {
        let slot = slot_key(kind, &normalize_topic(topic));
        self.entries.lock().await.contains_key(&slot)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Runs the configured mismatch detector against content that has not
    /// been stored yet.
    pub fn looks_mismatched(&self, content: &CachedContent, topic: &str) -> bool {
        self.detector
            .is_likely_mismatched(content, &normalize_topic(topic))
    }

    /// Poisoning first, then diversity. `None` means the entry may be served.
    fn validate(&self, entry: &CacheEntry, topic_key: &str) -> Option<MissReason> {
        if self.detector.is_likely_mismatched(&entry.content, topic_key) {
            return Some(MissReason::Poisoned);
        }

        match &entry.content {
            CachedContent::Quiz { questions } => {
                let report = check_diversity(questions);
                if report.stored == 0 {
                    Some(MissReason::Empty)
                } else if !report.passed() {
                    Some(MissReason::LowDiversity {
                        distinct: report.distinct,
                        required: report.required,
                    })
                } else {
                    None
                }
            }
            CachedContent::Plan(plan) if plan.units.is_empty() => Some(MissReason::Empty),
            CachedContent::Plan(_) => None,
        }
    }

    async fn evict_locked(
        &self,
        entries: &mut BTreeMap<String, CacheEntry>,
        slot: &str,
        reason: MissReason,
    ) {
        entries.remove(slot);
        warn!("Evicted cache entry '{slot}': {reason:?}");
        // The in-memory eviction already protects readers; a failed write only
        // means the bad entry is evicted again after a restart.
        if let Err(e) = self.persist(entries).await {
            error!("Failed to persist eviction of '{slot}': {e}");
        }
    }

    async fn persist(&self, entries: &BTreeMap<String, CacheEntry>) -> Result<(), StoreError> {
        let value = serde_json::to_value(entries)?;
        self.store.write_blob(CONTENT_CACHE_KEY, &value).await
    }
}

fn slot_key(kind: ContentKind, topic_key: &str) -> String {
    format!("{}::{}", kind.as_str(), topic_key)
}

/// De-duplicates by question identity, shuffles, and keeps `desired_count`.
pub fn serve_questions(questions: &[QuizQuestion], desired_count: usize) -> Vec<QuizQuestion> {
    let mut seen = HashSet::new();
    let mut distinct: Vec<QuizQuestion> = questions
        .iter()
        .filter(|q| seen.insert(q.identity()))
        .cloned()
        .collect();

    distinct.shuffle(&mut rand::thread_rng());
    distinct.truncate(desired_count.max(1));
    distinct
}
