use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a piece of content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentSource {
    RemoteGenerated,
    StaticFallback,
    Synthesized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Quiz,
    Plan,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Quiz => "quiz",
            ContentKind::Plan => "plan",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub question: String,
    pub options: Vec<String>,
    #[serde(alias = "correctIndex", alias = "correct_answer")]
    pub correct_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl QuizQuestion {
    /// Identity used for de-duplication: the explicit id when present,
    /// otherwise the case-folded, whitespace-collapsed question text.
    pub fn identity(&self) -> String {
        match self.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => format!("id:{id}"),
            _ => format!("text:{}", normalize_topic(&self.question)),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        !self.question.trim().is_empty()
            && self.options.len() >= 2
            && self.correct_index < self.options.len()
    }
}

/// Quiz payload as returned by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuizSet {
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanUnit {
    pub day: u32,
    pub title: String,
    #[serde(default)]
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyPlan {
    pub title: String,
    #[serde(default)]
    pub units: Vec<PlanUnit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachedContent {
    Quiz { questions: Vec<QuizQuestion> },
    Plan(StudyPlan),
}

impl CachedContent {
    pub fn kind(&self) -> ContentKind {
        match self {
            CachedContent::Quiz { .. } => ContentKind::Quiz,
            CachedContent::Plan(_) => ContentKind::Plan,
        }
    }

    /// Every human-readable string in the content, in order. Used by the
    /// mismatch heuristics.
    pub fn texts(&self) -> Vec<&str> {
        match self {
            CachedContent::Quiz { questions } => questions
                .iter()
                .flat_map(|q| {
                    std::iter::once(q.question.as_str())
                        .chain(q.options.iter().map(String::as_str))
                        .chain(q.explanation.as_deref())
                })
                .collect(),
            CachedContent::Plan(plan) => std::iter::once(plan.title.as_str())
                .chain(plan.units.iter().flat_map(|u| {
                    std::iter::once(u.title.as_str()).chain(u.tasks.iter().map(String::as_str))
                }))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub topic_key: String,
    pub content: CachedContent,
    pub source: ContentSource,
    pub cached_at: DateTime<Utc>,
}

/// Case-folds, trims, and collapses inner whitespace.
pub fn normalize_topic(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
