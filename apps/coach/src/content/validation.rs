//! Read-time trust checks for cached content.
//!
//! Content comes from a generative upstream that, under failure, returns
//! wrong-topic boilerplate or duplicated filler. Nothing is trusted at write
//! time alone: every cache read re-runs these checks.
//!
//! Mismatch detection is a pluggable predicate (`MismatchDetector`) because the
//! heuristic is inherently fuzzy. Two policies ship:
//! - `FillerMarkerDetector` (default): conservative, only flags content that is
//!   recognizably generic filler written for a different subject.
//! - `KeywordOverlapDetector`: also flags content that shares no significant
//!   token with the requested topic. Catches more, but can evict valid content
//!   whose text never names its topic.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use crate::content::models::{normalize_topic, CachedContent, QuizQuestion};

/// A quiz needs at least this many distinct questions (or all of them, when
/// smaller) to be served.
pub const MIN_DISTINCT_QUESTIONS: usize = 5;

const FILLER_QUESTION_MARKER: &str = "Generic practice question for ";
const FILLER_TASK_MARKER: &str = "Generic study task for ";

/// Words that carry no subject on their own ("intro to java basics" → "java").
const STOPWORDS: &[&str] = &[
    "intro",
    "introduction",
    "to",
    "the",
    "and",
    "for",
    "of",
    "in",
    "with",
    "basics",
    "basic",
    "advanced",
    "fundamentals",
    "interview",
    "prep",
    "practice",
    "beginner",
    "beginners",
    "course",
];

/// Filler line attached to every synthesized quiz question.
pub fn filler_explanation(topic: &str) -> String {
    format!("{FILLER_QUESTION_MARKER}{}.", topic.trim())
}

/// Filler line attached to every synthesized plan unit.
pub fn filler_task(topic: &str) -> String {
    format!("{FILLER_TASK_MARKER}{}.", topic.trim())
}

/// Extracts the normalized subject from a generic filler line, if `text` is one.
pub fn filler_subject(text: &str) -> Option<String> {
    let text = text.trim();
    let rest = text
        .strip_prefix(FILLER_QUESTION_MARKER)
        .or_else(|| text.strip_prefix(FILLER_TASK_MARKER))?;
    let subject = normalize_topic(rest.strip_suffix('.').unwrap_or(rest));
    (!subject.is_empty()).then_some(subject)
}

/// Whole-token comparison: "python basics" matches "python", but "java" never
/// matches "javascript" and "go" never matches "algorithms".
fn subjects_match(subject: &str, topic_key: &str) -> bool {
    let subject_tokens: Vec<String> = tokenize(subject).collect();
    let key_tokens: Vec<String> = tokenize(topic_key).collect();
    if subject_tokens.is_empty() || key_tokens.is_empty() {
        return subject == topic_key;
    }
    if subject_tokens == key_tokens {
        return true;
    }

    let is_subset = |small: &[String], large: &[String]| small.iter().all(|t| large.contains(t));
    is_subset(&subject_tokens, &key_tokens) || is_subset(&key_tokens, &subject_tokens)
}

/// Decides whether cached content looks like it belongs to a different topic.
pub trait MismatchDetector: Send + Sync {
    fn is_likely_mismatched(&self, content: &CachedContent, topic_key: &str) -> bool;

    fn name(&self) -> &'static str;
}

/// Flags content carrying generic filler fingerprinted to another subject.
#[derive(Debug, Clone, Copy, Default)]
pub struct FillerMarkerDetector;

impl MismatchDetector for FillerMarkerDetector {
    fn is_likely_mismatched(&self, content: &CachedContent, topic_key: &str) -> bool {
        let topic_key = normalize_topic(topic_key);
        if topic_key.is_empty() {
            return false;
        }
        content
            .texts()
            .into_iter()
            .filter_map(filler_subject)
            .any(|subject| !subjects_match(&subject, &topic_key))
    }

    fn name(&self) -> &'static str {
        "marker"
    }
}

/// Filler-marker check plus a keyword-overlap score between topic and content.
///
/// `aliases` maps sub-topic keywords to their parent topic, so a "django" entry
/// whose text only ever says "Python" is not treated as a mismatch.
#[derive(Debug, Clone, Default)]
pub struct KeywordOverlapDetector {
    aliases: Vec<(String, String)>,
}

impl KeywordOverlapDetector {
    pub fn new(aliases: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            aliases: aliases
                .into_iter()
                .map(|(k, t)| (normalize_topic(&k), normalize_topic(&t)))
                .collect(),
        }
    }

    fn significant_tokens(&self, topic_key: &str) -> HashSet<String> {
        let mut tokens: HashSet<String> = tokenize(topic_key)
            .filter(|t| t.len() >= 2 && !STOPWORDS.contains(&t.as_str()))
            .collect();

        let expanded: Vec<String> = self
            .aliases
            .iter()
            .filter(|(keyword, _)| tokens.iter().any(|t| t.starts_with(keyword.as_str())))
            .flat_map(|(_, parent)| tokenize(parent).collect::<Vec<_>>())
            .collect();
        tokens.extend(expanded);
        tokens
    }
}

impl MismatchDetector for KeywordOverlapDetector {
    fn is_likely_mismatched(&self, content: &CachedContent, topic_key: &str) -> bool {
        if FillerMarkerDetector.is_likely_mismatched(content, topic_key) {
            return true;
        }

        let tokens = self.significant_tokens(topic_key);
        if tokens.is_empty() {
            return false;
        }

        let content_tokens: HashSet<String> = content
            .texts()
            .into_iter()
            .flat_map(tokenize)
            .collect();
        if content_tokens.is_empty() {
            return false;
        }

        !tokens.iter().any(|t| {
            content_tokens
                .iter()
                .any(|c| c == t || (t.len() >= 4 && c.starts_with(t.as_str())))
        })
    }

    fn name(&self) -> &'static str {
        "overlap"
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Which mismatch heuristic the cache runs on read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MismatchPolicy {
    #[default]
    Marker,
    Overlap,
}

impl FromStr for MismatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "marker" => Ok(MismatchPolicy::Marker),
            "overlap" => Ok(MismatchPolicy::Overlap),
            other => Err(format!(
                "unknown mismatch policy '{other}' (expected 'marker' or 'overlap')"
            )),
        }
    }
}

impl MismatchPolicy {
    pub fn build(
        self,
        aliases: impl IntoIterator<Item = (String, String)>,
    ) -> Arc<dyn MismatchDetector> {
        match self {
            MismatchPolicy::Marker => Arc::new(FillerMarkerDetector),
            MismatchPolicy::Overlap => Arc::new(KeywordOverlapDetector::new(aliases)),
        }
    }
}

/// Distinct-question count of a quiz against the diversity floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiversityReport {
    pub stored: usize,
    pub distinct: usize,
    pub required: usize,
}

impl DiversityReport {
    pub fn passed(&self) -> bool {
        self.stored > 0 && self.distinct >= self.required
    }
}

pub fn check_diversity(questions: &[QuizQuestion]) -> DiversityReport {
    let distinct = questions
        .iter()
        .map(QuizQuestion::identity)
        .collect::<HashSet<_>>()
        .len();

    DiversityReport {
        stored: questions.len(),
        distinct,
        required: MIN_DISTINCT_QUESTIONS.min(questions.len()),
    }
}
