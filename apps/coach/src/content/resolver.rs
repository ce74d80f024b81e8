//! Fuzzy Resolver: maps a free-text topic to the best canonical content bundle.
//!
//! Strategies run in order and stop at the first hit:
//! 1. exact (case-insensitive) topic name
//! 2. substring containment, either direction
//! 3. curated keyword table ("jvm" → Java)
//! 4. synthesized generic bundle parameterized by the requested topic
//!
//! Resolution is deterministic. Only the order of quiz questions is randomized,
//! and that happens at serve time, not here.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::content::models::{normalize_topic, ContentSource, PlanUnit, QuizQuestion, StudyPlan};
use crate::content::validation::{filler_explanation, filler_task};

const BUILTIN_CATALOG: &str = include_str!("../../assets/catalog.json");

/// Days in a synthesized plan.
pub const SYNTHESIZED_PLAN_DAYS: u32 = 7;

/// Reverse containment ("script" inside "javascript") needs at least this many
/// characters, otherwise one-letter requests would match everything.
const MIN_REVERSE_MATCH_LEN: usize = 3;

const SYNTHESIZED_QUESTIONS: &[(&str, [&str; 4], usize)] = &[
    (
        "What is the best first step when starting to learn {topic}?",
        [
            "Survey the core concepts and vocabulary",
            "Memorize advanced edge cases",
            "Skip straight to optimization",
            "Avoid hands-on practice",
        ],
        0,
    ),
    (
        "How should you practice {topic} between study sessions?",
        [
            "Only reread notes",
            "Work through small, concrete exercises",
            "Wait until the interview",
            "Practice once a month",
        ],
        1,
    ),
    (
        "Which habit helps most when an explanation of {topic} is unclear?",
        [
            "Move on and hope it clicks",
            "Build a tiny example and observe its behavior",
            "Assume the source is wrong",
            "Memorize the wording",
        ],
        1,
    ),
    (
        "How can you check that you really understand a concept in {topic}?",
        [
            "Explain it in your own words to someone else",
            "Read the definition again",
            "Highlight the textbook",
            "Count how long you studied",
        ],
        0,
    ),
    (
        "What is a good way to prepare {topic} for an interview?",
        [
            "Skim a glossary the night before",
            "Solve representative problems and talk through your reasoning",
            "Only watch videos",
            "Focus exclusively on trivia",
        ],
        1,
    ),
    (
        "When reviewing {topic}, what should you revisit first?",
        [
            "Topics you already know well",
            "Random chapters",
            "Concepts you got wrong in earlier practice",
            "Nothing, review is unnecessary",
        ],
        2,
    ),
    (
        "What is the value of building a small project with {topic}?",
        [
            "It connects isolated concepts into working knowledge",
            "It replaces all theory",
            "It is only useful for experts",
            "It has no interview value",
        ],
        0,
    ),
    (
        "Which resource is most reliable when learning {topic}?",
        [
            "An anonymous comment thread",
            "Official documentation and reputable references",
            "A single blog post from years ago",
            "Guessing",
        ],
        1,
    ),
    (
        "How should you handle trade-off questions about {topic}?",
        [
            "Claim there is always one right answer",
            "State the options, their costs, and when each fits",
            "Refuse to answer",
            "Pick the newest option",
        ],
        1,
    ),
    (
        "What does steady progress in {topic} usually look like?",
        [
            "Short, regular sessions with feedback",
            "One long cramming session",
            "Studying only when motivated",
            "Reading without practicing",
        ],
        0,
    ),
];

const SYNTHESIZED_PLAN_DAYS_OUTLINE: &[(&str, [&str; 2])] = &[
    ("Orientation", ["Map out the core concepts", "Collect two reliable references"]),
    ("Core concepts", ["Study the fundamental building blocks", "Write short notes in your own words"]),
    ("Hands-on practice", ["Complete three small exercises", "Review mistakes from the exercises"]),
    ("Deeper topics", ["Pick one advanced area to explore", "Summarize the key trade-offs"]),
    ("Applied project", ["Build a small end-to-end example", "Document what you learned"]),
    ("Interview practice", ["Answer common interview questions out loud", "Identify remaining gaps"]),
    ("Review", ["Revisit weak areas", "Take a timed practice quiz"]),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicBundle {
    pub topic: String,
    pub questions: Vec<QuizQuestion>,
    pub plan: StudyPlan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordMapping {
    pub keyword: String,
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub topics: Vec<TopicBundle>,
    #[serde(default)]
    pub keywords: Vec<KeywordMapping>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Exact,
    Substring,
    Keyword,
    Synthesized,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub bundle: TopicBundle,
    pub strategy: MatchStrategy,
}

impl Resolution {
    pub fn source(&self) -> ContentSource {
        match self.strategy {
            MatchStrategy::Synthesized => ContentSource::Synthesized,
            _ => ContentSource::StaticFallback,
        }
    }
}

pub struct FuzzyResolver {
    catalog: Catalog,
    /// Normalized topic names, parallel to `catalog.topics`.
    names: Vec<String>,
    /// Indices into `catalog.topics`, longest name first.
    by_length: Vec<usize>,
}

impl FuzzyResolver {
    /// Resolver over the catalog compiled into the binary.
    pub fn builtin() -> Result<Self, serde_json::Error> {
        let catalog: Catalog = serde_json::from_str(BUILTIN_CATALOG)?;
        Ok(Self::new(catalog))
    }

    pub fn new(catalog: Catalog) -> Self {
        let names: Vec<String> = catalog
            .topics
            .iter()
            .map(|b| normalize_topic(&b.topic))
            .collect();

        let mut by_length: Vec<usize> = (0..names.len()).collect();
        // Stable sort: ties keep catalog order.
        by_length.sort_by_key(|&i| std::cmp::Reverse(names[i].len()));

        Self {
            catalog,
            names,
            by_length,
        }
    }

    /// (keyword, canonical topic) pairs, for mismatch alias expansion.
    pub fn keyword_aliases(&self) -> Vec<(String, String)> {
        self.catalog
            .keywords
            .iter()
            .map(|k| (k.keyword.clone(), k.topic.clone()))
            .collect()
    }

    pub fn resolve(&self, topic: &str) -> Resolution {
        let requested = normalize_topic(topic);

        let (bundle, strategy) = match self.find_catalog_match(&requested) {
            Some((index, strategy)) => (self.catalog.topics[index].clone(), strategy),
            None => (synthesize_bundle(topic), MatchStrategy::Synthesized),
        };

        debug!(
            "Resolved topic '{}' to '{}' via {:?}",
            topic, bundle.topic, strategy
        );
        Resolution { bundle, strategy }
    }

    fn find_catalog_match(&self, requested: &str) -> Option<(usize, MatchStrategy)> {
        if requested.is_empty() {
            return None;
        }

        if let Some(index) = self.names.iter().position(|n| n == requested) {
            return Some((index, MatchStrategy::Exact));
        }

        if let Some(&index) = self
            .by_length
            .iter()
            .find(|&&i| !self.names[i].is_empty() && requested.contains(self.names[i].as_str()))
        {
            return Some((index, MatchStrategy::Substring));
        }

        if requested.len() >= MIN_REVERSE_MATCH_LEN {
            if let Some(index) = self.names.iter().position(|n| n.contains(requested)) {
                return Some((index, MatchStrategy::Substring));
            }
        }

        self.catalog
            .keywords
            .iter()
            .find(|k| contains_word_prefix(requested, &normalize_topic(&k.keyword)))
            .and_then(|k| {
                let parent = normalize_topic(&k.topic);
                self.names.iter().position(|n| *n == parent)
            })
            .map(|index| (index, MatchStrategy::Keyword))
    }
}

/// True when `needle` occurs in `haystack` starting at a word boundary.
fn contains_word_prefix(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(at, _)| {
        haystack[..at]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric())
    })
}

/// Generic, well-formed content parameterized only by the topic string.
pub fn synthesize_bundle(topic: &str) -> TopicBundle {
    let display = display_topic(topic);
    TopicBundle {
        topic: display.clone(),
        questions: synthesize_questions(&display),
        plan: synthesize_plan(&display),
    }
}

fn display_topic(topic: &str) -> String {
    let collapsed = topic.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        "General Interview Skills".to_string()
    } else {
        collapsed
    }
}

fn synthesize_questions(topic: &str) -> Vec<QuizQuestion> {
    let slug = normalize_topic(topic).replace(' ', "-");
    SYNTHESIZED_QUESTIONS
        .iter()
        .enumerate()
        .map(|(i, (template, options, correct))| QuizQuestion {
            id: Some(format!("synth-{slug}-{}", i + 1)),
            question: template.replace("{topic}", topic),
            options: options.iter().map(|o| o.to_string()).collect(),
            correct_index: *correct,
            explanation: Some(filler_explanation(topic)),
        })
        .collect()
}

fn synthesize_plan(topic: &str) -> StudyPlan {
    let units = SYNTHESIZED_PLAN_DAYS_OUTLINE
        .iter()
        .take(SYNTHESIZED_PLAN_DAYS as usize)
        .zip(1..)
        .map(|((title, tasks), day)| PlanUnit {
            day,
            title: format!("{topic}: {title}"),
            tasks: tasks
                .iter()
                .map(|t| t.to_string())
                .chain(std::iter::once(filler_task(topic)))
                .collect(),
        })
        .collect();

    StudyPlan {
        title: format!("{topic} Study Plan"),
        units,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::validation::check_diversity;

    fn resolver() -> FuzzyResolver {
        FuzzyResolver::builtin().expect("builtin catalog parses")
    }

    #[test]
    fn test_builtin_catalog_is_well_formed() {
        let r = resolver();
        assert!(!r.catalog.topics.is_empty());
        for bundle in &r.catalog.topics {
            assert!(check_diversity(&bundle.questions).passed(), "{}", bundle.topic);
            assert!(bundle.questions.iter().all(QuizQuestion::is_well_formed));
            assert!(!bundle.plan.units.is_empty());
        }
        for mapping in &r.catalog.keywords {
            let parent = normalize_topic(&mapping.topic);
            assert!(r.names.contains(&parent), "dangling keyword {}", mapping.keyword);
        }
    }

    #[test]
    fn test_exact_match_is_case_insensitive() {
        let res = resolver().resolve("  PYTHON ");
        assert_eq!(res.bundle.topic, "Python");
        assert_eq!(res.strategy, MatchStrategy::Exact);
        assert_eq!(res.source(), ContentSource::StaticFallback);
    }

    #[test]
    fn test_substring_maps_intro_to_java() {
        let r = resolver();
        for _ in 0..5 {
            let res = r.resolve("Intro to Java Basics");
            assert_eq!(res.bundle.topic, "Java");
            assert_eq!(res.strategy, MatchStrategy::Substring);
        }
    }

    #[test]
    fn test_substring_prefers_longer_topic() {
        let res = resolver().resolve("JavaScript basics");
        assert_eq!(res.bundle.topic, "JavaScript");
    }

    #[test]
    fn test_reverse_containment() {
        let res = resolver().resolve("script");
        assert_eq!(res.bundle.topic, "JavaScript");
        assert_eq!(res.strategy, MatchStrategy::Substring);
    }

    #[test]
    fn test_short_requests_skip_reverse_containment() {
        let res = resolver().resolve("q");
        assert_eq!(res.strategy, MatchStrategy::Synthesized);
    }

    #[test]
    fn test_keyword_table() {
        let r = resolver();
        assert_eq!(r.resolve("JVM internals").bundle.topic, "Java");
        assert_eq!(r.resolve("arrays and hashing").bundle.topic, "Data Structures");
        assert_eq!(r.resolve("Django REST").strategy, MatchStrategy::Keyword);
    }

    #[test]
    fn test_keyword_requires_word_boundary() {
        assert!(contains_word_prefix("jvm internals", "jvm"));
        assert!(contains_word_prefix("big-stack", "stack"));
        assert!(!contains_word_prefix("haystack", "stack"));
    }

    #[test]
    fn test_unknown_topic_is_synthesized() {
        let res = resolver().resolve("Zorblaxian Systems");
        assert_eq!(res.strategy, MatchStrategy::Synthesized);
        assert_eq!(res.source(), ContentSource::Synthesized);
        assert_eq!(res.bundle.topic, "Zorblaxian Systems");
        assert_eq!(res.bundle.questions.len(), SYNTHESIZED_QUESTIONS.len());
        assert!(check_diversity(&res.bundle.questions).passed());
        assert!(res.bundle.questions.iter().all(QuizQuestion::is_well_formed));
        assert_eq!(res.bundle.plan.units.len(), SYNTHESIZED_PLAN_DAYS as usize);
        assert!(res.bundle.questions[0].question.contains("Zorblaxian Systems"));
    }

    #[test]
    fn test_blank_topic_still_yields_content() {
        let res = resolver().resolve("   ");
        assert_eq!(res.strategy, MatchStrategy::Synthesized);
        assert!(!res.bundle.questions.is_empty());
        assert!(!res.bundle.plan.units.is_empty());
    }

    #[test]
    fn test_synthesized_plan_days_are_ordered() {
        let plan = synthesize_plan("Rust");
        let days: Vec<u32> = plan.units.iter().map(|u| u.day).collect();
        assert_eq!(days, (1..=SYNTHESIZED_PLAN_DAYS).collect::<Vec<_>>());
    }
}
