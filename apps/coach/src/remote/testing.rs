//! Scriptable `RemoteService` double shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{RemoteError, RemoteService};
use crate::content::models::{PlanUnit, QuizQuestion, QuizSet, StudyPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behavior {
    Up,
    Down,
    /// Never answers; only a deadline ends the call.
    Hang,
}

pub(crate) struct StubRemote {
    behavior: Mutex<Behavior>,
    quizzes: Mutex<HashMap<String, QuizSet>>,
    failing_units: Mutex<HashSet<u32>>,
    confirmed: Mutex<Vec<u32>>,
    empty_content: AtomicBool,
    pub quiz_calls: AtomicUsize,
    pub plan_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
}

impl StubRemote {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            quizzes: Mutex::new(HashMap::new()),
            failing_units: Mutex::new(HashSet::new()),
            confirmed: Mutex::new(Vec::new()),
            empty_content: AtomicBool::new(false),
            quiz_calls: AtomicUsize::new(0),
            plan_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Submissions for these units fail even while the remote is up.
    pub fn fail_units(&self, units: &[u32]) {
        *self.failing_units.lock().unwrap() = units.iter().copied().collect();
    }

    /// Successful fetches return no questions / no units.
    pub fn serve_empty_content(&self, empty: bool) {
        self.empty_content.store(empty, Ordering::SeqCst);
    }

    pub fn set_quiz(&self, topic_key: &str, quiz: QuizSet) {
        self.quizzes
            .lock()
            .unwrap()
            .insert(topic_key.to_string(), quiz);
    }

    /// Units the remote accepted, in arrival order.
    pub fn confirmed(&self) -> Vec<u32> {
        self.confirmed.lock().unwrap().clone()
    }

    async fn gate(&self) -> Result<(), RemoteError> {
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            Behavior::Up => Ok(()),
            Behavior::Down => Err(RemoteError::Unavailable("connection refused".to_string())),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                Err(RemoteError::Unavailable("hung".to_string()))
            }
        }
    }
}

pub(crate) fn generated_questions(topic_key: &str, n: usize) -> Vec<QuizQuestion> {
    (1..=n)
        .map(|i| QuizQuestion {
            id: Some(format!("remote-{topic_key}-{i}")),
            question: format!("Remote {topic_key} question {i}?"),
            options: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            correct_index: i % 3,
            explanation: None,
        })
        .collect()
}

#[async_trait]
impl RemoteService for StubRemote {
    async fn fetch_quiz(&self, topic_key: &str, count: usize) -> Result<QuizSet, RemoteError> {
        self.quiz_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        if self.empty_content.load(Ordering::SeqCst) {
            return Ok(QuizSet::default());
        }
        let scripted = self.quizzes.lock().unwrap().get(topic_key).cloned();
        Ok(scripted.unwrap_or_else(|| QuizSet {
            questions: generated_questions(topic_key, count),
        }))
    }

    async fn fetch_plan(&self, topic_key: &str) -> Result<StudyPlan, RemoteError> {
        self.plan_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        let units = if self.empty_content.load(Ordering::SeqCst) {
            vec![]
        } else {
            (1..=3)
                .map(|day| PlanUnit {
                    day,
                    title: format!("Remote {topic_key} day {day}"),
                    tasks: vec![format!("Practice {topic_key}")],
                })
                .collect()
        };
        Ok(StudyPlan {
            title: format!("Remote {topic_key} plan"),
            units,
        })
    }

    async fn submit_unit_complete(&self, unit_id: u32) -> Result<(), RemoteError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        if self.failing_units.lock().unwrap().contains(&unit_id) {
            return Err(RemoteError::Api {
                status: 503,
                message: format!("unit {unit_id} rejected"),
            });
        }
        self.confirmed.lock().unwrap().push(unit_id);
        Ok(())
    }
}
