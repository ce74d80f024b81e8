use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use super::{RemoteError, RemoteService};
use crate::content::models::{QuizSet, StudyPlan};

/// Transport backstop only; per-call deadlines come from the orchestrator.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct CompleteUnitRequest {
    unit_id: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// `RemoteService` over the backend's JSON HTTP API.
#[derive(Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
        let response = Self::check_status(response).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn check_status(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Api {
            status: status.as_u16(),
            message: parse_error_message(body),
        })
    }
}

#[async_trait]
impl RemoteService for HttpRemote {
    async fn fetch_quiz(&self, topic_key: &str, count: usize) -> Result<QuizSet, RemoteError> {
        let count = count.to_string();
        let response = self
            .client
            .get(self.endpoint("api/quiz"))
            .query(&[("topic", topic_key), ("count", count.as_str())])
            .send()
            .await?;

        let quiz: QuizSet = Self::read_json(response).await?;
        debug!("Fetched {} question(s) for '{}'", quiz.questions.len(), topic_key);
        Ok(quiz)
    }

    async fn fetch_plan(&self, topic_key: &str) -> Result<StudyPlan, RemoteError> {
        let response = self
            .client
            .get(self.endpoint("api/plan"))
            .query(&[("topic", topic_key)])
            .send()
            .await?;

        let plan: StudyPlan = Self::read_json(response).await?;
        debug!("Fetched plan '{}' with {} unit(s)", plan.title, plan.units.len());
        Ok(plan)
    }

    async fn submit_unit_complete(&self, unit_id: u32) -> Result<(), RemoteError> {
        let response = self
            .client
            .post(self.endpoint("api/progress/complete"))
            .json(&CompleteUnitRequest { unit_id })
            .send()
            .await?;

        Self::check_status(response).await?;
        debug!("Backend confirmed completion of unit {}", unit_id);
        Ok(())
    }
}

/// Pulls `error.message` out of a JSON error body, falling back to the raw body.
fn parse_error_message(body: String) -> String {
    serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}
