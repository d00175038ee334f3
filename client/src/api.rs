// src/api.rs

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    config::Config,
    error::SyncError,
    models::{ExamWindow, attempt::AttemptResult, exam::Exam},
};

/// REST boundary of the sync client.
#[async_trait]
pub trait ExamApi: Send + Sync {
    /// `GET /exams`
    async fn fetch_exams(&self) -> Result<Vec<Exam>, SyncError>;

    /// `GET /exam-windows/professor`
    async fn fetch_windows(&self) -> Result<Vec<ExamWindow>, SyncError>;

    /// `GET /exam-windows/{id}/ranking`
    async fn fetch_ranking(&self, window_id: i64) -> Result<Vec<AttemptResult>, SyncError>;
}

/// List endpoints answer either a bare array or `{ "data": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListResponse<T> {
    Bare(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> ListResponse<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            ListResponse::Bare(items) | ListResponse::Wrapped { data: items } => items,
        }
    }
}

/// `reqwest` implementation of [`ExamApi`] using the session bearer token.
pub struct HttpExamApi {
    client: reqwest::Client,
    base_url: Url,
    token: String,
}

impl HttpExamApi {
    pub fn new(config: &Config) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .user_agent("examline-sync/0.1")
            .build()?;
        Self::with_client(client, &config.api_base_url, &config.session_token)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        token: &str,
    ) -> Result<Self, SyncError> {
        // Keep the last path segment when joining relative endpoints.
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Self {
            client,
            base_url: Url::parse(&base)?,
            token: token.to_string(),
        })
    }

    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, SyncError> {
        let url = self.base_url.join(path)?;
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Unauthorized);
        }

        let body = response.error_for_status()?.json::<ListResponse<T>>().await?;
        Ok(body.into_vec())
    }
}

#[async_trait]
impl ExamApi for HttpExamApi {
    async fn fetch_exams(&self) -> Result<Vec<Exam>, SyncError> {
        self.get_list("exams").await
    }

    async fn fetch_windows(&self) -> Result<Vec<ExamWindow>, SyncError> {
        self.get_list("exam-windows/professor").await
    }

    async fn fetch_ranking(&self, window_id: i64) -> Result<Vec<AttemptResult>, SyncError> {
        self.get_list(&format!("exam-windows/{}/ranking", window_id))
            .await
    }
}
