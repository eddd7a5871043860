//! Analysis API client.
//! Posts a stored capture plus the user's question to `<api_url>/analysis`
//! and returns the answer text. Needs a bearer token from the caller.
//! Network failures and 5xx answers are retried; auth and credit errors are not.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::capture::CaptureResult;
use crate::config::CaptureConfig;

const RETRY_DELAY_MS: u64 = 500;

// *************** Request/Response Types ***************

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// One earlier turn of the conversation about a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    pub sender: Sender,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self { text: text.into(), sender: Sender::User }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { text: text.into(), sender: Sender::Assistant }
    }
}

#[derive(Debug, Serialize)]
pub struct AnalysisRequest {
    pub message: String,
    pub fen: String,
    pub pgn: String,
    pub image_data: String,
    pub chat_history: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    #[serde(default)]
    response: Option<String>,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Question must not be empty")]
    EmptyQuestion,
    #[error("Authentication required. Please login again.")]
    AuthRequired,
    #[error("You need more credits to analyze positions.")]
    NoCredits,
    #[error("Analysis API error {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Analysis request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl AnalysisError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AnalysisError::Http(_) => true,
            AnalysisError::Status { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}

// *************** Public API ***************

pub struct AnalysisClient {
    client: Client,
    endpoint: String,
    retries: u32,
}

impl AnalysisClient {
    pub fn new(config: &CaptureConfig) -> Result<Self, AnalysisError> {
        let client = Client::builder().timeout(Duration::from_secs(config.api_timeout_secs)).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/analysis", config.api_url.trim_end_matches('/')),
            retries: config.api_retries,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Asks `question` about `capture`. `history` holds earlier turns, oldest first.
    pub async fn analyze(
        &self,
        token: &str,
        question: &str,
        capture: &CaptureResult,
        history: &[ChatMessage],
    ) -> Result<String, AnalysisError> {
        if question.trim().is_empty() {
            return Err(AnalysisError::EmptyQuestion);
        }
        let request = build_request(question, capture, history);
        self.call_api_with_retry(token, &request).await
    }

    async fn call_api_with_retry(&self, token: &str, request: &AnalysisRequest) -> Result<String, AnalysisError> {
        let attempts = self.retries + 1;
        let mut attempt = 1;
        loop {
            match self.call_api(token, request).await {
                Ok(answer) => return Ok(answer),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!("Analysis API attempt {}/{} failed: {}", attempt, attempts, e);
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_api(&self, token: &str, request: &AnalysisRequest) -> Result<String, AnalysisError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", token))
            .json(request)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(AnalysisError::AuthRequired),
            StatusCode::PAYMENT_REQUIRED => return Err(AnalysisError::NoCredits),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(AnalysisError::Status { status, body });
            }
            _ => {}
        }

        let body: AnalysisResponse = response.json().await?;
        debug!(endpoint = %self.endpoint, "analysis answered");
        Ok(body.response.unwrap_or_else(|| "No analysis available.".to_string()))
    }
}

// *************** Internal Functions ***************

fn build_request(question: &str, capture: &CaptureResult, history: &[ChatMessage]) -> AnalysisRequest {
    AnalysisRequest {
        message: question.trim().to_string(),
        fen: capture.fen.clone(),
        pgn: capture.pgn.clone(),
        image_data: capture.image_data.clone(),
        chat_history: history.to_vec(),
    }
}

// *************** Tests ***************
