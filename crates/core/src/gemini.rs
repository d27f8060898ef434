//! Thin REST plumbing shared by the Gemini chat model and embedder.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::error;

use crate::config::LlmConfig;
use crate::error::QaError;

const BACKEND: &str = "gemini";

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, QaError> {
        if config.api_key.trim().is_empty() {
            return Err(QaError::Config("gemini API key must not be empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(QaError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/{}:{}", self.base_url, model_path(model), method)
    }

    pub async fn post<B, R>(&self, model: &str, method: &str, body: &B) -> Result<R, QaError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.endpoint(model, method))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|error| QaError::from_transport(BACKEND, error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|parsed| parsed.error.message)
                .unwrap_or(body);
            error!(provider = BACKEND, model, method, %status, "API error");
            return Err(QaError::provider(BACKEND, status.as_u16(), detail));
        }

        response.json::<R>().await.map_err(QaError::Http)
    }
}

/// Gemini addresses models as `models/<name>`; accept either spelling.
pub fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part { text: text.into() }],
        }
    }
}
