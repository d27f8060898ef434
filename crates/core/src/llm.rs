use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::QaError;
use crate::gemini::{Content, GeminiClient};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    System,
    Human,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }
}

/// A chat-style text generator.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Sends the conversation and returns the model's raw text reply.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, QaError>;
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

pub struct GeminiChatModel {
    client: GeminiClient,
    model: String,
    temperature: f32,
    max_output_tokens: Option<u32>,
    retry: RetryPolicy,
}

impl GeminiChatModel {
    pub fn new(config: &LlmConfig, retry: RetryPolicy) -> Result<Self, QaError> {
        Ok(Self {
            client: GeminiClient::new(config)?,
            model: config.chat_model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            retry,
        })
    }

    fn build_request(&self, messages: &[ChatMessage]) -> GenerateRequest {
        let system = messages
            .iter()
            .filter(|message| message.role == Role::System)
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let contents = messages
            .iter()
            .filter_map(|message| match message.role {
                Role::System => None,
                Role::Human => Some(Content::text(Some("user"), message.content.clone())),
                Role::Assistant => Some(Content::text(Some("model"), message.content.clone())),
            })
            .collect();

        GenerateRequest {
            system_instruction: (!system.is_empty()).then(|| Content::text(None, system)),
            contents,
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }
}

fn response_text(response: GenerateResponse) -> Result<String, QaError> {
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .map(|part| part.text)
                .collect::<String>()
        })
        .ok_or_else(|| QaError::Parse("gemini returned no candidates".to_string()))?;

    Ok(text)
}

#[async_trait]
impl LanguageModel for GeminiChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, QaError> {
        let request = self.build_request(messages);
        debug!(
            model = %self.model,
            messages = messages.len(),
            "invoking chat model"
        );

        let response: GenerateResponse = self
            .retry
            .run("generateContent", || {
                self.client.post(&self.model, "generateContent", &request)
            })
            .await?;

        response_text(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> GeminiChatModel {
        let config = LlmConfig {
            api_key: "key".to_string(),
            max_output_tokens: Some(256),
            ..LlmConfig::default()
        };
        match GeminiChatModel::new(&config, RetryPolicy::none()) {
            Ok(model) => model,
            Err(error) => panic!("model should build: {error}"),
        }
    }

    #[test]
    fn system_messages_become_system_instruction() -> Result<(), serde_json::Error> {
        let request = model().build_request(&[
            ChatMessage::system("be brief"),
            ChatMessage::human("hello"),
        ]);
        let rendered = serde_json::to_value(&request)?;

        assert_eq!(
            rendered.pointer("/systemInstruction/parts/0/text"),
            Some(&serde_json::json!("be brief"))
        );
        assert_eq!(
            rendered.pointer("/contents/0/role"),
            Some(&serde_json::json!("user"))
        );
        assert_eq!(rendered["contents"].as_array().map(Vec::len), Some(1));
        assert_eq!(
            rendered.pointer("/generationConfig/maxOutputTokens"),
            Some(&serde_json::json!(256))
        );
        Ok(())
    }

    #[test]
    fn request_without_system_omits_instruction() -> Result<(), serde_json::Error> {
        let request = model().build_request(&[ChatMessage::human("hello")]);
        let rendered = serde_json::to_value(&request)?;
        assert!(rendered.get("systemInstruction").is_none());
        Ok(())
    }

    #[test]
    fn response_parts_are_concatenated() -> Result<(), serde_json::Error> {
        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Hello, "}, {"text": "world"}]}}]
        }))?;
        assert_eq!(response_text(response).ok().as_deref(), Some("Hello, world"));
        Ok(())
    }

    #[test]
    fn empty_candidates_are_a_parse_failure() -> Result<(), serde_json::Error> {
        let response: GenerateResponse = serde_json::from_value(serde_json::json!({}))?;
        assert!(matches!(response_text(response), Err(QaError::Parse(_))));
        Ok(())
    }
}
