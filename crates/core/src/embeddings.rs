use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::QaError;
use crate::gemini::{model_path, Content, GeminiClient};
use crate::retry::RetryPolicy;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Gemini caps batch embedding requests at this many inputs.
const MAX_BATCH: usize = 100;

/// Turns text into vectors. Dimensionality is not declared up front; callers
/// measure it by embedding a canary input.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, QaError>;

    /// Embeds texts destined for storage, preserving input order.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, QaError>;
}

/// Offline embedder hashing character trigrams into a fixed number of
/// buckets. Deterministic, so it doubles as a test fixture.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for ch in window {
                let mut buffer = [0u8; 4];
                for byte in ch.encode_utf8(&mut buffer).bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(1099511628211);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, QaError> {
        Ok(self.embed(text))
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, QaError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalQuery,
    RetrievalDocument,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest {
    model: String,
    content: Content,
    task_type: TaskType,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

/// Embeddings from the Gemini `embedContent` family of endpoints.
pub struct GeminiEmbedder {
    client: GeminiClient,
    model: String,
    retry: RetryPolicy,
}

impl GeminiEmbedder {
    pub fn new(config: &LlmConfig, retry: RetryPolicy) -> Result<Self, QaError> {
        Ok(Self {
            client: GeminiClient::new(config)?,
            model: model_path(&config.embedding_model),
            retry,
        })
    }

    fn request(&self, text: &str, task_type: TaskType) -> EmbedRequest {
        EmbedRequest {
            model: self.model.clone(),
            content: Content::text(None, text),
            task_type,
        }
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, QaError> {
        debug!(provider = "gemini", text_len = text.len(), "embedding query");
        let request = self.request(text, TaskType::RetrievalQuery);
        let response: EmbedResponse = self
            .retry
            .run("embedContent", || {
                self.client.post(&self.model, "embedContent", &request)
            })
            .await?;
        Ok(response.embedding.values)
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, QaError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(MAX_BATCH) {
            debug!(provider = "gemini", batch_size = batch.len(), "embedding batch");
            let request = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|text| self.request(text, TaskType::RetrievalDocument))
                    .collect(),
            };
            let response: BatchEmbedResponse = self
                .retry
                .run("batchEmbedContents", || {
                    self.client.post(&self.model, "batchEmbedContents", &request)
                })
                .await?;

            if response.embeddings.len() != batch.len() {
                return Err(QaError::Parse(format!(
                    "gemini returned {} embeddings for {} inputs",
                    response.embeddings.len(),
                    batch.len()
                )));
            }
            vectors.extend(response.embeddings.into_iter().map(|item| item.values));
        }

        Ok(vectors)
    }
}
