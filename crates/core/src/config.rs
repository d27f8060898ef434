//! Process-wide configuration, assembled once at start-up and handed to each
//! component's constructor.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::QaError;
use crate::models::IngestionOptions;
use crate::retry::RetryPolicy;

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-1.5-pro";
pub const DEFAULT_EMBEDDING_MODEL: &str = "models/embedding-001";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QdrantConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_QDRANT_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEMINI_URL.to_string(),
            api_key: String::new(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            temperature: 0.0,
            max_output_tokens: None,
            timeout_secs: 120,
        }
    }
}

/// What `check_collection` does when a collection is missing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum CollectionPolicy {
    /// Create only the missing collection.
    #[default]
    PerCollection,
    /// Drop and recreate all three collections. Destroys stored vectors.
    RecreateAll,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalOptions {
    /// Hits requested per collection search.
    pub search_limit: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self { search_limit: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpansionOptions {
    /// Number of paraphrases requested in addition to the original question.
    pub variants: usize,
}

impl Default for ExpansionOptions {
    fn default() -> Self {
        Self { variants: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthesisOptions {
    /// Rendered context length above which a warning is logged.
    pub context_warn_chars: usize,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            context_warn_chars: 200_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub qdrant: QdrantConfig,
    pub llm: LlmConfig,
    pub ingestion: IngestionOptions,
    pub retrieval: RetrievalOptions,
    pub expansion: ExpansionOptions,
    pub synthesis: SynthesisOptions,
    pub collection_policy: CollectionPolicy,
    pub retry: RetryPolicy,
}

impl AppConfig {
    /// Checks the settings every component relies on. The API key is only
    /// required when `needs_api_key` is set, so offline runs can skip it.
    pub fn validate(&self, needs_api_key: bool) -> Result<(), QaError> {
        Url::parse(&self.qdrant.url)?;
        Url::parse(&self.llm.base_url)?;

        if needs_api_key && self.llm.api_key.trim().is_empty() {
            return Err(QaError::Config(
                "an API key is required (set GOOGLE_API_KEY)".to_string(),
            ));
        }
        if self.ingestion.chunk_size == 0 {
            return Err(QaError::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.ingestion.chunk_overlap >= self.ingestion.chunk_size {
            return Err(QaError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.ingestion.chunk_overlap, self.ingestion.chunk_size
            )));
        }
        if self.retrieval.search_limit == 0 {
            return Err(QaError::Config("search_limit must be greater than zero".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(QaError::Config("retry max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }
}
