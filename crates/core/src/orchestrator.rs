//! Wires the pipelines together behind the two user-facing actions: asking
//! a question and ingesting PDFs.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::AppConfig;
use crate::embeddings::{CharacterNgramEmbedder, Embedder, GeminiEmbedder};
use crate::error::{IngestError, QaError};
use crate::expansion::QuestionExpander;
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::gateway::VectorGateway;
use crate::ingest::{IngestionPipeline, UploadedPdf};
use crate::llm::{GeminiChatModel, LanguageModel};
use crate::models::{ChatAnswer, IngestMode, IngestionReport};
use crate::prompt::PromptBuilder;
use crate::retrieval::RetrievalFanOut;
use crate::stores::QdrantStore;
use crate::summarize::Summarizer;
use crate::synthesis::AnswerSynthesizer;
use crate::traits::VectorStore;

/// Builds the Qdrant-backed gateway. With `offline` set, embeddings are
/// computed locally and no embedding API is called.
pub fn build_gateway(config: &AppConfig, offline: bool) -> Result<Arc<VectorGateway>, QaError> {
    let store: Arc<dyn VectorStore> = Arc::new(QdrantStore::new(
        config.qdrant.url.clone(),
        Duration::from_secs(config.qdrant.timeout_secs),
    )?);
    let embedder: Arc<dyn Embedder> = if offline {
        Arc::new(CharacterNgramEmbedder::default())
    } else {
        Arc::new(GeminiEmbedder::new(&config.llm, config.retry)?)
    };
    Ok(Arc::new(gateway_for(config, store, embedder)))
}

fn gateway_for(
    config: &AppConfig,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
) -> VectorGateway {
    VectorGateway::new(store, embedder)
        .with_policy(config.collection_policy)
        .with_retry(config.retry)
        .with_search_limit(config.retrieval.search_limit)
}

pub struct Chatbot {
    gateway: Arc<VectorGateway>,
    expander: QuestionExpander,
    retrieval: RetrievalFanOut,
    synthesizer: AnswerSynthesizer,
    ingestion: IngestionPipeline,
}

impl Chatbot {
    pub fn new(
        config: &AppConfig,
        gateway: Arc<VectorGateway>,
        llm: Arc<dyn LanguageModel>,
        extractor: Arc<dyn PdfExtractor>,
    ) -> Result<Self, IngestError> {
        let prompts = PromptBuilder::new();
        let summarizer = Summarizer::new(
            Arc::clone(&llm),
            prompts,
            config.ingestion.summary_char_budget,
        );

        Ok(Self {
            expander: QuestionExpander::new(Arc::clone(&llm), prompts, config.expansion.variants),
            retrieval: RetrievalFanOut::new(Arc::clone(&gateway)),
            synthesizer: AnswerSynthesizer::new(
                llm,
                prompts,
                config.synthesis.context_warn_chars,
            ),
            ingestion: IngestionPipeline::new(
                Arc::clone(&gateway),
                summarizer,
                extractor,
                &config.ingestion,
            )?,
            gateway,
        })
    }

    /// Gemini for chat, Qdrant for storage, lopdf for parsing.
    pub fn from_config(config: &AppConfig, offline: bool) -> Result<Self, IngestError> {
        let gateway = build_gateway(config, offline)?;
        let llm: Arc<dyn LanguageModel> =
            Arc::new(GeminiChatModel::new(&config.llm, config.retry)?);
        Self::new(config, gateway, llm, Arc::new(LopdfExtractor))
    }

    pub async fn connect(&self) -> Result<(), QaError> {
        self.gateway.connect().await
    }

    /// Expands the question, retrieves passages for every variant and
    /// answers from all of them.
    pub async fn answer(&self, question: &str) -> Result<ChatAnswer, QaError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QaError::Validation("question is empty".to_string()));
        }

        let expanded = self.expander.expand(question).await?;
        let context = self.retrieval.retrieve_all(&expanded).await?;
        let answer = self.synthesizer.synthesize(&context, question).await?;

        info!(
            variants = expanded.len(),
            bundles = context.len(),
            "question answered"
        );
        Ok(ChatAnswer {
            question: question.to_string(),
            expanded,
            context,
            answer,
        })
    }

    pub async fn ingest(
        &self,
        files: &[UploadedPdf],
        mode: IngestMode,
    ) -> Result<IngestionReport, IngestError> {
        match mode {
            IngestMode::FailFast => self.ingestion.load_and_store(files).await,
            IngestMode::BestEffort => self.ingestion.load_and_store_best_effort(files).await,
        }
    }
}
