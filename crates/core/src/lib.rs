pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod expansion;
pub mod extractor;
pub mod gateway;
pub mod gemini;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod retrieval;
pub mod retry;
pub mod stores;
pub mod summarize;
pub mod synthesis;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use chunking::{normalize_whitespace, split_documents, split_text, ChunkingConfig};
pub use config::{
    AppConfig, CollectionPolicy, ExpansionOptions, LlmConfig, QdrantConfig, RetrievalOptions,
    SynthesisOptions,
};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, GeminiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{IngestError, QaError};
pub use expansion::{parse_question_list, QuestionExpander};
pub use extractor::{LopdfExtractor, PageText, PdfExtractor};
pub use gateway::VectorGateway;
pub use ingest::{discover_pdf_files, digest_bytes, IngestionPipeline, UploadedPdf};
pub use llm::{ChatMessage, GeminiChatModel, LanguageModel, Role};
pub use models::{
    ChatAnswer, Collection, Document, DocumentMetadata, IngestMode, IngestionOptions,
    IngestionReport, RetrievalBundle, SkippedPdf, StoreInput, StoredPdf,
};
pub use orchestrator::{build_gateway, Chatbot};
pub use prompt::PromptBuilder;
pub use retrieval::RetrievalFanOut;
pub use retry::RetryPolicy;
pub use stores::{InMemoryVectorStore, QdrantStore};
pub use summarize::Summarizer;
pub use synthesis::AnswerSynthesizer;
pub use traits::{CollectionInfo, Distance, ScoredPoint, VectorPoint, VectorStore};
