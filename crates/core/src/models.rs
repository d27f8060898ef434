use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::QaError;

/// The three fixed partitions of the vector store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    #[serde(rename = "Documents")]
    Documents,
    #[serde(rename = "Summary")]
    Summary,
    #[serde(rename = "Splited_text")]
    SplitedText,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Documents,
        Collection::Summary,
        Collection::SplitedText,
    ];

    /// Collections searched at question time. Full documents are stored but
    /// never queried.
    pub const RETRIEVAL_TARGETS: [Collection; 2] = [Collection::Summary, Collection::SplitedText];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Documents => "Documents",
            Collection::Summary => "Summary",
            Collection::SplitedText => "Splited_text",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = QaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|collection| collection.name() == value)
            .ok_or_else(|| QaError::Validation(format!("unknown collection: {value}")))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<Collection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Creates a document with a fresh random identifier.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: DocumentMetadata {
                id: Uuid::new_v4().to_string(),
                ..DocumentMetadata::default()
            },
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.metadata.page = Some(page);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = Some(source.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }
}

/// What can be handed to the gateway for storage.
#[derive(Debug, Clone)]
pub enum StoreInput {
    Text(String),
    Chunks(Vec<Document>),
}

impl From<String> for StoreInput {
    fn from(value: String) -> Self {
        StoreInput::Text(value)
    }
}

impl From<&str> for StoreInput {
    fn from(value: &str) -> Self {
        StoreInput::Text(value.to_string())
    }
}

impl From<Vec<Document>> for StoreInput {
    fn from(value: Vec<Document>) -> Self {
        StoreInput::Chunks(value)
    }
}

/// Everything retrieved for one question, keyed by collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalBundle {
    pub question: String,
    pub buckets: BTreeMap<Collection, Vec<Document>>,
}

impl RetrievalBundle {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            buckets: BTreeMap::new(),
        }
    }

    pub fn bucket(&self, collection: Collection) -> &[Document] {
        self.buckets
            .get(&collection)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn passage_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn passages(&self) -> impl Iterator<Item = &Document> {
        self.buckets.values().flatten()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub question: String,
    pub expanded: Vec<String>,
    pub context: Vec<RetrievalBundle>,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Concatenated page length above which summarization logs a warning.
    pub summary_char_budget: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            summary_char_budget: 400_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    /// Stop the batch at the first file that fails.
    FailFast,
    /// Record failing files and keep going.
    BestEffort,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredPdf {
    pub file_name: String,
    pub checksum: String,
    pub page_ids: Vec<String>,
    pub summary_ids: Vec<String>,
    pub chunk_ids: Vec<String>,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedPdf {
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionReport {
    pub stored: Vec<StoredPdf>,
    pub skipped_files: Vec<SkippedPdf>,
}
