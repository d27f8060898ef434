use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QaError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Distance {
    Cosine,
    Dot,
    Euclid,
}

impl Distance {
    pub fn as_str(self) -> &'static str {
        match self {
            Distance::Cosine => "Cosine",
            Distance::Dot => "Dot",
            Distance::Euclid => "Euclid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionInfo {
    pub dimensions: usize,
    pub distance: Distance,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f64,
    pub payload: Value,
}

/// Storage and similarity search over named vector collections.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn backend(&self) -> &str;

    /// Confirms the store answers at all.
    async fn health(&self) -> Result<(), QaError>;

    /// Describes a collection, or fails with `QaError::CollectionNotFound`.
    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, QaError>;

    async fn create_collection(&self, name: &str, info: CollectionInfo) -> Result<(), QaError>;

    /// Drops `name` if present and creates it empty.
    async fn recreate_collection(&self, name: &str, info: CollectionInfo) -> Result<(), QaError>;

    async fn upsert(&self, name: &str, points: Vec<VectorPoint>) -> Result<(), QaError>;

    /// Nearest points to `vector`, best first.
    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, QaError>;
}
