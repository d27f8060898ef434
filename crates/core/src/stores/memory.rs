//! In-process vector store with cosine scoring, for tests and local runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::error::QaError;
use crate::traits::{CollectionInfo, ScoredPoint, VectorPoint, VectorStore};

const BACKEND: &str = "memory";

#[derive(Debug)]
struct StoredCollection {
    info: CollectionInfo,
    points: Vec<VectorPoint>,
}

#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, StoredCollection>>,
    unreachable: AtomicBool,
    searches: AtomicUsize,
    creations: AtomicUsize,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    f64::from(dot / (norm_a * norm_b))
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail as if the server were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    /// Number of create/recreate calls served so far.
    pub fn creation_count(&self) -> usize {
        self.creations.load(Ordering::SeqCst)
    }

    pub async fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.collections.read().await.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Removes a collection behind the gateway's back.
    pub async fn drop_collection(&self, name: &str) -> bool {
        self.collections.write().await.remove(name).is_some()
    }

    pub async fn point_count(&self, name: &str) -> usize {
        self.collections
            .read()
            .await
            .get(name)
            .map(|collection| collection.points.len())
            .unwrap_or(0)
    }

    pub async fn payloads(&self, name: &str) -> Vec<serde_json::Value> {
        self.collections
            .read()
            .await
            .get(name)
            .map(|collection| {
                collection
                    .points
                    .iter()
                    .map(|point| point.payload.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn reachable(&self) -> Result<(), QaError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(QaError::Connection {
                backend: BACKEND.to_string(),
                details: "store marked unreachable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn health(&self) -> Result<(), QaError> {
        self.reachable()
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, QaError> {
        self.reachable()?;
        self.collections
            .read()
            .await
            .get(name)
            .map(|collection| collection.info)
            .ok_or_else(|| QaError::CollectionNotFound(name.to_string()))
    }

    async fn create_collection(&self, name: &str, info: CollectionInfo) -> Result<(), QaError> {
        self.reachable()?;
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(QaError::provider(
                BACKEND,
                409,
                format!("collection {name} already exists"),
            ));
        }
        collections.insert(
            name.to_string(),
            StoredCollection {
                info,
                points: Vec::new(),
            },
        );
        self.creations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn recreate_collection(&self, name: &str, info: CollectionInfo) -> Result<(), QaError> {
        self.reachable()?;
        self.collections.write().await.insert(
            name.to_string(),
            StoredCollection {
                info,
                points: Vec::new(),
            },
        );
        self.creations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<VectorPoint>) -> Result<(), QaError> {
        self.reachable()?;
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| QaError::CollectionNotFound(name.to_string()))?;

        for point in points {
            if point.vector.len() != collection.info.dimensions {
                return Err(QaError::provider(
                    BACKEND,
                    400,
                    format!(
                        "vector dimension {} != {}",
                        point.vector.len(),
                        collection.info.dimensions
                    ),
                ));
            }
            collection.points.retain(|existing| existing.id != point.id);
            collection.points.push(point);
        }
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, QaError> {
        self.reachable()?;
        self.searches.fetch_add(1, Ordering::SeqCst);
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| QaError::CollectionNotFound(name.to_string()))?;

        let mut scored: Vec<ScoredPoint> = collection
            .points
            .iter()
            .map(|point| ScoredPoint {
                id: point.id.clone(),
                score: cosine_similarity(vector, &point.vector),
                payload: point.payload.clone(),
            })
            .collect();
        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(limit);
        Ok(scored)
    }
}
