use crate::error::QaError;
use crate::traits::{CollectionInfo, Distance, ScoredPoint, VectorPoint, VectorStore};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info};

const BACKEND: &str = "qdrant";

/// Qdrant over its REST API.
pub struct QdrantStore {
    endpoint: String,
    client: Client,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, QaError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(QaError::Http)?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn collection_url(&self, name: &str) -> String {
        format!("{}/collections/{}", self.endpoint, name)
    }

    async fn check(response: Response) -> Result<Response, QaError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let details = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|parsed| {
                parsed
                    .pointer("/status/error")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or(body);

        Err(QaError::provider(BACKEND, status.as_u16(), details))
    }

    async fn delete_collection(&self, name: &str) -> Result<(), QaError> {
        let response = self
            .client
            .delete(self.collection_url(name))
            .send()
            .await
            .map_err(|error| QaError::from_transport(BACKEND, error))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }
}

fn parse_distance(value: &str) -> Option<Distance> {
    match value {
        "Cosine" => Some(Distance::Cosine),
        "Dot" => Some(Distance::Dot),
        "Euclid" => Some(Distance::Euclid),
        _ => None,
    }
}

pub(crate) fn parse_collection_info(body: &Value) -> Result<CollectionInfo, QaError> {
    let vectors = body
        .pointer("/result/config/params/vectors")
        .ok_or_else(|| QaError::provider(BACKEND, 200, "collection info has no vector params"))?;

    let dimensions = vectors
        .pointer("/size")
        .and_then(Value::as_u64)
        .ok_or_else(|| QaError::provider(BACKEND, 200, "collection info has no vector size"))?;

    let distance = vectors
        .pointer("/distance")
        .and_then(Value::as_str)
        .and_then(parse_distance)
        .ok_or_else(|| QaError::provider(BACKEND, 200, "collection info has no distance"))?;

    Ok(CollectionInfo {
        dimensions: dimensions as usize,
        distance,
    })
}

pub(crate) fn parse_search_hits(body: &Value) -> Vec<ScoredPoint> {
    let hits = body
        .pointer("/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    hits.into_iter()
        .map(|hit| {
            let id = match hit.pointer("/id") {
                Some(Value::String(id)) => id.clone(),
                Some(Value::Number(id)) => id.to_string(),
                _ => String::new(),
            };
            let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
            let payload = hit.get("payload").cloned().unwrap_or(Value::Null);
            ScoredPoint { id, score, payload }
        })
        .collect()
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn health(&self) -> Result<(), QaError> {
        let response = self
            .client
            .get(format!("{}/", self.endpoint))
            .send()
            .await
            .map_err(|error| {
                error!(endpoint = %self.endpoint, error = %error, "connect error with qdrant");
                QaError::from_transport(BACKEND, error)
            })?;
        Self::check(response).await?;
        info!(endpoint = %self.endpoint, "connected to qdrant");
        Ok(())
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, QaError> {
        let response = self
            .client
            .get(self.collection_url(name))
            .send()
            .await
            .map_err(|error| QaError::from_transport(BACKEND, error))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(QaError::CollectionNotFound(name.to_string()));
        }

        let body: Value = Self::check(response).await?.json().await.map_err(QaError::Http)?;
        parse_collection_info(&body)
    }

    async fn create_collection(&self, name: &str, info: CollectionInfo) -> Result<(), QaError> {
        let response = self
            .client
            .put(self.collection_url(name))
            .json(&json!({
                "vectors": {
                    "size": info.dimensions,
                    "distance": info.distance.as_str(),
                }
            }))
            .send()
            .await
            .map_err(|error| QaError::from_transport(BACKEND, error))?;

        Self::check(response).await?;
        debug!(collection = name, dimensions = info.dimensions, "created qdrant collection");
        Ok(())
    }

    async fn recreate_collection(&self, name: &str, info: CollectionInfo) -> Result<(), QaError> {
        self.delete_collection(name).await?;
        self.create_collection(name, info).await
    }

    async fn upsert(&self, name: &str, points: Vec<VectorPoint>) -> Result<(), QaError> {
        if points.is_empty() {
            return Ok(());
        }

        let count = points.len();
        let points = points
            .into_iter()
            .map(|point| {
                json!({
                    "id": point.id,
                    "vector": point.vector,
                    "payload": point.payload,
                })
            })
            .collect::<Vec<_>>();

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url(name)))
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(|error| QaError::from_transport(BACKEND, error))?;

        Self::check(response).await?;
        debug!(collection = name, count, "upserted points to qdrant");
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, QaError> {
        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url(name)))
            .json(&json!({
                "vector": vector,
                "limit": limit,
                "with_payload": true,
            }))
            .send()
            .await
            .map_err(|error| QaError::from_transport(BACKEND, error))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(QaError::CollectionNotFound(name.to_string()));
        }

        let parsed: Value = Self::check(response).await?.json().await.map_err(QaError::Http)?;
        Ok(parse_search_hits(&parsed))
    }
}
