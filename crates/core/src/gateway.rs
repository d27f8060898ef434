//! Gateway between the pipelines and the vector store: collection lifecycle,
//! embedding and storage of documents, similarity search.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::CollectionPolicy;
use crate::embeddings::Embedder;
use crate::error::QaError;
use crate::models::{Collection, Document, DocumentMetadata, StoreInput};
use crate::retry::RetryPolicy;
use crate::traits::{CollectionInfo, Distance, VectorPoint, VectorStore};

/// Input embedded to learn the provider's vector size.
const CANARY: &str = "test";

pub struct VectorGateway {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    policy: CollectionPolicy,
    retry: RetryPolicy,
    search_limit: usize,
}

impl VectorGateway {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            policy: CollectionPolicy::default(),
            retry: RetryPolicy::default(),
            search_limit: 10,
        }
    }

    pub fn with_policy(mut self, policy: CollectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit.max(1);
        self
    }

    pub async fn connect(&self) -> Result<(), QaError> {
        self.retry
            .run("connect", || self.store.health())
            .await
            .map_err(|error| {
                error!(backend = self.store.backend(), error = %error, "vector store unreachable");
                error
            })
    }

    async fn embedding_dimensions(&self) -> Result<usize, QaError> {
        let dimensions = self.embedder.embed_query(CANARY).await?.len();
        if dimensions == 0 {
            return Err(QaError::Validation(
                "embedding provider returned an empty vector".to_string(),
            ));
        }
        Ok(dimensions)
    }

    /// Drops and recreates all three collections with cosine distance and the
    /// measured embedding size. Every stored vector is lost.
    pub async fn ensure_collections(&self) -> Result<usize, QaError> {
        warn!("recreating all collections; stored vectors will be dropped");
        let mut dimensions = 0;

        for collection in Collection::ALL {
            dimensions = self.embedding_dimensions().await?;
            let info = CollectionInfo {
                dimensions,
                distance: Distance::Cosine,
            };
            self.retry
                .run("recreate_collection", || {
                    self.store.recreate_collection(collection.name(), info)
                })
                .await
                .map_err(|error| {
                    error!(%collection, error = %error, "error creating collection");
                    error
                })?;
            info!(%collection, dimensions, "created collection");
        }

        Ok(dimensions)
    }

    async fn create_missing(&self, collection: Collection) -> Result<(), QaError> {
        let info = CollectionInfo {
            dimensions: self.embedding_dimensions().await?,
            distance: Distance::Cosine,
        };
        self.retry
            .run("create_collection", || {
                self.store.create_collection(collection.name(), info)
            })
            .await?;
        info!(%collection, dimensions = info.dimensions, "created collection");
        Ok(())
    }

    /// Confirms `collection` exists, creating it according to the configured
    /// policy when it does not. Returns its current layout.
    pub async fn check_collection(&self, collection: Collection) -> Result<CollectionInfo, QaError> {
        let lookup = self
            .retry
            .run("collection_info", || self.store.collection_info(collection.name()))
            .await;

        match lookup {
            Ok(info) => {
                info!(%collection, "collection exists");
                Ok(info)
            }
            Err(QaError::CollectionNotFound(_)) => {
                warn!(%collection, policy = ?self.policy, "collection does not exist");
                match self.policy {
                    CollectionPolicy::PerCollection => self.create_missing(collection).await?,
                    CollectionPolicy::RecreateAll => {
                        self.ensure_collections().await?;
                    }
                }
                self.retry
                    .run("collection_info", || self.store.collection_info(collection.name()))
                    .await
            }
            Err(error) => {
                error!(%collection, error = %error, "error checking collection");
                Err(error)
            }
        }
    }

    /// Embeds and stores `input` in `collection`, returning the identifier
    /// assigned to each stored item in input order.
    pub async fn store_embeddings(
        &self,
        input: impl Into<StoreInput>,
        collection: Collection,
    ) -> Result<Vec<String>, QaError> {
        let documents = prepare_documents(input.into())?;
        let info = self.check_collection(collection).await?;

        let texts: Vec<&str> = documents.iter().map(|doc| doc.content.as_str()).collect();
        let vectors = self.embedder.embed_documents(&texts).await.map_err(|error| {
            error!(%collection, error = %error, "embedding failed");
            error
        })?;

        if vectors.len() != documents.len() {
            return Err(QaError::Parse(format!(
                "embedding count {} doesn't match document count {}",
                vectors.len(),
                documents.len()
            )));
        }

        let points = documents
            .iter()
            .zip(vectors)
            .map(|(document, vector)| {
                if vector.len() != info.dimensions {
                    return Err(QaError::Validation(format!(
                        "embedding dimension {} != {} for collection {}",
                        vector.len(),
                        info.dimensions,
                        collection
                    )));
                }
                Ok(VectorPoint {
                    id: document.metadata.id.clone(),
                    vector,
                    payload: json!({
                        "page_content": document.content,
                        "metadata": document.metadata,
                    }),
                })
            })
            .collect::<Result<Vec<_>, QaError>>()?;

        self.retry
            .run("upsert", || self.store.upsert(collection.name(), points.clone()))
            .await
            .map_err(|error| {
                error!(%collection, error = %error, "error storing embeddings");
                error
            })?;

        info!(%collection, count = documents.len(), "saved successfully");
        Ok(documents.into_iter().map(|doc| doc.metadata.id).collect())
    }

    /// Nearest stored documents to `question`, annotated with their score
    /// and originating collection.
    pub async fn search(&self, collection: Collection, question: &str) -> Result<Vec<Document>, QaError> {
        let vector = self.embedder.embed_query(question).await?;
        let hits = self
            .retry
            .run("search", || {
                self.store.search(collection.name(), &vector, self.search_limit)
            })
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let mut metadata = hit
                    .payload
                    .get("metadata")
                    .cloned()
                    .and_then(|value| serde_json::from_value::<DocumentMetadata>(value).ok())
                    .unwrap_or_default();
                if metadata.id.is_empty() {
                    metadata.id = hit.id;
                }
                metadata.score = Some(hit.score);
                metadata.collection = Some(collection);

                Document {
                    content: hit
                        .payload
                        .get("page_content")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    metadata,
                }
            })
            .collect())
    }
}

/// Normalizes storage input into documents with fresh identifiers.
fn prepare_documents(input: StoreInput) -> Result<Vec<Document>, QaError> {
    match input {
        StoreInput::Text(text) => {
            if text.trim().is_empty() {
                return Err(QaError::Validation("cannot store empty text".to_string()));
            }
            Ok(vec![Document::new(text)])
        }
        StoreInput::Chunks(chunks) => {
            if chunks.is_empty() {
                return Err(QaError::Validation("no chunks to store".to_string()));
            }
            chunks
                .into_iter()
                .enumerate()
                .map(|(index, chunk)| {
                    if chunk.content.trim().is_empty() {
                        return Err(QaError::Validation(format!("chunk {index} has no content")));
                    }
                    let mut document = Document::new(chunk.content);
                    document.metadata.page = chunk.metadata.page;
                    document.metadata.source = chunk.metadata.source;
                    Ok(document)
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::stores::InMemoryVectorStore;
    use crate::test_support::FaultyStore;
    use std::collections::HashSet;

    fn gateway(store: Arc<InMemoryVectorStore>) -> VectorGateway {
        VectorGateway::new(store, Arc::new(CharacterNgramEmbedder { dimensions: 24 }))
            .with_retry(RetryPolicy::none())
    }

    #[tokio::test]
    async fn ensure_collections_creates_three_cosine_collections() -> Result<(), QaError> {
        let store = Arc::new(InMemoryVectorStore::new());
        let dimensions = gateway(store.clone()).ensure_collections().await?;

        assert_eq!(dimensions, 24);
        assert_eq!(
            store.collection_names().await,
            vec!["Documents", "Splited_text", "Summary"]
        );
        for collection in Collection::ALL {
            let info = store.collection_info(collection.name()).await?;
            assert_eq!(info.dimensions, dimensions);
            assert_eq!(info.distance, Distance::Cosine);
        }
        Ok(())
    }

    #[tokio::test]
    async fn checking_an_existing_collection_has_no_side_effects() -> Result<(), QaError> {
        let store = Arc::new(InMemoryVectorStore::new());
        let gateway = gateway(store.clone());
        gateway.store_embeddings("kept", Collection::Summary).await?;
        let creations = store.creation_count();

        let first = gateway.check_collection(Collection::Summary).await?;
        let second = gateway.check_collection(Collection::Summary).await?;

        assert_eq!(first, second);
        assert_eq!(store.creation_count(), creations);
        assert_eq!(store.point_count("Summary").await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn missing_collection_is_created_alone_by_default() -> Result<(), QaError> {
        let store = Arc::new(InMemoryVectorStore::new());
        let gateway = gateway(store.clone());
        gateway.store_embeddings("summary", Collection::Summary).await?;
        gateway.check_collection(Collection::Documents).await?;

        assert_eq!(store.collection_names().await, vec!["Documents", "Summary"]);
        assert_eq!(store.point_count("Summary").await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn recreate_all_policy_drops_every_collection() -> Result<(), QaError> {
        let store = Arc::new(InMemoryVectorStore::new());
        let gateway = gateway(store.clone()).with_policy(CollectionPolicy::RecreateAll);
        gateway.store_embeddings("summary", Collection::Summary).await?;
        assert_eq!(store.collection_names().await.len(), 3);

        store.drop_collection("Documents").await;
        gateway.check_collection(Collection::Documents).await?;

        assert_eq!(store.collection_names().await.len(), 3);
        assert_eq!(store.point_count("Summary").await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn layout_read_after_creation_is_retried() -> Result<(), QaError> {
        let store = Arc::new(FaultyStore::failing_info_call(2));
        let gateway = VectorGateway::new(
            store.clone(),
            Arc::new(CharacterNgramEmbedder { dimensions: 24 }),
        )
        .with_retry(RetryPolicy {
            max_attempts: 2,
            initial_backoff_ms: 0,
        });

        let info = gateway.check_collection(Collection::Summary).await?;

        assert_eq!(info.dimensions, 24);
        assert_eq!(store.info_calls(), 3);
        assert_eq!(store.inner.collection_names().await, vec!["Summary"]);
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_store_fails_without_creating_collections() {
        let store = Arc::new(InMemoryVectorStore::new());
        store.set_unreachable(true);

        let result = gateway(store.clone())
            .check_collection(Collection::Summary)
            .await;

        assert!(matches!(result, Err(QaError::Connection { .. })));
        store.set_unreachable(false);
        assert!(store.collection_names().await.is_empty());
        assert_eq!(store.creation_count(), 0);
    }

    #[tokio::test]
    async fn storing_same_text_twice_yields_distinct_ids() -> Result<(), QaError> {
        let store = Arc::new(InMemoryVectorStore::new());
        let gateway = gateway(store.clone());

        let first = gateway.store_embeddings("same content", Collection::Summary).await?;
        let second = gateway.store_embeddings("same content", Collection::Summary).await?;

        assert_eq!(first.len(), 1);
        assert_ne!(first, second);
        assert_eq!(store.point_count("Summary").await, 2);
        Ok(())
    }

    #[tokio::test]
    async fn chunks_get_unique_ids_and_keep_pages() -> Result<(), QaError> {
        let store = Arc::new(InMemoryVectorStore::new());
        let gateway = gateway(store.clone());
        let chunks = vec![
            Document::new("alpha chunk").with_page(1),
            Document::new("alpha chunk").with_page(2),
            Document::new("gamma chunk").with_page(2),
        ];
        let original_ids: HashSet<String> = chunks.iter().map(|c| c.id().to_string()).collect();

        let ids = gateway.store_embeddings(chunks, Collection::SplitedText).await?;

        let unique: HashSet<_> = ids.iter().cloned().collect();
        assert_eq!(unique.len(), 3);
        assert!(unique.is_disjoint(&original_ids));

        let pages: Vec<_> = store
            .payloads("Splited_text")
            .await
            .iter()
            .map(|payload| payload["metadata"]["page"].as_u64())
            .collect();
        assert_eq!(pages, vec![Some(1), Some(2), Some(2)]);
        Ok(())
    }

    #[tokio::test]
    async fn unsupported_inputs_are_validation_failures() {
        let gateway = gateway(Arc::new(InMemoryVectorStore::new()));

        let blank = gateway.store_embeddings("   ", Collection::Summary).await;
        let empty = gateway
            .store_embeddings(Vec::<Document>::new(), Collection::SplitedText)
            .await;
        let hollow = gateway
            .store_embeddings(vec![Document::new("")], Collection::SplitedText)
            .await;

        assert!(matches!(blank, Err(QaError::Validation(_))));
        assert!(matches!(empty, Err(QaError::Validation(_))));
        assert!(matches!(hollow, Err(QaError::Validation(_))));
    }

    #[tokio::test]
    async fn search_annotates_score_and_collection() -> Result<(), QaError> {
        let store = Arc::new(InMemoryVectorStore::new());
        let gateway = gateway(store);
        gateway
            .store_embeddings(
                vec![Document::new("the pump runs at 40 bar").with_page(3)],
                Collection::SplitedText,
            )
            .await?;

        let hits = gateway
            .search(Collection::SplitedText, "pump pressure")
            .await?;

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "the pump runs at 40 bar");
        assert_eq!(hits[0].metadata.page, Some(3));
        assert_eq!(hits[0].metadata.collection, Some(Collection::SplitedText));
        assert!(hits[0].metadata.score.is_some());
        Ok(())
    }
}
