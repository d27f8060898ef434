use std::sync::Arc;
use tracing::debug;

use crate::error::QaError;
use crate::gateway::VectorGateway;
use crate::models::{Collection, RetrievalBundle};

/// Searches every retrieval collection for each question.
pub struct RetrievalFanOut {
    gateway: Arc<VectorGateway>,
}

impl RetrievalFanOut {
    pub fn new(gateway: Arc<VectorGateway>) -> Self {
        Self { gateway }
    }

    /// Searches the summaries and the chunks concurrently. The first failure
    /// fails the whole call.
    pub async fn retrieve(&self, question: &str) -> Result<RetrievalBundle, QaError> {
        let [first, second] = Collection::RETRIEVAL_TARGETS;
        let (first_hits, second_hits) = tokio::try_join!(
            self.gateway.search(first, question),
            self.gateway.search(second, question),
        )?;

        debug!(
            first_collection = %first,
            first_hits = first_hits.len(),
            second_collection = %second,
            second_hits = second_hits.len(),
            "retrieved passages"
        );
        let mut bundle = RetrievalBundle::new(question);
        bundle.buckets.insert(first, first_hits);
        bundle.buckets.insert(second, second_hits);
        Ok(bundle)
    }

    pub async fn retrieve_all(&self, questions: &[String]) -> Result<Vec<RetrievalBundle>, QaError> {
        let mut bundles = Vec::with_capacity(questions.len());
        for question in questions {
            bundles.push(self.retrieve(question).await?);
        }
        Ok(bundles)
    }
}
