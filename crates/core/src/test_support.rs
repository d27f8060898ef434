use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::QaError;
use crate::llm::{ChatMessage, LanguageModel};
use crate::stores::InMemoryVectorStore;
use crate::traits::{CollectionInfo, ScoredPoint, VectorPoint, VectorStore};

type Reply = dyn Fn(&[ChatMessage]) -> Result<String, QaError> + Send + Sync;

/// Language model double that answers through a closure and records every
/// conversation it was sent.
pub struct ScriptedModel {
    reply: Box<Reply>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn new(
        reply: impl Fn(&[ChatMessage]) -> Result<String, QaError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            reply: Box::new(reply),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn fixed(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, QaError> {
        match self.calls.lock() {
            Ok(mut calls) => calls.push(messages.to_vec()),
            Err(poisoned) => poisoned.into_inner().push(messages.to_vec()),
        }
        (self.reply)(messages)
    }
}

/// Wraps the in-memory store and injects failures into chosen calls.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: InMemoryVectorStore,
    rejected_upserts: Option<String>,
    failing_info_call: Option<usize>,
    info_calls: AtomicUsize,
}

impl FaultyStore {
    /// Every upsert into `collection` fails with a non-retryable 400.
    pub fn rejecting_upserts_to(collection: &str) -> Self {
        Self {
            rejected_upserts: Some(collection.to_string()),
            ..Self::default()
        }
    }

    /// The `call`-th `collection_info` request (1-based) fails with a 503.
    pub fn failing_info_call(call: usize) -> Self {
        Self {
            failing_info_call: Some(call),
            ..Self::default()
        }
    }

    pub fn info_calls(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for FaultyStore {
    fn backend(&self) -> &str {
        "faulty"
    }

    async fn health(&self) -> Result<(), QaError> {
        self.inner.health().await
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, QaError> {
        let call = self.info_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_info_call == Some(call) {
            return Err(QaError::provider("faulty", 503, "temporarily unavailable"));
        }
        self.inner.collection_info(name).await
    }

    async fn create_collection(&self, name: &str, info: CollectionInfo) -> Result<(), QaError> {
        self.inner.create_collection(name, info).await
    }

    async fn recreate_collection(&self, name: &str, info: CollectionInfo) -> Result<(), QaError> {
        self.inner.recreate_collection(name, info).await
    }

    async fn upsert(&self, name: &str, points: Vec<VectorPoint>) -> Result<(), QaError> {
        if self.rejected_upserts.as_deref() == Some(name) {
            return Err(QaError::provider("faulty", 400, format!("upsert into {name} rejected")));
        }
        self.inner.upsert(name, points).await
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, QaError> {
        self.inner.search(name, vector, limit).await
    }
}
