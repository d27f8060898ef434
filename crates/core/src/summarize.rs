use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::QaError;
use crate::llm::LanguageModel;
use crate::models::Document;
use crate::prompt::PromptBuilder;

/// Condenses every page of a document into one summary with a single
/// model call.
pub struct Summarizer {
    llm: Arc<dyn LanguageModel>,
    prompts: PromptBuilder,
    char_budget: usize,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LanguageModel>, prompts: PromptBuilder, char_budget: usize) -> Self {
        Self {
            llm,
            prompts,
            char_budget,
        }
    }

    pub async fn summarize(&self, pages: &[Document]) -> Result<Document, QaError> {
        if pages.is_empty() {
            return Err(QaError::Validation(
                "cannot summarize a document without pages".to_string(),
            ));
        }

        let input_chars: usize = pages.iter().map(|page| page.content.chars().count()).sum();
        if input_chars > self.char_budget {
            warn!(
                input_chars,
                budget = self.char_budget,
                "summary input exceeds the configured budget; sending it whole"
            );
        }

        let messages = self.prompts.summary_messages(pages);
        let summary = self.llm.complete(&messages).await?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(QaError::Parse(format!(
                "{} returned an empty summary",
                self.llm.name()
            )));
        }
        debug!(pages = pages.len(), summary_chars = summary.len(), "summarized document");

        let mut document = Document::new(summary);
        document.metadata.source = pages[0].metadata.source.clone();
        Ok(document)
    }
}
