use std::sync::Arc;
use tracing::{info, warn};

use crate::error::QaError;
use crate::llm::LanguageModel;
use crate::models::RetrievalBundle;
use crate::prompt::PromptBuilder;

pub struct AnswerSynthesizer {
    llm: Arc<dyn LanguageModel>,
    prompts: PromptBuilder,
    context_warn_chars: usize,
}

impl AnswerSynthesizer {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        prompts: PromptBuilder,
        context_warn_chars: usize,
    ) -> Self {
        Self {
            llm,
            prompts,
            context_warn_chars,
        }
    }

    /// Answers `question` from every retrieved passage. The context is sent
    /// whole even when it is large.
    pub async fn synthesize(
        &self,
        context: &[RetrievalBundle],
        question: &str,
    ) -> Result<String, QaError> {
        let rendered = self.prompts.render_context(context);
        let context_chars = rendered.chars().count();
        if context_chars > self.context_warn_chars {
            warn!(
                context_chars,
                limit = self.context_warn_chars,
                "answer context is very large"
            );
        }

        let messages = self.prompts.answer_messages(&rendered, question);
        let answer = self.llm.complete(&messages).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(QaError::Parse(format!(
                "{} returned an empty answer",
                self.llm.name()
            )));
        }

        info!(
            passages = context.iter().map(RetrievalBundle::passage_count).sum::<usize>(),
            "answer synthesized"
        );
        Ok(answer.to_string())
    }
}
