use regex::Regex;
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::QaError;
use crate::llm::LanguageModel;
use crate::prompt::PromptBuilder;

/// Pulls the first JSON array of strings out of a model reply. Prose or
/// Markdown fences around the array are ignored, including bracketed text
/// after it.
pub fn parse_question_list(reply: &str) -> Result<Vec<String>, QaError> {
    let normalized = reply.replace(['\u{201c}', '\u{201d}'], "\"");
    let array_start_re =
        Regex::new(r#"\[\s*""#).map_err(|error| QaError::Parse(error.to_string()))?;
    let start = array_start_re
        .find(&normalized)
        .map(|found| found.start())
        .ok_or_else(|| QaError::Parse(format!("no JSON array in model reply: {reply}")))?;

    let questions = serde_json::Deserializer::from_str(&normalized[start..])
        .into_iter::<Vec<String>>()
        .next()
        .ok_or_else(|| QaError::Parse("question list is empty".to_string()))?
        .map_err(|error| QaError::Parse(format!("question list is not valid JSON: {error}")))?;

    let questions: Vec<String> = questions
        .into_iter()
        .map(|question| question.trim().to_string())
        .filter(|question| !question.is_empty())
        .collect();
    if questions.is_empty() {
        return Err(QaError::Parse("model returned an empty question list".to_string()));
    }
    Ok(questions)
}

fn same_question(left: &str, right: &str) -> bool {
    left.trim().to_lowercase() == right.trim().to_lowercase()
}

/// Rewrites a user question into several phrasings to widen recall.
pub struct QuestionExpander {
    llm: Arc<dyn LanguageModel>,
    prompts: PromptBuilder,
    variants: usize,
}

impl QuestionExpander {
    pub fn new(llm: Arc<dyn LanguageModel>, prompts: PromptBuilder, variants: usize) -> Self {
        Self {
            llm,
            prompts,
            variants,
        }
    }

    /// Returns the original question first, followed by at most `variants`
    /// distinct rewrites.
    pub async fn expand(&self, question: &str) -> Result<Vec<String>, QaError> {
        let question = question.trim();
        let messages = self.prompts.expansion_messages(question, self.variants);
        let reply = self.llm.complete(&messages).await?;

        let parsed = parse_question_list(&reply).map_err(|error| {
            error!(model = self.llm.name(), error = %error, "question expansion failed");
            error
        })?;

        let mut expanded = vec![question.to_string()];
        for candidate in parsed {
            if expanded.len() > self.variants {
                break;
            }
            if !expanded
                .iter()
                .any(|existing| same_question(existing, &candidate))
            {
                expanded.push(candidate);
            }
        }
        debug!(count = expanded.len(), "expanded question");
        Ok(expanded)
    }
}
