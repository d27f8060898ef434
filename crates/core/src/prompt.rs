//! Prompt templates for question expansion, page summarization and answer
//! synthesis.

use crate::llm::ChatMessage;
use crate::models::{Document, RetrievalBundle};

const ANSWER_RULES: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the questions. \
If you don't know the answer, say that you don't know. \
Keep the answer concise.";

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn expansion_messages(&self, question: &str, variants: usize) -> Vec<ChatMessage> {
        let prompt = format!(
            "You are an AI language model assistant. Your task is to generate {variants} \
different versions of the given user question to retrieve relevant documents from a vector \
database. By generating multiple perspectives on the user question, your goal is to help the \
user overcome some of the limitations of distance-based similarity search.\n\
Return only a JSON array of strings, including the original question first, for example:\n\
[\"What is the capital city of France?\", \"Which city is the capital of France?\"]\n\n\
Original question: {question}"
        );
        vec![ChatMessage::human(prompt)]
    }

    pub fn summary_messages(&self, pages: &[Document]) -> Vec<ChatMessage> {
        let text = pages
            .iter()
            .map(|page| page.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        vec![ChatMessage::human(format!(
            "Write a concise summary of the following:\n\n\"{text}\"\n\nCONCISE SUMMARY:"
        ))]
    }

    /// Every retrieved passage, verbatim, grouped per question and collection.
    pub fn render_context(&self, bundles: &[RetrievalBundle]) -> String {
        let mut blocks = Vec::new();
        for bundle in bundles {
            for (collection, documents) in &bundle.buckets {
                for document in documents {
                    blocks.push(format!(
                        "[{collection} | {}]\n{}",
                        bundle.question, document.content
                    ));
                }
            }
        }
        blocks.join("\n\n")
    }

    pub fn answer_messages(&self, context: &str, question: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(format!("{ANSWER_RULES}\n\nContext: {context}")),
            ChatMessage::human(format!(
                "Please answer the following questions based on the given context:\n\
{context}\n\nUser's next questions: {question}"
            )),
        ]
    }
}
