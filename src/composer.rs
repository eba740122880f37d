//! Turns retrieved posts plus a question into one chat-completion call.
use tracing::debug;

use crate::config::PromptConfig;
use crate::generator::{ChatClient, ChatMessage, GenerationError};
use crate::store::SearchResult;

/// Reply used when retrieval found nothing; no API call is made.
pub const NO_CONTEXT_ANSWER: &str =
    "I couldn't find any relevant posts in the database to answer your question.";

const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions based on forum post content. You will provide references to the forum posts in your answer.";

pub struct AnswerComposer {
    client: Box<dyn ChatClient>,
    max_post_chars: usize,
    max_context_chars: usize,
}

impl AnswerComposer {
    pub fn new(client: Box<dyn ChatClient>, prompt: &PromptConfig) -> Self {
        Self {
            client,
            max_post_chars: prompt.max_post_chars,
            max_context_chars: prompt.max_context_chars,
        }
    }

    /// Answer `question` from `results`.
    pub fn answer(
        &self,
        question: &str,
        results: &[SearchResult],
    ) -> Result<String, GenerationError> {
        if results.is_empty() {
            return Ok(NO_CONTEXT_ANSWER.to_string());
        }

        let messages = self.build_messages(question, results);
        self.client.complete(&messages)
    }

    /// System and user messages for one question.
    pub fn build_messages(&self, question: &str, results: &[SearchResult]) -> Vec<ChatMessage> {
        let context = self.build_context(results);
        let prompt = format!(
            "You are an AI assistant helping users find information from iRacing forum posts.\n\
             Based on the following forum posts, please answer the user's question. \
             If the posts don't contain enough information to answer the question, say so.\n\n\
             Forum Posts Context:\n{context}\n\
             User Question: {question}\n\n\
             Please provide a helpful answer based on the forum posts above. \
             If you reference specific posts, mention the author and date."
        );

        vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)]
    }

    /// Context block: each post truncated to `max_post_chars`, posts dropped
    /// once the block would exceed `max_context_chars`. The best match is
    /// always kept.
    fn build_context(&self, results: &[SearchResult]) -> String {
        let mut context = String::from(
            "Here are some relevant forum posts that might help answer your question:\n\n",
        );
        let header_len = context.len();

        for (i, result) in results.iter().enumerate() {
            let post = &result.post;
            let entry = format!(
                "Post {} (by {}, {}):\n{}\n\n",
                i + 1,
                post.author,
                post.display_date(),
                truncate_chars(&post.text, self.max_post_chars)
            );

            if i > 0 && context.len() - header_len + entry.len() > self.max_context_chars {
                debug!(kept = i, dropped = results.len() - i, "context budget reached");
                break;
            }
            context.push_str(&entry);
        }

        context
    }
}

/// First `max` characters of `text`, with `...` appended when cut.
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
