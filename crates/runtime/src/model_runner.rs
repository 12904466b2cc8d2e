//! The pluggable LLM boundary (spec §1 "Out of scope: the LLM invocation
//! itself ... a pluggable `ModelRunner` returning a stream of token/tool-call
//! chunks").
//!
//! No example repo in the pack ships a real model client worth grounding
//! this on (the teacher's `llm.rs` was an embeddings client, not a chat
//! completion loop, and was dropped — see DESIGN.md), so this module
//! defines the trait boundary plus a deterministic `EchoModelRunner` for
//! tests and local development, in the same "thin trait + stub impl"
//! shape the teacher uses for its storage adapters.

use async_trait::async_trait;
use futures::stream::BoxStream;
use zerg_common::{CoreError, Message};

#[derive(Debug, Clone)]
pub enum ModelChunk {
    AssistantToken { text: String },
    ToolCall { name: String, args: serde_json::Value, call_id: String },
    End,
}

#[async_trait]
pub trait ModelRunner: Send + Sync {
    async fn run(
        &self,
        messages: &[Message],
        tool_allowlist: &[String],
    ) -> Result<BoxStream<'static, ModelChunk>, CoreError>;
}

/// Echoes the last user message back as assistant tokens, word by word.
/// Never issues tool calls. Useful as the default `ModelRunner` until a
/// real provider client is wired in.
pub struct EchoModelRunner;

#[async_trait]
impl ModelRunner for EchoModelRunner {
    async fn run(
        &self,
        messages: &[Message],
        _tool_allowlist: &[String],
    ) -> Result<BoxStream<'static, ModelChunk>, CoreError> {
        let last_user_text = messages
            .iter()
            .rev()
            .find(|m| m.role == zerg_common::MessageRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let words: Vec<String> = last_user_text
            .split_whitespace()
            .map(|w| format!("{w} "))
            .collect();

        let stream = futures::stream::iter(
            words
                .into_iter()
                .map(|text| ModelChunk::AssistantToken { text })
                .chain(std::iter::once(ModelChunk::End)),
        );
        Ok(Box::pin(stream))
    }
}
