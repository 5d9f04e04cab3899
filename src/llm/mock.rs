//! Scripted LLM client for tests.
//!
//! Responses are consumed in order across every agent in the run, which is
//! deterministic because launches are synchronous: the orchestrator's call
//! sequence interleaves with each subagent's in a fixed order. Prompts are
//! recorded so tests can assert what each agent was shown.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{estimate_tokens, ChatMessage, Completion, LlmClient};
use crate::error::LlmError;

#[derive(Default)]
pub struct ScriptedClient {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedClient {
    pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every message list the client was called with, in order.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of scripted responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _temperature: f32,
    ) -> Result<Completion, LlmError> {
        self.calls.lock().unwrap().push(messages.to_vec());

        let text = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::InvalidResponse("script exhausted".to_string()))?;

        let tokens_in = messages.iter().map(|m| estimate_tokens(&m.content)).sum();
        let tokens_out = estimate_tokens(&text);
        Ok(Completion {
            text,
            tokens_in,
            tokens_out,
        })
    }
}
