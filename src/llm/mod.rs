//! LLM client abstraction.
//!
//! The runtime treats the model as an opaque text oracle: one blocking
//! `complete` call per turn, no streaming, no tool-call API. The gateway
//! implementation talks to an OpenAI-compatible endpoint; the scripted mock
//! backs the test suites.

pub mod gateway;
pub mod mock;

pub use gateway::GatewayClient;
pub use mock::ScriptedClient;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One model response with its token accounting.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// Cumulative token counters, shared across agents via `Arc`.
#[derive(Debug, Default)]
pub struct TokenUsage {
    tokens_in: AtomicU64,
    tokens_out: AtomicU64,
}

impl TokenUsage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, tokens_in: u64, tokens_out: u64) {
        self.tokens_in.fetch_add(tokens_in, Ordering::Relaxed);
        self.tokens_out.fetch_add(tokens_out, Ordering::Relaxed);
    }

    pub fn totals(&self) -> (u64, u64) {
        (
            self.tokens_in.load(Ordering::Relaxed),
            self.tokens_out.load(Ordering::Relaxed),
        )
    }
}

/// Rough token estimate when the gateway omits usage data: ~4 chars/token.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() / 4) as u64
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<Completion, LlmError>;
}
