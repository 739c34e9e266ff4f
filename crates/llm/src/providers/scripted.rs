//! Scripted LLM client for deterministic tests.
//!
//! Replies are queued ahead of time and popped in call order; every
//! received request is recorded so tests can assert on prompts and
//! sampling parameters.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use diligence_core::{AppError, AppResult};

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};

enum Reply {
    Text(String),
    Error(String),
}

/// Test double that replays a scripted sequence of replies.
pub struct ScriptedClient {
    script: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<LlmRequest>>,
    delay: Option<Duration>,
}

impl ScriptedClient {
    /// Create an empty scripted client.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Delay every completion by the given duration (for timeout tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a successful text reply.
    pub fn push_text(&self, text: impl Into<String>) {
        self.script.lock().unwrap().push_back(Reply::Text(text.into()));
    }

    /// Queue a transport failure.
    pub fn push_error(&self, message: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push_back(Reply::Error(message.into()));
    }

    /// Requests received so far, in call order.
    pub fn calls(&self) -> Vec<LlmRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of unconsumed scripted replies.
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedClient {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.calls.lock().unwrap().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self.script.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(LlmResponse {
                content: text,
                model: request.model.clone(),
                usage: LlmUsage::default(),
            }),
            Some(Reply::Error(message)) => Err(AppError::Llm(message)),
            None => Err(AppError::Llm("Scripted replies exhausted".to_string())),
        }
    }
}
