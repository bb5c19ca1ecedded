use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::message::Message;
use crate::models::tool::ToolSpec;
use crate::providers::base::{Provider, Usage};

enum Script {
    /// Responses handed out in order; empty assistant message once exhausted.
    Sequence(Mutex<Vec<Message>>),
    /// The same response on every call, for bounding-loop tests.
    Repeating(Message),
}

/// A scripted provider for testing the agent loop without a network.
pub struct MockProvider {
    script: Script,
    calls: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            script: Script::Sequence(Mutex::new(responses)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn repeating(response: Message) -> Self {
        Self {
            script: Script::Repeating(response),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A handle to the completion-call counter, usable after the provider has
    /// been boxed into an agent.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        _messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<(Message, Usage)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let message = match &self.script {
            Script::Sequence(responses) => {
                let mut responses = responses.lock().unwrap();
                if responses.is_empty() {
                    Message::assistant("")
                } else {
                    responses.remove(0)
                }
            }
            Script::Repeating(response) => response.clone(),
        };
        Ok((message, Usage::default()))
    }
}
