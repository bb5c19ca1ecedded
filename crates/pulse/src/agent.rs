//! The agent loop: alternates between asking the model for its next action
//! and executing the tools it requested, until the model answers in plain
//! text or the iteration cap is hit.

use std::collections::VecDeque;

use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::models::message::{Message, Role, ToolCallRequest};
use crate::models::tool::ToolSpec;
use crate::providers::base::Provider;
use crate::tool::ToolRegistry;

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// A lifecycle event emitted while a reply turn runs.
///
/// Events are observational only: the loop branches on the model response,
/// never on its own emitted events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Thinking { message: String },
    ToolCall { name: String, arguments: Value },
    ToolResult { name: String, output: String },
    Response { text: String },
    Error { message: String },
}

/// How a reply turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The model produced a final assistant turn.
    Answered,
    /// The iteration cap was reached while the model was still requesting tools.
    IterationLimit,
    /// The model endpoint failed; the turn could not continue.
    Failed,
}

/// A single agent bound to one model endpoint and one set of tools.
///
/// All configuration is per-instance, so independent agents can run in the
/// same process against different endpoints or datasets.
pub struct Agent {
    provider: Box<dyn Provider>,
    tools: ToolRegistry,
    system_prompt: String,
    max_iterations: u32,
}

impl Agent {
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Agent {
            provider,
            tools: ToolRegistry::new(),
            system_prompt: "You are a helpful assistant.".to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Start a reply turn: take ownership of the conversation history, append
    /// the user message, and return a generator of [`AgentEvent`]s.
    ///
    /// The system directive is inserted at position 0 on the first turn that
    /// lacks one and never again. The caller gets the full updated history
    /// back from [`Reply::into_history`] whatever the outcome, so the
    /// conversation can be resumed even after a failure or an exhausted
    /// iteration budget.
    pub fn reply<S: Into<String>>(&self, history: Vec<Message>, user_message: S) -> Reply<'_> {
        let mut messages = history;
        if messages.first().map(|m| m.role) != Some(Role::System) {
            messages.insert(0, Message::system(&self.system_prompt));
        }
        messages.push(Message::user(user_message));

        Reply {
            agent: self,
            tools: self.tools.specs(),
            messages,
            pending: VecDeque::new(),
            events: VecDeque::new(),
            state: State::AwaitingModel,
            iteration: 0,
            outcome: None,
        }
    }
}

#[derive(Clone, Copy)]
enum State {
    /// Check the iteration budget and announce the next model call.
    AwaitingModel,
    /// One completion call is due.
    CallingModel,
    /// Tool requests from the last assistant message are being drained.
    ExecutingTools,
    Done,
}

/// One in-flight reply turn, driven by pulling events.
///
/// The loop performs work only when polled: each `next_event` call advances
/// the state machine until an event is produced or a terminal state is
/// reached, so a caller that stops consuming stops the loop after the step in
/// flight. Exactly one model call or tool execution is ever outstanding.
pub struct Reply<'a> {
    agent: &'a Agent,
    tools: Vec<ToolSpec>,
    messages: Vec<Message>,
    pending: VecDeque<ToolCallRequest>,
    events: VecDeque<AgentEvent>,
    state: State,
    iteration: u32,
    outcome: Option<TurnOutcome>,
}

impl Reply<'_> {
    /// The next lifecycle event, or `None` once the turn has ended.
    pub async fn next_event(&mut self) -> Option<AgentEvent> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Some(event);
            }
            if matches!(self.state, State::Done) {
                return None;
            }
            self.step().await;
        }
    }

    /// The events as a stream, terminating when the turn ends.
    pub fn events(&mut self) -> BoxStream<'_, AgentEvent> {
        Box::pin(futures::stream::unfold(self, |reply| async move {
            reply.next_event().await.map(|event| (event, reply))
        }))
    }

    /// The terminal status, `None` while the turn is still running.
    pub fn outcome(&self) -> Option<TurnOutcome> {
        self.outcome
    }

    /// Hand the conversation history back to the caller, including every
    /// message appended so far.
    pub fn into_history(self) -> Vec<Message> {
        self.messages
    }

    fn finish(&mut self, outcome: TurnOutcome) {
        self.outcome = Some(outcome);
        self.state = State::Done;
    }

    async fn step(&mut self) {
        match self.state {
            State::AwaitingModel => {
                if self.iteration >= self.agent.max_iterations {
                    debug!(iterations = self.iteration, "iteration cap reached, stopping");
                    self.finish(TurnOutcome::IterationLimit);
                    return;
                }
                self.iteration += 1;
                self.events.push_back(AgentEvent::Thinking {
                    message: format!("Iteration {}: calling the model", self.iteration),
                });
                self.state = State::CallingModel;
            }
            State::CallingModel => {
                let result = self
                    .agent
                    .provider
                    .complete(&self.messages, &self.tools)
                    .await;
                let response = match result {
                    Ok((message, _usage)) => message,
                    Err(err) => {
                        warn!(error = %err, "model call failed");
                        self.events.push_back(AgentEvent::Error {
                            message: format!("API error: {err}"),
                        });
                        self.finish(TurnOutcome::Failed);
                        return;
                    }
                };

                let requests = response.tool_calls().to_vec();
                if !requests.is_empty() {
                    debug!(count = requests.len(), "model requested tools");
                    self.messages.push(Message::assistant_with_tool_calls(
                        response.content,
                        requests.clone(),
                    ));
                    self.pending = requests.into();
                    self.state = State::ExecutingTools;
                    return;
                }

                match response.content.as_deref() {
                    Some(text) if !text.is_empty() => {
                        self.events.push_back(AgentEvent::Response {
                            text: text.to_string(),
                        });
                        self.messages.push(Message::assistant(text));
                    }
                    // An assistant turn with neither tool calls nor content
                    // ends the run silently.
                    _ => debug!("model returned neither tool calls nor content"),
                }
                self.finish(TurnOutcome::Answered);
            }
            State::ExecutingTools => {
                // Strictly sequential, in the order the model emitted the
                // requests; results are matched back by id.
                let request = match self.pending.pop_front() {
                    Some(request) => request,
                    None => {
                        self.state = State::AwaitingModel;
                        return;
                    }
                };

                let arguments: Value = serde_json::from_str(&request.function.arguments)
                    .unwrap_or_else(|_| json!({}));
                self.events.push_back(AgentEvent::ToolCall {
                    name: request.function.name.clone(),
                    arguments: arguments.clone(),
                });

                let output = self
                    .agent
                    .tools
                    .invoke(&request.function.name, arguments)
                    .await;
                self.events.push_back(AgentEvent::ToolResult {
                    name: request.function.name.clone(),
                    output: output.clone(),
                });
                self.messages.push(Message::tool(request.id, output));
            }
            State::Done => {}
        }
    }
}
