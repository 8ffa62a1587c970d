//! Streaming turn execution: the central `AgentTurnLoop` (spec.md §4.6).
//!
//! Grounded step by step on
//! `original_source/openclaw/agents/agent_loop.py::AgentLoop` — its
//! `asyncio`-flavored event emitter becomes a `tokio::sync::broadcast`
//! channel, its async generator provider becomes [`StreamingProvider`], and
//! its boolean abort flag becomes a [`CancellationToken`].

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};
use uuid::Uuid;

use skynet_events::{Event, EventBus};
use skynet_sessions::types::{Message, MessageContent, MessageRole, ToolCallRecord};

use crate::context::to_provider_messages;
use crate::provider::{ChatRequest, ProviderError, StreamingProvider, ToolDefinition};
use crate::stream::ProviderEvent;
use crate::thinking::ThinkingLevel;
use crate::tools::Tool;

/// Mirrors the fine-grained event sequence spec.md §4.6 names, emitted on a
/// broadcast channel local to one turn loop instance (not the cross-session
/// [`skynet_events::EventBus`], which only carries the coarse
/// `agent.turn-start`/`agent.turn-end`/`agent.text` summaries).
#[derive(Debug, Clone)]
pub enum TurnEvent {
    TurnStart { turn_number: u64 },
    MessageStart { message_id: String },
    ThinkingStart,
    ThinkingDelta { delta: String },
    ThinkingEnd { thinking: String },
    TextDelta { delta: String },
    MessageUpdate { content: String },
    ToolCallStart { tool_call_id: String, tool_name: String },
    ToolCallEnd { tool_call_id: String, tool_name: String, params: Value },
    MessageEnd { message_id: String, content: String },
    TurnEnd { turn_number: u64, has_tool_calls: bool },
    ToolExecutionStart { tool_call_id: String, tool_name: String, params: Value },
    ToolExecutionEnd { tool_call_id: String, success: bool, result: Option<String>, error: Option<String> },
}

/// `(messages, model, tools, thinkingLevel, steeringQueue, followupQueue,
/// aborted, turnNumber)` (spec.md §4.6).
pub struct AgentState {
    pub messages: Vec<Message>,
    pub model: String,
    pub thinking_level: ThinkingLevel,
    pub steering_queue: Vec<String>,
    pub followup_queue: Vec<String>,
    pub turn_number: u64,
    cancel: CancellationToken,
}

impl AgentState {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            model: model.into(),
            thinking_level: ThinkingLevel::Off,
            steering_queue: Vec::new(),
            followup_queue: Vec::new(),
            turn_number: 0,
            cancel: CancellationToken::new(),
        }
    }

    pub fn aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// The central turn loop: streams one assistant turn at a time, interleaving
/// tool execution, steering interrupts, and follow-up injection.
pub struct AgentTurnLoop {
    provider: Arc<dyn StreamingProvider>,
    tools: HashMap<String, Arc<dyn Tool>>,
    tool_defs: Vec<ToolDefinition>,
    events: EventBus,
    session_key: String,
    turn_tx: broadcast::Sender<TurnEvent>,
    state: Mutex<AgentState>,
}

impl AgentTurnLoop {
    pub fn new(
        provider: Arc<dyn StreamingProvider>,
        tools: Vec<Arc<dyn Tool>>,
        events: EventBus,
        session_key: String,
        model: impl Into<String>,
    ) -> Self {
        let tool_defs = tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect();
        let tools = tools.into_iter().map(|t| (t.name().to_string(), t)).collect();
        let (turn_tx, _) = broadcast::channel(256);
        Self {
            provider,
            tools,
            tool_defs,
            events,
            session_key,
            turn_tx,
            state: Mutex::new(AgentState::new(model)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TurnEvent> {
        self.turn_tx.subscribe()
    }

    fn emit(&self, event: TurnEvent) {
        let _ = self.turn_tx.send(event);
    }

    /// `steer(text)` — interrupts the current execution at the next check
    /// point (spec.md §4.6).
    pub async fn steer(&self, text: impl Into<String>) {
        self.state.lock().await.steering_queue.push(text.into());
    }

    /// `followUp(text)` — queued after the current turn completes.
    pub async fn followup(&self, text: impl Into<String>) {
        self.state.lock().await.followup_queue.push(text.into());
    }

    /// Override the thinking budget for the next turn (e.g. a per-message
    /// `/think:high` directive). Persists until changed again.
    pub async fn set_thinking_level(&self, level: ThinkingLevel) {
        self.state.lock().await.thinking_level = level;
    }

    /// `abort()` — sets the flag the loop checks at the top of each
    /// iteration and between tool calls.
    pub async fn abort(&self) {
        self.state.lock().await.cancel.cancel();
    }

    /// `prompt(messages, systemPrompt?, model?) -> messages` — starts a
    /// fresh turn sequence with new user prompts.
    pub async fn prompt(
        &self,
        prompts: Vec<String>,
        system_prompt: Option<String>,
        model: Option<String>,
    ) -> Result<Vec<Message>, ProviderError> {
        {
            let mut state = self.state.lock().await;
            state.messages.clear();
            state.turn_number = 0;
            if let Some(model) = model {
                state.model = model;
            }
            if let Some(system) = system_prompt {
                let mut m = Message::user(system);
                m.role = MessageRole::System;
                state.messages.push(m);
            }
            for prompt in prompts {
                state.messages.push(Message::user(prompt));
            }
        }
        self.run_loop().await
    }

    /// `continue() -> messages` — resumes `run_loop` from the existing
    /// state (e.g. after a steering message or follow-up was queued).
    pub async fn r#continue(&self) -> Result<Vec<Message>, ProviderError> {
        self.run_loop().await
    }

    #[instrument(skip(self), fields(session_key = %self.session_key))]
    async fn run_loop(&self) -> Result<Vec<Message>, ProviderError> {
        loop {
            if self.state.lock().await.aborted() {
                info!("turn loop aborted");
                break;
            }

            let steering = { self.state.lock().await.steering_queue.first().cloned() };
            if let Some(steering_msg) = steering {
                let mut state = self.state.lock().await;
                state.steering_queue.remove(0);
                state.messages.push(Message::user(steering_msg));
                drop(state);
                continue;
            }

            let turn_number = {
                let mut state = self.state.lock().await;
                state.turn_number += 1;
                state.turn_number
            };
            self.events.publish(Event::agent_turn_start(self.session_key.clone(), turn_number));
            self.emit(TurnEvent::TurnStart { turn_number });

            let (assistant_message, tool_calls) = self.stream_assistant_response().await?;
            self.state.lock().await.messages.push(assistant_message);

            let has_tool_calls = !tool_calls.is_empty();
            self.events.publish(Event::agent_turn_end(self.session_key.clone(), turn_number, has_tool_calls));
            self.emit(TurnEvent::TurnEnd { turn_number, has_tool_calls });

            if !has_tool_calls {
                break;
            }

            self.execute_tool_calls(tool_calls).await;

            let followup = { self.state.lock().await.followup_queue.first().cloned() };
            if let Some(followup_msg) = followup {
                let mut state = self.state.lock().await;
                state.followup_queue.remove(0);
                state.messages.push(Message::user(followup_msg));
            }
        }

        Ok(self.state.lock().await.messages.clone())
    }

    async fn stream_assistant_response(&self) -> Result<(Message, Vec<ToolCallRecord>), ProviderError> {
        let message_id = Uuid::new_v4().to_string();
        self.emit(TurnEvent::MessageStart { message_id: message_id.clone() });

        let (model, thinking, cancel, history) = {
            let state = self.state.lock().await;
            (state.model.clone(), state.thinking_level, state.cancel.clone(), state.messages.clone())
        };

        let req = ChatRequest {
            model,
            system: String::new(),
            system_prompt: None,
            messages: to_provider_messages(&history),
            max_tokens: 8192,
            thinking: Some(thinking),
            tools: self.tool_defs.clone(),
            raw_messages: None,
        };

        let (tx, mut rx) = mpsc::channel(256);
        let provider = self.provider.clone();
        let stream_cancel = cancel.clone();
        let stream_handle = tokio::spawn(async move { provider.stream(&req, tx, stream_cancel).await });

        let mut content_parts = Vec::new();
        let mut thinking_parts = Vec::new();
        let mut tool_calls = Vec::new();

        while let Some(event) = rx.recv().await {
            match event {
                ProviderEvent::ThinkingStart => self.emit(TurnEvent::ThinkingStart),
                ProviderEvent::ThinkingDelta { text } => {
                    thinking_parts.push(text.clone());
                    self.emit(TurnEvent::ThinkingDelta { delta: text });
                }
                ProviderEvent::ThinkingEnd => {
                    self.emit(TurnEvent::ThinkingEnd { thinking: thinking_parts.concat() });
                }
                ProviderEvent::TextDelta { text } => {
                    content_parts.push(text.clone());
                    self.emit(TurnEvent::TextDelta { delta: text });
                    let joined = content_parts.concat();
                    self.events.publish(Event::agent_text(self.session_key.clone(), joined.clone()));
                    self.emit(TurnEvent::MessageUpdate { content: joined });
                }
                ProviderEvent::ToolCall { id, name, input } => {
                    self.emit(TurnEvent::ToolCallStart { tool_call_id: id.clone(), tool_name: name.clone() });
                    self.emit(TurnEvent::ToolCallEnd {
                        tool_call_id: id.clone(),
                        tool_name: name.clone(),
                        params: input.clone(),
                    });
                    tool_calls.push(ToolCallRecord { id, name, arguments: input });
                }
                ProviderEvent::Usage { .. } => {}
                ProviderEvent::Done { .. } => break,
                ProviderEvent::Error { message } => {
                    error!(%message, "provider stream error");
                    return Err(ProviderError::Unavailable(message));
                }
            }
        }
        let _ = stream_handle.await;

        let content = content_parts.concat();
        let mut assistant_message = Message::assistant(content.clone());
        if !thinking_parts.is_empty() {
            assistant_message.thinking = Some(thinking_parts.concat());
        }
        if !tool_calls.is_empty() {
            assistant_message.tool_calls = Some(tool_calls.clone());
        }

        self.emit(TurnEvent::MessageEnd { message_id, content });
        Ok((assistant_message, tool_calls))
    }

    async fn execute_tool_calls(&self, tool_calls: Vec<ToolCallRecord>) {
        for call in tool_calls {
            if !self.state.lock().await.steering_queue.is_empty() {
                info!("steering detected, stopping tool execution early");
                break;
            }

            self.emit(TurnEvent::ToolExecutionStart {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                params: call.arguments.clone(),
            });

            let result_content = match self.tools.get(&call.name) {
                None => {
                    let error_msg = format!("Tool '{}' not found", call.name);
                    self.emit(TurnEvent::ToolExecutionEnd {
                        tool_call_id: call.id.clone(),
                        success: false,
                        result: None,
                        error: Some(error_msg.clone()),
                    });
                    format!("Error: {error_msg}")
                }
                Some(tool) => {
                    let cancel = self.state.lock().await.cancel.clone();
                    let result = tool.execute_cancellable(&call.id, call.arguments.clone(), cancel).await;
                    self.emit(TurnEvent::ToolExecutionEnd {
                        tool_call_id: call.id.clone(),
                        success: !result.is_error,
                        result: (!result.is_error).then(|| result.content.clone()),
                        error: result.is_error.then(|| result.content.clone()),
                    });
                    if result.is_error {
                        format!("Error: {}", result.content)
                    } else {
                        result.content
                    }
                }
            };

            let mut tool_message = Message::user(result_content);
            tool_message.role = MessageRole::ToolResult;
            tool_message.tool_call_id = Some(call.id);
            self.state.lock().await.messages.push(tool_message);
        }
    }
}

/// Collapse structured tool-call content back to plain text, used when
/// adapting history loaded from [`skynet_sessions::SessionStore`] for
/// display rather than for a provider request.
pub fn message_text(message: &Message) -> String {
    match &message.content {
        MessageContent::Text(t) => t.clone(),
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .filter_map(|b| match b {
                skynet_sessions::types::ContentBlock::Text { text } => Some(text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::InMemoryProvider;
    use serde_json::json;

    #[tokio::test]
    async fn loop_terminates_when_turn_has_no_tool_calls() {
        let provider = Arc::new(InMemoryProvider::new(vec![vec![
            ProviderEvent::TextDelta { text: "hello".into() },
            ProviderEvent::Done { model: "test".into(), tokens_in: 1, tokens_out: 1, stop_reason: "end_turn".into() },
        ]]));
        let turn_loop = AgentTurnLoop::new(provider, vec![], EventBus::new(), "agent:test:main".into(), "test-model");
        let messages = turn_loop.prompt(vec!["hi".into()], None, None).await.unwrap();
        assert_eq!(messages.last().unwrap().role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn steering_message_is_injected_before_next_turn() {
        let provider = Arc::new(InMemoryProvider::new(vec![
            vec![ProviderEvent::Done { model: "t".into(), tokens_in: 0, tokens_out: 0, stop_reason: "end_turn".into() }],
        ]));
        let turn_loop = AgentTurnLoop::new(provider, vec![], EventBus::new(), "agent:test:main".into(), "test-model");
        turn_loop.steer("interrupt").await;
        let messages = turn_loop.prompt(vec!["hi".into()], None, None).await.unwrap();
        assert!(messages.iter().any(|m| message_text(m) == "interrupt"));
    }

    #[tokio::test]
    async fn tool_not_found_produces_error_tool_result() {
        let provider = Arc::new(InMemoryProvider::new(vec![vec![
            ProviderEvent::ToolCall { id: "1".into(), name: "missing".into(), input: json!({}) },
            ProviderEvent::Done { model: "t".into(), tokens_in: 0, tokens_out: 0, stop_reason: "tool_use".into() },
        ], vec![
            ProviderEvent::Done { model: "t".into(), tokens_in: 0, tokens_out: 0, stop_reason: "end_turn".into() },
        ]]));
        let turn_loop = AgentTurnLoop::new(provider, vec![], EventBus::new(), "agent:test:main".into(), "test-model");
        let messages = turn_loop.prompt(vec!["hi".into()], None, None).await.unwrap();
        let tool_result = messages.iter().find(|m| m.role == MessageRole::ToolResult).unwrap();
        assert!(message_text(tool_result).contains("not found"));
    }
}
