//! Drives one backend turn: consumes the event stream, relays output to
//! the conversation, and persists the backend session id when the turn
//! ends. Text streams progressively: the first delta posts a response
//! message, later deltas edit it in place on a throttle, so a long turn
//! is visible while it runs and an interrupted turn leaves its partial
//! text behind. Every event is gated on the actor's generation counter so
//! a superseded turn stops relaying the moment a newer one exists.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::task::JoinHandle;

use rb_domain::event::AgentEvent;
use rb_domain::message::{MessageRef, PlatformMessage, SendOutcome, ToolCallSummary};

use crate::runtime::actor::ActorShared;

const TOOL_DETAIL_MAX: usize = 160;

/// Minimum gap between edits of the in-progress response message.
const STREAM_EDIT_INTERVAL: Duration = Duration::from_millis(700);

pub(crate) fn spawn(shared: Arc<ActorShared>, prompt: String, generation: u64) -> JoinHandle<()> {
    tokio::spawn(async move { run(shared, prompt, generation).await })
}

async fn run(shared: Arc<ActorShared>, prompt: String, generation: u64) {
    shared.sink.typing().await;

    let mut stream = match shared.backend.start_turn(prompt).await {
        Ok(stream) => stream,
        Err(e) => {
            shared.stats.record_error();
            tracing::error!(
                session_key = %shared.session_key,
                generation,
                error = %e,
                "failed to start turn"
            );
            notify_error(&shared).await;
            return;
        }
    };

    let mut response = ResponseStream::new(&shared);
    let mut thinking = String::new();

    while let Some(event) = stream.next().await {
        if shared.current_generation() != generation {
            tracing::debug!(
                session_key = %shared.session_key,
                generation,
                current = shared.current_generation(),
                "discarding output from superseded turn"
            );
            return;
        }

        match event {
            Ok(AgentEvent::TextDelta { text: delta }) => response.push(&delta).await,
            Ok(AgentEvent::ThinkingDelta { text: delta }) => thinking.push_str(&delta),
            Ok(AgentEvent::ToolUse { tool_name, input }) => {
                flush_thinking(&shared, &mut thinking).await;
                let mut detail = input.to_string();
                if detail.len() > TOOL_DETAIL_MAX {
                    detail.truncate(TOOL_DETAIL_MAX);
                    detail.push('…');
                }
                let _ = shared
                    .sink
                    .send(PlatformMessage::ToolCalls {
                        calls: vec![ToolCallSummary { tool_name, detail }],
                    })
                    .await;
            }
            Ok(AgentEvent::ToolResult {
                tool_name,
                is_error,
                ..
            }) => {
                if is_error {
                    tracing::debug!(
                        session_key = %shared.session_key,
                        tool = %tool_name,
                        "tool reported an error"
                    );
                }
            }
            Ok(AgentEvent::TurnEnded {
                backend_session_id,
                usage,
            }) => {
                if let Some(id) = backend_session_id {
                    shared.backend.set_session_id(id.clone());
                    shared.ctx.store.update(
                        &shared.session_key,
                        &id,
                        &shared.cwd.to_string_lossy(),
                        &shared.platform,
                    );
                }
                shared.stats.record_turn();
                if let Some(usage) = usage {
                    tracing::info!(
                        session_key = %shared.session_key,
                        generation,
                        input_tokens = usage.input_tokens,
                        output_tokens = usage.output_tokens,
                        "turn completed"
                    );
                } else {
                    tracing::info!(session_key = %shared.session_key, generation, "turn completed");
                }
                flush_thinking(&shared, &mut thinking).await;
                response.finish().await;
                return;
            }
            Ok(AgentEvent::Error { message }) => {
                shared.stats.record_error();
                tracing::error!(
                    session_key = %shared.session_key,
                    generation,
                    error = %message,
                    "backend reported a turn error"
                );
                notify_error(&shared).await;
                return;
            }
            Err(e) => {
                shared.stats.record_error();
                tracing::error!(
                    session_key = %shared.session_key,
                    generation,
                    error = %e,
                    "turn stream failed"
                );
                notify_error(&shared).await;
                return;
            }
        }
    }

    // Stream ended without a TurnEnded: the backend wound down after a
    // soft interrupt. Deliver whatever trailing text accumulated if this
    // turn is still the current one.
    if shared.current_generation() == generation {
        flush_thinking(&shared, &mut thinking).await;
        response.finish().await;
    }
}

/// The response message under construction. The first flush sends it,
/// later flushes edit it in place.
struct ResponseStream<'a> {
    shared: &'a ActorShared,
    text: String,
    delivered_len: usize,
    message: Option<MessageRef>,
    last_update: Instant,
}

impl<'a> ResponseStream<'a> {
    fn new(shared: &'a ActorShared) -> Self {
        Self {
            shared,
            text: String::new(),
            delivered_len: 0,
            message: None,
            last_update: Instant::now(),
        }
    }

    async fn push(&mut self, delta: &str) {
        self.text.push_str(delta);
        if self.message.is_none() || self.last_update.elapsed() >= STREAM_EDIT_INTERVAL {
            self.update().await;
        }
    }

    /// Deliver everything accumulated since the last flush.
    async fn finish(mut self) {
        self.update().await;
    }

    async fn update(&mut self) {
        if self.text.trim().is_empty() || self.text.len() == self.delivered_len {
            return;
        }
        self.last_update = Instant::now();
        let body = PlatformMessage::text(self.text.clone());
        let outcome = match &self.message {
            Some(message_ref) => self.shared.sink.edit(message_ref, body).await,
            None => self.shared.sink.send(body).await,
        };
        match outcome {
            SendOutcome::Sent(message_ref) => {
                self.message = Some(message_ref);
                self.delivered_len = self.text.len();
            }
            SendOutcome::Unchanged => {
                self.delivered_len = self.text.len();
            }
            SendOutcome::Failed(reason) => {
                tracing::warn!(
                    session_key = %self.shared.session_key,
                    error = %reason,
                    "failed to deliver turn output"
                );
            }
        }
    }
}

async fn flush_thinking(shared: &ActorShared, thinking: &mut String) {
    let body = std::mem::take(thinking);
    if body.trim().is_empty() {
        return;
    }
    let _ = shared
        .sink
        .send(PlatformMessage::Thinking { text: body })
        .await;
}

async fn notify_error(shared: &ActorShared) {
    let _ = shared
        .sink
        .send(PlatformMessage::text(
            "⚠️ The agent hit an error on that turn. Please try again.",
        ))
        .await;
}
