//! Backend turn events.
//!
//! One agent turn produces a stream of [`AgentEvent`]s: text deltas,
//! tool activity, and a terminal `TurnEnded` carrying the resumable
//! backend session id.

use serde::Serialize;
use std::pin::Pin;

/// A boxed async stream, used for backend turn output.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted by the agent backend during a single turn.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Incremental assistant text.
    TextDelta { text: String },

    /// Incremental "thinking" text.
    ThinkingDelta { text: String },

    /// The backend is invoking a tool.
    ToolUse {
        tool_name: String,
        input: serde_json::Value,
    },

    /// A tool finished.
    ToolResult {
        tool_name: String,
        output: String,
        is_error: bool,
    },

    /// The turn completed. Carries the id needed to resume this
    /// conversation after a restart, plus usage when the backend reports it.
    TurnEnded {
        backend_session_id: Option<String>,
        usage: Option<Usage>,
    },

    /// The backend reported a turn-level error.
    Error { message: String },
}

/// Token usage for one turn.
#[derive(Debug, Clone, Serialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
