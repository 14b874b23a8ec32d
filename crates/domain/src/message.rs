//! Structured outbound messages.
//!
//! Reply sinks consume these instead of raw strings so each platform can
//! decide how to render tool calls and thinking asides. Send/edit results
//! are explicit variants: an unmodified edit is [`SendOutcome::Unchanged`],
//! never an error to be string-matched.

use serde::{Deserialize, Serialize};

/// A platform-agnostic message ready for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlatformMessage {
    /// Plain assistant text.
    Text { text: String },
    /// A "thinking" aside, typically rendered dimmed or collapsed.
    Thinking { text: String },
    /// One or more tool invocations to summarize.
    ToolCalls { calls: Vec<ToolCallSummary> },
}

impl PlatformMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// True when the message has nothing displayable.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text { text } | Self::Thinking { text } => text.trim().is_empty(),
            Self::ToolCalls { calls } => calls.is_empty(),
        }
    }
}

/// Compact description of a single tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallSummary {
    pub tool_name: String,
    /// Short human-readable rendering of the arguments.
    pub detail: String,
}

/// One inline button.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonSpec {
    pub label: String,
    /// Callback payload echoed back by the platform on click.
    pub data: String,
}

/// A row of buttons attached to a message.
pub type ButtonRow = Vec<ButtonSpec>;

/// Opaque reference to a sent message, used for later edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef(pub String);

/// Result of a send or edit on a reply sink.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// The message went out; `MessageRef` can be used for edits.
    Sent(MessageRef),
    /// An edit was a no-op (identical content). Expected, not an error.
    Unchanged,
    /// The platform rejected the message.
    Failed(String),
}

impl SendOutcome {
    pub fn message_ref(&self) -> Option<&MessageRef> {
        match self {
            Self::Sent(r) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_detection() {
        assert!(PlatformMessage::text("   ").is_empty());
        assert!(!PlatformMessage::text("hi").is_empty());
        assert!(PlatformMessage::ToolCalls { calls: vec![] }.is_empty());
    }

    #[test]
    fn outcome_ref_only_for_sent() {
        let sent = SendOutcome::Sent(MessageRef("m1".into()));
        assert!(sent.message_ref().is_some());
        assert!(SendOutcome::Unchanged.message_ref().is_none());
    }

    #[test]
    fn message_serializes_tagged() {
        let json = serde_json::to_value(PlatformMessage::text("hi")).unwrap();
        assert_eq!(json["kind"], "text");
        assert_eq!(json["text"], "hi");
    }
}
