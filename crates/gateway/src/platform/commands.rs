//! Slash-command resolution.
//!
//! A leading `/command` in a prompt resolves in one of three ways: a
//! registered expansion replaces the prompt text, a locally-owned command
//! is answered by the session actor without starting a turn, and anything
//! else passes through to the backend unchanged (the backend may know it).

use std::collections::HashMap;

/// What a slash command resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResolution {
    /// Replace the prompt with this expansion and run a turn.
    Prompt(String),
    /// Answered by the session actor itself; no turn is started.
    Local(LocalCommand),
    /// Not registered here; the raw text goes to the backend untouched.
    PassThrough,
}

/// Commands the gateway answers without involving the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalCommand {
    /// Report per-conversation counters (turns, interrupts, errors).
    ShowStatus,
}

/// Registry of prompt-expansion commands, shared by all actors.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    expansions: HashMap<String, String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an expansion for `/name`.
    pub fn register(&mut self, name: impl Into<String>, expansion: impl Into<String>) {
        self.expansions.insert(name.into(), expansion.into());
    }

    /// Resolve a command name against local commands, registered
    /// expansions, and the backend's contextual command list, in that
    /// order.
    pub fn resolve(&self, name: &str, contextual: &[String]) -> CommandResolution {
        if name == "status" {
            return CommandResolution::Local(LocalCommand::ShowStatus);
        }
        if let Some(expansion) = self.expansions.get(name) {
            return CommandResolution::Prompt(expansion.clone());
        }
        if contextual.iter().any(|c| c == name) {
            tracing::debug!(command = name, "contextual command passed to backend");
        }
        CommandResolution::PassThrough
    }
}

/// Extract the command name from a prompt, if it starts with one.
///
/// `/review@somebot please` parses as `review`; bot-mention suffixes and
/// arguments are stripped.
pub fn parse_command_name(prompt: &str) -> Option<&str> {
    let rest = prompt.strip_prefix('/')?;
    let token = rest.split_whitespace().next()?;
    let name = token.split('@').next().unwrap_or(token);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_with_mention_and_args() {
        assert_eq!(parse_command_name("/review@relaybot src/"), Some("review"));
        assert_eq!(parse_command_name("/status"), Some("status"));
        assert_eq!(parse_command_name("plain text"), None);
        assert_eq!(parse_command_name("/"), None);
    }

    #[test]
    fn status_is_local() {
        let registry = CommandRegistry::new();
        assert_eq!(
            registry.resolve("status", &[]),
            CommandResolution::Local(LocalCommand::ShowStatus)
        );
    }

    #[test]
    fn registered_expansion_wins_over_contextual() {
        let mut registry = CommandRegistry::new();
        registry.register("review", "Review the pending changes.");
        let contextual = vec!["review".to_owned()];
        assert_eq!(
            registry.resolve("review", &contextual),
            CommandResolution::Prompt("Review the pending changes.".into())
        );
    }

    #[test]
    fn unknown_command_passes_through() {
        let registry = CommandRegistry::new();
        assert_eq!(
            registry.resolve("compact", &["compact".to_owned()]),
            CommandResolution::PassThrough
        );
        assert_eq!(registry.resolve("nope", &[]), CommandResolution::PassThrough);
    }
}
