//! Shared domain types for relaybot.
//!
//! Everything that crosses a crate boundary lives here: inbound triggers,
//! structured platform messages, backend turn events, configuration, and
//! the shared error type.

pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod trigger;
