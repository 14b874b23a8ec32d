//! relaybot gateway: the runtime core and control API.
//!
//! The pieces fit together like this: platform listeners push [`rb_domain::trigger::Trigger`]s
//! through the ingress dispatcher (bounded queue, per-conversation
//! serialization) into the coordinator, which owns one session actor per
//! conversation. Each actor serializes turns against an agent backend and
//! can interrupt an in-flight turn when new input arrives. The permission
//! broker parks turns that need a human decision without blocking anything
//! else.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod platform;
pub mod runtime;
pub mod state;
