//! Collision-free conversation keys.
//!
//! One key identifies one logical conversation across the whole process:
//! dispatcher serialization, actor registry, and the durable store all key
//! on the same string. Constructors are typed per platform so a listener
//! cannot accidentally build a key for the wrong platform shape.

/// Key for a Telegram chat, optionally scoped to a forum topic thread.
pub fn telegram_key(chat_id: i64, thread_id: Option<i64>) -> String {
    match thread_id {
        Some(thread) => format!("telegram:{chat_id}:{thread}"),
        None => format!("telegram:{chat_id}"),
    }
}

/// Key for a Discord channel.
pub fn discord_key(channel_id: u64) -> String {
    format!("discord:{channel_id}")
}
