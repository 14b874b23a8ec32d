//! Persisted session metadata store.
//!
//! A single versioned JSON document maps conversation keys to the backend
//! session id last seen for that conversation. Writes replace the file
//! atomically (temp file + rename) so a crash mid-write never corrupts the
//! store. Entries idle past the TTL are dropped by [`SessionStore::cleanup_expired`].

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use rb_domain::error::{Error, Result};

const STORE_VERSION: u32 = 1;
const STORE_FILE: &str = "sessions.json";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persisted entry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Durable state for one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    /// Resumable session id issued by the agent backend.
    pub backend_session_id: String,
    pub cwd: String,
    pub platform: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub message_count: u64,
}

/// On-disk document shape.
#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    sessions: HashMap<String, PersistedSession>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// File-backed session store.
///
/// `update` persists immediately; readers see the in-memory map. All
/// methods are safe to call from any task.
pub struct SessionStore {
    path: PathBuf,
    max_age: Duration,
    sessions: Mutex<HashMap<String, PersistedSession>>,
}

impl SessionStore {
    /// Open (or create) the store at `state_path/sessions.json`.
    ///
    /// A missing file is an empty store. A file with an unknown version or
    /// unparseable content is ignored with a warning rather than an error,
    /// so a bad store never blocks startup.
    pub fn open(state_path: &Path, ttl_days: u64) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;
        let path = state_path.join(STORE_FILE);

        let sessions = match std::fs::read_to_string(&path) {
            Ok(raw) if !raw.trim().is_empty() => match serde_json::from_str::<StoreDocument>(&raw)
            {
                Ok(doc) if doc.version == STORE_VERSION => doc.sessions,
                Ok(doc) => {
                    tracing::warn!(
                        version = doc.version,
                        expected = STORE_VERSION,
                        "session store version mismatch, starting empty"
                    );
                    HashMap::new()
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to parse session store, starting empty");
                    HashMap::new()
                }
            },
            Ok(_) => HashMap::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "session store file not found");
                HashMap::new()
            }
            Err(e) => return Err(Error::Io(e)),
        };

        tracing::info!(
            sessions = sessions.len(),
            path = %path.display(),
            "session store loaded"
        );

        Ok(Self {
            path,
            max_age: Duration::days(ttl_days as i64),
            sessions: Mutex::new(sessions),
        })
    }

    /// Look up a persisted session by conversation key.
    pub fn get(&self, session_key: &str) -> Option<PersistedSession> {
        self.sessions.lock().get(session_key).cloned()
    }

    /// Record the backend session id for a conversation and persist.
    ///
    /// An empty `backend_session_id` is ignored; the backend has not issued
    /// a resumable id yet.
    pub fn update(
        &self,
        session_key: &str,
        backend_session_id: &str,
        cwd: &str,
        platform: &str,
    ) {
        if backend_session_id.is_empty() {
            return;
        }
        let now = Utc::now();
        let mut sessions = self.sessions.lock();
        let entry = sessions
            .entry(session_key.to_owned())
            .and_modify(|s| {
                s.backend_session_id = backend_session_id.to_owned();
                s.cwd = cwd.to_owned();
                s.last_activity = now;
                s.message_count += 1;
            })
            .or_insert_with(|| PersistedSession {
                backend_session_id: backend_session_id.to_owned(),
                cwd: cwd.to_owned(),
                platform: platform.to_owned(),
                created_at: now,
                last_activity: now,
                message_count: 1,
            });
        let _ = entry;
        self.save_locked(&sessions);
    }

    /// Remove one conversation's entry and persist.
    pub fn remove(&self, session_key: &str) {
        let mut sessions = self.sessions.lock();
        if sessions.remove(session_key).is_some() {
            self.save_locked(&sessions);
        }
    }

    /// Drop entries idle longer than the TTL. Returns how many were evicted.
    pub fn cleanup_expired(&self) -> usize {
        let cutoff = Utc::now() - self.max_age;
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, s| s.last_activity >= cutoff);
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, "expired persisted sessions removed");
            self.save_locked(&sessions);
        }
        evicted
    }

    /// Number of persisted entries (for the health endpoint).
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Write the current state to disk (atomic replace).
    pub fn flush(&self) -> Result<()> {
        let sessions = self.sessions.lock();
        self.write_document(&sessions)
    }

    fn save_locked(&self, sessions: &HashMap<String, PersistedSession>) {
        if let Err(e) = self.write_document(sessions) {
            tracing::error!(error = %e, path = %self.path.display(), "failed to save session store");
        }
    }

    fn write_document(&self, sessions: &HashMap<String, PersistedSession>) -> Result<()> {
        let doc = StoreDocument {
            version: STORE_VERSION,
            sessions: sessions.clone(),
        };
        let json = serde_json::to_string_pretty(&doc)?;

        let dir = self
            .path
            .parent()
            .ok_or_else(|| Error::Store("session store path has no parent".into()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(Error::Io)?;
        tmp.write_all(json.as_bytes()).map_err(Error::Io)?;
        tmp.flush().map_err(Error::Io)?;
        tmp.persist(&self.path)
            .map_err(|e| Error::Store(format!("replacing {}: {e}", self.path.display())))?;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn open_in(dir: &tempfile::TempDir, ttl_days: u64) -> SessionStore {
        SessionStore::open(dir.path(), ttl_days).unwrap()
    }

    #[test]
    fn update_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, 7);

        store.update("telegram:1", "bs-123", "/work", "telegram");
        let entry = store.get("telegram:1").unwrap();
        assert_eq!(entry.backend_session_id, "bs-123");
        assert_eq!(entry.platform, "telegram");
        assert_eq!(entry.message_count, 1);
    }

    #[test]
    fn update_bumps_counters_and_keeps_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, 7);

        store.update("k", "a", "/w", "discord");
        let first = store.get("k").unwrap();
        store.update("k", "b", "/w", "discord");
        let second = store.get("k").unwrap();

        assert_eq!(second.backend_session_id, "b");
        assert_eq!(second.message_count, 2);
        assert_eq!(second.created_at, first.created_at);
    }

    #[test]
    fn empty_backend_id_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, 7);
        store.update("k", "", "/w", "telegram");
        assert!(store.get("k").is_none());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_in(&dir, 7);
            store.update("discord:9", "bs-9", "/proj", "discord");
        }
        let reopened = open_in(&dir, 7);
        let entry = reopened.get("discord:9").unwrap();
        assert_eq!(entry.backend_session_id, "bs-9");
    }

    #[test]
    fn version_mismatch_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(STORE_FILE),
            r#"{"version": 99, "sessions": {"k": {}}}"#,
        )
        .unwrap();
        let store = open_in(&dir, 7);
        assert!(store.is_empty());
    }

    #[test]
    fn garbage_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(STORE_FILE), "not json").unwrap();
        let store = open_in(&dir, 7);
        assert!(store.is_empty());
    }

    #[test]
    fn cleanup_expired_evicts_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, 7);
        store.update("fresh", "a", "/w", "telegram");

        // Backdate one entry past the TTL directly in the map.
        {
            let mut sessions = store.sessions.lock();
            let mut stale = sessions.get("fresh").unwrap().clone();
            stale.last_activity = Utc::now() - Duration::days(30);
            sessions.insert("stale".into(), stale);
        }

        assert_eq!(store.cleanup_expired(), 1);
        assert!(store.get("fresh").is_some());
        assert!(store.get("stale").is_none());
    }

    #[test]
    fn remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir, 7);
        store.update("k", "a", "/w", "telegram");
        store.remove("k");
        drop(store);

        let reopened = open_in(&dir, 7);
        assert!(reopened.get("k").is_none());
    }
}
