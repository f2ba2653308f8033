//! Keyed, TTL-bounded conversation log.
//!
//! Every operation is best-effort: a fault never propagates past this crate.
//! `create` always returns a usable id, `load` returns an empty log on any
//! miss, `append` silently drops on any fault. An outage of the backing
//! store degrades multi-turn behavior but never fails a single-turn
//! request.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

pub const MAX_MESSAGES: usize = 20;
pub const MAX_MSG_CHARS: usize = 1000;
pub const TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub desk_name: String,
    pub role: String,
    pub messages: Vec<Message>,
    pub message_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    fn new(user_id: String, desk_name: String) -> Self {
        let now = Utc::now();
        let role = derive_role(&user_id);
        let desk_name = if desk_name.is_empty() { derive_desk(&user_id) } else { desk_name };
        Self {
            user_id,
            desk_name,
            role,
            messages: Vec::new(),
            message_count: 0,
            created_at: now,
            updated_at: now,
            expires_at: now + chrono::Duration::hours(TTL_HOURS),
        }
    }

    fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Maps a user id prefix to a trading desk. Unknown prefixes fall back to
/// `GENERAL`.
fn derive_desk(user_id: &str) -> String {
    const DESK_PREFIXES: &[(&str, &str)] =
        &[("T_HY", "HY"), ("T_IG", "IG"), ("T_EM", "EM"), ("T_RATES", "RATES")];

    for (prefix, desk) in DESK_PREFIXES {
        if user_id.starts_with(prefix) {
            return desk.to_string();
        }
    }
    "GENERAL".to_string()
}

fn derive_role(user_id: &str) -> String {
    if user_id.starts_with("T_") { "business".to_string() } else { "technical".to_string() }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push('…');
    truncated
}

fn new_session_id() -> String {
    // Mirrors the source's `sess-<16 hex>` shape without depending on its
    // DynamoDB table.
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("sess-{}", &hex[..16])
}

/// Shared, TTL-bounded session store.
///
/// Cloning shares the same underlying map (it wraps an `Arc`).
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Session>>,
    max_messages: usize,
    max_msg_chars: usize,
    ttl_hours: i64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(MAX_MESSAGES, MAX_MSG_CHARS, TTL_HOURS)
    }
}

impl SessionStore {
    pub fn new(max_messages: usize, max_msg_chars: usize, ttl_hours: i64) -> Self {
        Self { sessions: Arc::new(DashMap::new()), max_messages, max_msg_chars, ttl_hours }
    }

    /// Mint a fresh session id and store an empty log. Never fails: if the
    /// map insert somehow couldn't happen, the id returned is still usable
    /// by callers (a subsequent `load` simply returns empty).
    pub fn create(&self, user_id: &str, desk_name: &str) -> String {
        let id = new_session_id();
        let mut session = Session::new(user_id.to_string(), desk_name.to_string());
        session.expires_at = session.created_at + chrono::Duration::hours(self.ttl_hours);
        self.sessions.insert(id.clone(), session);
        id
    }

    /// Load the message log for a session id. Returns empty if missing or
    /// expired.
    pub fn load(&self, session_id: &str) -> Vec<Message> {
        match self.sessions.get(session_id) {
            Some(entry) if !entry.is_expired() => entry.messages.clone(),
            Some(_) => {
                self.sessions.remove(session_id);
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Append one user turn and one assistant turn, rotate to
    /// `max_messages`, refresh `updated_at`/expiry, and increment
    /// `message_count`. Lazily fills `user_id`/`desk_name` if they were
    /// previously unset. Silently no-ops if the session row is missing —
    /// callers never learn of a dropped append.
    pub fn append(
        &self,
        session_id: &str,
        user_text: &str,
        assistant_text: &str,
        user_id: &str,
        desk_name: &str,
    ) {
        let Some(mut entry) = self.sessions.get_mut(session_id) else {
            tracing::debug!(%session_id, "append on unknown session, dropping");
            return;
        };

        entry.messages.push(Message { role: Role::User, content: truncate(user_text, self.max_msg_chars) });
        entry.messages.push(Message {
            role: Role::Assistant,
            content: truncate(assistant_text, self.max_msg_chars),
        });

        if entry.messages.len() > self.max_messages {
            let overflow = entry.messages.len() - self.max_messages;
            entry.messages.drain(0..overflow);
        }

        entry.message_count += 1;
        entry.updated_at = Utc::now();
        entry.expires_at = entry.updated_at + chrono::Duration::hours(self.ttl_hours);

        if entry.user_id.is_empty() && !user_id.is_empty() {
            entry.user_id = user_id.to_string();
        }
        if entry.desk_name.is_empty() && !desk_name.is_empty() {
            entry.desk_name = desk_name.to_string();
        }
    }

    /// Deterministic "Conversation History" rendering, matching the format
    /// the prior turns were shown to the model in.
    pub fn render_context(log: &[Message]) -> String {
        if log.is_empty() {
            return String::new();
        }

        let mut lines = vec!["[Conversation History — previous turns in this session]".to_string()];
        for message in log {
            let label = match message.role {
                Role::User => "Trader",
                Role::Assistant => "System",
            };
            lines.push(format!("{label}: {}", message.content));
        }
        lines.join("\n")
    }
}

/// Unix timestamp helper used by callers that want to stamp responses
/// without importing `chrono` themselves.
pub fn unix_now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_desk_maps_known_prefixes() {
        assert_eq!(derive_desk("T_HY_001"), "HY");
        assert_eq!(derive_desk("T_RATES_9"), "RATES");
        assert_eq!(derive_desk("anonymous"), "GENERAL");
    }

    #[test]
    fn derive_role_from_prefix() {
        assert_eq!(derive_role("T_HY_001"), "business");
        assert_eq!(derive_role("dev-laptop"), "technical");
    }

    #[test]
    fn create_returns_usable_id_and_load_returns_empty() {
        let store = SessionStore::default();
        let id = store.create("T_HY_001", "");
        assert!(id.starts_with("sess-"));
        assert!(store.load(&id).is_empty());
    }

    #[test]
    fn append_then_load_round_trips() {
        let store = SessionStore::default();
        let id = store.create("T_HY_001", "");
        store.append(&id, "hello", "hi there", "T_HY_001", "HY");

        let log = store.load(&id);
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].content, "hello");
        assert_eq!(log[1].content, "hi there");
    }

    #[test]
    fn append_rotates_to_max_messages() {
        let store = SessionStore::new(4, 1000, 24);
        let id = store.create("u", "");
        for i in 0..5 {
            store.append(&id, &format!("q{i}"), &format!("a{i}"), "u", "");
        }
        let log = store.load(&id);
        assert_eq!(log.len(), 4);
        assert_eq!(log[0].content, "q3");
    }

    #[test]
    fn append_on_unknown_session_does_not_panic() {
        let store = SessionStore::default();
        store.append("sess-does-not-exist", "a", "b", "", "");
    }

    #[test]
    fn message_count_never_decreases_across_rotation() {
        let store = SessionStore::new(2, 1000, 24);
        let id = store.create("u", "");
        for _ in 0..10 {
            store.append(&id, "q", "a", "u", "");
        }
        let entry = store.sessions.get(&id).unwrap();
        assert_eq!(entry.message_count, 10);
        assert!(entry.messages.len() <= 2);
    }

    #[test]
    fn truncate_appends_ellipsis_sentinel() {
        let long = "x".repeat(10);
        assert_eq!(truncate(&long, 5), "xxxxx…");
        assert_eq!(truncate("short", 5), "short");
    }

    #[test]
    fn render_context_matches_expected_format() {
        let log = vec![
            Message { role: Role::User, content: "What is a state machine?".to_string() },
            Message { role: Role::Assistant, content: "It's a model of computation.".to_string() },
        ];
        let rendered = SessionStore::render_context(&log);
        assert!(rendered.starts_with("[Conversation History — previous turns in this session]"));
        assert!(rendered.contains("Trader: What is a state machine?"));
        assert!(rendered.contains("System: It's a model of computation."));
    }

    #[test]
    fn render_context_of_empty_log_is_empty_string() {
        assert_eq!(SessionStore::render_context(&[]), "");
    }

    #[test]
    fn lazily_fills_user_and_desk_on_first_append() {
        let store = SessionStore::default();
        let id = store.create("", "");
        store.append(&id, "q", "a", "T_IG_7", "IG");
        let entry = store.sessions.get(&id).unwrap();
        assert_eq!(entry.user_id, "T_IG_7");
        assert_eq!(entry.desk_name, "IG");
    }
}
