//! Server-side login sessions keyed by an opaque cookie token.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::debug;

const TOKEN_LEN: usize = 40;

/// Lookup key for a session. Only the hash of the cookie token is kept in
/// memory.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn from_cookie(cookie_value: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(cookie_value.as_bytes());
        let result = hasher.finalize();
        Self(hex::encode(&result[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}...", &self.0[..8.min(self.0.len())])
    }
}

#[derive(Debug, Clone, Copy)]
struct SessionEntry {
    user_id: i64,
    started_at: Instant,
}

/// Concurrent session table with a fixed lifetime per session.
#[derive(Debug)]
pub struct SessionStore {
    entries: DashMap<SessionKey, SessionEntry>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Starts a session for `user_id` and returns the cookie token.
    pub fn start(&self, user_id: i64) -> String {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();
        let key = SessionKey::from_cookie(&token);
        debug!(user_id, "Started session {key}");
        self.entries.insert(
            key,
            SessionEntry {
                user_id,
                started_at: Instant::now(),
            },
        );
        token
    }

    /// The user behind a live session. Expired sessions are dropped on sight.
    pub fn user_id(&self, token: &str) -> Option<i64> {
        let key = SessionKey::from_cookie(token);
        let entry = *self.entries.get(&key)?;
        if entry.started_at.elapsed() < self.ttl {
            Some(entry.user_id)
        } else {
            self.entries.remove(&key);
            None
        }
    }

    pub fn end(&self, token: &str) -> bool {
        self.entries.remove(&SessionKey::from_cookie(token)).is_some()
    }

    /// Ends every session belonging to `user_id`.
    pub fn end_user(&self, user_id: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.user_id != user_id);
        before.saturating_sub(self.entries.len())
    }

    /// Drops expired sessions and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.started_at.elapsed() < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_hashes_token() {
        let key = SessionKey::from_cookie("abc");
        assert_eq!(key.as_str().len(), 32);
        assert_ne!(key.as_str(), "abc");
        assert_eq!(key, SessionKey::from_cookie("abc"));
        assert!(key.to_string().ends_with("..."));
    }

    #[test]
    fn test_start_lookup_end() {
        let store = SessionStore::new(Duration::from_secs(60));
        let token = store.start(7);
        assert_eq!(token.len(), TOKEN_LEN);
        assert_eq!(store.user_id(&token), Some(7));
        assert_eq!(store.user_id("forged"), None);

        assert!(store.end(&token));
        assert_eq!(store.user_id(&token), None);
        assert!(!store.end(&token));
    }

    #[test]
    fn test_end_user_drops_all_their_sessions() {
        let store = SessionStore::new(Duration::from_secs(60));
        let a = store.start(1);
        let b = store.start(1);
        let other = store.start(2);

        assert_eq!(store.end_user(1), 2);
        assert_eq!(store.user_id(&a), None);
        assert_eq!(store.user_id(&b), None);
        assert_eq!(store.user_id(&other), Some(2));
    }

    #[test]
    fn test_end_user_during_concurrent_logins() {
        let store = SessionStore::new(Duration::from_secs(60));
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..500 {
                    store.start(2);
                }
            });
            for _ in 0..50 {
                store.start(1);
                store.end_user(1);
            }
            store.start(1);
        });

        assert_eq!(store.end_user(1), 1);
        assert_eq!(store.len(), 500);
    }

    #[test]
    fn test_expired_sessions() {
        let store = SessionStore::new(Duration::ZERO);
        let token = store.start(1);
        assert_eq!(store.user_id(&token), None);

        store.start(2);
        assert_eq!(store.purge_expired(), 1);
        assert!(store.is_empty());
    }
}
