/// In-memory session registry
///
/// Tokens are random UUID v4 strings handed to the browser in an HttpOnly cookie.
/// Expired sessions are purged lazily when they are looked up.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Who a session belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Researcher,
}

/// An authenticated session
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// Admin username or researcher email
    pub subject: String,
    pub role: Role,
    /// Set for researcher sessions
    pub researcher_id: Option<i64>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Open a new session and return its token
    pub async fn create(&self, subject: String, role: Role, researcher_id: Option<i64>) -> (String, Session) {
        let now = Utc::now();
        let token = uuid::Uuid::new_v4().simple().to_string();
        let session = Session {
            subject,
            role,
            researcher_id,
            expires_at: now + self.ttl,
        };

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, existing| !existing.is_expired(now));
        if sessions.len() < before {
            tracing::debug!("⌛ Purged {} expired session(s)", before - sessions.len());
        }
        sessions.insert(token.clone(), session.clone());
        (token, session)
    }

    /// Look up a live session
    pub async fn get(&self, token: &str) -> Option<Session> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                Some(session) if !session.is_expired(now) => return Some(session.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: drop it
        let mut sessions = self.sessions.write().await;
        if sessions.get(token).is_some_and(|s| s.is_expired(now)) {
            sessions.remove(token);
            tracing::debug!("⌛ Session expired and removed");
        }
        None
    }

    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// End every session of a researcher (deactivation, deletion, password change)
    pub async fn revoke_researcher(&self, researcher_id: i64) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.researcher_id != Some(researcher_id));
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_get_revoke() {
        let store = SessionStore::new(Duration::hours(3));
        let (token, session) = store.create("admin".into(), Role::Admin, None).await;
        assert_eq!(session.role, Role::Admin);
        assert_eq!(store.get(&token).await.unwrap().subject, "admin");
        assert!(store.revoke(&token).await);
        assert!(store.get(&token).await.is_none());
        assert!(!store.revoke(&token).await);
    }

    #[tokio::test]
    async fn expired_sessions_are_purged() {
        let store = SessionStore::new(Duration::seconds(-1));
        let (token, _) = store.create("ada@lab.org".into(), Role::Researcher, Some(1)).await;
        assert_eq!(store.len().await, 1);
        assert!(store.get(&token).await.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn creating_a_session_purges_expired_ones() {
        let store = SessionStore::new(Duration::seconds(-1));
        for _ in 0..100 {
            store.create("bot@lab.org".into(), Role::Researcher, Some(7)).await;
        }
        assert_eq!(store.len().await, 1);

        let live = SessionStore::new(Duration::hours(1));
        live.create("a@lab.org".into(), Role::Researcher, Some(1)).await;
        live.create("b@lab.org".into(), Role::Researcher, Some(2)).await;
        assert_eq!(live.len().await, 2);
    }

    #[tokio::test]
    async fn revoke_researcher_only_hits_their_sessions() {
        let store = SessionStore::new(Duration::hours(1));
        store.create("a@lab.org".into(), Role::Researcher, Some(1)).await;
        store.create("a@lab.org".into(), Role::Researcher, Some(1)).await;
        let (other, _) = store.create("b@lab.org".into(), Role::Researcher, Some(2)).await;
        assert_eq!(store.revoke_researcher(1).await, 2);
        assert!(store.get(&other).await.is_some());
    }
}
