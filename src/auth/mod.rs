/// Authentication layer
///
/// Two kinds of principals can log in:
/// - the administrator configured through the environment
/// - any active researcher with a stored credential, identified by email
///
/// A successful login opens a server-side session referenced by an HttpOnly cookie.

pub mod password;
pub mod session;

use crate::{
    config::{AuthConfig, DEFAULT_SESSION_TTL_HOURS},
    schema::{
        record_id,
        types::{ACTIVE_COLUMN, PASSWORD_HASH_COLUMN},
        EntityKind,
    },
    storage::{Database, StoreResult},
};
use axum::http::{header, HeaderMap};
use serde_json::Value;

pub use password::{hash_password, verify_password};
pub use session::{Role, Session, SessionStore};

/// Login, session lookup and cookie handling
#[derive(Debug)]
pub struct AuthService {
    admin_username: String,
    admin_password: Option<String>,
    cookie_name: String,
    sessions: SessionStore,
}

impl AuthService {
    pub fn new(config: &AuthConfig) -> Self {
        if config.admin_password.is_none() {
            tracing::warn!("⚠️ No admin password configured; only researcher logins are possible");
        }
        Self {
            admin_username: config.admin_username.clone(),
            admin_password: config.admin_password.clone(),
            cookie_name: config.session_cookie.clone(),
            sessions: SessionStore::new(session_ttl(config.session_ttl_hours)),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Check credentials and open a session. `Ok(None)` means the credentials were rejected.
    pub async fn login(&self, db: &Database, username: &str, password: &str) -> StoreResult<Option<(String, Session)>> {
        if let Some(admin_password) = &self.admin_password {
            let name_ok = password::constant_time_eq(username.as_bytes(), self.admin_username.as_bytes());
            let password_ok = password::constant_time_eq(password.as_bytes(), admin_password.as_bytes());
            if name_ok && password_ok {
                tracing::info!("🔑 Admin login: {}", username);
                return Ok(Some(
                    self.sessions.create(username.to_string(), Role::Admin, None).await,
                ));
            }
        }

        let candidates = db
            .select(EntityKind::Researcher, &[("EMAIL", Value::String(username.to_string()))])
            .await?;
        for researcher in candidates {
            let active = researcher.get(ACTIVE_COLUMN).and_then(Value::as_bool).unwrap_or(true);
            let Some(hash) = researcher.get(PASSWORD_HASH_COLUMN).and_then(Value::as_str) else {
                continue;
            };
            if active && verify_password(password, hash) {
                let id = record_id(&researcher);
                tracing::info!("🔑 Researcher login: {} (id {:?})", username, id);
                return Ok(Some(
                    self.sessions.create(username.to_string(), Role::Researcher, id).await,
                ));
            }
        }

        tracing::warn!("🚫 Login failed for {}", username);
        Ok(None)
    }

    /// Resolve the session referenced by the request's cookie, if any
    pub async fn session_from_headers(&self, headers: &HeaderMap) -> Option<Session> {
        let token = token_from_headers(headers, &self.cookie_name)?;
        self.sessions.get(&token).await
    }

    /// End the session referenced by the request's cookie
    pub async fn logout(&self, headers: &HeaderMap) -> bool {
        match token_from_headers(headers, &self.cookie_name) {
            Some(token) => self.sessions.revoke(&token).await,
            None => false,
        }
    }

    /// `Set-Cookie` value carrying a session token
    pub fn session_cookie(&self, token: &str) -> String {
        format!(
            "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
            self.cookie_name,
            token,
            self.sessions.ttl().num_seconds().max(0)
        )
    }

    /// `Set-Cookie` value removing the session cookie
    pub fn clear_cookie(&self) -> String {
        format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", self.cookie_name)
    }
}

/// Session lifetime; out-of-range hour counts fall back to the default
fn session_ttl(hours: i64) -> chrono::Duration {
    match chrono::Duration::try_hours(hours) {
        Some(ttl) if hours > 0 => ttl,
        _ => {
            tracing::warn!(
                "⚠️ Ignoring invalid session lifetime of {} hours; using {}",
                hours,
                DEFAULT_SESSION_TTL_HOURS
            );
            chrono::Duration::hours(DEFAULT_SESSION_TTL_HOURS)
        }
    }
}

/// Extract a cookie value from the `Cookie` request headers
pub fn token_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn finds_named_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("lang=fr; labtrack_session=abc123; theme=dark"),
        );
        assert_eq!(token_from_headers(&headers, "labtrack_session").as_deref(), Some("abc123"));
        assert_eq!(token_from_headers(&headers, "missing"), None);
    }

    #[test]
    fn empty_cookie_value_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("labtrack_session="));
        assert_eq!(token_from_headers(&headers, "labtrack_session"), None);
    }

    #[test]
    fn oversized_session_lifetime_falls_back_to_default() {
        assert_eq!(session_ttl(i64::MAX), chrono::Duration::hours(DEFAULT_SESSION_TTL_HOURS));
        assert_eq!(session_ttl(0), chrono::Duration::hours(DEFAULT_SESSION_TTL_HOURS));
        assert_eq!(session_ttl(12), chrono::Duration::hours(12));
    }

    #[test]
    fn cookies_carry_flags() {
        let service = AuthService::new(&AuthConfig {
            admin_username: "admin".into(),
            admin_password: Some("secret".into()),
            session_cookie: "sid".into(),
            session_ttl_hours: 3,
        });
        assert_eq!(service.session_cookie("t"), "sid=t; HttpOnly; SameSite=Lax; Path=/; Max-Age=10800");
        assert!(service.clear_cookie().ends_with("Max-Age=0"));
    }
}
