//! Authentication boundary.
//!
//! Two concerns live here: the pre-shared key that guards the HTTP API (compared in constant
//! time), and the session that decides whether the data store loads and follows changes.

use axum::{
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use subtle::ConstantTimeEq;
use tokio::sync::watch;

use crate::errors::{AppError, ErrorResponse};

/// Header carrying the API key. `Authorization: Bearer <key>` is accepted too.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Middleware guarding `/api`. With no key configured every request passes.
pub async fn require_api_key(expected: Option<String>, request: Request, next: Next) -> Response {
    let Some(expected) = expected else {
        return next.run(request).await;
    };

    match presented_key(request.headers()) {
        Some(key) if keys_match(key, &expected) => next.run(request).await,
        Some(_) => unauthorized_response("Invalid API key"),
        None => unauthorized_response("Missing API key"),
    }
}

/// The key a client presented, preferring the dedicated header over a bearer token.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
        })
}

/// Constant-time key comparison.
fn keys_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// An authenticated user on whose behalf the data store loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub signed_in_at: String,
}

/// Publishes the current session to everything that depends on one.
#[derive(Debug)]
pub struct SessionHandle {
    tx: watch::Sender<Option<Session>>,
}

impl SessionHandle {
    /// Start signed out.
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(None),
        }
    }

    pub fn sign_in(&self, user_id: &str) -> Session {
        let session = Session {
            user_id: user_id.to_string(),
            signed_in_at: Utc::now().to_rfc3339(),
        };
        tracing::info!(user_id, "Signed in");
        self.tx.send_replace(Some(session.clone()));
        session
    }

    pub fn sign_out(&self) {
        if self.tx.send_replace(None).is_some() {
            tracing::info!("Signed out");
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Create an unauthorized response.
fn unauthorized_response(message: &str) -> Response {
    let body = ErrorResponse::new(&AppError::Unauthorized(message.to_string()), 0);

    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_sign_in_and_out() {
        let sessions = SessionHandle::new();
        let rx = sessions.subscribe();
        assert!(rx.borrow().is_none());

        let session = sessions.sign_in("user-1");
        assert_eq!(session.user_id, "user-1");
        assert_eq!(*rx.borrow(), Some(session.clone()));
        assert_eq!(sessions.current(), Some(session));

        sessions.sign_out();
        assert!(sessions.current().is_none());
        assert!(rx.borrow().is_none());
    }

    #[test]
    fn test_keys_match() {
        assert!(keys_match("crm-key-123", "crm-key-123"));
        assert!(!keys_match("crm-key-123", "crm-key-124"));
        assert!(!keys_match("short", "much-longer-key"));
        assert!(keys_match("", ""));
    }

    #[test]
    fn test_presented_key_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_key(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer from-bearer".parse().unwrap());
        assert_eq!(presented_key(&headers), Some("from-bearer"));

        headers.insert(API_KEY_HEADER, "from-header".parse().unwrap());
        assert_eq!(presented_key(&headers), Some("from-header"));
    }

    #[test]
    fn test_non_bearer_authorization_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(presented_key(&headers), None);
    }
}
