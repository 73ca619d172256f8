//! Bearer-token sessions and role checks.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Extension;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use common::{Caller, Role};
use tokio::sync::RwLock;

use crate::error::ApiError;

/// What a session token resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub caller: Caller,
    pub region: Option<String>,
}

impl Session {
    pub fn with_region(caller: Caller, region: impl Into<String>) -> Self {
        Self {
            caller,
            region: Some(region.into()),
        }
    }
}

impl From<Caller> for Session {
    fn from(caller: Caller) -> Self {
        Self {
            caller,
            region: None,
        }
    }
}

/// In-memory map from session token to the session it authenticates.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh random token for the session.
    pub async fn issue(&self, session: impl Into<Session>) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        self.register(token.clone(), session).await;
        token
    }

    /// Registers a session under a known token, replacing any previous owner.
    pub async fn register(&self, token: impl Into<String>, session: impl Into<Session>) {
        self.sessions
            .write()
            .await
            .insert(token.into(), session.into());
    }

    pub async fn resolve(&self, token: &str) -> Option<Session> {
        self.sessions.read().await.get(token).cloned()
    }

    /// Removes a token. Returns false if it was not registered.
    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }
}

/// Resolves the bearer token and stores the `Caller` and its `Session` in
/// request extensions.
pub async fn require_session(
    State(sessions): State<SessionRegistry>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(req.headers()).ok_or(ApiError::Unauthorized)?;
    let session = sessions
        .resolve(token)
        .await
        .ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(session.caller);
    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

/// Rejects callers that are not admins. Must run inside `require_session`.
pub async fn require_admin(
    Extension(caller): Extension<Caller>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    require_role(&caller, Role::Admin)?;
    Ok(next.run(req).await)
}

pub fn require_role(caller: &Caller, role: Role) -> Result<(), ApiError> {
    if caller.has_role(role) {
        Ok(())
    } else {
        tracing::warn!(
            user_id = %caller.user_id,
            role = %caller.role,
            required = %role,
            "role not authorized"
        );
        Err(ApiError::Forbidden)
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let token = header.to_str().ok()?.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}
