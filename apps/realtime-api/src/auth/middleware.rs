//! Handshake authentication for the socket upgrade.

use axum::extract::{FromRequestParts, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::auth::tokens::TokenError;
use crate::AppState;

/// Authenticated user extracted from the handshake credential, read from
/// `Authorization: Bearer <token>` or the `token` query parameter.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub display_name: String,
}

/// Rejection returned before the upgrade when authentication fails.
#[derive(Debug)]
pub struct AuthError {
    status: StatusCode,
    message: &'static str,
}

impl AuthError {
    fn unauthorized(message: &'static str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let code = if self.status == StatusCode::UNAUTHORIZED {
            "UNAUTHORIZED"
        } else {
            "UNAVAILABLE"
        };
        let body = serde_json::json!({
            "error": {
                "code": code,
                "message": self.message
            }
        });
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let from_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string);

    from_header.or_else(|| {
        Query::<TokenQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|q| q.0.token)
    })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts);

        let identity = state
            .tokens
            .verify(token.as_deref())
            .map_err(|err| match err {
                TokenError::NotConfigured => {
                    tracing::error!("JWT_SECRET is not configured; refusing connection");
                    AuthError::unauthorized("Authentication is not configured")
                }
                TokenError::Missing => AuthError::unauthorized("Missing token"),
                TokenError::Invalid => AuthError::unauthorized("Invalid or expired token"),
            })?;

        let profile = state
            .stores
            .users
            .get_user(identity.user_id)
            .await
            .map_err(|_| AuthError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: "User lookup failed",
            })?;

        let display_name = match profile {
            Some(profile) => profile.shown_name().to_string(),
            None => identity
                .username
                .unwrap_or_else(|| format!("user{}", identity.user_id)),
        };

        Ok(AuthUser {
            user_id: identity.user_id,
            display_name,
        })
    }
}
