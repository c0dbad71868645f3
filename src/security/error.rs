use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

use crate::security::token_provider::TokenClaims;

/// Failure talking to the session store. Never used for "key not found".
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),

    #[error("session store timed out after {0:?}")]
    Timeout(Duration),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid token signature")]
    MalformedSignature,

    #[error("malformed token: {0}")]
    Malformed(String),

    /// The stale claims stay available for logout bookkeeping.
    #[error("token expired")]
    Expired(Box<TokenClaims>),

    #[error("token carries no authorities")]
    MissingAuthorities,

    #[error("refresh token does not match the active session")]
    RefreshMismatch,

    #[error("refresh token missing")]
    MissingRefreshToken,

    #[error("unknown member: {0}")]
    UnknownMember(String),

    #[error("member already exists: {0}")]
    MemberExists(String),

    #[error("invalid principal: {0}")]
    InvalidPrincipal(String),

    #[error("authentication required")]
    Unauthenticated,

    #[error("access denied: requires {0}")]
    AccessDenied(String),

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
}

impl AuthError {
    /// Claims of an expired token, if that is what this error is.
    pub fn expired_claims(&self) -> Option<&TokenClaims> {
        match self {
            AuthError::Expired(claims) => Some(claims),
            _ => None,
        }
    }

    /// Short machine-readable reason, used in audit events.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::MalformedSignature => "malformed_signature",
            AuthError::Malformed(_) => "malformed",
            AuthError::Expired(_) => "expired",
            AuthError::MissingAuthorities => "missing_authorities",
            AuthError::RefreshMismatch => "refresh_mismatch",
            AuthError::MissingRefreshToken => "missing_refresh_token",
            AuthError::UnknownMember(_) => "unknown_member",
            AuthError::MemberExists(_) => "member_exists",
            AuthError::InvalidPrincipal(_) => "invalid_principal",
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::AccessDenied(_) => "access_denied",
            AuthError::Signing(_) => "signing",
            AuthError::PasswordHash(_) => "password_hash",
            AuthError::StoreUnavailable(_) => "store_unavailable",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::MalformedSignature
            | AuthError::Malformed(_)
            | AuthError::Expired(_)
            | AuthError::MissingAuthorities
            | AuthError::RefreshMismatch
            | AuthError::UnknownMember(_)
            | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::AccessDenied(_) => StatusCode::FORBIDDEN,
            AuthError::MissingRefreshToken
            | AuthError::MemberExists(_)
            | AuthError::InvalidPrincipal(_) => StatusCode::BAD_REQUEST,
            AuthError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Signing(_) | AuthError::PasswordHash(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        // Never echo member names back on unknown-member failures.
        let message = match &self {
            AuthError::UnknownMember(_) => AuthError::InvalidCredentials.to_string(),
            other => other.to_string(),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_service_unavailable() {
        let err: AuthError = StoreError::Timeout(Duration::from_millis(5)).into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.reason(), "store_unavailable");
    }

    #[test]
    fn test_authorization_failures_are_distinguished() {
        assert_eq!(AuthError::Unauthenticated.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::AccessDenied("ROLE_admin".into()).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_expired_claims_only_on_expired() {
        assert!(AuthError::MalformedSignature.expired_claims().is_none());
        let claims = TokenClaims {
            sub: "alice".into(),
            authorities: None,
            iat: 0,
            exp: 1,
            jti: "x".into(),
        };
        let err = AuthError::Expired(Box::new(claims));
        assert_eq!(err.expired_claims().map(|c| c.sub.as_str()), Some("alice"));
    }
}
