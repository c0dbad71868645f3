use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::security::error::AuthError;
use crate::security::principal::Principal;

/// Per-request authentication outcome, carried in request extensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SecurityContext {
    #[default]
    Unauthenticated,
    Authenticated(Principal),
}

impl SecurityContext {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            SecurityContext::Authenticated(p) => Some(p),
            SecurityContext::Unauthenticated => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal().is_some()
    }

    /// Context of a request; missing means the verification filter never ran.
    pub fn of(parts: &Parts) -> SecurityContext {
        parts
            .extensions
            .get::<SecurityContext>()
            .cloned()
            .unwrap_or_default()
    }
}

/// Extractor for handlers on protected routes.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match SecurityContext::of(parts) {
            SecurityContext::Authenticated(principal) => Ok(Authenticated(principal)),
            SecurityContext::Unauthenticated => Err(AuthError::Unauthenticated),
        }
    }
}

impl Authenticated {
    pub fn require_authority(&self, authority: &str) -> Result<&Principal, AuthError> {
        require_authority(&self.0, authority)
    }
}

pub fn require_authority<'a>(principal: &'a Principal, authority: &str) -> Result<&'a Principal, AuthError> {
    if principal.has_authority(authority) {
        Ok(principal)
    } else {
        Err(AuthError::AccessDenied(authority.to_string()))
    }
}
