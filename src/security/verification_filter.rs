use async_trait::async_trait;
use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use tracing::debug;

use crate::security::audit_log::AuditLogger;
use crate::security::context::SecurityContext;
use crate::security::filter::RequestFilter;
use crate::security::session_service::SessionService;
use crate::security::token_provider::resolve_access_token;

/// Paths that never carry credentials worth checking. Exact match only.
pub const UNAUTHENTICATED_PATHS: &[&str] = &[
    "/",
    "/members/sign-in",
    "/members/reissue",
    "/favicon.ico",
    "/error",
];

/// Resolves the bearer access token into a [`SecurityContext`].
///
/// Never rejects a request: every failure leaves it `Unauthenticated` and
/// authorization downstream decides.
#[derive(Debug)]
pub struct VerificationFilter {
    sessions: Arc<SessionService>,
    audit: AuditLogger,
}

impl VerificationFilter {
    pub fn new(sessions: Arc<SessionService>) -> Self {
        Self {
            sessions,
            audit: AuditLogger::new(),
        }
    }

    pub async fn authenticate(&self, headers: &HeaderMap, path: &str) -> SecurityContext {
        let Some(token) = resolve_access_token(headers) else {
            debug!(path, "no bearer token");
            return SecurityContext::Unauthenticated;
        };

        match self.sessions.is_revoked(&token).await {
            Ok(false) => {}
            Ok(true) => {
                self.audit.revoked_token_presented(path);
                return SecurityContext::Unauthenticated;
            }
            Err(err) => {
                self.audit.token_rejected(path, err.reason());
                return SecurityContext::Unauthenticated;
            }
        }

        let tokens = self.sessions.tokens();
        if !tokens.validate(&token) {
            self.audit.token_rejected(path, "invalid_token");
            return SecurityContext::Unauthenticated;
        }
        match tokens.authentication_from_token(&token) {
            Ok(principal) => {
                self.audit.token_accepted(principal.identity(), path);
                SecurityContext::Authenticated(principal)
            }
            Err(err) => {
                self.audit.token_rejected(path, err.reason());
                SecurityContext::Unauthenticated
            }
        }
    }
}

#[async_trait]
impl RequestFilter for VerificationFilter {
    fn name(&self) -> &'static str {
        "verification"
    }

    fn should_skip(&self, path: &str) -> bool {
        UNAUTHENTICATED_PATHS.contains(&path)
    }

    async fn handle(&self, mut request: Request, next: Next) -> Response {
        let path = request.uri().path().to_string();
        let context = self.authenticate(request.headers(), &path).await;
        request.extensions_mut().insert(context);
        next.run(request).await
    }
}
