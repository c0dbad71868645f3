//! Token lifecycle against the session store: sign-in, reissue, logout.
//!
//! Every operation is terminal on failure and performs its store writes
//! only after all checks have passed.

use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::security::audit_log::AuditLogger;
use crate::security::error::{AuthError, StoreError};
use crate::security::principal::{CredentialVerifier, PrincipalLookup};
use crate::security::session_store::{SessionStore, StoreLookup, REVOCATION_MARKER};
use crate::security::token_provider::{TokenPair, TokenProvider};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReissuedAccessToken {
    pub identity: String,
    pub access_token: String,
    pub access_token_expires_in: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// Refresh record removed; `access_revoked` tells whether a marker was written.
    LoggedOut { access_revoked: bool },
    /// No live refresh record for the subject, nothing changed.
    NoActiveSession,
}

pub struct SessionService {
    tokens: Arc<TokenProvider>,
    store: Arc<dyn SessionStore>,
    verifier: Arc<dyn CredentialVerifier>,
    directory: Arc<dyn PrincipalLookup>,
    refresh_record_ttl: Duration,
    audit: AuditLogger,
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("tokens", &self.tokens)
            .field("store", &self.store)
            .field("refresh_record_ttl", &self.refresh_record_ttl)
            .finish_non_exhaustive()
    }
}

impl SessionService {
    pub fn new(
        tokens: Arc<TokenProvider>,
        store: Arc<dyn SessionStore>,
        verifier: Arc<dyn CredentialVerifier>,
        directory: Arc<dyn PrincipalLookup>,
        refresh_record_ttl: Duration,
    ) -> Self {
        Self {
            tokens,
            store,
            verifier,
            directory,
            refresh_record_ttl,
            audit: AuditLogger::new(),
        }
    }

    pub fn tokens(&self) -> &TokenProvider {
        &self.tokens
    }

    /// Verify credentials, issue a pair and record the refresh token.
    ///
    /// The pair is only returned once the refresh record is persisted.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        let principal = match self.verifier.verify(username, password) {
            Ok(p) => p,
            Err(err) => {
                self.audit.login_failure(username, err.reason());
                return Err(AuthError::InvalidCredentials);
            }
        };
        let pair = self.tokens.create_token_pair(&principal)?;
        let ttl = self.refresh_record_ttl.min(self.tokens.refresh_token_validity());

        self.store
            .set(principal.identity(), &pair.refresh_token, ttl)
            .await
            .map_err(|err| self.store_failure("sign_in", err))?;

        self.audit.login_success(principal.identity());
        Ok(pair)
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// The stored refresh record is left untouched.
    pub async fn reissue(&self, refresh_token: Option<&str>) -> Result<ReissuedAccessToken, AuthError> {
        let refresh_token = refresh_token
            .filter(|t| !t.trim().is_empty())
            .ok_or(AuthError::MissingRefreshToken)?;
        let claims = self.tokens.parse_claims(refresh_token).inspect_err(|err| {
            self.audit.reissue_denied(None, err.reason());
        })?;
        let identity = claims.sub;

        let stored = self
            .store
            .get(&identity)
            .await
            .map_err(|err| self.store_failure("reissue", err))?;
        if !refresh_matches(&stored, refresh_token) {
            self.audit.reissue_denied(Some(&identity), AuthError::RefreshMismatch.reason());
            return Err(AuthError::RefreshMismatch);
        }

        let principal = self.directory.find_principal(&identity).ok_or_else(|| {
            self.audit.reissue_denied(Some(&identity), "unknown_member");
            AuthError::UnknownMember(identity.clone())
        })?;
        let pair = self.tokens.create_token_pair(&principal)?;

        self.audit.reissued(&identity);
        Ok(ReissuedAccessToken {
            identity,
            access_token: pair.access_token,
            access_token_expires_in: pair.access_token_expires_in,
        })
    }

    /// Revoke the presented access token, then drop the refresh record.
    ///
    /// An expired refresh token still identifies the subject, but it must be
    /// the one on record. The marker goes in first so a failure part way
    /// leaves the session in place for a retry to finish.
    pub async fn logout(
        &self,
        refresh_token: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<LogoutOutcome, AuthError> {
        let refresh_token = refresh_token
            .filter(|t| !t.trim().is_empty())
            .ok_or(AuthError::MissingRefreshToken)?;
        let identity = match self.tokens.parse_claims(refresh_token) {
            Ok(claims) => claims.sub,
            Err(AuthError::Expired(claims)) => claims.sub,
            Err(err) => return Err(err),
        };

        let stored = self
            .store
            .get(&identity)
            .await
            .map_err(|err| self.store_failure("logout", err))?;
        if !stored.exists() {
            debug!(identity = %identity, "logout without an active session");
            return Ok(LogoutOutcome::NoActiveSession);
        }
        if !refresh_matches(&stored, refresh_token) {
            self.audit.logout_denied(&identity, AuthError::RefreshMismatch.reason());
            return Err(AuthError::RefreshMismatch);
        }

        // An access token that no longer verifies needs no marker.
        let revoke_for = access_token
            .and_then(|token| self.tokens.parse_claims(token).ok().map(|c| (token, c)))
            .map(|(token, claims)| (token, claims.remaining_lifetime()))
            .filter(|(_, remaining)| !remaining.is_zero());

        if let Some((token, remaining)) = revoke_for {
            self.store
                .set(token, REVOCATION_MARKER, remaining)
                .await
                .map_err(|err| self.store_failure("logout", err))?;
        }
        self.store
            .delete(&identity)
            .await
            .map_err(|err| self.store_failure("logout", err))?;

        let access_revoked = revoke_for.is_some();
        self.audit.logout(&identity, access_revoked);
        Ok(LogoutOutcome::LoggedOut { access_revoked })
    }

    /// Whether a revocation marker is stored for this access token.
    pub async fn is_revoked(&self, access_token: &str) -> Result<bool, AuthError> {
        let lookup = self
            .store
            .get(access_token)
            .await
            .map_err(|err| self.store_failure("revocation_check", err))?;
        Ok(lookup.is_revocation_marker())
    }

    fn store_failure(&self, operation: &str, err: StoreError) -> AuthError {
        self.audit.store_unavailable(operation, &err.to_string());
        AuthError::StoreUnavailable(err)
    }
}

fn refresh_matches(stored: &StoreLookup, presented: &str) -> bool {
    match stored.value() {
        Some(value) => value.as_bytes().ct_eq(presented.as_bytes()).into(),
        None => false,
    }
}
