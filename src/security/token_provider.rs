//! Signed bearer tokens (HS512).
//!
//! Access tokens carry `sub`, the comma-joined `role` claim, `iat`, `exp`
//! and a unique `jti`. Refresh tokens carry the same minus `role`. Both are
//! signed with one process-wide key derived from a base64 secret at startup.

use anyhow::{bail, Context};
use axum::http::{HeaderMap, HeaderValue};
use base64::{engine::general_purpose, Engine};
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::security::error::AuthError;
use crate::security::principal::Principal;

pub const GRANT_TYPE: &str = "Bearer";
pub const BEARER_PREFIX: &str = "Bearer ";
pub const AUTHORIZATION_HEADER: &str = "authorization";
pub const REFRESH_HEADER: &str = "refresh";

/// HS512 needs a key at least as long as its output.
pub const MIN_SECRET_BYTES: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(rename = "role", default, skip_serializing_if = "Option::is_none")]
    pub authorities: Option<String>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl TokenClaims {
    /// Authorities decoded from the claim; `None` when absent or empty.
    pub fn authority_list(&self) -> Option<Vec<String>> {
        let raw = self.authorities.as_deref()?;
        if raw.is_empty() {
            return None;
        }
        Some(raw.split(',').map(str::to_string).collect())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Time left until the token stops verifying, zero once passed.
    ///
    /// With no leeway a token is accepted while `exp >= now` in whole
    /// seconds, so it lives until the end of second `exp`.
    pub fn remaining_lifetime(&self) -> Duration {
        self.remaining_lifetime_at(Utc::now())
    }

    pub fn remaining_lifetime_at(&self, now: DateTime<Utc>) -> Duration {
        let end_ms = self.exp.saturating_add(1).saturating_mul(1000);
        let left = end_ms.saturating_sub(now.timestamp_millis());
        Duration::from_millis(left.max(0) as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub grant_type: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute access-token expiry, epoch milliseconds.
    pub access_token_expires_in: i64,
}

#[derive(Clone)]
pub struct TokenProvider {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    // Same checks minus `exp`, to recover stale claims.
    expired_validation: Validation,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("algorithm", &Algorithm::HS512)
            .field("access_ttl_secs", &self.access_ttl.num_seconds())
            .field("refresh_ttl_secs", &self.refresh_ttl.num_seconds())
            .finish_non_exhaustive()
    }
}

impl TokenProvider {
    /// Derive the signing key. Fails on a malformed or too-short secret.
    pub fn new(config: &JwtConfig) -> anyhow::Result<Self> {
        let key_bytes = general_purpose::STANDARD
            .decode(config.secret.trim())
            .context("jwt.secret is not valid base64")?;
        if key_bytes.len() < MIN_SECRET_BYTES {
            bail!(
                "jwt.secret decodes to {} bytes; HS512 requires at least {MIN_SECRET_BYTES}",
                key_bytes.len()
            );
        }
        let access_ttl = seconds(config.access_token_validity_secs)?;
        let refresh_ttl = seconds(config.refresh_token_validity_secs)?;

        let mut validation = Validation::new(Algorithm::HS512);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);
        let mut expired_validation = validation.clone();
        expired_validation.validate_exp = false;

        info!(
            access_ttl_secs = config.access_token_validity_secs,
            refresh_ttl_secs = config.refresh_token_validity_secs,
            "token provider initialised"
        );
        Ok(Self {
            encoding_key: EncodingKey::from_secret(&key_bytes),
            decoding_key: DecodingKey::from_secret(&key_bytes),
            validation,
            expired_validation,
            access_ttl,
            refresh_ttl,
        })
    }

    pub fn access_token_validity(&self) -> Duration {
        Duration::from_secs(self.access_ttl.num_seconds() as u64)
    }

    pub fn refresh_token_validity(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl.num_seconds() as u64)
    }

    pub fn create_token_pair(&self, principal: &Principal) -> Result<TokenPair, AuthError> {
        self.create_token_pair_at(principal, Utc::now())
    }

    /// Issue a pair as if the current time were `now`.
    pub fn create_token_pair_at(
        &self,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        if principal.authorities().is_empty() {
            return Err(AuthError::MissingAuthorities);
        }
        let access_exp = now + self.access_ttl;
        let refresh_exp = now + self.refresh_ttl;

        let access_claims = TokenClaims {
            sub: principal.identity().to_string(),
            authorities: Some(principal.joined_authorities()),
            iat: now.timestamp(),
            exp: access_exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let refresh_claims = TokenClaims {
            sub: principal.identity().to_string(),
            authorities: None,
            iat: now.timestamp(),
            exp: refresh_exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let access_token = self.sign(&access_claims)?;
        let refresh_token = self.sign(&refresh_claims)?;
        debug!(identity = principal.identity(), "token pair issued");

        Ok(TokenPair {
            grant_type: GRANT_TYPE.to_string(),
            access_token,
            refresh_token,
            access_token_expires_in: access_exp.timestamp_millis(),
        })
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS512), claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Verify the signature and decode the claims.
    ///
    /// `Expired` carries the claims so callers can still read the subject.
    pub fn parse_claims(&self, token: &str) -> Result<TokenClaims, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::Malformed("empty token".to_string()));
        }
        match decode::<TokenClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(err) if matches!(err.kind(), ErrorKind::ExpiredSignature) => {
                let stale = decode::<TokenClaims>(token, &self.decoding_key, &self.expired_validation)
                    .map_err(classify)?;
                Err(AuthError::Expired(Box::new(stale.claims)))
            }
            Err(err) => Err(classify(err)),
        }
    }

    pub fn validate(&self, token: &str) -> bool {
        match self.parse_claims(token) {
            Ok(_) => true,
            Err(err) => {
                info!(reason = err.reason(), "token rejected");
                false
            }
        }
    }

    /// Rebuild the principal from a valid access token.
    pub fn authentication_from_token(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.parse_claims(token)?;
        let authorities = claims.authority_list().ok_or(AuthError::MissingAuthorities)?;
        if authorities.iter().any(String::is_empty) {
            return Err(AuthError::MissingAuthorities);
        }
        Principal::new(claims.sub, authorities)
    }
}

fn seconds(secs: u64) -> anyhow::Result<chrono::Duration> {
    let secs = i64::try_from(secs).context("token validity out of range")?;
    chrono::Duration::try_seconds(secs).context("token validity out of range")
}

fn classify(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => AuthError::MalformedSignature,
        _ => AuthError::Malformed(err.to_string()),
    }
}

/// Access token from `Authorization: Bearer <token>`.
pub fn resolve_access_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

pub fn resolve_refresh_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REFRESH_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

pub fn set_access_token_header(headers: &mut HeaderMap, access_token: &str) -> Result<(), AuthError> {
    let value = HeaderValue::from_str(&format!("{BEARER_PREFIX}{access_token}"))
        .map_err(|e| AuthError::Signing(e.to_string()))?;
    headers.insert(AUTHORIZATION_HEADER, value);
    Ok(())
}

pub fn set_refresh_token_header(headers: &mut HeaderMap, refresh_token: &str) -> Result<(), AuthError> {
    let value = HeaderValue::from_str(refresh_token).map_err(|e| AuthError::Signing(e.to_string()))?;
    headers.insert(REFRESH_HEADER, value);
    Ok(())
}
