use tracing::{info, warn};

/// Security events on the `audit` target. Never receives token material.
#[derive(Debug, Clone, Default)]
pub struct AuditLogger;

impl AuditLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn login_success(&self, identity: &str) {
        info!(target: "audit", event = "login_success", identity);
    }

    pub fn login_failure(&self, identity: &str, reason: &str) {
        warn!(target: "audit", event = "login_failure", identity, reason);
    }

    pub fn token_accepted(&self, identity: &str, path: &str) {
        info!(target: "audit", event = "token_accepted", identity, path);
    }

    pub fn token_rejected(&self, path: &str, reason: &str) {
        info!(target: "audit", event = "token_rejected", path, reason);
    }

    pub fn revoked_token_presented(&self, path: &str) {
        warn!(target: "audit", event = "revoked_token_presented", path);
    }

    pub fn reissued(&self, identity: &str) {
        info!(target: "audit", event = "access_token_reissued", identity);
    }

    pub fn reissue_denied(&self, identity: Option<&str>, reason: &str) {
        warn!(target: "audit", event = "reissue_denied", identity = identity.unwrap_or(""), reason);
    }

    pub fn logout(&self, identity: &str, access_revoked: bool) {
        info!(target: "audit", event = "logout", identity, access_revoked);
    }

    pub fn logout_denied(&self, identity: &str, reason: &str) {
        warn!(target: "audit", event = "logout_denied", identity, reason);
    }

    pub fn store_unavailable(&self, operation: &str, error: &str) {
        warn!(target: "audit", event = "store_unavailable", operation, error);
    }
}
