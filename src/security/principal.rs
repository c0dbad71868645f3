use serde::Serialize;

use crate::security::error::AuthError;

/// An authenticated identity and its authorities, in grant order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    identity: String,
    authorities: Vec<String>,
}

impl Principal {
    /// Build a principal. Authorities must be non-empty and free of `,`
    /// (the token claim joins them with commas); duplicates are dropped.
    pub fn new<I, S>(identity: impl Into<String>, authorities: I) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let identity = identity.into();
        if identity.trim().is_empty() {
            return Err(AuthError::InvalidPrincipal("empty identity".to_string()));
        }
        let mut unique: Vec<String> = Vec::new();
        for authority in authorities {
            let authority = authority.into();
            if authority.is_empty() || authority.contains(',') {
                return Err(AuthError::InvalidPrincipal(format!(
                    "invalid authority {authority:?}"
                )));
            }
            if !unique.contains(&authority) {
                unique.push(authority);
            }
        }
        Ok(Self {
            identity,
            authorities: unique,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn authorities(&self) -> &[String] {
        &self.authorities
    }

    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.iter().any(|a| a == authority)
    }

    pub fn joined_authorities(&self) -> String {
        self.authorities.join(",")
    }
}

/// Checks a username/password pair. Failures are always `InvalidCredentials`.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, identity: &str, secret: &str) -> Result<Principal, AuthError>;
}

/// Resolves the current principal for an identity (used on reissue).
pub trait PrincipalLookup: Send + Sync {
    fn find_principal(&self, identity: &str) -> Option<Principal>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_keeps_order_and_dedups() {
        let p = Principal::new("alice", ["ROLE_user", "ROLE_admin", "ROLE_user"]).unwrap();
        assert_eq!(p.identity(), "alice");
        assert_eq!(p.authorities(), &["ROLE_user".to_string(), "ROLE_admin".to_string()]);
        assert_eq!(p.joined_authorities(), "ROLE_user,ROLE_admin");
        assert!(p.has_authority("ROLE_admin"));
        assert!(!p.has_authority("ROLE_root"));
    }

    #[test]
    fn test_principal_rejects_bad_input() {
        assert!(matches!(
            Principal::new("", ["ROLE_user"]),
            Err(AuthError::InvalidPrincipal(_))
        ));
        assert!(Principal::new("alice", [""]).is_err());
        assert!(Principal::new("alice", ["ROLE_a,ROLE_b"]).is_err());
    }

    #[test]
    fn test_principal_without_authorities_is_allowed() {
        let p = Principal::new("alice", Vec::<String>::new()).unwrap();
        assert!(p.authorities().is_empty());
        assert_eq!(p.joined_authorities(), "");
    }
}
