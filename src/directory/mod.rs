//! In-memory member directory.
//!
//! Backs both credential verification (sign-in) and principal lookup
//! (reissue). Passwords are kept as Argon2 PHC strings.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info};

use crate::config::MemberSeed;
use crate::security::error::AuthError;
use crate::security::principal::{CredentialVerifier, Principal, PrincipalLookup};

pub const ROLE_PREFIX: &str = "ROLE_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: u64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub nickname: Option<String>,
    pub roles: Vec<String>,
}

impl Member {
    /// Roles as authorities: `user` becomes `ROLE_user`.
    pub fn authorities(&self) -> Vec<String> {
        self.roles
            .iter()
            .map(|role| {
                if role.starts_with(ROLE_PREFIX) {
                    role.clone()
                } else {
                    format!("{ROLE_PREFIX}{role}")
                }
            })
            .collect()
    }

    pub fn principal(&self) -> Result<Principal, AuthError> {
        Principal::new(self.username.clone(), self.authorities())
    }
}

#[derive(Debug, Default)]
struct Members {
    sequence: u64,
    by_id: HashMap<u64, Member>,
}

#[derive(Debug, Default)]
pub struct MemberRepository {
    inner: RwLock<Members>,
}

impl MemberRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seeds(seeds: &[MemberSeed]) -> Result<Self, AuthError> {
        let repo = Self::new();
        for seed in seeds {
            repo.save(
                seed.username.clone(),
                seed.password.clone(),
                seed.nickname.clone(),
                seed.roles.clone(),
            )?;
        }
        info!(count = seeds.len(), "member directory seeded");
        Ok(repo)
    }

    /// Register a member under the next id. Usernames are unique.
    pub fn save(
        &self,
        username: String,
        password: String,
        nickname: Option<String>,
        roles: Vec<String>,
    ) -> Result<Member, AuthError> {
        let mut member = Member {
            id: 0,
            username,
            password_hash: String::new(),
            nickname,
            roles,
        };
        // Reject members whose roles cannot be carried in a token.
        member.principal()?;
        // Hash before taking the write lock.
        member.password_hash = hash_password(&password)?;

        let mut members = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if members.by_id.values().any(|m| m.username == member.username) {
            return Err(AuthError::MemberExists(member.username));
        }
        member.id = members.sequence + 1;
        members.sequence = member.id;
        members.by_id.insert(member.id, member.clone());
        debug!(id = member.id, username = %member.username, "member saved");
        Ok(member)
    }

    pub fn find_by_id(&self, id: u64) -> Option<Member> {
        self.read().by_id.get(&id).cloned()
    }

    pub fn find_by_username(&self, username: &str) -> Option<Member> {
        self.read()
            .by_id
            .values()
            .find(|m| m.username == username)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Members> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt =
        SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::PasswordHash(e.to_string()))?;
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::PasswordHash(e.to_string()))?;
    Ok(phc.to_string())
}

fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

impl CredentialVerifier for MemberRepository {
    fn verify(&self, identity: &str, secret: &str) -> Result<Principal, AuthError> {
        let member = self
            .find_by_username(identity)
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(&member.password_hash, secret) {
            return Err(AuthError::InvalidCredentials);
        }
        member.principal()
    }
}

impl PrincipalLookup for MemberRepository {
    fn find_principal(&self, identity: &str) -> Option<Principal> {
        self.find_by_username(identity)?.principal().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> MemberRepository {
        MemberRepository::from_seeds(&[
            MemberSeed {
                username: "alice".into(),
                password: "pw".into(),
                nickname: None,
                roles: vec!["user".into()],
            },
            MemberSeed {
                username: "root".into(),
                password: "toor".into(),
                nickname: Some("admin".into()),
                roles: vec!["ROLE_admin".into(), "user".into()],
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_save_assigns_sequential_ids() {
        let repo = seeded();
        assert_eq!(repo.len(), 2);
        assert_eq!(repo.find_by_id(1).unwrap().username, "alice");
        assert_eq!(repo.find_by_id(2).unwrap().username, "root");
        assert!(repo.find_by_id(3).is_none());
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let repo = seeded();
        let result = repo.save("alice".into(), "x".into(), None, vec!["user".into()]);
        assert!(matches!(result, Err(AuthError::MemberExists(_))));
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn test_roles_map_to_authorities() {
        let repo = seeded();
        let root = repo.find_by_username("root").unwrap();
        assert_eq!(root.authorities(), vec!["ROLE_admin".to_string(), "ROLE_user".to_string()]);
    }

    #[test]
    fn test_verify_credentials() {
        let repo = seeded();
        let principal = repo.verify("alice", "pw").unwrap();
        assert_eq!(principal.identity(), "alice");
        assert_eq!(principal.authorities(), &["ROLE_user".to_string()]);

        assert!(matches!(repo.verify("alice", "wrong"), Err(AuthError::InvalidCredentials)));
        assert!(matches!(repo.verify("mallory", "pw"), Err(AuthError::InvalidCredentials)));
    }

    #[test]
    fn test_find_principal() {
        let repo = seeded();
        assert!(repo.find_principal("root").unwrap().has_authority("ROLE_admin"));
        assert!(repo.find_principal("nobody").is_none());
    }

    #[test]
    fn test_passwords_are_not_stored_in_clear() {
        let repo = seeded();
        let alice = repo.find_by_username("alice").unwrap();
        assert!(alice.password_hash.starts_with("$argon2"));
        assert!(verify_password(&alice.password_hash, "pw"));
        assert!(!verify_password("pw", "pw"));

        let json = serde_json::to_value(&alice).unwrap();
        assert!(json.get("password_hash").is_none());
    }

    #[test]
    fn test_roles_with_commas_rejected() {
        let repo = MemberRepository::new();
        let result = repo.save("eve".into(), "pw".into(), None, vec!["a,b".into()]);
        assert!(matches!(result, Err(AuthError::InvalidPrincipal(_))));
        assert!(repo.is_empty());
    }
}
