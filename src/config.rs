use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Which lifetime governs how long a stored refresh record stays live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefreshRecordTtl {
    AccessToken,
    #[default]
    RefreshToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Base64-encoded HMAC secret.
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_access_ttl")]
    pub access_token_validity_secs: u64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_validity_secs: u64,
    #[serde(default)]
    pub refresh_record_ttl: RefreshRecordTtl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Absent means the in-process store.
    pub redis_url: Option<String>,
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            op_timeout_ms: default_op_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberSeed {
    pub username: String,
    pub password: String,
    pub nickname: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub jwt: JwtConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default = "default_members")]
    pub members: Vec<MemberSeed>,
}

fn default_access_ttl() -> u64 {
    1800
}
fn default_refresh_ttl() -> u64 {
    14 * 24 * 3600
}
fn default_op_timeout_ms() -> u64 {
    2000
}

fn default_members() -> Vec<MemberSeed> {
    vec![
        MemberSeed {
            username: "username".to_string(),
            password: "password".to_string(),
            nickname: Some("nickname".to_string()),
            roles: vec!["admin".to_string()],
        },
        MemberSeed {
            username: "username2".to_string(),
            password: "password2".to_string(),
            nickname: Some("nickname2".to_string()),
            roles: vec!["user".to_string()],
        },
    ]
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path).context("reading config file")?;
        let mut cfg: Config = serde_json::from_str(&raw).context("parsing JSON config")?;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(secret) = std::env::var("TOKEN_GATE_JWT_SECRET") {
            self.jwt.secret = secret;
        }
        if let Ok(v) = std::env::var("TOKEN_GATE_ACCESS_TTL_SECS") {
            self.jwt.access_token_validity_secs =
                v.parse().context("parsing TOKEN_GATE_ACCESS_TTL_SECS")?;
        }
        if let Ok(v) = std::env::var("TOKEN_GATE_REFRESH_TTL_SECS") {
            self.jwt.refresh_token_validity_secs =
                v.parse().context("parsing TOKEN_GATE_REFRESH_TTL_SECS")?;
        }
        if let Ok(url) = std::env::var("TOKEN_GATE_REDIS_URL") {
            self.store.redis_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.jwt.secret.trim().is_empty() {
            bail!("jwt.secret is required (or set TOKEN_GATE_JWT_SECRET)");
        }
        if self.jwt.access_token_validity_secs == 0 || self.jwt.refresh_token_validity_secs == 0 {
            bail!("token validity periods must be greater than zero");
        }
        Ok(())
    }

    /// TTL for the stored refresh record, never longer than the refresh token itself.
    pub fn refresh_record_ttl(&self) -> Duration {
        let refresh = self.jwt.refresh_token_validity_secs;
        let chosen = match self.jwt.refresh_record_ttl {
            RefreshRecordTtl::AccessToken => self.jwt.access_token_validity_secs,
            RefreshRecordTtl::RefreshToken => refresh,
        };
        Duration::from_secs(chosen.min(refresh))
    }
}
