pub mod audit_log;
pub mod context;
pub mod error;
pub mod filter;
pub mod login_filter;
pub mod principal;
pub mod session_service;
pub mod session_store;
pub mod token_provider;
pub mod verification_filter;

pub use context::{Authenticated, SecurityContext};
pub use error::{AuthError, StoreError};
pub use principal::{CredentialVerifier, Principal, PrincipalLookup};
pub use session_service::SessionService;
pub use token_provider::{TokenClaims, TokenPair, TokenProvider};
