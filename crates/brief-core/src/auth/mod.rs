//! Credentials for the Brief API.
//!
//! [`CredentialCoordinator`] owns the signed-in credential and guarantees at
//! most one refresh against the identity provider at a time; every caller
//! that needs a token goes through [`AccessTokenSource::acquire`].

mod coordinator;
mod session;
mod supabase;

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use coordinator::{CredentialCoordinator, CredentialSettings};
pub use session::{KvSessionStore, SessionPersistence};
pub use supabase::{AuthError, AuthResult, SupabaseAuthClient};

/// Short-lived access token plus the material needed to renew it
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry time (Unix ms)
    pub expires_at: i64,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Credential {
    /// Whether the credential expires within `threshold_ms` of `now_ms`
    pub const fn expires_within(&self, threshold_ms: i64, now_ms: i64) -> bool {
        self.expires_at <= now_ms.saturating_add(threshold_ms)
    }

    pub fn has_refresh_material(&self) -> bool {
        !self.refresh_token.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .finish()
    }
}

/// Failure to obtain a usable credential.
///
/// `Clone` because one refresh outcome is handed to every waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// No credential or refresh material is available
    #[error("Not signed in")]
    Unauthenticated,
    /// The identity provider refused the refresh material
    #[error("Session expired, sign in again: {0}")]
    RefreshRejected(String),
    /// Network failure or timeout; a later attempt may succeed
    #[error("Credential refresh failed temporarily: {0}")]
    Transient(String),
    /// The refreshed credential could not be persisted
    #[error("Failed to persist credential: {0}")]
    Storage(String),
}

impl CredentialError {
    pub const fn requires_reauthentication(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::RefreshRejected(_))
    }
}

/// Errors an identity provider reports for a refresh request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("No refresh material")]
    NoRefreshMaterial,
    #[error("Provider rejected refresh: {0}")]
    ProviderRejected(String),
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl From<ProviderError> for CredentialError {
    fn from(value: ProviderError) -> Self {
        match value {
            ProviderError::NoRefreshMaterial => Self::Unauthenticated,
            ProviderError::ProviderRejected(message) => Self::RefreshRejected(message),
            ProviderError::Unavailable(message) => Self::Transient(message),
        }
    }
}

/// Exchanges refresh material for a new credential
pub trait IdentityProvider: Send + Sync + 'static {
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<Credential, ProviderError>> + Send;
}

/// Anything that can hand out a valid credential for an API request
pub trait AccessTokenSource: Send + Sync {
    fn acquire(&self) -> impl Future<Output = Result<Credential, CredentialError>> + Send;

    /// Mark the cached access token unusable (e.g. after an HTTP 401) so the
    /// next `acquire` refreshes it.
    fn invalidate(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(expires_at: i64) -> Credential {
        Credential {
            access_token: "secret-access-token".to_string(),
            refresh_token: "secret-refresh-token".to_string(),
            expires_at,
            user_id: Some("user".to_string()),
            email: None,
        }
    }

    #[test]
    fn credential_debug_redacts_tokens() {
        let rendered = format!("{:?}", credential(1));
        assert!(!rendered.contains("secret-access-token"));
        assert!(!rendered.contains("secret-refresh-token"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn expires_within_threshold() {
        let credential = credential(10_000);
        assert!(!credential.expires_within(1_000, 8_000));
        assert!(credential.expires_within(1_000, 9_000));
        assert!(credential.expires_within(0, 10_000));
    }

    #[test]
    fn provider_errors_map_to_credential_errors() {
        assert_eq!(
            CredentialError::from(ProviderError::NoRefreshMaterial),
            CredentialError::Unauthenticated
        );
        assert!(CredentialError::from(ProviderError::ProviderRejected("x".into()))
            .requires_reauthentication());
        assert!(matches!(
            CredentialError::from(ProviderError::Unavailable("x".into())),
            CredentialError::Transient(_)
        ));
    }
}
