//! Supabase identity provider.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use super::{Credential, IdentityProvider, ProviderError};
use crate::util::unix_millis_now;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Auth API error: {message} ({status})")]
    Api { status: u16, message: String },
    #[error("Invalid auth payload: {0}")]
    InvalidPayload(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Client for the Supabase GoTrue endpoints Brief needs
#[derive(Clone)]
pub struct SupabaseAuthClient {
    auth_url: String,
    anon_key: String,
    client: Client,
}

impl SupabaseAuthClient {
    pub fn new(
        url: impl AsRef<str>,
        anon_key: impl Into<String>,
        request_timeout: Duration,
    ) -> AuthResult<Self> {
        let auth_url = normalize_auth_url(url.as_ref())?;
        let anon_key = anon_key.into().trim().to_string();
        if anon_key.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Supabase anon key must not be empty",
            ));
        }

        Ok(Self {
            auth_url,
            anon_key,
            client: Client::builder().timeout(request_timeout).build()?,
        })
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Credential> {
        if email.trim().is_empty() || password.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Email and password are required",
            ));
        }

        let payload = serde_json::json!({
            "email": email.trim(),
            "password": password,
        });
        let request = self.public_request(
            self.client
                .post(format!("{}/token", self.auth_url))
                .query(&[("grant_type", "password")])
                .json(&payload),
        );
        self.send_token_request(request).await
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> AuthResult<Credential> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Refresh token must not be empty",
            ));
        }

        let payload = serde_json::json!({
            "refresh_token": refresh_token,
        });
        let request = self.public_request(
            self.client
                .post(format!("{}/token", self.auth_url))
                .query(&[("grant_type", "refresh_token")])
                .json(&payload),
        );
        self.send_token_request(request).await
    }

    pub async fn sign_out(&self, access_token: &str) -> AuthResult<()> {
        let response = self
            .client
            .post(format!("{}/logout", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        let status = response.status();
        if !(status.is_success() || status == StatusCode::UNAUTHORIZED) {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api {
                status: status.as_u16(),
                message: parse_api_error(&body),
            });
        }
        Ok(())
    }

    fn public_request(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }

    async fn send_token_request(&self, request: RequestBuilder) -> AuthResult<Credential> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api {
                status: status.as_u16(),
                message: parse_api_error(&body),
            });
        }
        response.json::<TokenResponse>().await?.into_credential()
    }
}

impl IdentityProvider for SupabaseAuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential, ProviderError> {
        self.refresh_session(refresh_token)
            .await
            .map_err(provider_error)
    }
}

fn provider_error(error: AuthError) -> ProviderError {
    match error {
        AuthError::InvalidConfiguration(_) => ProviderError::NoRefreshMaterial,
        AuthError::Api { status, message } if (400..500).contains(&status) && status != 429 => {
            ProviderError::ProviderRejected(message)
        }
        other => ProviderError::Unavailable(other.to_string()),
    }
}

fn normalize_auth_url(url: &str) -> AuthResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AuthError::InvalidConfiguration(
            "Supabase URL must not be empty",
        ));
    }
    if !crate::util::is_http_url(trimmed) {
        return Err(AuthError::InvalidConfiguration(
            "Supabase URL must include http:// or https://",
        ));
    }
    if trimmed.ends_with("/auth/v1") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/auth/v1"))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    /// Unix seconds
    expires_at: Option<i64>,
    /// Seconds from now
    expires_in: Option<i64>,
    user: Option<TokenUser>,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: String,
    email: Option<String>,
}

impl TokenResponse {
    fn into_credential(self) -> AuthResult<Credential> {
        let expires_at = self
            .expires_at
            .map(|seconds| seconds.saturating_mul(1000))
            .or_else(|| {
                self.expires_in
                    .map(|seconds| unix_millis_now().saturating_add(seconds.saturating_mul(1000)))
            });

        match (self.access_token, self.refresh_token, expires_at) {
            (Some(access_token), Some(refresh_token), Some(expires_at)) => Ok(Credential {
                access_token,
                refresh_token,
                expires_at,
                user_id: self.user.as_ref().map(|user| user.id.clone()),
                email: self.user.and_then(|user| user.email),
            }),
            _ => Err(AuthError::InvalidPayload(
                "token response did not include access_token, refresh_token and expiry"
                    .to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SupabaseErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
    msg: Option<String>,
}

fn parse_api_error(body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<SupabaseErrorResponse>(body) {
        if let Some(message) = payload
            .message
            .or(payload.msg)
            .or(payload.error_description)
            .or(payload.error)
        {
            return message.trim().to_string();
        }
    }

    let trimmed = crate::util::compact_text(body);
    if trimmed.is_empty() {
        "empty response".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_auth_url_appends_auth_path() {
        let normalized = normalize_auth_url("https://demo.supabase.co/").unwrap();
        assert_eq!(normalized, "https://demo.supabase.co/auth/v1");
    }

    #[test]
    fn normalize_auth_url_keeps_existing_auth_path() {
        let normalized = normalize_auth_url("https://demo.supabase.co/auth/v1").unwrap();
        assert_eq!(normalized, "https://demo.supabase.co/auth/v1");
        assert!(normalize_auth_url("demo.supabase.co").is_err());
    }

    #[test]
    fn token_response_converts_seconds_to_millis() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token": "a", "refresh_token": "r", "expires_at": 1700000000,
                "user": {"id": "u1", "email": "user@example.com"}}"#,
        )
        .unwrap();
        let credential = response.into_credential().unwrap();
        assert_eq!(credential.expires_at, 1_700_000_000_000);
        assert_eq!(credential.user_id.as_deref(), Some("u1"));
        assert_eq!(credential.email.as_deref(), Some("user@example.com"));
    }

    #[test]
    fn token_response_without_tokens_is_invalid() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"user": {"id": "u1"}}"#).unwrap();
        assert!(matches!(
            response.into_credential(),
            Err(AuthError::InvalidPayload(_))
        ));
    }

    #[test]
    fn client_errors_reject_and_server_errors_are_transient() {
        let rejected = provider_error(AuthError::Api {
            status: 400,
            message: "Invalid Refresh Token".to_string(),
        });
        assert_eq!(
            rejected,
            ProviderError::ProviderRejected("Invalid Refresh Token".to_string())
        );

        let unavailable = provider_error(AuthError::Api {
            status: 503,
            message: "down".to_string(),
        });
        assert!(matches!(unavailable, ProviderError::Unavailable(_)));

        let throttled = provider_error(AuthError::Api {
            status: 429,
            message: "slow down".to_string(),
        });
        assert!(matches!(throttled, ProviderError::Unavailable(_)));

        assert_eq!(
            provider_error(AuthError::InvalidConfiguration("Refresh token must not be empty")),
            ProviderError::NoRefreshMaterial
        );
    }

    #[test]
    fn parse_api_error_prefers_message_fields() {
        assert_eq!(
            parse_api_error(r#"{"error": "invalid_grant", "error_description": "expired"}"#),
            "expired"
        );
        assert_eq!(parse_api_error(""), "empty response");
    }
}
