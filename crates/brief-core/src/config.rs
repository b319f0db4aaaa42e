//! Client configuration.
//!
//! `ClientConfig` carries the public endpoints a client needs to reach the
//! Brief API and the Supabase auth service. `SyncSettings` holds the tunables
//! of the sync engine; every field has a default so partial files load.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::CredentialSettings;
use crate::util::normalize_text_option;
use crate::{Error, Result};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const DEFAULT_RETENTION_LIMIT: usize = 100;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_REFRESH_THRESHOLD_MS: u64 = 60_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 300_000;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 2_000;
pub const DEFAULT_MAX_PAGES: u32 = 200;

/// Sync engine tunables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    /// Records requested per remote history page
    pub page_size: u32,
    /// Maximum records kept in the local replica
    pub retention_limit: usize,
    /// Upper bound for a single upload, fetch, delete or refresh
    pub request_timeout_ms: u64,
    /// Refresh credentials this long before they expire
    pub refresh_threshold_ms: u64,
    /// Periodic drain interval while online
    pub poll_interval_ms: u64,
    /// Quiet period after reconnecting before draining
    pub settle_delay_ms: u64,
    /// Stop paginating after this many pages
    pub max_pages: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            retention_limit: DEFAULT_RETENTION_LIMIT,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            refresh_threshold_ms: DEFAULT_REFRESH_THRESHOLD_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl SyncSettings {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub const fn credential_settings(&self) -> CredentialSettings {
        CredentialSettings {
            refresh_threshold: Duration::from_millis(self.refresh_threshold_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }

    /// Reject values that would stall or disable syncing.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::InvalidInput("page_size must be at least 1".to_string()));
        }
        if self.retention_limit == 0 {
            return Err(Error::InvalidInput(
                "retention_limit must be at least 1".to_string(),
            ));
        }
        if self.max_pages == 0 {
            return Err(Error::InvalidInput("max_pages must be at least 1".to_string()));
        }
        if self.request_timeout_ms == 0 || self.poll_interval_ms == 0 {
            return Err(Error::InvalidInput(
                "request_timeout_ms and poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Endpoints and keys a client is provisioned with.
///
/// Only public values belong here; session tokens live in the session store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    #[serde(default)]
    pub sync: SyncSettings,
}

impl ClientConfig {
    /// Trim values, drop empty ones and strip trailing slashes from URLs.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            api_base_url: normalize_url(self.api_base_url),
            supabase_url: normalize_url(self.supabase_url),
            supabase_anon_key: normalize_text_option(self.supabase_anon_key),
            sync: self.sync,
        }
    }
}

fn normalize_url(value: Option<String>) -> Option<String> {
    normalize_text_option(value).map(|url| url.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_settings_fill_defaults() {
        let settings: SyncSettings = serde_json::from_str(r#"{"page_size": 10}"#).unwrap();
        assert_eq!(settings.page_size, 10);
        assert_eq!(settings.retention_limit, DEFAULT_RETENTION_LIMIT);
        assert_eq!(settings.request_timeout(), Duration::from_secs(15));
        assert_eq!(settings.settle_delay(), Duration::from_secs(2));
    }

    #[test]
    fn unknown_settings_are_rejected() {
        let result: std::result::Result<SyncSettings, _> =
            serde_json::from_str(r#"{"pagesize": 10}"#);
        assert!(result.is_err());
    }

    #[test]
    fn zero_values_fail_validation() {
        let settings = SyncSettings {
            max_pages: 0,
            ..SyncSettings::default()
        };
        assert!(settings.validate().is_err());
        assert!(SyncSettings::default().validate().is_ok());
    }

    #[test]
    fn credential_settings_follow_sync_settings() {
        let settings = SyncSettings {
            refresh_threshold_ms: 5_000,
            request_timeout_ms: 1_000,
            ..SyncSettings::default()
        };
        let credentials = settings.credential_settings();
        assert_eq!(credentials.refresh_threshold, Duration::from_secs(5));
        assert_eq!(credentials.request_timeout, Duration::from_secs(1));
    }

    #[test]
    fn normalized_config_trims_values() {
        let config = ClientConfig {
            api_base_url: Some(" https://api.brief.test/ ".to_string()),
            supabase_url: Some(String::new()),
            supabase_anon_key: Some(" anon ".to_string()),
            sync: SyncSettings::default(),
        }
        .normalized();

        assert_eq!(config.api_base_url.as_deref(), Some("https://api.brief.test"));
        assert_eq!(config.supabase_url, None);
        assert_eq!(config.supabase_anon_key.as_deref(), Some("anon"));
    }
}
