//! Wiring of the core services from CLI configuration.

use std::path::PathBuf;

use brief_core::api::HttpHistoryApi;
use brief_core::auth::{CredentialCoordinator, SupabaseAuthClient};
use brief_core::config::ClientConfig;
use brief_core::history::LocalHistory;
use brief_core::store::SqliteStore;
use brief_core::SyncCoordinator;

use crate::config::{
    apply_overrides, default_config_path, default_db_path, env_lookup, load_from_path,
};
use crate::error::CliError;
use crate::session::KeyringSessionStore;

pub type CliCredentials = CredentialCoordinator<SupabaseAuthClient, KeyringSessionStore>;
pub type CliSync = SyncCoordinator<HttpHistoryApi, CliCredentials, SqliteStore>;

/// Resolved paths and configuration for one CLI invocation.
pub struct AppContext {
    pub config: ClientConfig,
    pub config_path: PathBuf,
    pub db_path: PathBuf,
}

/// Fully wired services for commands that talk to the API.
pub struct Services {
    pub api: HttpHistoryApi,
    pub credentials: CliCredentials,
    pub sync: CliSync,
}

impl AppContext {
    pub fn load(config_path: Option<PathBuf>, db_path: Option<PathBuf>) -> Result<Self, CliError> {
        let config_path = match config_path {
            Some(path) => path,
            None => default_config_path()?,
        };
        let db_path = match db_path {
            Some(path) => path,
            None => default_db_path()?,
        };
        let config = apply_overrides(load_from_path(&config_path)?, env_lookup);
        Ok(Self {
            config,
            config_path,
            db_path,
        })
    }

    pub fn open_store(&self) -> Result<SqliteStore, CliError> {
        Ok(SqliteStore::open(&self.db_path)?)
    }

    /// Local replica and upload queue; needs no remote configuration.
    pub fn local_history(&self) -> Result<LocalHistory<SqliteStore>, CliError> {
        Ok(LocalHistory::new(
            self.open_store()?,
            self.config.sync.retention_limit,
        ))
    }

    pub fn auth_client(&self) -> Result<SupabaseAuthClient, CliError> {
        let url = self
            .config
            .supabase_url
            .as_deref()
            .ok_or(CliError::NotConfigured("supabase_url"))?;
        let anon_key = self
            .config
            .supabase_anon_key
            .as_deref()
            .ok_or(CliError::NotConfigured("supabase_anon_key"))?;
        Ok(SupabaseAuthClient::new(
            url,
            anon_key,
            self.config.sync.request_timeout(),
        )?)
    }

    /// Credential coordinator with any stored session restored.
    pub fn credentials(&self, auth: SupabaseAuthClient) -> Result<CliCredentials, CliError> {
        let account = self.config.supabase_url.as_deref().unwrap_or("default");
        let credentials = CredentialCoordinator::new(
            auth,
            KeyringSessionStore::new(account),
            self.config.sync.credential_settings(),
        );
        credentials.restore()?;
        Ok(credentials)
    }

    pub fn services(&self) -> Result<Services, CliError> {
        let base_url = self
            .config
            .api_base_url
            .as_deref()
            .ok_or(CliError::NotConfigured("api_base_url"))?;
        let api = HttpHistoryApi::new(base_url, self.config.sync.request_timeout())?;
        let auth = self.auth_client()?;
        let credentials = self.credentials(auth)?;
        let sync = SyncCoordinator::new(
            api.clone(),
            credentials.clone(),
            self.open_store()?,
            self.config.sync.clone(),
        );
        Ok(Services {
            api,
            credentials,
            sync,
        })
    }
}
