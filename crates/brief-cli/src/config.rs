//! Persistent CLI configuration and local paths.

use std::path::{Path, PathBuf};

use brief_core::config::ClientConfig;
use brief_core::util::normalize_text_option;

use crate::error::CliError;

const APP_DIR_NAME: &str = "brief";
const CONFIG_FILE_NAME: &str = "config.json";
const DB_FILE_NAME: &str = "brief.db";

pub const API_BASE_URL_ENV: &str = "BRIEF_API_BASE_URL";
pub const SUPABASE_URL_ENV: &str = "SUPABASE_URL";
pub const SUPABASE_ANON_KEY_ENV: &str = "SUPABASE_ANON_KEY";

pub fn default_config_path() -> Result<PathBuf, CliError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve config directory".to_string()))
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_local_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join(DB_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve data directory".to_string()))
}

/// Read the config file; a missing file yields the defaults.
pub fn load_from_path(path: &Path) -> Result<ClientConfig, CliError> {
    if !path.exists() {
        return Ok(ClientConfig::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|error| {
        CliError::Config(format!("Failed to read config at {}: {error}", path.display()))
    })?;
    let config = serde_json::from_str::<ClientConfig>(&raw).map_err(|error| {
        CliError::Config(format!("Failed to parse config at {}: {error}", path.display()))
    })?;
    config
        .sync
        .validate()
        .map_err(|error| CliError::Config(error.to_string()))?;
    Ok(config.normalized())
}

pub fn save_to_path(config: &ClientConfig, path: &Path) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|error| {
            CliError::Config(format!(
                "Failed to create config directory {}: {error}",
                parent.display()
            ))
        })?;
    }
    let serialized = serde_json::to_string_pretty(&config.clone().normalized())?;
    std::fs::write(path, serialized).map_err(|error| {
        CliError::Config(format!("Failed to write config at {}: {error}", path.display()))
    })
}

/// Environment values win over the file; empty values are ignored.
pub fn apply_overrides(
    config: ClientConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> ClientConfig {
    ClientConfig {
        api_base_url: normalize_text_option(lookup(API_BASE_URL_ENV)).or(config.api_base_url),
        supabase_url: normalize_text_option(lookup(SUPABASE_URL_ENV)).or(config.supabase_url),
        supabase_anon_key: normalize_text_option(lookup(SUPABASE_ANON_KEY_ENV))
            .or(config.supabase_anon_key),
        sync: config.sync,
    }
    .normalized()
}

pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Mask all but the first few characters of a key for display.
pub fn redact_key(value: &str) -> String {
    let visible: String = value.chars().take(6).collect();
    if visible.chars().count() == value.chars().count() {
        "[REDACTED]".to_string()
    } else {
        format!("{visible}...")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn config_roundtrip_normalizes_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let config = ClientConfig {
            api_base_url: Some(" https://api.brief.test/ ".to_string()),
            supabase_url: Some("https://project.supabase.co".to_string()),
            supabase_anon_key: Some(" anon-key ".to_string()),
            ..ClientConfig::default()
        };

        save_to_path(&config, &path).unwrap();
        let loaded = load_from_path(&path).unwrap();
        assert_eq!(loaded.api_base_url.as_deref(), Some("https://api.brief.test"));
        assert_eq!(loaded.supabase_anon_key.as_deref(), Some("anon-key"));
    }

    #[test]
    fn invalid_sync_settings_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{"sync": {"page_size": 0}}"#).unwrap();
        assert!(matches!(load_from_path(&path), Err(CliError::Config(_))));
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            (API_BASE_URL_ENV, "https://env.brief.test/"),
            (SUPABASE_ANON_KEY_ENV, "  "),
        ]
        .into_iter()
        .collect();
        let config = ClientConfig {
            api_base_url: Some("https://file.brief.test".to_string()),
            supabase_anon_key: Some("file-key".to_string()),
            ..ClientConfig::default()
        };

        let merged = apply_overrides(config, |name| env.get(name).map(ToString::to_string));
        assert_eq!(merged.api_base_url.as_deref(), Some("https://env.brief.test"));
        assert_eq!(merged.supabase_anon_key.as_deref(), Some("file-key"));
    }

    #[test]
    fn redact_key_hides_short_values_entirely() {
        assert_eq!(redact_key("abc"), "[REDACTED]");
        assert_eq!(redact_key("eyJhbGciOiJIUzI1NiJ9"), "eyJhbG...");
    }
}
