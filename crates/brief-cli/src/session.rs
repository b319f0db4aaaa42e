//! Keychain-backed session persistence for the CLI.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

use brief_core::auth::{Credential, SessionPersistence};
use brief_core::{Error, Result};
#[cfg(not(test))]
use keyring::Entry;

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "brief-cli";

/// Stores the signed-in session as JSON under one keychain entry.
#[derive(Debug, Clone)]
pub struct KeyringSessionStore {
    username: String,
}

impl KeyringSessionStore {
    pub fn new(account: &str) -> Self {
        Self {
            username: format!("supabase_session:{account}"),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(test)]
    fn with_test_store<T>(f: impl FnOnce(&mut HashMap<String, String>) -> T) -> Result<T> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| Error::Storage(error.to_string()))?;
        Ok(f(&mut guard))
    }

    #[cfg(not(test))]
    fn entry(&self) -> Result<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username).map_err(keyring_error)
    }
}

#[cfg(not(test))]
#[allow(clippy::needless_pass_by_value)]
fn keyring_error(error: keyring::Error) -> Error {
    Error::Storage(format!("Keychain error: {error}"))
}

impl SessionPersistence for KeyringSessionStore {
    #[cfg(not(test))]
    fn load_session(&self) -> Result<Option<Credential>> {
        match self.entry()?.get_password() {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(keyring_error(error)),
        }
    }

    #[cfg(test)]
    fn load_session(&self) -> Result<Option<Credential>> {
        let raw = Self::with_test_store(|store| store.get(&self.username).cloned())?;
        raw.map(|raw| serde_json::from_str(&raw).map_err(Error::from))
            .transpose()
    }

    #[cfg(not(test))]
    fn save_session(&self, credential: &Credential) -> Result<()> {
        let raw = serde_json::to_string(credential)?;
        self.entry()?.set_password(&raw).map_err(keyring_error)
    }

    #[cfg(test)]
    fn save_session(&self, credential: &Credential) -> Result<()> {
        let raw = serde_json::to_string(credential)?;
        Self::with_test_store(|store| {
            store.insert(self.username.clone(), raw);
        })
    }

    #[cfg(not(test))]
    fn clear_session(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(keyring_error(error)),
        }
    }

    #[cfg(test)]
    fn clear_session(&self) -> Result<()> {
        Self::with_test_store(|store| {
            store.remove(&self.username);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_roundtrip_and_clear() {
        let store = KeyringSessionStore::new("session-roundtrip-test");
        let credential = Credential {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: 1_000,
            user_id: Some("user-1".to_string()),
            email: Some("reader@example.com".to_string()),
        };

        store.save_session(&credential).unwrap();
        assert_eq!(store.load_session().unwrap(), Some(credential));

        store.clear_session().unwrap();
        assert_eq!(store.load_session().unwrap(), None);
        store.clear_session().unwrap();
    }
}
