//! Credential persistence.

use crate::error::Result;
use crate::store::{KeyValueStore, SESSION_KEY};

use super::Credential;

/// Where the signed-in credential lives between runs
pub trait SessionPersistence: Send + Sync + 'static {
    fn load_session(&self) -> Result<Option<Credential>>;
    fn save_session(&self, credential: &Credential) -> Result<()>;
    fn clear_session(&self) -> Result<()>;
}

/// Session persistence on top of the local key-value store
#[derive(Debug, Clone)]
pub struct KvSessionStore<K: KeyValueStore> {
    store: K,
}

impl<K: KeyValueStore> KvSessionStore<K> {
    pub const fn new(store: K) -> Self {
        Self { store }
    }
}

impl<K: KeyValueStore + 'static> SessionPersistence for KvSessionStore<K> {
    fn load_session(&self) -> Result<Option<Credential>> {
        self.store.get_json(SESSION_KEY, None)
    }

    fn save_session(&self, credential: &Credential) -> Result<()> {
        self.store.set_json(SESSION_KEY, credential)
    }

    fn clear_session(&self) -> Result<()> {
        self.store.remove(SESSION_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn session_roundtrip_and_clear() {
        let sessions = KvSessionStore::new(MemoryStore::new());
        assert!(sessions.load_session().unwrap().is_none());

        let credential = Credential {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: 5,
            user_id: None,
            email: Some("user@example.com".to_string()),
        };
        sessions.save_session(&credential).unwrap();
        assert_eq!(sessions.load_session().unwrap(), Some(credential));

        sessions.clear_session().unwrap();
        assert!(sessions.load_session().unwrap().is_none());
    }
}
