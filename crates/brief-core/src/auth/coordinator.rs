//! Single-flight credential refresh.
//!
//! The first caller that finds the cached credential near expiry creates a
//! shared refresh future and stores it in the coordinator state; concurrent
//! callers clone that future instead of starting their own. The future
//! settles the state exactly once (installing or clearing the credential)
//! before any caller observes its output, so every waiter sees the same
//! outcome.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{
    AccessTokenSource, Credential, CredentialError, IdentityProvider, SessionPersistence,
};
use crate::util::unix_millis_now;

type SharedRefresh = Shared<BoxFuture<'static, Result<Credential, CredentialError>>>;

/// Timing knobs for credential handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialSettings {
    /// Refresh when the credential expires within this window
    pub refresh_threshold: Duration,
    /// Upper bound for one refresh request
    pub request_timeout: Duration,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            refresh_threshold: Duration::from_secs(60),
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl CredentialSettings {
    fn threshold_ms(&self) -> i64 {
        i64::try_from(self.refresh_threshold.as_millis()).unwrap_or(i64::MAX)
    }
}

struct InFlight {
    refresh_token: String,
    future: SharedRefresh,
}

#[derive(Default)]
struct CredentialState {
    credential: Option<Credential>,
    in_flight: Option<InFlight>,
    // Bumped on sign-in/sign-out so a refresh started for an older session
    // cannot install its result.
    epoch: u64,
    renewal_task: Option<JoinHandle<()>>,
}

struct Inner<P, S> {
    provider: P,
    sessions: S,
    settings: CredentialSettings,
    state: Mutex<CredentialState>,
    renewal: Arc<watch::Sender<u64>>,
}

/// Holds the signed-in credential and coordinates its renewal.
pub struct CredentialCoordinator<P: IdentityProvider, S: SessionPersistence> {
    inner: Arc<Inner<P, S>>,
}

impl<P: IdentityProvider, S: SessionPersistence> Clone for CredentialCoordinator<P, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: IdentityProvider, S: SessionPersistence> CredentialCoordinator<P, S> {
    pub fn new(provider: P, sessions: S, settings: CredentialSettings) -> Self {
        let (renewal, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                provider,
                sessions,
                settings,
                state: Mutex::new(CredentialState::default()),
                renewal: Arc::new(renewal),
            }),
        }
    }

    /// Load a persisted credential into memory, if one exists.
    pub fn restore(&self) -> crate::Result<Option<Credential>> {
        let Some(credential) = self.inner.sessions.load_session()? else {
            return Ok(None);
        };
        let mut state = self.inner.lock_state();
        self.inner.install(&mut state, credential.clone());
        tracing::debug!("Restored persisted credential (expires_at={})", credential.expires_at);
        Ok(Some(credential))
    }

    /// Install a freshly signed-in credential and persist it.
    pub fn sign_in(&self, credential: Credential) -> crate::Result<()> {
        let mut state = self.inner.lock_state();
        self.inner.sessions.save_session(&credential)?;
        state.epoch += 1;
        state.in_flight = None;
        self.inner.install(&mut state, credential);
        Ok(())
    }

    /// Forget the credential, cancel renewal and clear persistence.
    pub fn sign_out(&self) -> crate::Result<()> {
        let mut state = self.inner.lock_state();
        state.epoch += 1;
        state.in_flight = None;
        state.credential = None;
        if let Some(task) = state.renewal_task.take() {
            task.abort();
        }
        self.inner.sessions.clear_session()?;
        tracing::info!("Signed out; cached credential cleared");
        Ok(())
    }

    /// The cached credential without validating or refreshing it
    pub fn current(&self) -> Option<Credential> {
        self.inner.lock_state().credential.clone()
    }

    #[cfg(test)]
    fn is_refreshing(&self) -> bool {
        self.inner.lock_state().in_flight.is_some()
    }

    /// Counter bumped each time the cached credential enters its refresh window.
    ///
    /// This is a wake-up hint for the caller layer; nothing is refreshed
    /// until someone calls `acquire`.
    pub fn renewal_signal(&self) -> watch::Receiver<u64> {
        self.inner.renewal.subscribe()
    }

    /// Return a valid credential, refreshing it at most once across all callers.
    pub async fn acquire(&self) -> Result<Credential, CredentialError> {
        let refresh = {
            let mut state = self.inner.lock_state();
            if let Some(credential) = state.credential.as_ref() {
                if !credential.expires_within(self.inner.settings.threshold_ms(), unix_millis_now())
                {
                    return Ok(credential.clone());
                }
            }

            if let Some(in_flight) = state.in_flight.as_ref() {
                tracing::debug!("Joining in-flight credential refresh");
                in_flight.future.clone()
            } else {
                let refresh_token = state
                    .credential
                    .as_ref()
                    .filter(|credential| credential.has_refresh_material())
                    .map(|credential| credential.refresh_token.clone())
                    .ok_or(CredentialError::Unauthenticated)?;
                Self::start_refresh(&self.inner, &mut state, refresh_token)
            }
        };

        refresh.await
    }

    // Called with the state lock held: the in-flight slot is filled before
    // the first suspension point, so a concurrent caller always finds it.
    fn start_refresh(
        inner: &Arc<Inner<P, S>>,
        state: &mut CredentialState,
        refresh_token: String,
    ) -> SharedRefresh {
        let epoch = state.epoch;
        let task_inner = Arc::clone(inner);
        let token = refresh_token.clone();
        let future = async move {
            tracing::info!("Refreshing access credential");
            let outcome = match tokio::time::timeout(
                task_inner.settings.request_timeout,
                task_inner.provider.refresh(&token),
            )
            .await
            {
                Ok(result) => result.map_err(CredentialError::from),
                Err(_) => Err(CredentialError::Transient(format!(
                    "refresh timed out after {:?}",
                    task_inner.settings.request_timeout
                ))),
            };
            task_inner.settle(epoch, &token, outcome)
        }
        .boxed()
        .shared();

        state.in_flight = Some(InFlight {
            refresh_token,
            future: future.clone(),
        });
        future
    }
}

impl<P: IdentityProvider, S: SessionPersistence> Inner<P, S> {
    fn lock_state(&self) -> MutexGuard<'_, CredentialState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn install(&self, state: &mut CredentialState, credential: Credential) {
        self.schedule_renewal(state, credential.expires_at);
        state.credential = Some(credential);
    }

    fn settle(
        &self,
        epoch: u64,
        refresh_token: &str,
        outcome: Result<Credential, CredentialError>,
    ) -> Result<Credential, CredentialError> {
        let mut state = self.lock_state();
        if state.epoch != epoch {
            tracing::debug!("Discarding refresh result for a session that was replaced");
            return Err(CredentialError::Unauthenticated);
        }
        if state
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.refresh_token == refresh_token)
        {
            state.in_flight = None;
        }

        match outcome {
            Ok(credential) => {
                self.install(&mut state, credential.clone());
                if let Err(error) = self.sessions.save_session(&credential) {
                    tracing::warn!("Refreshed credential could not be persisted: {}", error);
                    return Err(CredentialError::Storage(error.to_string()));
                }
                tracing::info!("Credential refreshed (expires_at={})", credential.expires_at);
                Ok(credential)
            }
            Err(error) if error.requires_reauthentication() => {
                tracing::warn!("Credential refresh rejected: {}", error);
                state.credential = None;
                if let Some(task) = state.renewal_task.take() {
                    task.abort();
                }
                if let Err(clear_error) = self.sessions.clear_session() {
                    tracing::warn!("Failed to clear persisted session: {}", clear_error);
                }
                Err(error)
            }
            Err(error) => {
                tracing::warn!("Credential refresh failed: {}", error);
                Err(error)
            }
        }
    }

    fn schedule_renewal(&self, state: &mut CredentialState, expires_at: i64) {
        if let Some(task) = state.renewal_task.take() {
            task.abort();
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let renew_at = expires_at.saturating_sub(self.settings.threshold_ms());
        let delay = u64::try_from(renew_at.saturating_sub(unix_millis_now())).unwrap_or(0);
        let renewal = Arc::clone(&self.renewal);
        state.renewal_task = Some(handle.spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            tracing::debug!("Credential renewal window reached");
            renewal.send_modify(|ticks| *ticks += 1);
        }));
    }
}

impl<P: IdentityProvider, S: SessionPersistence> AccessTokenSource for CredentialCoordinator<P, S> {
    fn acquire(
        &self,
    ) -> impl std::future::Future<Output = Result<Credential, CredentialError>> + Send {
        Self::acquire(self)
    }

    fn invalidate(&self) {
        let mut state = self.inner.lock_state();
        if let Some(credential) = state.credential.as_mut() {
            credential.expires_at = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::auth::{KvSessionStore, ProviderError};
    use crate::store::MemoryStore;

    #[derive(Clone)]
    struct FakeProvider {
        calls: Arc<AtomicUsize>,
        delay: Duration,
        outcome: Result<(), ProviderError>,
    }

    impl FakeProvider {
        fn ok() -> Self {
            Self {
                calls: Arc::default(),
                delay: Duration::from_millis(50),
                outcome: Ok(()),
            }
        }

        fn failing(error: ProviderError) -> Self {
            Self {
                outcome: Err(error),
                ..Self::ok()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl IdentityProvider for FakeProvider {
        async fn refresh(&self, refresh_token: &str) -> Result<Credential, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            self.outcome.clone()?;
            Ok(Credential {
                access_token: format!("access-{call}"),
                refresh_token: format!("{refresh_token}-next"),
                expires_at: unix_millis_now() + 3_600_000,
                user_id: Some("user".to_string()),
                email: None,
            })
        }
    }

    type TestCoordinator = CredentialCoordinator<FakeProvider, KvSessionStore<MemoryStore>>;

    fn coordinator(provider: FakeProvider, store: MemoryStore) -> TestCoordinator {
        CredentialCoordinator::new(
            provider,
            KvSessionStore::new(store),
            CredentialSettings {
                refresh_threshold: Duration::from_secs(60),
                request_timeout: Duration::from_secs(5),
            },
        )
    }

    fn expired_credential() -> Credential {
        Credential {
            access_token: "stale".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: unix_millis_now() - 1,
            user_id: Some("user".to_string()),
            email: None,
        }
    }

    #[tokio::test]
    async fn cached_credential_is_returned_without_refresh() {
        let provider = FakeProvider::ok();
        let coordinator = coordinator(provider.clone(), MemoryStore::new());
        let mut fresh = expired_credential();
        fresh.expires_at = unix_millis_now() + 3_600_000;
        coordinator.sign_in(fresh.clone()).unwrap();

        assert_eq!(coordinator.acquire().await.unwrap(), fresh);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn missing_credential_is_unauthenticated() {
        let coordinator = coordinator(FakeProvider::ok(), MemoryStore::new());
        assert_eq!(
            coordinator.acquire().await.unwrap_err(),
            CredentialError::Unauthenticated
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_acquires_share_one_refresh() {
        let provider = FakeProvider::ok();
        let store = MemoryStore::new();
        let coordinator = coordinator(provider.clone(), store.clone());
        coordinator.sign_in(expired_credential()).unwrap();

        let results = futures::future::join_all((0..8).map(|_| coordinator.acquire())).await;

        assert_eq!(provider.calls(), 1);
        let first = results[0].clone().unwrap();
        assert_eq!(first.access_token, "access-1");
        assert!(results.iter().all(|result| result.as_ref() == Ok(&first)));
        assert!(!coordinator.is_refreshing());

        let persisted = KvSessionStore::new(store).load_session().unwrap();
        assert_eq!(persisted, Some(first));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_refresh_fails_all_waiters_and_clears_credential() {
        let provider = FakeProvider::failing(ProviderError::ProviderRejected("revoked".into()));
        let store = MemoryStore::new();
        let coordinator = coordinator(provider.clone(), store.clone());
        coordinator.sign_in(expired_credential()).unwrap();

        let results = futures::future::join_all((0..4).map(|_| coordinator.acquire())).await;

        assert_eq!(provider.calls(), 1);
        for result in results {
            assert_eq!(
                result.unwrap_err(),
                CredentialError::RefreshRejected("revoked".to_string())
            );
        }
        assert!(coordinator.current().is_none());
        assert!(KvSessionStore::new(store).load_session().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_keeps_credential_for_retry() {
        let provider = FakeProvider::failing(ProviderError::Unavailable("offline".into()));
        let coordinator = coordinator(provider.clone(), MemoryStore::new());
        coordinator.sign_in(expired_credential()).unwrap();

        assert!(matches!(
            coordinator.acquire().await,
            Err(CredentialError::Transient(_))
        ));
        assert!(coordinator.current().is_some());

        assert!(matches!(
            coordinator.acquire().await,
            Err(CredentialError::Transient(_))
        ));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_refresh_times_out_as_transient() {
        let mut provider = FakeProvider::ok();
        provider.delay = Duration::from_secs(3600);
        let coordinator = coordinator(provider, MemoryStore::new());
        coordinator.sign_in(expired_credential()).unwrap();

        let error = coordinator.acquire().await.unwrap_err();
        assert!(matches!(error, CredentialError::Transient(_)));
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn sign_out_during_refresh_discards_result() {
        let provider = FakeProvider::ok();
        let coordinator = coordinator(provider, MemoryStore::new());
        coordinator.sign_in(expired_credential()).unwrap();

        let pending = coordinator.acquire();
        let sign_out = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            coordinator.sign_out().unwrap();
        };
        let (result, ()) = tokio::join!(pending, sign_out);

        assert_eq!(result.unwrap_err(), CredentialError::Unauthenticated);
        assert!(coordinator.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn renewal_signal_fires_before_expiry() {
        let coordinator = coordinator(FakeProvider::ok(), MemoryStore::new());
        let mut signal = coordinator.renewal_signal();
        let mut credential = expired_credential();
        credential.expires_at = unix_millis_now() + 120_000;
        coordinator.sign_in(credential).unwrap();

        tokio::time::timeout(Duration::from_secs(61), signal.changed())
            .await
            .expect("renewal hint should fire within the refresh window")
            .unwrap();
        assert_eq!(*signal.borrow(), 1);
    }

    #[tokio::test]
    async fn restore_loads_persisted_session() {
        let store = MemoryStore::new();
        let mut credential = expired_credential();
        credential.expires_at = unix_millis_now() + 3_600_000;
        KvSessionStore::new(store.clone())
            .save_session(&credential)
            .unwrap();

        let coordinator = coordinator(FakeProvider::ok(), store);
        assert_eq!(coordinator.restore().unwrap(), Some(credential.clone()));
        assert_eq!(coordinator.acquire().await.unwrap(), credential);
    }
}
