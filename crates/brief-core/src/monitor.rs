//! Connectivity-driven sync triggering.
//!
//! The monitor reacts to two inputs: online/offline transitions delivered on a
//! `watch` channel, and a fixed-interval timer. A reconnect drains the queue
//! once after a settle delay; a timer tick drains only while online and not
//! already syncing. Skipped ticks are not made up.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::api::HistoryApi;
use crate::auth::AccessTokenSource;
use crate::config::SyncSettings;
use crate::events::SyncOutcome;
use crate::store::KeyValueStore;
use crate::sync::{SyncCoordinator, SyncState};
use crate::{Error, Result};

/// What the monitor needs from a sync coordinator
pub trait SyncTrigger: Send + Sync {
    fn state(&self) -> SyncState;

    fn drain(&self) -> impl Future<Output = Result<SyncOutcome>> + Send;
}

impl<A, C, K> SyncTrigger for SyncCoordinator<A, C, K>
where
    A: HistoryApi,
    C: AccessTokenSource,
    K: KeyValueStore,
{
    fn state(&self) -> SyncState {
        Self::state(self)
    }

    fn drain(&self) -> impl Future<Output = Result<SyncOutcome>> + Send {
        self.drain_only()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainReason {
    Reconnect,
    Timer,
}

pub struct ConnectivityMonitor<T: SyncTrigger> {
    trigger: T,
    settle_delay: Duration,
    poll_interval: Duration,
}

impl<T: SyncTrigger> ConnectivityMonitor<T> {
    pub fn new(trigger: T, settings: &SyncSettings) -> Self {
        Self::with_timing(trigger, settings.settle_delay(), settings.poll_interval())
    }

    pub const fn with_timing(trigger: T, settle_delay: Duration, poll_interval: Duration) -> Self {
        Self {
            trigger,
            settle_delay,
            poll_interval,
        }
    }

    /// Run until the connectivity sender is dropped.
    ///
    /// Starting while already online counts as a reconnect.
    pub async fn run(self, mut online: watch::Receiver<bool>) {
        let mut is_online = *online.borrow_and_update();
        let mut settling = is_online;

        let settle = tokio::time::sleep(self.settle_delay);
        tokio::pin!(settle);

        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = online.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Connectivity source closed, stopping monitor");
                        break;
                    }
                    let now_online = *online.borrow_and_update();
                    if now_online && !is_online {
                        tracing::info!("Back online, draining in {:?}", self.settle_delay);
                        settle.as_mut().reset(Instant::now() + self.settle_delay);
                        settling = true;
                    } else if !now_online && is_online {
                        tracing::info!("Went offline");
                        settling = false;
                    }
                    is_online = now_online;
                }
                () = &mut settle, if settling => {
                    settling = false;
                    self.drain(DrainReason::Reconnect).await;
                }
                _ = ticker.tick() => {
                    if !is_online {
                        tracing::trace!("Offline, skipping periodic drain");
                    } else if self.trigger.state() == SyncState::Syncing {
                        tracing::debug!("Sync already running, skipping periodic drain");
                    } else {
                        self.drain(DrainReason::Timer).await;
                    }
                }
            }
        }
    }

    async fn drain(&self, reason: DrainReason) {
        match self.trigger.drain().await {
            Ok(outcome) if outcome.synced + outcome.failed > 0 => tracing::info!(
                "{reason:?} drain: {} synced, {} failed",
                outcome.synced,
                outcome.failed
            ),
            Ok(_) => tracing::debug!("{reason:?} drain: queue empty"),
            Err(Error::Busy) => tracing::debug!("{reason:?} drain skipped, sync busy"),
            Err(error) => tracing::warn!("{reason:?} drain failed: {error}"),
        }
    }
}

/// Publish the result of `probe` on `online` every `every`, until every
/// receiver is gone.
pub async fn watch_reachability<F, Fut>(probe: F, every: Duration, online: watch::Sender<bool>)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    while !online.is_closed() {
        ticker.tick().await;
        let reachable = probe().await;
        online.send_if_modified(|current| {
            let changed = *current != reachable;
            *current = reachable;
            changed
        });
    }
}
