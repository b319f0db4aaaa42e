use std::time::Duration;

use brief_core::auth::{CredentialCoordinator, IdentityProvider, SessionPersistence};
use brief_core::events::SyncOutcome;
use brief_core::monitor::{watch_reachability, ConnectivityMonitor};
use serde::Serialize;
use tokio::sync::watch;

use crate::cli::SyncCommands;
use crate::commands::common::{format_event, format_outcome, format_timestamp};
use crate::context::{AppContext, Services};
use crate::error::CliError;

const PROBE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    state: brief_core::SyncState,
    pending: usize,
    last_error: Option<String>,
    signed_in: bool,
    session_expires_at: Option<String>,
}

pub async fn run_sync(command: SyncCommands, context: &AppContext) -> Result<(), CliError> {
    let services = context.services()?;
    match command {
        SyncCommands::Drain { json } => {
            let outcome = with_progress(&services, json, services.sync.drain_only()).await?;
            print_outcome(&outcome, json)
        }
        SyncCommands::Reconcile { json } => {
            let outcome = with_progress(&services, json, services.sync.reconcile()).await?;
            print_outcome(&outcome, json)
        }
        SyncCommands::Status { json } => run_sync_status(&services, json),
        SyncCommands::Watch => run_sync_watch(services).await,
    }
}

async fn with_progress(
    services: &Services,
    quiet: bool,
    operation: impl std::future::Future<Output = brief_core::Result<SyncOutcome>>,
) -> Result<SyncOutcome, CliError> {
    let subscription = (!quiet).then(|| {
        services.sync.subscribe(|event| {
            if let Some(line) = format_event(event) {
                eprintln!("{line}");
            }
        })
    });
    let result = operation.await;
    if let Some(subscription) = subscription {
        subscription.unsubscribe();
    }
    Ok(result?)
}

fn print_outcome(outcome: &SyncOutcome, as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    } else {
        for line in format_outcome(outcome) {
            println!("{line}");
        }
    }
    Ok(())
}

fn run_sync_status(services: &Services, as_json: bool) -> Result<(), CliError> {
    let status = services.sync.status()?;
    let credential = services.credentials.current();
    let report = StatusReport {
        state: status.state,
        pending: status.pending,
        last_error: status.last_error,
        signed_in: credential.is_some(),
        session_expires_at: credential.map(|credential| format_timestamp(credential.expires_at)),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("state:           {:?}", report.state);
    println!("pending uploads: {}", report.pending);
    if let Some(error) = &report.last_error {
        println!("last error:      {error}");
    }
    match report.session_expires_at {
        Some(expires_at) => println!("session:         signed in (expires {expires_at})"),
        None => println!("session:         not signed in"),
    }
    Ok(())
}

async fn run_sync_watch(services: Services) -> Result<(), CliError> {
    let Services {
        api,
        credentials,
        sync,
    } = services;
    if credentials.current().is_none() {
        return Err(CliError::NotSignedIn);
    }

    let subscription = sync.subscribe(|event| {
        if let Some(line) = format_event(event) {
            eprintln!("{line}");
        }
    });

    let (online_sender, online) = watch::channel(false);
    let prober = tokio::spawn(watch_reachability(
        move || {
            let api = api.clone();
            async move { api.probe().await }
        },
        PROBE_INTERVAL,
        online_sender,
    ));
    let renewer = tokio::spawn(renew_on_signal(credentials));
    let monitor = ConnectivityMonitor::new(sync.clone(), sync.settings());

    println!("Watching for connectivity changes (Ctrl-C to stop)");
    tokio::select! {
        () = monitor.run(online) => {}
        result = tokio::signal::ctrl_c() => result?,
    }

    prober.abort();
    renewer.abort();
    subscription.unsubscribe();
    println!("Stopped");
    Ok(())
}

/// Keep the session fresh: check it once at start-up, then again whenever
/// the coordinator signals renewal is due.
///
/// The receiver is taken before the first check, so a hint raised while the
/// restored session was already inside its refresh window is not lost.
pub async fn renew_on_signal<P, S>(credentials: CredentialCoordinator<P, S>)
where
    P: IdentityProvider,
    S: SessionPersistence,
{
    let mut renewal = credentials.renewal_signal();
    loop {
        match credentials.acquire().await {
            Ok(credential) => tracing::info!(
                "Session valid until {}",
                format_timestamp(credential.expires_at)
            ),
            Err(error) if error.requires_reauthentication() => {
                eprintln!("Session expired. Run `brief auth login` to sign in again.");
                break;
            }
            Err(error) => tracing::warn!("Session renewal failed: {error}"),
        }
        if renewal.changed().await.is_err() {
            break;
        }
    }
}
