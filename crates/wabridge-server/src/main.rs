use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wabridge_proto::{Detached, Transport};
use wabridge_server::api::{self, AppState};
use wabridge_server::bootstrap;
use wabridge_server::config::BridgeConfig;
use wabridge_server::events::EventContext;
use wabridge_server::health::HealthState;
use wabridge_server::lifecycle;
use wabridge_server::qr::QrState;
use wabridge_server::send::SendEngine;

#[tokio::main]
async fn main() {
    init_tracing();
    install_panic_hook();

    info!("starting wabridge v{}", env!("CARGO_PKG_VERSION"));

    let config = BridgeConfig::from_env();
    info!(?config, "loaded configuration");

    if let Err(error) = run(config).await {
        // One actionable line, then the startup exit code.
        tracing::error!(error = %format!("{error:#}"), "fatal error, exiting");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("{level},wabridge_server={level}"))),
        )
        .init();
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        std::process::exit(2);
    }));
}

async fn run(config: BridgeConfig) -> anyhow::Result<()> {
    let backends = bootstrap::prepare(&config).await?;

    // The protocol engine binds here; without one attached the bridge still
    // serves its store and HTTP surface and reports NotConnected.
    let transport: Arc<dyn Transport> = Arc::new(Detached::new());

    let health = Arc::new(HealthState::default());
    let qr = Arc::new(QrState::default());

    match backends.session.device_jid().await {
        Ok(Some(jid)) => {
            info!(%jid, "found existing paired device");
            health.set_authenticated(true);
        }
        Ok(None) => info!("no paired device yet, pairing required"),
        Err(error) => warn!(%error, "could not probe session device row"),
    }

    let send = Arc::new(SendEngine::new(
        transport.clone(),
        backends.store.clone(),
        health.clone(),
        &config.media_root,
    ));

    let state = AppState {
        transport: transport.clone(),
        store: backends.store.clone(),
        session: backends.session.clone(),
        health: health.clone(),
        qr: qr.clone(),
        send,
        media_root: config.media_root.clone(),
        backup_note: backends.backup_note,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let client_task = tokio::spawn(lifecycle::run_client(
        transport.clone(),
        EventContext {
            store: backends.store.clone(),
            health: health.clone(),
            qr: qr.clone(),
        },
        shutdown_rx.clone(),
    ));

    let snapshot_task = backends.snapshotter.clone().map(|snapshotter| {
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { snapshotter.run_periodic(shutdown_rx).await })
    });

    let addr = config.listen_addr();
    tokio::select! {
        result = api::serve(state, addr) => {
            result?;
            anyhow::bail!("HTTP server stopped unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);

    if let Some(snapshotter) = &backends.snapshotter {
        match tokio::time::timeout(Duration::from_secs(10), snapshotter.snapshot()).await {
            Ok(Ok(())) => info!("final session snapshot uploaded"),
            Ok(Err(error)) => warn!(%error, "final session snapshot failed"),
            Err(_) => warn!("final session snapshot aborted after 10s"),
        }
    }

    let _ = tokio::time::timeout(Duration::from_secs(5), client_task).await;
    if let Some(task) = snapshot_task {
        let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
    }

    info!("graceful shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(error) => {
                warn!(%error, "could not install SIGTERM handler, watching Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
