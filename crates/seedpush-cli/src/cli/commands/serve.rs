//! `seedpush serve` – the long-running service.
//!
//! Startup order: daemon reachability check, VAPID keys, registry restore
//! (with one reconciliation pass), reconciliation timer, HTTP server.
//! On SIGINT/SIGTERM the timer stops and the registry is saved at once;
//! in-flight requests then get a bounded grace period. A failed save makes
//! the process exit non-zero.

use anyhow::{Context, Result};
use axum::Router;
use seedpush_core::config::SeedpushConfig;
use seedpush_core::daemon::{JobDaemon, TransmissionClient};
use seedpush_core::push::{VapidKeys, WebPushSender};
use seedpush_core::reconcile::Reconciler;
use seedpush_core::registry::{LoadOutcome, Registry};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::cli::http::{self, AppState};

pub async fn run_serve(cfg: &SeedpushConfig) -> Result<()> {
    let client = TransmissionClient::new(&cfg.rpc);
    let version = client
        .version()
        .await
        .with_context(|| format!("cannot reach Transmission at {}", client.endpoint()))?;
    tracing::info!(
        rpc_version = version.rpc_version,
        "connected to Transmission {} at {}",
        version.version,
        client.endpoint()
    );

    let keys = VapidKeys::load_or_create(&cfg.vapid_file_path()?)?;
    let push = WebPushSender::new(&keys, &cfg.vapid_subject, cfg.notification_ttl())
        .context("set up web push")?;

    let daemon: Arc<dyn JobDaemon> = Arc::new(client);
    let registry = Arc::new(Registry::new());
    let reconciler = Arc::new(
        Reconciler::new(
            Arc::clone(&registry),
            Arc::clone(&daemon),
            Arc::new(push),
            cfg.base_uri.clone(),
        )
        .with_retry_policy(cfg.retry_policy()?),
    );

    let state_path = cfg.state_file_path()?;
    match reconciler.restore(&state_path).await? {
        LoadOutcome::Missing => tracing::info!("no saved jobs at {}", state_path.display()),
        LoadOutcome::Restored(_) => {
            tracing::info!(tracked = registry.count(), "jobs tracked after restore")
        }
    }

    let sync = Arc::clone(&reconciler).spawn(cfg.sync_interval());

    let app = http::router(AppState {
        registry: Arc::clone(&registry),
        daemon,
        vapid_public_key: keys.public_key.clone().into(),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.listen_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(%addr, base_uri = %cfg.base_uri, "listening");

    serve_then_save(listener, app, shutdown_signal(), DRAIN_TIMEOUT, || {
        sync.abort();
        let count = registry
            .save_to_path(&state_path)
            .with_context(|| format!("save jobs to {}", state_path.display()))?;
        tracing::info!(count, "saved jobs to {}", state_path.display());
        Ok(())
    })
    .await
}

/// Grace period for in-flight requests once the snapshot is written.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Serve `app` until `signal` fires (or the server fails), run `save`
/// immediately, then give open connections at most `drain` to finish.
/// A save error takes precedence over a server error.
async fn serve_then_save<S, F>(
    listener: TcpListener,
    app: Router,
    signal: S,
    drain: Duration,
    save: F,
) -> Result<()>
where
    S: Future<Output = ()>,
    F: FnOnce() -> Result<()>,
{
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    let finished_early = tokio::select! {
        _ = signal => None,
        joined = &mut server => Some(joined),
    };

    let saved = save();

    let served = match finished_early {
        Some(joined) => joined
            .context("http server task")
            .and_then(|r| r.context("http server")),
        None => {
            let _ = stop_tx.send(());
            match tokio::time::timeout(drain, &mut server).await {
                Ok(joined) => joined
                    .context("http server task")
                    .and_then(|r| r.context("http server")),
                Err(_) => {
                    tracing::warn!(
                        "requests still open after {:?}; closing them",
                        drain
                    );
                    server.abort();
                    Ok(())
                }
            }
        }
    };

    saved?;
    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("ctrl-c handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
}
