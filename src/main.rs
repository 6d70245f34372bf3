//! Hotspot Cache - admin server over a simulated hotspot device
//!
//! Runs the caching and write-coalescing layer against the in-memory device
//! simulator and exposes the admin API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hotspot_cache::api::{create_router, AppState};
use hotspot_cache::gateway::{InMemoryGateway, UserRecord};
use hotspot_cache::{Config, HotspotService};

/// Startup sequence:
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the service (registry, read caches, batch queue)
/// 4. Start the admin HTTP server on the configured port
/// 5. On SIGINT/SIGTERM, stop serving and flush pending mutations
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hotspot_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Hotspot Cache");

    let config = Config::from_env();
    info!(
        max_entries = config.cache.max_size,
        default_ttl_ms = config.cache.ttl.as_millis() as u64,
        batch_size = config.batch.max_batch_size,
        flush_delay_ms = config.batch.flush_delay.as_millis() as u64,
        port = config.server_port,
        "Configuration loaded"
    );

    let gateway = Arc::new(
        InMemoryGateway::new().with_users([
            UserRecord::new("demo", "default").with_comment("seeded by simulator"),
        ]),
    );
    let service = Arc::new(
        HotspotService::new(&config, gateway).context("failed to build hotspot service")?,
    );

    let failures = service.failures();
    let failure_log = tokio::spawn(async move {
        let Some(mut rx) = failures else {
            return;
        };
        while let Some(report) = rx.recv().await {
            warn!(
                kind = %report.kind,
                batch_id = report.batch_id,
                users = ?report.usernames(),
                error = ?report.error(),
                "Batch flush failed"
            );
        }
    });

    let app = create_router(AppState::new(service.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let reports = service.shutdown().await;
    let failed = reports.iter().filter(|r| !r.is_success()).count();
    info!(batches = reports.len(), failed, "Pending mutations flushed");
    // shutdown released the failure sender, so the log task ends once drained
    match tokio::time::timeout(Duration::from_secs(5), failure_log).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "Failure log task ended abnormally"),
        Err(_) => warn!("Failure log did not drain in time"),
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
