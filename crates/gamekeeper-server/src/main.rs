mod config;
mod sweeper;

use std::sync::Arc;

use anyhow::Context;
use chrono::TimeDelta;
use gamekeeper_api::{AppStateInner, router};
use gamekeeper_core::{ElapsedPolicy, SystemClock};
use tracing::{info, warn};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gamekeeper=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(gamekeeper_db::Database::open(&config.db_path)?);

    let token_ttl = TimeDelta::try_days(config.token_ttl_days)
        .context("GAMEKEEPER_TOKEN_TTL_DAYS is out of range")?;
    let policy = ElapsedPolicy::from_hours(config.auto_resolve_hours);
    let state = AppStateInner::new(
        db,
        Arc::new(SystemClock),
        policy,
        config.jwt_secret.clone(),
        token_ttl,
    );

    if config.sweep_interval_secs > 0 {
        info!(
            "Sweeper enabled, every {}s (threshold {}h)",
            config.sweep_interval_secs, config.auto_resolve_hours
        );
        tokio::spawn(sweeper::run_sweep_loop(
            state.sessions.clone(),
            config.sweep_interval_secs,
        ));
    }

    let app = router(state);

    info!("GameKeeper listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("GameKeeper stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Could not install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
