use anyhow::Result;
use axum::Router;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use crate::services::{
    clock::SystemClock, file_store::FileStore, mailer::SmtpMailer, registry::TransferRegistry,
    transfer::TransferService,
};

/// How often abandoned transfers are swept.
const RECLAIM_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;
    tracing::info!(
        host = %cfg.host,
        port = cfg.port,
        storage_dir = %cfg.storage_dir,
        base_url = %cfg.base_url,
        smtp_host = %cfg.smtp_host,
        smtp_port = cfg.smtp_port,
        "Starting filegate"
    );

    // --- Payload store (creates the directory if missing) ---
    let files = FileStore::new(&cfg.storage_dir).await?;

    // --- Mail transport ---
    let mailer = Arc::new(SmtpMailer::new(
        &cfg.smtp_host,
        cfg.smtp_port,
        cfg.smtp_credentials(),
        &cfg.mail_from,
    )?);

    // --- Core service ---
    let registry = Arc::new(TransferRegistry::new());
    let service = TransferService::new(
        registry,
        files,
        mailer,
        Arc::new(SystemClock),
        cfg.base_url.clone(),
    );

    // --- Hourly reclamation of abandoned transfers ---
    let sweeper = service.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(RECLAIM_INTERVAL_SECS));
        loop {
            interval.tick().await;
            sweeper.purge_stale().await;
        }
    });

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_upload_bytes).with_state(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == std::io::ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
