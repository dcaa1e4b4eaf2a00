use anyhow::{Context, Result};
use axum::Router;
use bucket_gateway::{
    config::AppConfig,
    routes::routes,
    services::{bucket::Bucket, sqlite_bucket::SqliteBucket, sweeper::ExpirySweeper},
    state::AppState,
};
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;

    tracing::info!("Starting bucket-gateway with config: {:?}", cfg);

    // --- Open the bucket ---
    let bucket: Arc<dyn Bucket> = Arc::new(
        SqliteBucket::connect(&cfg.database_url, &cfg.storage_dir)
            .await
            .with_context(|| format!("opening bucket at {}", cfg.database_url))?,
    );

    let state = AppState::new(bucket.clone(), cfg.gateway.clone());

    // --- Start the sweeper ---
    if cfg.sweeper.enabled {
        ExpirySweeper::new(bucket, state.config.clone(), cfg.sweeper.clone()).spawn();
    } else {
        tracing::info!("Expiry sweeper disabled");
    }

    // --- Build router ---
    let app: Router = routes::app(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
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
