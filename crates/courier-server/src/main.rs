mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use courier_api::auth::{AppState, AppStateInner};
use courier_api::blob::BlobClient;
use courier_api::intake::UploadPolicy;
use courier_api::token::TokenService;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = courier_db::Database::open(&config.db_path)?;

    // Staging directory for inbound files
    tokio::fs::create_dir_all(&config.staging_dir).await?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        tokens: TokenService::new(config.jwt_secret.clone(), config.token_ttl_hours),
        blobs: BlobClient::new(config.blob_url.clone()),
        uploads: UploadPolicy {
            staging_dir: config.staging_dir.clone(),
            max_file_bytes: config.max_file_bytes,
            max_files: config.max_files,
            allowed_types: config.allowed_mime.clone(),
        },
    });

    let app = courier_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Courier server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
