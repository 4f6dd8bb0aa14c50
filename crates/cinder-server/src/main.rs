mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderName, Method, header::{AUTHORIZATION, CONTENT_TYPE}};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use cinder_api::AppStateInner;
use cinder_api::pastes::PASSWORD_HEADER;
use cinder_engine::{PasteService, SystemClock, sweep};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinder_server=debug,cinder_api=debug,cinder_engine=debug,cinder_db=info,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e}");
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    // Init database
    let db = Arc::new(cinder_db::Database::open(&config.db_path)?);
    let service = Arc::new(
        PasteService::new(db, Arc::new(SystemClock)).with_max_paste_bytes(config.max_paste_bytes),
    );

    // Background sweep of expired pastes
    tokio::spawn(sweep::run_sweep_loop(service.clone(), config.sweep_interval_secs));

    let state = Arc::new(AppStateInner {
        service,
        jwt_secret: config.jwt_secret,
        public_url: config.public_url,
        max_paste_bytes: config.max_paste_bytes,
    });

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, HeaderName::from_static(PASSWORD_HEADER)])
        .allow_credentials(false);

    let app = cinder_api::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Cinder listening on {}", addr);
    info!(
        "Sweeping expired pastes every {}s, max paste size {} bytes",
        config.sweep_interval_secs, config.max_paste_bytes
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

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
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
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
