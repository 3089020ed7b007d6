mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use parley_api::archive::SqliteArchive;
use parley_api::attachments::AttachmentStore;
use parley_api::auth::{AppState, AppStateInner};
use parley_api::gateway::{DeliveryMode, MessagingGateway};
use parley_api::routes;
use parley_xmpp::SessionBroker;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    // Archive and attachment storage
    let db = Arc::new(parley_db::Database::open(&config.db_path)?);
    let archive = Arc::new(SqliteArchive::new(db));
    let attachments = Arc::new(
        AttachmentStore::new(
            config.file_dir.clone(),
            config.media_dir.clone(),
            config.max_attachment_bytes,
        )
        .await?,
    );

    // Messaging network
    info!(
        "XMPP endpoint {}:{} (domain {}, timeout {:?})",
        config.xmpp.host, config.xmpp.port, config.xmpp.domain, config.xmpp.reply_timeout
    );
    match &config.delivery {
        DeliveryMode::ServiceAccount(creds) => {
            info!("Delivering as service account '{}'", creds.username)
        }
        DeliveryMode::AsSender => info!("Delivering with each sender's own credentials"),
    }
    let domain = config.xmpp.domain.clone();
    let body_limit = config.body_limit();
    let broker = SessionBroker::new(config.xmpp);

    let gateway = MessagingGateway::new(
        domain,
        config.delivery,
        Arc::new(broker.clone()),
        attachments,
        archive,
    );

    let state: AppState = Arc::new(AppStateInner {
        gateway,
        broker,
        jwt_secret: config.jwt_secret,
        token_ttl: config.token_ttl,
    });

    let app = routes::router(state, body_limit)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Parley gateway listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Parley gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
