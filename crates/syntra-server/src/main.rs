mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use syntra_api::auth::{AppState, AppStateInner};
use syntra_api::geocode::{Geocoder, GoogleGeocoder};
use syntra_api::notifications::{MemoryInbox, Notifier};
use syntra_api::push::{FcmSender, PushSender};
use syntra_api::report_store::ReportStore;
use syntra_chat::{ChatResponder, CompletionBackend, MemorySessionStore, OpenAiClient};
use syntra_db::Database;
use syntra_gateway::Dispatcher;
use syntra_storage::BlobStore;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "syntra=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    let blobs = Arc::new(BlobStore::new(config.blob_dir.clone()).await?);
    let dispatcher = Dispatcher::new();

    let completion: Option<Arc<dyn CompletionBackend>> = match &config.openai_api_key {
        Some(key) => {
            let mut client = OpenAiClient::new(key.clone());
            if let Some(endpoint) = &config.chat_endpoint {
                client = client.with_endpoint(endpoint.clone());
            }
            if let Some(model) = &config.chat_model {
                client = client.with_model(model.clone());
            }
            Some(Arc::new(client) as Arc<dyn CompletionBackend>)
        }
        None => {
            warn!("OPENAI_API_KEY not set, chat falls back to canned replies only");
            None
        }
    };

    let push: Option<Arc<dyn PushSender>> =
        match (&config.fcm_project_id, &config.fcm_access_token) {
            (Some(project), Some(token)) => {
                Some(Arc::new(FcmSender::new(project, token.clone())) as Arc<dyn PushSender>)
            }
            _ => {
                info!("FCM not configured, notifications stay in the inbox");
                None
            }
        };

    let geocoder: Option<Arc<dyn Geocoder>> = config
        .google_maps_api_key
        .as_ref()
        .map(|key| Arc::new(GoogleGeocoder::new(key.clone())) as Arc<dyn Geocoder>);

    let state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        reports: ReportStore::new(db, blobs, config.public_url.clone()),
        jwt_secret: config.jwt_secret.clone(),
        dispatcher: dispatcher.clone(),
        chat: ChatResponder::new(Arc::new(MemorySessionStore::new()), completion),
        notifier: Notifier::new(Arc::new(MemoryInbox::new()), push, dispatcher),
        geocoder,
    });

    let app = syntra_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Syntra server listening on {}", addr);
    info!("Photos served from {}", config.public_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
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
