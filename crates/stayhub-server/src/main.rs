mod config;

use std::sync::Arc;

use axum::http::{
    HeaderValue, Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use stayhub_api::auth::hash_password;
use stayhub_api::provider::{MockPaymentProvider, PaymentProvider};
use stayhub_api::state::{AppState, AppStateInner};
use stayhub_api::stripe::StripeProvider;
use stayhub_db::Database;

use crate::config::Config;

const DEMO_PASSWORD: &str = "password123";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stayhub=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.has_placeholder_secret() {
        warn!("STAYHUB_JWT_SECRET is unset or a placeholder; do not run this in production");
    }

    // Init database
    let db = Database::open(&config.db_path)?;
    info!("Database ready at {}", config.db_path.display());

    if config.seed_demo {
        let hash = hash_password(DEMO_PASSWORD)?;
        if stayhub_db::seed::seed_demo(&db, &hash)? {
            info!(
                "Seeded demo data ({} / {}, password {})",
                stayhub_db::seed::DEMO_HOST_EMAIL,
                stayhub_db::seed::DEMO_GUEST_EMAIL,
                DEMO_PASSWORD
            );
        }
    }

    let provider: Arc<dyn PaymentProvider> = match &config.stripe_secret_key {
        Some(key) => Arc::new(StripeProvider::new(key.clone())),
        None => {
            warn!("STRIPE_SECRET_KEY not set; using the mock payment provider");
            Arc::new(MockPaymentProvider::new())
        }
    };
    if config.stripe_webhook_secret.is_none() {
        info!("STRIPE_WEBHOOK_SECRET not set; webhook endpoint disabled");
    }

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        provider,
        publishable_key: config.stripe_publishable_key.clone(),
        webhook_secret: config.stripe_webhook_secret.clone(),
    });

    let cors = match &config.cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE]),
        None => CorsLayer::permissive(),
    };

    let app = stayhub_api::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!(
        "StayHub API listening on {} (payments: {})",
        addr,
        if config.stripe_secret_key.is_some() { "stripe" } else { "mock" }
    );
    if let Some(url) = &config.public_api_url {
        info!("Public API URL: {}", url);
    }

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
