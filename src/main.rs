//! OpenSASE Checkout - cart and order placement service

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderName;
use tower_sessions_sqlx_store::PostgresStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opensase_checkout::config::AppConfig;
use opensase_checkout::domain::events::EventBus;
use opensase_checkout::http::{self, AppState};
use opensase_checkout::store::postgres::{create_pool, PgStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().context("loading configuration")?;
    tracing::debug!(?config, "configuration loaded");

    let db = create_pool(&config.database_url, config.max_connections).await.context("connecting to database")?;
    sqlx::migrate!("./migrations").run(&db).await.context("running migrations")?;
    let sessions = PostgresStore::new(db.clone());
    sessions.migrate().await.context("creating session table")?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events will only be logged");
                None
            }
        },
        None => None,
    };

    let state = AppState::new(Arc::new(PgStore::new(db)), EventBus::new(nats))
        .with_account_header(HeaderName::from_bytes(config.account_header.as_bytes())?)
        .with_admin_token(config.admin_token.clone());
    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set, admin routes are closed");
    }
    let app = http::router(state, http::session_layer(sessions, config.secure_cookie));

    let addr = config.socket_addr();
    tracing::info!("OpenSASE Checkout listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
