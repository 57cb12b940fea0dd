//! Reconciliation server
//!
//! This module wires the HTTP API together:
//! - `POST /sync` merges a client snapshot into the account
//! - `GET /sync/:token` returns the account's last sync time
//! - `GET /restore/:token` returns the stored snapshot
//! - `POST /email` stores a recovery email and sends the token
//! - `GET /health` and `GET /health/detailed`
//!
//! Every route except `/health` goes through the rate limiter.

pub mod clock;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod rate_limit;
pub mod reconcile;
pub mod storage;
pub mod sweeper;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::{middleware, Router};
use log::info;
use sea_orm::DatabaseConnection;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::repositories::AccountRepository;
use crate::token::RetentionPolicy;
use crate::utils::datetime;
use clock::SyncClock;
use mailer::Mailer;
use rate_limit::RateLimiter;
use sweeper::RetentionSweeper;

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<Config>,
    pub retention: RetentionPolicy,
    /// `None` when rate limiting is disabled
    pub limiter: Option<Arc<RateLimiter>>,
    pub mailer: Arc<dyn Mailer>,
    /// Source of `syncedAt` stamps
    pub clock: Arc<SyncClock>,
    /// Server start time in epoch milliseconds
    pub started_at: i64,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: Config, mailer: Arc<dyn Mailer>) -> Self {
        let limiter = config
            .rate_limit
            .enabled
            .then(|| Arc::new(RateLimiter::from_config(&config.rate_limit)));
        Self {
            db,
            retention: config.retention.policy(),
            config: Arc::new(config),
            limiter,
            mailer,
            clock: Arc::new(SyncClock::new()),
            started_at: datetime::now_millis(),
        }
    }
}

/// Create the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sync", post(handlers::sync))
        .route("/sync/:token", get(handlers::last_sync))
        .route("/restore/:token", get(handlers::restore))
        .route("/email", post(handlers::email))
        .route("/health", get(handlers::health))
        .route("/health/detailed", get(handlers::health_detailed))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit::enforce))
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;
    Ok(())
}

/// Start the server with its background tasks and run until Ctrl-C.
pub async fn run(config: Config) -> Result<()> {
    let db = storage::connect(&config.server.database_url).await?;
    let mailer = mailer::from_config(&config.mail).context("Failed to set up mailer")?;
    let state = AppState::new(db.clone(), config.clone(), mailer);
    if let Some(latest) = AccountRepository::latest_sync_at(&db).await? {
        state.clock.observe(latest);
    }

    let sweeper = RetentionSweeper::new(db, state.retention).spawn(config.server.sweep_interval());
    let cleanup = state
        .limiter
        .clone()
        .map(|limiter| limiter.spawn_cleanup(Duration::from_secs(config.rate_limit.cleanup_interval_secs.max(1))));

    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;
    info!("🚀 Sync server listening on {}", listener.local_addr()?);

    let result = serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down");
    })
    .await;

    sweeper.abort();
    if let Some(cleanup) = cleanup {
        cleanup.abort();
    }
    result
}
