//! HTTP handlers of the sync API.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{info, warn};
use sea_orm::{ConnectionTrait, DatabaseConnection};
use serde::Serialize;

use super::error::ApiError;
use super::mailer::RecoveryMessage;
use super::reconcile;
use super::AppState;
use crate::model::{
    normalize_bucket_orders, normalize_task_orders, Ack, Bucket, EmailRequest, LastSyncResponse, RestoreResponse,
    RestoreSettings, SyncRequest, SyncResponse, Task,
};
use crate::repositories::{AccountRepository, PriorityRepository, TodoRepository};
use crate::token;
use crate::utils::datetime;

fn path_token(raw: &str) -> Result<String, ApiError> {
    token::normalize(raw).ok_or_else(|| ApiError::Validation("invalid token format".to_string()))
}

/// `POST /sync`
pub async fn sync(
    State(state): State<AppState>,
    payload: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<SyncResponse>, ApiError> {
    let Json(mut request) = payload?;
    if let Some(token) = token::normalize(&request.token) {
        request.token = token;
    }
    request.validate(state.config.server.payload_limits())?;

    let synced_at = state.clock.stamp(datetime::now_millis());
    let response = reconcile::reconcile(&state.db, &request, synced_at).await?;
    Ok(Json(response))
}

/// `GET /sync/:token`
///
/// Unknown tokens answer with a null `lastSyncAt`.
pub async fn last_sync(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<LastSyncResponse>, ApiError> {
    let token = path_token(&token)?;
    let account = AccountRepository::get(&state.db, &token).await?;
    Ok(Json(LastSyncResponse {
        last_sync_at: account.and_then(|account| account.last_sync_at),
    }))
}

/// `GET /restore/:token`
pub async fn restore(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<RestoreResponse>, ApiError> {
    let token = path_token(&token)?;
    let account = AccountRepository::get(&state.db, &token)
        .await?
        .ok_or(ApiError::NotFound)?;
    if state
        .retention
        .is_expired(account.created_at, account.last_sync_at, datetime::now_millis())
    {
        return Err(ApiError::TokenExpired);
    }

    let mut todos: Vec<Task> = TodoRepository::get_all(&state.db, &token)
        .await?
        .into_iter()
        .map(Task::from)
        .collect();
    let mut priorities: Vec<Bucket> = PriorityRepository::get_all(&state.db, &token)
        .await?
        .into_iter()
        .map(Bucket::from)
        .collect();
    normalize_task_orders(&mut todos);
    normalize_bucket_orders(&mut priorities);

    info!("Restore for {token}: {} todos, {} priorities", todos.len(), priorities.len());
    Ok(Json(RestoreResponse {
        todos,
        priorities,
        settings: RestoreSettings {
            last_sync_at: account.last_sync_at,
        },
    }))
}

/// `POST /email`
pub async fn email(
    State(state): State<AppState>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<Ack>, ApiError> {
    let Json(mut request) = payload?;
    request.token = request.token.trim().to_uppercase();
    request.email = request.email.trim().to_string();
    request.validate()?;

    AccountRepository::get(&state.db, &request.token)
        .await?
        .ok_or(ApiError::NotFound)?;
    AccountRepository::set_email(&state.db, &request.token, &request.email).await?;

    let message = RecoveryMessage::new(&request.email, &request.token, &state.config.server.app_url);
    state
        .mailer
        .send_recovery(&message)
        .await
        .map_err(|e| ApiError::Mail(e.to_string()))?;
    Ok(Json(Ack { success: true }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: i64,
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: datetime::now_millis(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseCheck {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounts: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MailerCheck {
    pub status: &'static str,
    pub provider: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub database: DatabaseCheck,
    pub mailer: MailerCheck,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedHealthResponse {
    pub status: &'static str,
    pub timestamp: i64,
    pub uptime_secs: i64,
    pub checks: HealthChecks,
}

async fn probe_database(db: &DatabaseConnection) -> anyhow::Result<u64> {
    db.execute_unprepared("SELECT 1").await?;
    AccountRepository::count(db).await
}

async fn check_database(state: &AppState) -> DatabaseCheck {
    match probe_database(&state.db).await {
        Ok(accounts) => DatabaseCheck {
            status: "ok",
            accounts: Some(accounts),
            error: None,
        },
        Err(e) => {
            warn!("Database health check failed: {e:#}");
            DatabaseCheck {
                status: "error",
                accounts: None,
                error: Some("database unavailable".to_string()),
            }
        }
    }
}

/// `GET /health/detailed`
///
/// Answers `503` when the database check fails.
pub async fn health_detailed(State(state): State<AppState>) -> Response {
    let database = check_database(&state).await;
    let healthy = database.error.is_none();
    let now = datetime::now_millis();
    let body = DetailedHealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        timestamp: now,
        uptime_secs: (now - state.started_at).max(0) / 1000,
        checks: HealthChecks {
            database,
            mailer: MailerCheck {
                status: "ok",
                provider: state.mailer.provider(),
            },
        },
    };
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}
