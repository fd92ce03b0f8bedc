use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::time::SystemTime;

use crate::db::DbPool;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: u64,
    version: String,
    checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    database: CheckStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    ready: bool,
}

async fn database_healthy(pool: &DbPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}

/// GET /health
pub async fn health(State(pool): State<DbPool>) -> (StatusCode, Json<HealthResponse>) {
    let db_ok = database_healthy(&pool).await;

    let response = HealthResponse {
        status: if db_ok { "healthy" } else { "unhealthy" }.to_string(),
        timestamp: SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            database: if db_ok {
                CheckStatus::Healthy
            } else {
                CheckStatus::Unhealthy
            },
        },
    };

    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// GET /health/live
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
pub async fn readiness(State(pool): State<DbPool>) -> (StatusCode, Json<ReadinessResponse>) {
    let ready = database_healthy(&pool).await;

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(ReadinessResponse { ready }))
}
