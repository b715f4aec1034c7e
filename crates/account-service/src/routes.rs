//! HTTP 路由
//!
//! - `GET /health`：存活探针
//! - `GET /ready`：就绪探针，检查数据库与 Redis
//! - `POST /api/v1/auth/refresh`：以刷新令牌换取新的令牌对

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::SERVICE_NAME;
use crate::error::AccountError;
use crate::resources::{Resources, TokenPair};

pub fn router(resources: Resources) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/v1/auth/refresh", post(refresh_token))
        .with_state(resources)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
    }))
}

async fn readiness_check(State(resources): State<Resources>) -> (StatusCode, Json<Value>) {
    let db_ok = resources.database.health_check().await.is_ok();
    let cache_ok = resources.redis.health_check().await.is_ok();
    let all_ok = db_ok && cache_ok;

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "status": if all_ok { "ok" } else { "degraded" },
        "service": SERVICE_NAME,
        "checks": {
            "database": if db_ok { "ok" } else { "fail" },
            "redis": if cache_ok { "ok" } else { "fail" }
        }
    });
    (status, Json(body))
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

async fn refresh_token(
    State(resources): State<Resources>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AccountError> {
    resources.jwt.refresh(&request.refresh_token).map(Json)
}
