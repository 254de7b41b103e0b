// handlers/root/tenant_health.rs - GET /api/root/tenant/:name/health handler

use axum::extract::{Path, State};
use serde::Serialize;
use std::time::Instant;

use crate::app::AppState;
use crate::database::ConnectionHandle;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Serialize)]
pub struct TenantHealth {
    pub identifier: String,
    pub database: String,
    pub status: &'static str,
    pub latency_ms: u64,
}

/// Opens (or reuses) the tenant's cached connection and checks it with a round trip
pub async fn tenant_health<H: ConnectionHandle>(
    State(state): State<AppState<H>>,
    Path(name): Path<String>,
) -> ApiResult<TenantHealth> {
    let identifier = name.to_lowercase();
    let connection = state.resolver.cache().checkout(&identifier).await?;

    let started = Instant::now();
    connection.handle.ping().await?;

    Ok(ApiResponse::success(TenantHealth {
        identifier,
        database: connection.tenant.database.clone(),
        status: "ok",
        latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    }))
}
