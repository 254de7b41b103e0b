// handlers/root/connections.rs - tenant connection cache administration
//
// GET    /api/root/connections          cache snapshot
// DELETE /api/root/connections/:tenant  close one cached connection

use axum::extract::{Path, State};
use serde::Serialize;

use crate::app::AppState;
use crate::database::{ConnectionHandle, ConnectionSnapshot};
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Serialize)]
pub struct ConnectionList {
    pub active: usize,
    pub max_connections: usize,
    pub connections: Vec<ConnectionSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionClosed {
    pub identifier: String,
    pub closed: bool,
}

pub async fn connection_list<H: ConnectionHandle>(
    State(state): State<AppState<H>>,
) -> ApiResponse<ConnectionList> {
    let cache = state.resolver.cache();
    let connections = cache.snapshot().await;

    ApiResponse::success(ConnectionList {
        active: connections.len(),
        max_connections: cache.max_connections(),
        connections,
    })
}

pub async fn connection_close<H: ConnectionHandle>(
    State(state): State<AppState<H>>,
    Path(tenant): Path<String>,
) -> ApiResult<ConnectionClosed> {
    let identifier = tenant.to_lowercase();
    let closed = state.resolver.cache().close(&identifier).await;

    tracing::info!("Administrative close for tenant '{}' (was cached: {})", identifier, closed);

    Ok(ApiResponse::success(ConnectionClosed { identifier, closed }))
}
