// handlers/system.rs - GET / and GET /health handlers

use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::database::ConnectionHandle;

pub async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Tenant Gate",
            "version": version,
            "description": "Multi-tenant request routing with per-tenant connection caching",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "auth": "/auth/tenant (tenant optional, falls back to landlord)",
                "api": "/api/tenant (tenant required)",
                "root": "/api/root/connections[/:tenant], /api/root/tenant/:name/health (administrative)",
            },
            "tenant_sources": ["x-tenant-id header", "subdomain", "?tenant=", "JSON body field \"tenant\""]
        }
    }))
}

/// Landlord connectivity plus tenant cache occupancy
pub async fn health<H: ConnectionHandle>(State(state): State<AppState<H>>) -> (StatusCode, Json<Value>) {
    let now = chrono::Utc::now();
    let cache = state.resolver.cache();
    let active = cache.active_count().await;
    let max = cache.max_connections();

    match state.resolver.landlord().ping().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok",
                    "tenant_connections": { "active": active, "max": max }
                }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string(),
                    "tenant_connections": { "active": active, "max": max }
                }
            })),
        ),
    }
}
