// handlers/tenant.rs - /auth/tenant (optional) and /api/tenant (required) handlers
//
// Both report what the resolution middleware attached to the request. They
// stand in for the authentication and data routes that consume the context.

use axum::extract::Extension;
use serde::Serialize;

use crate::database::{ConnectionHandle, TenantRecord};
use crate::middleware::{ApiResponse, ApiResult, ResolvedContext};

#[derive(Debug, Serialize)]
pub struct ContextView {
    pub identifier: String,
    pub is_landlord: bool,
    pub tenant: Option<TenantRecord>,
}

impl<H: ConnectionHandle> From<&ResolvedContext<H>> for ContextView {
    fn from(context: &ResolvedContext<H>) -> Self {
        Self {
            identifier: context.identifier.clone(),
            is_landlord: context.is_landlord,
            tenant: context.tenant.as_deref().cloned(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TenantStatus {
    #[serde(flatten)]
    pub context: ContextView,
    pub database: &'static str,
}

/// GET|POST /auth/tenant - landlord fallback on unknown or unreachable tenants
pub async fn tenant_context<H: ConnectionHandle>(
    Extension(context): Extension<ResolvedContext<H>>,
) -> ApiResponse<ContextView> {
    ApiResponse::success(ContextView::from(&context))
}

/// GET /api/tenant - tenant must resolve; verifies the connection with a round trip
pub async fn tenant_show<H: ConnectionHandle>(
    Extension(context): Extension<ResolvedContext<H>>,
) -> ApiResult<TenantStatus> {
    context.store().handle().ping().await?;

    Ok(ApiResponse::success(TenantStatus {
        context: ContextView::from(&context),
        database: "ok",
    }))
}
