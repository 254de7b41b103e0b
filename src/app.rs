use axum::{
    middleware,
    routing::{delete, get},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::database::ConnectionHandle;
use crate::handlers;
use crate::middleware::{optional_tenant, require_tenant, TenantResolver};

/// Shared router state, built once in the composition root
pub struct AppState<H: ConnectionHandle> {
    pub resolver: Arc<TenantResolver<H>>,
}

impl<H: ConnectionHandle> AppState<H> {
    pub fn new(resolver: TenantResolver<H>) -> Self {
        Self {
            resolver: Arc::new(resolver),
        }
    }
}

impl<H: ConnectionHandle> Clone for AppState<H> {
    fn clone(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
        }
    }
}

pub fn app<H: ConnectionHandle>(state: AppState<H>, request_logging: bool) -> Router {
    let router: Router = Router::<AppState<H>>::new()
        // Public
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health::<H>))
        // Tenant optional: landlord fallback
        .merge(auth_routes(state.clone()))
        // Tenant required
        .merge(api_routes(state.clone()))
        // Administrative
        .merge(root_routes::<H>())
        // Global middleware
        .layer(CorsLayer::permissive())
        .with_state(state);

    if request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

fn auth_routes<H: ConnectionHandle>(state: AppState<H>) -> Router<AppState<H>> {
    Router::new()
        .route(
            "/auth/tenant",
            get(handlers::tenant_context::<H>).post(handlers::tenant_context::<H>),
        )
        .route_layer(middleware::from_fn_with_state(state, optional_tenant::<H>))
}

fn api_routes<H: ConnectionHandle>(state: AppState<H>) -> Router<AppState<H>> {
    Router::new()
        .route("/api/tenant", get(handlers::tenant_show::<H>))
        .route_layer(middleware::from_fn_with_state(state, require_tenant::<H>))
}

fn root_routes<H: ConnectionHandle>() -> Router<AppState<H>> {
    use handlers::root;

    Router::new()
        .route("/api/root/connections", get(root::connection_list::<H>))
        .route("/api/root/connections/:tenant", delete(root::connection_close::<H>))
        .route("/api/root/tenant/:name/health", get(root::tenant_health::<H>))
}
