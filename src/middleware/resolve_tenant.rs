use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use thiserror::Error;

use crate::app::AppState;
use crate::config::ResolutionConfig;
use crate::database::{
    CacheError, ConnectionError, ConnectionHandle, Store, TenantCache, TenantRecord,
};
use crate::error::ApiError;
use super::extract;

/// Identifier reported for requests served by the landlord store
pub const LANDLORD_IDENTIFIER: &str = "landlord";

/// How resolution failures are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMode {
    /// Unknown or unreachable tenants fail the request
    Required,
    /// Unknown or unreachable tenants fall back to the landlord store
    Optional,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    #[error("Tenant '{identifier}' unavailable: {source}")]
    TenantUnavailable {
        identifier: String,
        #[source]
        source: ConnectionError,
    },

    #[error("Tenant directory unavailable: {0}")]
    DirectoryUnavailable(String),
}

impl From<CacheError> for ResolveError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::TenantNotFound(identifier) => ResolveError::TenantNotFound(identifier),
            CacheError::DirectoryUnavailable(msg) => ResolveError::DirectoryUnavailable(msg),
            CacheError::Connection { identifier, source } => {
                ResolveError::TenantUnavailable { identifier, source }
            }
        }
    }
}

/// Per-request tenant context, injected into request extensions
#[derive(Clone, Debug)]
pub struct ResolvedContext<H> {
    /// `None` on the landlord path
    pub tenant: Option<Arc<TenantRecord>>,
    /// Tenant connection, or the landlord connection on the landlord path
    pub connection: H,
    pub is_landlord: bool,
    pub identifier: String,
}

impl<H: ConnectionHandle> ResolvedContext<H> {
    /// Store handle for repositories
    pub fn store(&self) -> Store<H> {
        if self.is_landlord {
            Store::Landlord(self.connection.clone())
        } else {
            Store::Tenant(self.connection.clone())
        }
    }
}

/// Turns an optional identifier into a [`ResolvedContext`] via the tenant cache
pub struct TenantResolver<H: ConnectionHandle> {
    cache: Arc<TenantCache<H>>,
    landlord: H,
    config: ResolutionConfig,
}

impl<H: ConnectionHandle> TenantResolver<H> {
    pub fn new(cache: Arc<TenantCache<H>>, landlord: H, config: ResolutionConfig) -> Self {
        Self {
            cache,
            landlord,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<TenantCache<H>> {
        &self.cache
    }

    pub fn landlord(&self) -> &H {
        &self.landlord
    }

    pub fn config(&self) -> &ResolutionConfig {
        &self.config
    }

    pub fn landlord_context(&self) -> ResolvedContext<H> {
        ResolvedContext {
            tenant: None,
            connection: self.landlord.clone(),
            is_landlord: true,
            identifier: LANDLORD_IDENTIFIER.to_string(),
        }
    }

    /// Resolve an extracted identifier. Lower-casing is the only normalization.
    pub async fn resolve(
        &self,
        identifier: Option<&str>,
        mode: ResolutionMode,
    ) -> Result<ResolvedContext<H>, ResolveError> {
        let identifier = match identifier.map(str::trim).filter(|s| !s.is_empty()) {
            Some(identifier) => identifier.to_lowercase(),
            None => return Ok(self.landlord_context()),
        };

        match self.cache.checkout(&identifier).await {
            Ok(connection) => Ok(ResolvedContext {
                tenant: Some(connection.tenant),
                connection: connection.handle,
                is_landlord: false,
                identifier,
            }),
            // Infra failure: never masked by a landlord fallback
            Err(CacheError::DirectoryUnavailable(msg)) => {
                Err(ResolveError::DirectoryUnavailable(msg))
            }
            Err(err) if mode == ResolutionMode::Optional => {
                tracing::warn!(
                    "Tenant '{}' could not be resolved, falling back to landlord: {}",
                    identifier,
                    err
                );
                Ok(self.landlord_context())
            }
            Err(err) => {
                tracing::warn!("Tenant resolution failed for '{}': {}", identifier, err);
                Err(err.into())
            }
        }
    }
}

/// Middleware for routes that must run against the caller's tenant
pub async fn require_tenant<H: ConnectionHandle>(
    State(state): State<AppState<H>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    resolve_request(&state.resolver, request, next, ResolutionMode::Required).await
}

/// Middleware for routes shared by landlord and tenant callers (e.g. authentication)
pub async fn optional_tenant<H: ConnectionHandle>(
    State(state): State<AppState<H>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    resolve_request(&state.resolver, request, next, ResolutionMode::Optional).await
}

async fn resolve_request<H: ConnectionHandle>(
    resolver: &TenantResolver<H>,
    request: Request,
    next: Next,
    mode: ResolutionMode,
) -> Result<Response, ApiError> {
    let config = resolver.config();
    let (parts, body) = request.into_parts();

    let mut identifier = extract::from_parts(&parts, config);

    // Body is only buffered when nothing earlier matched
    let body = if identifier.is_none() && extract::has_json_body(&parts.headers) {
        let (bytes, body) = buffer_body(body, config.max_body_bytes).await;
        identifier = bytes.and_then(|bytes| extract::from_body(&bytes, &config.body_field));
        body
    } else {
        body
    };

    let context = resolver.resolve(identifier.as_deref(), mode).await?;

    tracing::debug!(
        "Resolved request to '{}' (landlord: {})",
        context.identifier,
        context.is_landlord
    );

    let mut request = Request::from_parts(parts, body);
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

/// Buffer up to `limit` bytes of the body. Returns the bytes only when the
/// whole body fit; the returned body always replays everything read so far.
async fn buffer_body(body: Body, limit: usize) -> (Option<Bytes>, Body) {
    let mut stream = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut total = 0;

    while let Some(next) = stream.next().await {
        match next {
            Ok(chunk) => {
                total += chunk.len();
                chunks.push(chunk);
                if total > limit {
                    tracing::debug!("Request body over {} bytes, skipping body identifier", limit);
                    return (None, replay(chunks, stream.boxed()));
                }
            }
            Err(e) => {
                tracing::debug!("Request body unreadable, skipping body identifier: {}", e);
                return (None, replay(chunks, futures::stream::once(async { Err(e) }).boxed()));
            }
        }
    }

    let mut buffered = Vec::with_capacity(total);
    for chunk in &chunks {
        buffered.extend_from_slice(chunk);
    }
    let bytes = Bytes::from(buffered);
    (Some(bytes.clone()), Body::from(bytes))
}

fn replay(chunks: Vec<Bytes>, rest: BoxStream<'static, Result<Bytes, axum::Error>>) -> Body {
    let head = futures::stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>));
    Body::from_stream(head.chain(rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::testing::{MockDirectory, MockFactory, MockHandle};

    struct Fixture {
        directory: Arc<MockDirectory>,
        factory: Arc<MockFactory>,
        landlord: MockHandle,
        resolver: TenantResolver<MockHandle>,
    }

    fn fixture(tenants: &[&str]) -> Fixture {
        let directory = Arc::new(MockDirectory::with_tenants(tenants));
        let factory = Arc::new(MockFactory::new());
        let cache = Arc::new(TenantCache::<MockHandle>::new(
            CacheConfig::default(),
            directory.clone(),
            factory.clone(),
        ));
        let landlord = MockHandle::new(0);
        let resolver = TenantResolver::new(cache, landlord.clone(), ResolutionConfig::default());
        Fixture {
            directory,
            factory,
            landlord,
            resolver,
        }
    }

    #[tokio::test]
    async fn missing_identifier_is_landlord_without_io() {
        let f = fixture(&["acme"]);

        for mode in [ResolutionMode::Required, ResolutionMode::Optional] {
            let context = f.resolver.resolve(None, mode).await.unwrap();
            assert!(context.is_landlord);
            assert_eq!(context.identifier, "landlord");
            assert_eq!(context.connection.id, f.landlord.id);
            assert!(context.tenant.is_none());
        }

        let blank = f.resolver.resolve(Some("  "), ResolutionMode::Required).await.unwrap();
        assert!(blank.is_landlord);

        assert_eq!(f.directory.lookups(), 0);
        assert_eq!(f.factory.connects(), 0);
    }

    #[tokio::test]
    async fn known_tenant_resolves_to_its_connection() {
        let f = fixture(&["acme"]);

        let context = f
            .resolver
            .resolve(Some("ACME"), ResolutionMode::Required)
            .await
            .unwrap();
        assert!(!context.is_landlord);
        assert_eq!(context.identifier, "acme");
        assert_eq!(context.tenant.as_ref().unwrap().database, "tenant_acme");
        assert_ne!(context.connection.id, f.landlord.id);
        assert!(!context.store().is_landlord());
    }

    #[tokio::test]
    async fn unknown_tenant_required_mode_fails() {
        let f = fixture(&[]);

        let err = f
            .resolver
            .resolve(Some("acme"), ResolutionMode::Required)
            .await
            .unwrap_err();
        assert_eq!(err, ResolveError::TenantNotFound("acme".to_string()));
    }

    #[tokio::test]
    async fn unknown_tenant_optional_mode_falls_back() {
        let f = fixture(&[]);

        let context = f
            .resolver
            .resolve(Some("acme"), ResolutionMode::Optional)
            .await
            .unwrap();
        assert!(context.is_landlord);
        assert_eq!(context.connection.id, f.landlord.id);
        assert!(context.store().is_landlord());
    }

    #[tokio::test]
    async fn connection_failure_depends_on_mode() {
        let f = fixture(&["acme"]);
        f.factory.fail_for("acme");

        let err = f
            .resolver
            .resolve(Some("acme"), ResolutionMode::Required)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::TenantUnavailable { .. }));

        let context = f
            .resolver
            .resolve(Some("acme"), ResolutionMode::Optional)
            .await
            .unwrap();
        assert!(context.is_landlord);
    }

    #[tokio::test]
    async fn directory_outage_never_falls_back() {
        let f = fixture(&["acme"]);
        f.directory.set_unavailable(true);

        for mode in [ResolutionMode::Required, ResolutionMode::Optional] {
            let err = f.resolver.resolve(Some("acme"), mode).await.unwrap_err();
            assert!(matches!(err, ResolveError::DirectoryUnavailable(_)));
        }
    }

    #[tokio::test]
    async fn body_within_limit_is_buffered() {
        let (bytes, body) = buffer_body(Body::from(r#"{"tenant":"acme"}"#), 64).await;

        assert_eq!(bytes.as_deref(), Some(br#"{"tenant":"acme"}"#.as_slice()));
        let replayed = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(&replayed[..], br#"{"tenant":"acme"}"#);
    }

    #[tokio::test]
    async fn oversized_body_is_skipped_but_replayed_intact() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = (0..4)
            .map(|i| Ok(Bytes::from(vec![b'a' + i; 16])))
            .collect();
        let original: Vec<u8> = (0..4).flat_map(|i| vec![b'a' + i; 16]).collect();

        let (bytes, body) = buffer_body(Body::from_stream(futures::stream::iter(chunks)), 20).await;

        assert!(bytes.is_none());
        let replayed = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(&replayed[..], original.as_slice());
    }
}
