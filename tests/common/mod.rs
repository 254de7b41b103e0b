#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use reqwest::StatusCode as ReqwestStatus;
use serde_json::Value;
use tower::ServiceExt;

use tenant_gate::app::{app, AppState};
use tenant_gate::config::{CacheConfig, ResolutionConfig};
use tenant_gate::database::TenantCache;
use tenant_gate::middleware::TenantResolver;
use tenant_gate::testing::{MockDirectory, MockFactory, MockHandle};

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_tenant-gate"));
        cmd.env("TENANT_GATE_PORT", port.to_string())
            .env("TENANT_GATE_BIND", "127.0.0.1")
            // Keeps /health fast when no landlord database is running
            .env("TENANT_CONNECT_TIMEOUT_MS", "2000")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // Inherit environment so the server can see DATABASE_URL from .env (loaded by the server)
        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                // Landlord may be down in CI; a 503 still means the server is up
                if resp.status() == ReqwestStatus::OK
                    || resp.status() == ReqwestStatus::SERVICE_UNAVAILABLE
                {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

// In-process router over the in-memory collaborators from `testing`

pub struct Harness {
    pub router: Router,
    pub directory: Arc<MockDirectory>,
    pub factory: Arc<MockFactory>,
    pub cache: Arc<TenantCache<MockHandle>>,
    pub landlord: MockHandle,
}

/// Full router over the given tenants; handle id 0 is the landlord
pub fn harness(tenants: &[&str]) -> Harness {
    let directory = Arc::new(MockDirectory::with_tenants(tenants));
    let factory = Arc::new(MockFactory::new());
    let cache = Arc::new(TenantCache::<MockHandle>::new(
        CacheConfig::default(),
        directory.clone(),
        factory.clone(),
    ));
    let landlord = MockHandle::new(0);

    let resolver = TenantResolver::new(cache.clone(), landlord.clone(), ResolutionConfig::default());
    let router = app(AppState::new(resolver), false);

    Harness {
        router,
        directory,
        factory,
        cache,
        landlord,
    }
}

impl Harness {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }
}
