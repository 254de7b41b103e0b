mod common;

use anyhow::Result;
use common::ensure_server;
use serde_json::Value;

#[tokio::test]
async fn root_describes_the_api() -> Result<()> {
    let server = ensure_server().await?;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{}/", server.base_url)).send().await?;
    assert!(resp.status().is_success());

    let body: Value = resp.json().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["name"], "Tenant Gate");
    Ok(())
}

#[tokio::test]
async fn health_reports_tenant_cache_occupancy() -> Result<()> {
    let server = ensure_server().await?;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{}/health", server.base_url)).send().await?;
    let status = resp.status().as_u16();
    assert!(status == 200 || status == 503, "unexpected status {}", status);

    // Nothing has resolved a tenant yet in this process
    let body: Value = resp.json().await?;
    assert_eq!(body["data"]["tenant_connections"]["active"], 0);
    assert!(body["data"]["tenant_connections"]["max"].as_u64().unwrap_or(0) >= 1);
    Ok(())
}
