use anyhow::Context;
use clap::Parser;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use tenant_gate::app::{app, AppState};
use tenant_gate::config::AppConfig;
use tenant_gate::database::{PgConnectionFactory, PgTenantDirectory, TenantCache};
use tenant_gate::middleware::TenantResolver;

#[derive(Parser)]
#[command(name = "tenant-gate")]
#[command(about = "Multi-tenant API gateway with per-tenant connection caching")]
#[command(version)]
struct Args {
    #[arg(long, help = "Port to listen on (overrides TENANT_GATE_PORT / PORT)")]
    port: Option<u16>,

    #[arg(long, env = "TENANT_GATE_BIND", default_value = "0.0.0.0", help = "Address to bind")]
    bind: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, TENANT_CACHE_*, etc.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let config = AppConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Tenant Gate in {:?} mode", config.environment);

    // Lazy so the process starts (and /health reports) while the landlord is down
    let landlord = PgPoolOptions::new()
        .max_connections(config.database.landlord_max_connections)
        .acquire_timeout(config.factory.connect_timeout())
        .connect_lazy(&config.database.landlord_url)
        .context("invalid landlord DATABASE_URL")?;

    let directory = Arc::new(PgTenantDirectory::new(landlord.clone()));
    let factory = Arc::new(PgConnectionFactory::new(
        &config.database.landlord_url,
        &config.factory,
    )?);
    let cache = Arc::new(TenantCache::<PgPool>::new(
        config.cache.clone(),
        directory,
        factory,
    ));

    let resolver = TenantResolver::new(cache.clone(), landlord.clone(), config.resolution.clone());
    let router = app(AppState::new(resolver), config.api.enable_request_logging);

    let port = args.port.unwrap_or(config.api.port);
    let bind_addr = format!("{}:{}", args.bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Tenant Gate listening on http://{}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Close cached tenant sockets before exit
    let closed = cache.close_all().await;
    landlord.close().await;
    tracing::info!("Shutdown complete ({} tenant connection(s) closed)", closed);

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
