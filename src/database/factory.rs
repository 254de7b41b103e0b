use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::FactoryConfig;
use crate::database::models::TenantRecord;

/// Errors from establishing or using a tenant connection
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Credentials rejected: {0}")]
    Rejected(String),

    #[error("Database unreachable: {0}")]
    Unreachable(String),

    #[error("Invalid tenant database name: {0}")]
    InvalidDatabaseName(String),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Failed to close connection: {0}")]
    Close(String),
}

impl ConnectionError {
    fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            // 28000 invalid_authorization_specification, 28P01 invalid_password
            sqlx::Error::Database(db)
                if matches!(db.code().as_deref(), Some("28000") | Some("28P01")) =>
            {
                ConnectionError::Rejected(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut => ConnectionError::Unreachable("pool timed out".to_string()),
            _ => ConnectionError::Unreachable(err.to_string()),
        }
    }
}

/// A reusable live link to one database.
///
/// Handles are cheap to clone; clones share the underlying connection.
#[async_trait]
pub trait ConnectionHandle: Clone + Send + Sync + 'static {
    /// Whether the handle can still serve queries. Must not perform I/O.
    fn is_usable(&self) -> bool;

    async fn close(&self) -> Result<(), ConnectionError>;

    /// Round-trip check, used by health endpoints only.
    async fn ping(&self) -> Result<(), ConnectionError>;
}

#[async_trait]
impl ConnectionHandle for PgPool {
    fn is_usable(&self) -> bool {
        !self.is_closed()
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        // Waits for checked-out connections to be returned before closing them
        PgPool::close(self).await;
        Ok(())
    }

    async fn ping(&self) -> Result<(), ConnectionError> {
        sqlx::query("SELECT 1")
            .execute(self)
            .await
            .map(|_| ())
            .map_err(ConnectionError::from_sqlx)
    }
}

/// Opens connections to isolated tenant databases
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    type Handle: ConnectionHandle;

    async fn connect(&self, tenant: &TenantRecord) -> Result<Self::Handle, ConnectionError>;
}

/// Builds a small `PgPool` per tenant by rewriting the landlord URL
pub struct PgConnectionFactory {
    base_url: url::Url,
    connect_timeout: Duration,
    idle_timeout: Duration,
    pool_size: u32,
}

impl PgConnectionFactory {
    pub fn new(base_url: &str, config: &FactoryConfig) -> Result<Self, ConnectionError> {
        let base_url = url::Url::parse(base_url).map_err(|_| ConnectionError::InvalidDatabaseUrl)?;
        Ok(Self {
            base_url,
            connect_timeout: config.connect_timeout(),
            idle_timeout: config.idle_timeout(),
            pool_size: config.tenant_pool_size,
        })
    }

    /// Swap database name and credentials into the landlord URL, keeping host and query
    fn build_connection_string(&self, tenant: &TenantRecord) -> Result<String, ConnectionError> {
        if !Self::is_valid_db_name(&tenant.database) {
            return Err(ConnectionError::InvalidDatabaseName(tenant.database.clone()));
        }

        let mut url = self.base_url.clone();
        url.set_path(&format!("/{}", tenant.database));
        url.set_username(&tenant.username)
            .map_err(|_| ConnectionError::InvalidDatabaseUrl)?;
        url.set_password(Some(&tenant.password))
            .map_err(|_| ConnectionError::InvalidDatabaseUrl)?;
        Ok(url.into())
    }

    /// Database names are interpolated into a URL path, so only `[A-Za-z0-9_]` is accepted
    fn is_valid_db_name(name: &str) -> bool {
        !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    type Handle = PgPool;

    async fn connect(&self, tenant: &TenantRecord) -> Result<PgPool, ConnectionError> {
        let connection_string = self.build_connection_string(tenant)?;

        let attempt = PgPoolOptions::new()
            .max_connections(self.pool_size)
            .acquire_timeout(self.connect_timeout)
            .idle_timeout(Some(self.idle_timeout))
            .connect(&connection_string);

        // The driver's own acquire deadline races ours; both mean the same thing
        let pool = tokio::time::timeout(self.connect_timeout, attempt)
            .await
            .map_err(|_| ConnectionError::Timeout(self.connect_timeout))?
            .map_err(|e| match e {
                sqlx::Error::PoolTimedOut => ConnectionError::Timeout(self.connect_timeout),
                e => ConnectionError::from_sqlx(e),
            })?;

        info!("Created database pool for tenant '{}' ({})", tenant.identifier, tenant.database);
        Ok(pool)
    }
}
