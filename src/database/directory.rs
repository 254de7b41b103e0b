use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use crate::database::models::TenantRecord;

/// Errors from a tenant directory lookup
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Tenant not found: {0}")]
    NotFound(String),

    /// The landlord store could not be queried at all
    #[error("Tenant directory unavailable: {0}")]
    Unavailable(String),
}

/// Authoritative identifier → tenant metadata mapping.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn lookup(&self, identifier: &str) -> Result<TenantRecord, DirectoryError>;
}

/// Directory backed by the landlord database's `tenants` table
#[derive(Clone)]
pub struct PgTenantDirectory {
    pool: PgPool,
}

impl PgTenantDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn lookup(&self, identifier: &str) -> Result<TenantRecord, DirectoryError> {
        let query = r#"
            SELECT subdomain, name, database_name, db_username, db_password
            FROM tenants
            WHERE subdomain = $1
            AND deleted_at IS NULL
        "#;

        let record = sqlx::query_as::<_, TenantRecord>(query)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database error looking up tenant '{}': {}", identifier, e);
                DirectoryError::Unavailable(e.to_string())
            })?;

        record.ok_or_else(|| DirectoryError::NotFound(identifier.to_string()))
    }
}
