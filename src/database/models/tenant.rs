use serde::Serialize;
use sqlx::FromRow;

/// Tenant metadata as stored in the landlord `tenants` table.
///
/// Fetched by the directory on a cache miss and never mutated afterwards.
/// The database password is kept out of `Debug` output and serialization.
#[derive(Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct TenantRecord {
    #[sqlx(rename = "subdomain")]
    pub identifier: String,
    pub name: String,
    #[sqlx(rename = "database_name")]
    pub database: String,
    #[sqlx(rename = "db_username")]
    pub username: String,
    #[sqlx(rename = "db_password")]
    #[serde(skip_serializing)]
    pub password: String,
}

impl TenantRecord {
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            database: database.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for TenantRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantRecord")
            .field("identifier", &self.identifier)
            .field("name", &self.name)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
