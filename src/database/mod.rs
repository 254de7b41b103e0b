pub mod cache;
pub mod directory;
pub mod factory;
pub mod models;
pub mod store;

pub use cache::{CacheError, ConnectionSnapshot, TenantCache, TenantConnection};
pub use directory::{DirectoryError, PgTenantDirectory, TenantDirectory};
pub use factory::{ConnectionError, ConnectionFactory, ConnectionHandle, PgConnectionFactory};
pub use models::TenantRecord;
pub use store::Store;
