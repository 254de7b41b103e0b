// handlers/mod.rs - Route handlers grouped by resolution tier
//
// system: no tenant context (/, /health)
// tenant: run behind the resolution middleware (/auth/tenant, /api/tenant)
// root:   administrative cache operations (/api/root/*)

pub mod root;
pub mod system;
pub mod tenant;

pub use system::{health, root};
pub use tenant::{tenant_context, tenant_show};
