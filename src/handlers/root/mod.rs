// handlers/root/mod.rs - Administrative handlers (/api/root/*)
//
// These expose the tenant connection cache for health checks and operator
// intervention. Access control is expected in front of these routes.

pub mod connections; // GET /api/root/connections, DELETE /api/root/connections/:tenant
pub mod tenant_health; // GET /api/root/tenant/:name/health

pub use connections::{connection_close, connection_list};
pub use tenant_health::tenant_health;
