pub mod extract;
pub mod resolve_tenant;
pub mod response;

pub use resolve_tenant::{
    optional_tenant, require_tenant, ResolutionMode, ResolveError, ResolvedContext,
    TenantResolver, LANDLORD_IDENTIFIER,
};
pub use response::{ApiResponse, ApiResult};
