use crate::database::factory::ConnectionHandle;

/// The database a repository should talk to.
///
/// Repositories take one of these explicitly instead of an optional pool:
/// `Landlord` is the shared control-plane store, `Tenant` an isolated one.
#[derive(Clone, Debug)]
pub enum Store<H> {
    Landlord(H),
    Tenant(H),
}

impl<H: ConnectionHandle> Store<H> {
    pub fn handle(&self) -> &H {
        match self {
            Store::Landlord(handle) | Store::Tenant(handle) => handle,
        }
    }

    pub fn is_landlord(&self) -> bool {
        matches!(self, Store::Landlord(_))
    }
}
