//! In-memory collaborators for unit and integration tests (`test-util`
//! feature): a directory with a fixed tenant set, a factory that hands out
//! counted mock handles, and the handle itself.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::database::{
    ConnectionError, ConnectionFactory, ConnectionHandle, DirectoryError, TenantDirectory,
    TenantRecord,
};

pub fn tenant(identifier: &str) -> TenantRecord {
    TenantRecord::new(
        identifier,
        format!("Tenant {}", identifier),
        format!("tenant_{}", identifier),
        format!("{}_user", identifier),
        "secret",
    )
}

#[derive(Clone, Debug)]
pub struct MockHandle {
    pub id: usize,
    open: Arc<AtomicBool>,
    closes: Arc<AtomicUsize>,
    fail_close: Arc<AtomicBool>,
}

impl MockHandle {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            open: Arc::new(AtomicBool::new(true)),
            closes: Arc::new(AtomicUsize::new(0)),
            fail_close: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Simulate the driver dropping the connection underneath us
    pub fn break_connection(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn fail_on_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionHandle for MockHandle {
    fn is_usable(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.open.store(false, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(ConnectionError::Close("socket already gone".to_string()));
        }
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn ping(&self) -> Result<(), ConnectionError> {
        if self.is_usable() {
            Ok(())
        } else {
            Err(ConnectionError::Unreachable("closed".to_string()))
        }
    }
}

#[derive(Default)]
pub struct MockDirectory {
    tenants: HashMap<String, TenantRecord>,
    lookups: AtomicUsize,
    unavailable: AtomicBool,
}

impl MockDirectory {
    pub fn with_tenants(identifiers: &[&str]) -> Self {
        Self {
            tenants: identifiers
                .iter()
                .map(|id| (id.to_string(), tenant(id)))
                .collect(),
            ..Self::default()
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantDirectory for MockDirectory {
    async fn lookup(&self, identifier: &str) -> Result<TenantRecord, DirectoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable("connection refused".to_string()));
        }
        self.tenants
            .get(identifier)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(identifier.to_string()))
    }
}

#[derive(Default)]
pub struct MockFactory {
    delay: Duration,
    connects: AtomicUsize,
    failing: Mutex<HashSet<String>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_for(&self, identifier: &str) {
        self.failing.lock().unwrap().insert(identifier.to_string());
    }

    pub fn recover(&self, identifier: &str) {
        self.failing.lock().unwrap().remove(identifier);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    type Handle = MockHandle;

    async fn connect(&self, tenant: &TenantRecord) -> Result<MockHandle, ConnectionError> {
        let id = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.lock().unwrap().contains(&tenant.identifier) {
            return Err(ConnectionError::Rejected(format!(
                "password authentication failed for user \"{}\"",
                tenant.username
            )));
        }
        Ok(MockHandle::new(id))
    }
}
