use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::database::directory::{DirectoryError, TenantDirectory};
use crate::database::factory::{ConnectionError, ConnectionFactory, ConnectionHandle};
use crate::database::models::TenantRecord;

/// Errors from TenantCache. Cloneable so every waiter on a shared
/// connection attempt receives the same outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    #[error("Tenant directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("Connection to tenant '{identifier}' failed: {source}")]
    Connection {
        identifier: String,
        #[source]
        source: ConnectionError,
    },
}

impl From<DirectoryError> for CacheError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound(identifier) => CacheError::TenantNotFound(identifier),
            DirectoryError::Unavailable(msg) => CacheError::DirectoryUnavailable(msg),
        }
    }
}

/// A cached handle together with the tenant it was opened for
#[derive(Clone)]
pub struct TenantConnection<H> {
    pub tenant: Arc<TenantRecord>,
    pub handle: H,
}

/// Point-in-time view of one cache entry
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub identifier: String,
    pub database: String,
    pub idle_ms: u64,
    pub usable: bool,
}

struct CacheEntry<H> {
    connection: TenantConnection<H>,
    last_used_at: Instant,
}

impl<H: ConnectionHandle> CacheEntry<H> {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_used_at) > ttl
    }

    fn is_evictable(&self, now: Instant, ttl: Duration) -> bool {
        self.is_expired(now, ttl) || !self.connection.handle.is_usable()
    }
}

type PendingConnect<H> = Shared<BoxFuture<'static, Result<TenantConnection<H>, CacheError>>>;

struct CacheState<H> {
    entries: HashMap<String, CacheEntry<H>>,
    /// In-flight connection attempts, at most one per identifier
    pending: HashMap<String, PendingConnect<H>>,
}

struct CacheInner<H: ConnectionHandle> {
    config: CacheConfig,
    directory: Arc<dyn TenantDirectory>,
    factory: Arc<dyn ConnectionFactory<Handle = H>>,
    state: Mutex<CacheState<H>>,
}

/// Bounded cache of live per-tenant connections.
///
/// Entries are created lazily on first use, refreshed on every hit, and
/// removed by TTL sweep, LRU capacity eviction, or explicit close. Concurrent
/// callers for the same cold identifier share a single connection attempt.
///
/// One instance is built per process and shared by reference; it owns a
/// background sweep task that runs until [`TenantCache::close_all`] is called
/// or the cache is dropped.
pub struct TenantCache<H: ConnectionHandle> {
    inner: Arc<CacheInner<H>>,
    shutdown: watch::Sender<bool>,
}

impl<H: ConnectionHandle> TenantCache<H> {
    /// Create the cache and start its sweep task. Must be called from within a tokio runtime.
    pub fn new(
        config: CacheConfig,
        directory: Arc<dyn TenantDirectory>,
        factory: Arc<dyn ConnectionFactory<Handle = H>>,
    ) -> Self {
        let sweep_interval = config.sweep_interval().max(Duration::from_millis(1));
        let inner = Arc::new(CacheInner {
            config,
            directory,
            factory,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                pending: HashMap::new(),
            }),
        });

        let (shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(sweep_loop(Arc::downgrade(&inner), sweep_interval, shutdown_rx));

        Self { inner, shutdown }
    }

    /// Get a live handle for `identifier`, connecting on a miss
    pub async fn get_or_create(&self, identifier: &str) -> Result<H, CacheError> {
        self.checkout(identifier).await.map(|connection| connection.handle)
    }

    /// Like [`get_or_create`](Self::get_or_create), also returning the tenant record
    pub async fn checkout(&self, identifier: &str) -> Result<TenantConnection<H>, CacheError> {
        let (pending, stale) = {
            let mut state = self.inner.state.lock().await;

            if let Some(entry) = state.entries.get_mut(identifier) {
                if entry.connection.handle.is_usable() {
                    entry.last_used_at = Instant::now();
                    debug!("Reusing cached connection for tenant '{}'", identifier);
                    return Ok(entry.connection.clone());
                }
            }

            let stale = state.entries.remove(identifier);
            let pending = match state.pending.get(identifier) {
                Some(pending) => pending.clone(),
                None => {
                    let pending = self.inner.spawn_connect(identifier).boxed().shared();
                    state.pending.insert(identifier.to_string(), pending.clone());
                    pending
                }
            };
            (pending, stale)
        };

        if let Some(stale) = stale {
            debug!("Discarded stale connection handle for tenant '{}'", identifier);
            self.inner.close_entries(vec![(identifier.to_string(), stale)]).await;
        }

        pending.await
    }

    /// Close and forget the connection for `identifier`. No-op when absent.
    pub async fn close(&self, identifier: &str) -> bool {
        let removed = self.inner.state.lock().await.entries.remove(identifier);
        match removed {
            Some(entry) => {
                self.inner.close_entries(vec![(identifier.to_string(), entry)]).await;
                true
            }
            None => false,
        }
    }

    /// Stop the sweeper, then close and remove every entry. Used at shutdown.
    pub async fn close_all(&self) -> usize {
        self.shutdown.send_replace(true);

        let drained: Vec<_> = self.inner.state.lock().await.entries.drain().collect();
        let count = drained.len();
        self.inner.close_entries(drained).await;

        info!("Closed {} cached tenant connection(s)", count);
        count
    }

    pub async fn active_count(&self) -> usize {
        self.inner.state.lock().await.entries.len()
    }

    pub fn max_connections(&self) -> usize {
        self.inner.config.max_connections
    }

    /// Run one sweep cycle now; returns the number of entries removed
    pub async fn sweep(&self) -> usize {
        self.inner.sweep().await
    }

    pub async fn snapshot(&self) -> Vec<ConnectionSnapshot> {
        let now = Instant::now();
        let state = self.inner.state.lock().await;
        let mut snapshot: Vec<ConnectionSnapshot> = state
            .entries
            .iter()
            .map(|(identifier, entry)| ConnectionSnapshot {
                identifier: identifier.clone(),
                database: entry.connection.tenant.database.clone(),
                idle_ms: u64::try_from(now.saturating_duration_since(entry.last_used_at).as_millis())
                    .unwrap_or(u64::MAX),
                usable: entry.connection.handle.is_usable(),
            })
            .collect();
        snapshot.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        snapshot
    }
}

impl<H: ConnectionHandle> CacheInner<H> {
    /// Start the cold path on its own task so it completes (and leaves
    /// `pending`) even when every waiter has gone away.
    fn spawn_connect(
        self: &Arc<Self>,
        identifier: &str,
    ) -> impl Future<Output = Result<TenantConnection<H>, CacheError>> + Send + 'static {
        let cache = Arc::downgrade(self);
        let identifier = identifier.to_string();
        let task = tokio::spawn(Self::connect(
            cache.clone(),
            Arc::clone(&self.directory),
            Arc::clone(&self.factory),
            identifier.clone(),
        ));

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    // The task never reached finish_connect
                    warn!("Connect task for tenant '{}' failed: {}", identifier, e);
                    if let Some(inner) = cache.upgrade() {
                        inner.state.lock().await.pending.remove(&identifier);
                    }
                    Err(CacheError::Connection {
                        identifier,
                        source: ConnectionError::Unreachable(format!("connect task failed: {}", e)),
                    })
                }
            }
        }
    }

    /// Cold path: directory lookup, connect, insert. Runs once per identifier
    /// at a time; every concurrent caller awaits the same shared result.
    async fn connect(
        cache: Weak<CacheInner<H>>,
        directory: Arc<dyn TenantDirectory>,
        factory: Arc<dyn ConnectionFactory<Handle = H>>,
        identifier: String,
    ) -> Result<TenantConnection<H>, CacheError> {
        let result = Self::open(directory.as_ref(), factory.as_ref(), &identifier).await;

        match cache.upgrade() {
            Some(inner) => inner.finish_connect(&identifier, result).await,
            None => result,
        }
    }

    async fn open(
        directory: &dyn TenantDirectory,
        factory: &dyn ConnectionFactory<Handle = H>,
        identifier: &str,
    ) -> Result<TenantConnection<H>, CacheError> {
        let tenant = directory.lookup(identifier).await?;

        let handle = factory
            .connect(&tenant)
            .await
            .map_err(|source| CacheError::Connection {
                identifier: identifier.to_string(),
                source,
            })?;

        Ok(TenantConnection {
            tenant: Arc::new(tenant),
            handle,
        })
    }

    async fn finish_connect(
        &self,
        identifier: &str,
        result: Result<TenantConnection<H>, CacheError>,
    ) -> Result<TenantConnection<H>, CacheError> {
        let evicted = {
            let mut state = self.state.lock().await;
            state.pending.remove(identifier);

            match &result {
                Ok(connection) => {
                    let now = Instant::now();
                    let previous = state.entries.insert(
                        identifier.to_string(),
                        CacheEntry {
                            connection: connection.clone(),
                            last_used_at: now,
                        },
                    );
                    let mut evicted = self.evict_over_capacity(&mut state, identifier, now);
                    if let Some(previous) = previous {
                        evicted.push((identifier.to_string(), previous));
                    }
                    evicted
                }
                Err(_) => Vec::new(),
            }
        };

        if !evicted.is_empty() {
            debug!("Capacity eviction removed {} tenant connection(s)", evicted.len());
            self.close_entries(evicted).await;
        }

        result
    }

    /// Remove least-recently-used entries once the bound is exceeded.
    ///
    /// The oldest `eviction_batch` entries are examined: the overflow is
    /// always removed, and any other examined entry that is already expired
    /// or unusable goes with it. `keep` (the entry just inserted) is never
    /// a candidate.
    fn evict_over_capacity(
        &self,
        state: &mut CacheState<H>,
        keep: &str,
        now: Instant,
    ) -> Vec<(String, CacheEntry<H>)> {
        let overflow = state.entries.len().saturating_sub(self.config.max_connections);
        if overflow == 0 {
            return Vec::new();
        }

        let ttl = self.config.ttl();
        let mut candidates: Vec<(String, Instant, bool)> = state
            .entries
            .iter()
            .filter(|(identifier, _)| identifier.as_str() != keep)
            .map(|(identifier, entry)| {
                (identifier.clone(), entry.last_used_at, entry.is_evictable(now, ttl))
            })
            .collect();
        candidates.sort_by_key(|(_, last_used_at, _)| *last_used_at);

        let batch = self.config.eviction_batch.max(overflow);
        candidates
            .into_iter()
            .take(batch)
            .enumerate()
            .filter(|(position, (_, _, evictable))| *position < overflow || *evictable)
            .filter_map(|(_, (identifier, _, _))| {
                state.entries.remove(&identifier).map(|entry| (identifier, entry))
            })
            .collect()
    }

    async fn sweep(&self) -> usize {
        let now = Instant::now();
        let ttl = self.config.ttl();

        let removed: Vec<(String, CacheEntry<H>)> = {
            let mut state = self.state.lock().await;
            let expired: Vec<String> = state
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_evictable(now, ttl))
                .map(|(identifier, _)| identifier.clone())
                .collect();
            expired
                .into_iter()
                .filter_map(|identifier| {
                    state.entries.remove(&identifier).map(|entry| (identifier, entry))
                })
                .collect()
        };

        let count = removed.len();
        self.close_entries(removed).await;
        count
    }

    /// Close handles outside the state lock. Failures are logged per entry.
    async fn close_entries(&self, entries: Vec<(String, CacheEntry<H>)>) {
        let timeout = self.config.close_timeout();
        let closes = entries.into_iter().map(|(identifier, entry)| async move {
            match tokio::time::timeout(timeout, entry.connection.handle.close()).await {
                Ok(Ok(())) => info!("Closed database pool for tenant '{}'", identifier),
                Ok(Err(e)) => warn!("Failed to close connection for tenant '{}': {}", identifier, e),
                Err(_) => warn!(
                    "Timed out closing connection for tenant '{}' after {:?}",
                    identifier, timeout
                ),
            }
        });
        futures::future::join_all(closes).await;
    }
}

async fn sweep_loop<H: ConnectionHandle>(
    cache: Weak<CacheInner<H>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let Some(inner) = cache.upgrade() else {
            break;
        };
        let removed = inner.sweep().await;
        if removed > 0 {
            info!("Sweep removed {} idle or broken tenant connection(s)", removed);
        }
    }

    debug!("Tenant cache sweeper stopped");
}
