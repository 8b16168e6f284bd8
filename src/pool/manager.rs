//! LRU-bounded connection pool.
//!
//! # Responsibilities
//! - Map pool keys to live handles
//! - Re-check liveness (ping) and database selection on reuse
//! - Bound open connections, evicting least-recently-used keys first
//!
//! # Design Decisions
//! - One handle per key; the router borrows, the pool owns
//! - A handle that fails its ping or reselect is closed and forgotten,
//!   the caller proceeds as if it never existed
//! - The entry being installed is never the one evicted
//! - Persistent pools never evict

use lru::LruCache;

use crate::observability::metrics;
use crate::pool::{ConnectionHandle, Connector, PoolKey};

/// Pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolConfig {
    /// Maximum open connections. 0 means unbounded.
    pub max_connections: usize,
    /// Keep every connection open; disables eviction.
    pub persistent: bool,
}

/// Key → handle map in recency order.
pub struct ConnectionPool<T> {
    entries: LruCache<PoolKey, ConnectionHandle<T>>,
    config: PoolConfig,
}

impl<T> ConnectionPool<T> {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            entries: LruCache::unbounded(),
            config,
        }
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Reuse the handle for `key` if it is still alive.
    ///
    /// When `database` names a different database than the handle has
    /// selected, it is reselected first. Any failure evicts the handle.
    pub fn acquire<C>(
        &mut self,
        connector: &C,
        key: &PoolKey,
        database: Option<&str>,
    ) -> Option<&mut ConnectionHandle<T>>
    where
        C: Connector<Conn = T>,
    {
        let handle = self.take_live(connector, key, database)?;
        Some(self.reinsert(handle))
    }

    /// Reuse the handle for `key`, or install the one produced by `connect`.
    pub fn checkout<C, E>(
        &mut self,
        connector: &C,
        key: &PoolKey,
        database: Option<&str>,
        connect: impl FnOnce() -> Result<ConnectionHandle<T>, E>,
    ) -> Result<&mut ConnectionHandle<T>, E>
    where
        C: Connector<Conn = T>,
    {
        match self.take_live(connector, key, database) {
            Some(handle) => {
                tracing::debug!(key = %key, endpoint = %handle.endpoint(), uses = handle.uses(), "Reusing pooled connection");
                Ok(self.reinsert(handle))
            }
            None => {
                let handle = connect()?;
                Ok(self.install(connector, handle))
            }
        }
    }

    /// Pop the handle for `key` and validate it. Stale handles are closed.
    fn take_live<C>(&mut self, connector: &C, key: &PoolKey, database: Option<&str>) -> Option<ConnectionHandle<T>>
    where
        C: Connector<Conn = T>,
    {
        let mut handle = self.entries.pop(key)?;
        let stale = if !connector.ping(handle.conn_mut()) {
            Some("ping failed")
        } else {
            match database {
                Some(db) if db != handle.database() => {
                    if connector.select_db(handle.conn_mut(), db) {
                        tracing::debug!(key = %key, database = %db, "Reselected database on reused connection");
                        handle.set_database(db);
                        None
                    } else {
                        Some("reselect failed")
                    }
                }
                _ => None,
            }
        };

        if let Some(reason) = stale {
            tracing::warn!(key = %key, endpoint = %handle.endpoint(), reason = reason, "Dropping stale connection");
            if !connector.close(handle.into_conn()) {
                tracing::debug!(key = %key, "Close failed, forgetting connection anyway");
            }
            metrics::record_eviction(reason);
            return None;
        }

        handle.touch();
        Some(handle)
    }

    fn reinsert(&mut self, handle: ConnectionHandle<T>) -> &mut ConnectionHandle<T> {
        let key = handle.key().clone();
        self.entries.get_or_insert_mut(key, || handle)
    }

    /// Install a freshly connected handle as most-recently-used, evicting
    /// older keys so the pool stays within `max_connections`.
    pub fn install<C>(&mut self, connector: &C, mut handle: ConnectionHandle<T>) -> &mut ConnectionHandle<T>
    where
        C: Connector<Conn = T>,
    {
        let key = handle.key().clone();
        if let Some(previous) = self.entries.pop(&key) {
            connector.close(previous.into_conn());
        }

        if !self.config.persistent && self.config.max_connections > 0 {
            while self.entries.len() >= self.config.max_connections {
                let Some((oldest, old)) = self.entries.pop_lru() else {
                    break;
                };
                tracing::debug!(key = %oldest, endpoint = %old.endpoint(), "Evicting least recently used connection");
                if !connector.close(old.into_conn()) {
                    tracing::debug!(key = %oldest, "Close failed during eviction");
                }
                metrics::record_eviction("lru");
            }
        }

        handle.touch();
        tracing::debug!(key = %key, endpoint = %handle.endpoint(), open = self.entries.len() + 1, "Installed connection");
        self.reinsert(handle)
    }

    /// Close and forget the handle for `key`. Close failures are ignored.
    pub fn evict<C>(&mut self, connector: &C, key: &PoolKey, reason: &'static str) -> bool
    where
        C: Connector<Conn = T>,
    {
        match self.entries.pop(key) {
            Some(handle) => {
                if !connector.close(handle.into_conn()) {
                    tracing::debug!(key = %key, "Close failed, forgetting connection anyway");
                }
                metrics::record_eviction(reason);
                true
            }
            None => false,
        }
    }

    /// Close every handle.
    pub fn clear<C>(&mut self, connector: &C)
    where
        C: Connector<Conn = T>,
    {
        while let Some((_, handle)) = self.entries.pop_lru() {
            connector.close(handle.into_conn());
            metrics::record_eviction("disconnect");
        }
    }

    /// Handle for `key` without touching recency.
    pub fn peek(&self, key: &PoolKey) -> Option<&ConnectionHandle<T>> {
        self.entries.peek(key)
    }

    pub fn peek_mut(&mut self, key: &PoolKey) -> Option<&mut ConnectionHandle<T>> {
        self.entries.peek_mut(key)
    }

    pub fn contains(&self, key: &PoolKey) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<PoolKey> {
        self.entries.iter().rev().map(|(k, _)| k.clone()).collect()
    }
}

impl<T> std::fmt::Debug for ConnectionPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ConnectorError;
    use crate::topology::Endpoint;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeConnector {
        dead: RefCell<HashSet<u32>>,
        refuse_select: bool,
        closed: RefCell<Vec<u32>>,
    }

    impl Connector for FakeConnector {
        type Conn = u32;

        fn connect(&self, _: &Endpoint, _: &str, _: &str, _: Duration) -> Result<u32, ConnectorError> {
            Ok(0)
        }

        fn ping(&self, conn: &mut u32) -> bool {
            !self.dead.borrow().contains(conn)
        }

        fn select_db(&self, _: &mut u32, _: &str) -> bool {
            !self.refuse_select
        }

        fn close(&self, conn: u32) -> bool {
            self.closed.borrow_mut().push(conn);
            true
        }
    }

    fn handle(dataset: &str, id: u32) -> ConnectionHandle<u32> {
        ConnectionHandle::new(PoolKey::read(dataset), id, "main", Endpoint::new("db1", 3306))
    }

    #[test]
    fn test_lru_bound() {
        let connector = FakeConnector::default();
        let mut pool = ConnectionPool::new(PoolConfig {
            max_connections: 2,
            persistent: false,
        });

        pool.install(&connector, handle("a", 1));
        pool.install(&connector, handle("b", 2));
        pool.install(&connector, handle("c", 3));

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.keys(), vec![PoolKey::read("b"), PoolKey::read("c")]);
        assert_eq!(*connector.closed.borrow(), vec![1]);
    }

    #[test]
    fn test_reuse_refreshes_recency() {
        let connector = FakeConnector::default();
        let mut pool = ConnectionPool::new(PoolConfig {
            max_connections: 2,
            persistent: false,
        });

        pool.install(&connector, handle("a", 1));
        pool.install(&connector, handle("b", 2));
        assert!(pool.acquire(&connector, &PoolKey::read("a"), None).is_some());
        pool.install(&connector, handle("c", 3));

        // "b" was the least recently used.
        assert_eq!(pool.keys(), vec![PoolKey::read("a"), PoolKey::read("c")]);
    }

    #[test]
    fn test_single_slot_keeps_new_entry() {
        let connector = FakeConnector::default();
        let mut pool = ConnectionPool::new(PoolConfig {
            max_connections: 1,
            persistent: false,
        });

        pool.install(&connector, handle("a", 1));
        let installed = pool.install(&connector, handle("b", 2));
        assert_eq!(*installed.conn(), 2);
        assert_eq!(pool.keys(), vec![PoolKey::read("b")]);
    }

    #[test]
    fn test_persistent_never_evicts() {
        let connector = FakeConnector::default();
        let mut pool = ConnectionPool::new(PoolConfig {
            max_connections: 1,
            persistent: true,
        });

        pool.install(&connector, handle("a", 1));
        pool.install(&connector, handle("b", 2));
        assert_eq!(pool.len(), 2);
        assert!(connector.closed.borrow().is_empty());
    }

    #[test]
    fn test_reinstall_same_key_closes_previous() {
        let connector = FakeConnector::default();
        let mut pool = ConnectionPool::new(PoolConfig::default());

        pool.install(&connector, handle("a", 1));
        pool.install(&connector, handle("a", 2));
        assert_eq!(pool.len(), 1);
        assert_eq!(*connector.closed.borrow(), vec![1]);
    }

    #[test]
    fn test_dead_handle_is_evicted() {
        let connector = FakeConnector::default();
        let mut pool = ConnectionPool::new(PoolConfig::default());
        pool.install(&connector, handle("a", 1));
        connector.dead.borrow_mut().insert(1);

        assert!(pool.acquire(&connector, &PoolKey::read("a"), None).is_none());
        assert!(pool.is_empty());
        assert_eq!(*connector.closed.borrow(), vec![1]);
    }

    #[test]
    fn test_reselect_on_reuse() {
        let connector = FakeConnector::default();
        let mut pool = ConnectionPool::new(PoolConfig::default());
        pool.install(&connector, handle("a", 1));

        let reused = pool.acquire(&connector, &PoolKey::read("a"), Some("shard_2")).unwrap();
        assert_eq!(reused.database(), "shard_2");
        assert_eq!(reused.uses(), 2);
    }

    #[test]
    fn test_failed_reselect_evicts() {
        let connector = FakeConnector {
            refuse_select: true,
            ..Default::default()
        };
        let mut pool = ConnectionPool::new(PoolConfig::default());
        pool.install(&connector, handle("a", 1));

        // Same database: no reselect needed.
        assert!(pool.acquire(&connector, &PoolKey::read("a"), Some("main")).is_some());
        // Different database: reselect fails, handle dropped.
        assert!(pool.acquire(&connector, &PoolKey::read("a"), Some("other")).is_none());
        assert!(!pool.contains(&PoolKey::read("a")));
    }

    #[test]
    fn test_checkout_prefers_live_handle() {
        let connector = FakeConnector::default();
        let mut pool = ConnectionPool::new(PoolConfig::default());
        pool.install(&connector, handle("a", 1));

        let reused = pool
            .checkout(&connector, &PoolKey::read("a"), None, || -> Result<_, ()> {
                panic!("live handle must be reused")
            })
            .unwrap();
        assert_eq!(*reused.conn(), 1);

        connector.dead.borrow_mut().insert(1);
        let fresh = pool
            .checkout(&connector, &PoolKey::read("a"), None, || Ok::<_, ()>(handle("a", 9)))
            .unwrap();
        assert_eq!(*fresh.conn(), 9);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_checkout_propagates_connect_error() {
        let connector = FakeConnector::default();
        let mut pool: ConnectionPool<u32> = ConnectionPool::new(PoolConfig::default());
        let err = pool
            .checkout(&connector, &PoolKey::write("a"), None, || Err("exhausted"))
            .unwrap_err();
        assert_eq!(err, "exhausted");
        assert!(pool.is_empty());
    }

    #[test]
    fn test_clear() {
        let connector = FakeConnector::default();
        let mut pool = ConnectionPool::new(PoolConfig::default());
        pool.install(&connector, handle("a", 1));
        pool.install(&connector, handle("b", 2));

        pool.clear(&connector);
        assert!(pool.is_empty());
        assert_eq!(connector.closed.borrow().len(), 2);
    }
}
