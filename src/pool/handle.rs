//! Pool keys and the handles stored under them.

use std::fmt;
use std::time::Instant;

use serde::{Serialize, Serializer};

use crate::topology::{Endpoint, Operation};

/// Logical connection key: dataset plus operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub dataset: String,
    pub operation: Operation,
}

impl PoolKey {
    pub fn new(dataset: impl Into<String>, operation: Operation) -> Self {
        Self {
            dataset: dataset.into(),
            operation,
        }
    }

    pub fn read(dataset: impl Into<String>) -> Self {
        Self::new(dataset, Operation::Read)
    }

    pub fn write(dataset: impl Into<String>) -> Self {
        Self::new(dataset, Operation::Write)
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dataset, self.operation)
    }
}

impl Serialize for PoolKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A live connection owned by the pool.
pub struct ConnectionHandle<T> {
    key: PoolKey,
    conn: T,
    database: String,
    endpoint: Endpoint,
    uses: u64,
    connected_at: Instant,
}

impl<T> ConnectionHandle<T> {
    pub fn new(key: PoolKey, conn: T, database: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            key,
            conn,
            database: database.into(),
            endpoint,
            uses: 0,
            connected_at: Instant::now(),
        }
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    /// Database currently selected on the connection.
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// How many times the router has handed this connection out.
    pub fn uses(&self) -> u64 {
        self.uses
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    pub fn conn(&self) -> &T {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut T {
        &mut self.conn
    }

    pub(crate) fn set_database(&mut self, database: &str) {
        self.database = database.to_string();
    }

    pub(crate) fn touch(&mut self) {
        self.uses += 1;
    }

    pub(crate) fn into_conn(self) -> T {
        self.conn
    }
}

impl<T> fmt::Debug for ConnectionHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("key", &self.key)
            .field("endpoint", &self.endpoint)
            .field("database", &self.database)
            .field("uses", &self.uses)
            .field("age", &self.connected_at.elapsed())
            .finish()
    }
}
