//! Connection pooling subsystem.
//!
//! # Data Flow
//! ```text
//! Router computes PoolKey (dataset + operation)
//!     → manager.rs acquire: ping, reselect database, mark most recently used
//!     → on miss: router connects through connector.rs
//!     → manager.rs install: insert, evict least recently used keys
//! ```
//!
//! # Design Decisions
//! - The pool owns every live connection; callers borrow by key
//! - No internal locking: one pool per execution context
//! - Wire protocol stays behind the `Connector` trait

pub mod connector;
pub mod handle;
pub mod manager;

pub use connector::{Connector, ConnectorError};
pub use handle::{ConnectionHandle, PoolKey};
pub use manager::{ConnectionPool, PoolConfig};
