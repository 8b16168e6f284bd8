//! Raw connector capability.
//!
//! The router never speaks a wire protocol. Everything it needs from a live
//! connection goes through this trait, implemented outside the crate by a
//! MySQL driver adapter (or by a scripted connector in tests).

use std::time::Duration;

use thiserror::Error;

use crate::topology::Endpoint;

/// Transport-level failure reported by a connector.
///
/// Absorbed by the candidate loop; only surfaced inside an exhaustion report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConnectorError {
    /// Driver error code, when the driver produced one.
    pub code: Option<u32>,
    pub message: String,
}

impl ConnectorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: u32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

/// Connect/ping/select/close primitives over one kind of connection.
pub trait Connector {
    /// The live connection type handed back to callers.
    type Conn;

    /// Open a connection, bounded by `timeout`.
    fn connect(
        &self,
        endpoint: &Endpoint,
        user: &str,
        credential: &str,
        timeout: Duration,
    ) -> Result<Self::Conn, ConnectorError>;

    /// Liveness check on an idle connection.
    fn ping(&self, conn: &mut Self::Conn) -> bool;

    /// Switch the default database. Returns false on failure.
    fn select_db(&self, conn: &mut Self::Conn, database: &str) -> bool;

    /// Close the connection. Failure is non-fatal for callers.
    fn close(&self, conn: Self::Conn) -> bool;

    /// Normalize session state (character set, sql mode, ...). Best effort.
    fn set_session_options(&self, _conn: &mut Self::Conn) -> Result<(), ConnectorError> {
        Ok(())
    }
}
