//! Server descriptors and the values derived from them.
//!
//! # Responsibilities
//! - Describe one physical database server (immutable once registered)
//! - Resolve the effective endpoint, timeout and lag threshold
//! - Merge explicit per-query overrides over a base descriptor

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Port used when a descriptor does not name one.
pub const DEFAULT_PORT: u16 = 3306;

/// Connect timeout used when a descriptor does not name one.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(200);

/// Read or write intent driving server-pool selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
}

impl Operation {
    /// Parse an operation name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Self::Write)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One physical database server.
#[derive(Clone, PartialEq)]
pub struct ServerDescriptor {
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub credential: String,
    pub database: String,
    pub connect_timeout: Option<Duration>,
    /// Replication lag (seconds) above which this server counts as behind.
    pub lag_threshold: Option<f64>,
}

impl ServerDescriptor {
    /// Create a descriptor with no port, timeout or lag threshold of its own.
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        credential: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: None,
            user: user.into(),
            credential: credential.into(),
            database: database.into(),
            connect_timeout: None,
            lag_threshold: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_lag_threshold(mut self, seconds: f64) -> Self {
        self.lag_threshold = Some(seconds);
        self
    }

    /// Endpoint with the port defaulted.
    pub fn endpoint(&self, default_port: u16) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port.unwrap_or(default_port))
    }

    /// Connect timeout with the global default applied.
    pub fn timeout(&self, default: Duration) -> Duration {
        match self.connect_timeout {
            Some(t) if !t.is_zero() => t,
            _ => default,
        }
    }

    /// Lag threshold with the global default applied. `None` disables lag checks.
    pub fn effective_lag_threshold(&self, default: Option<f64>) -> Option<f64> {
        self.lag_threshold.or(default)
    }
}

impl fmt::Debug for ServerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("credential", &"<redacted>")
            .field("database", &self.database)
            .field("connect_timeout", &self.connect_timeout)
            .field("lag_threshold", &self.lag_threshold)
            .finish()
    }
}

/// Per-query replacement values, merged field by field over a descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptorOverride {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub credential: Option<String>,
    pub database: Option<String>,
    pub connect_timeout: Option<Duration>,
    pub lag_threshold: Option<f64>,
}

impl DescriptorOverride {
    pub fn database(name: impl Into<String>) -> Self {
        Self {
            database: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Produce the effective descriptor for one candidate.
    pub fn apply(&self, base: &ServerDescriptor) -> ServerDescriptor {
        ServerDescriptor {
            host: self.host.clone().unwrap_or_else(|| base.host.clone()),
            port: self.port.or(base.port),
            user: self.user.clone().unwrap_or_else(|| base.user.clone()),
            credential: self
                .credential
                .clone()
                .unwrap_or_else(|| base.credential.clone()),
            database: self
                .database
                .clone()
                .unwrap_or_else(|| base.database.clone()),
            connect_timeout: self.connect_timeout.or(base.connect_timeout),
            lag_threshold: self.lag_threshold.or(base.lag_threshold),
        }
    }
}
