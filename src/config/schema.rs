//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a database farm.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pool::{Connector, PoolConfig};
use crate::resilience::PassBackoff;
use crate::routing::{RouterConfig, DEFAULT_MIN_TRIES};
use crate::topology::{
    Operation, ServerDescriptor, Topology, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT,
};

/// Root configuration for a database farm.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FarmConfig {
    /// Pool sizing and candidate selection.
    pub router: RouterSection,

    /// TCP pre-check settings.
    pub probe: ProbeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Physical servers, one entry per (dataset, operation, priority, host).
    pub servers: Vec<ServerConfig>,

    /// Static table → dataset bindings.
    pub tables: BTreeMap<String, String>,
}

/// `[router]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterSection {
    /// Maximum open connections per router. 0 = unbounded.
    pub max_connections: usize,

    /// Keep every connection open (disables LRU eviction).
    pub persistent: bool,

    /// Minimum candidate-list length.
    pub min_tries: usize,

    pub default_port: u16,

    pub default_connect_timeout_ms: u64,

    /// Lag threshold for servers without their own. Absent = lag checks only where a server sets one.
    pub default_lag_threshold_secs: Option<f64>,

    /// Base delay between candidate passes. 0 = no delay.
    pub pass_backoff_base_ms: u64,

    pub pass_backoff_max_ms: u64,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            max_connections: 0,
            persistent: false,
            min_tries: DEFAULT_MIN_TRIES,
            default_port: DEFAULT_PORT,
            default_connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            default_lag_threshold_secs: None,
            pass_backoff_base_ms: 0,
            pass_backoff_max_ms: 1000,
        }
    }
}

/// `[probe]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub enabled: bool,

    /// How long a probe verdict is trusted.
    pub cache_ttl_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_ttl_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

/// One `[[servers]]` entry.
#[derive(Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub dataset: String,

    pub operation: Operation,

    /// Lower = preferred.
    #[serde(default = "default_priority")]
    pub priority: u32,

    pub host: String,

    #[serde(default)]
    pub port: Option<u16>,

    pub user: String,

    #[serde(default)]
    pub password: String,

    pub database: String,

    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,

    #[serde(default)]
    pub lag_threshold_secs: Option<f64>,
}

fn default_priority() -> u32 {
    1
}

impl ServerConfig {
    pub fn descriptor(&self) -> ServerDescriptor {
        ServerDescriptor {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            credential: self.password.clone(),
            database: self.database.clone(),
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
            lag_threshold: self.lag_threshold_secs,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("dataset", &self.dataset)
            .field("operation", &self.operation)
            .field("priority", &self.priority)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("lag_threshold_secs", &self.lag_threshold_secs)
            .finish()
    }
}

impl FarmConfig {
    /// Register every server and table binding into a fresh topology.
    /// Callbacks are added by the caller afterwards.
    pub fn build_topology<C: Connector>(&self) -> Topology<C> {
        let mut topology = Topology::new();
        for server in &self.servers {
            topology.register_server(
                server.dataset.clone(),
                server.operation,
                server.priority,
                server.descriptor(),
            );
        }
        for (table, dataset) in &self.tables {
            topology.bind_table(table.clone(), dataset.clone());
        }
        topology
    }

    /// Runtime router settings.
    pub fn router_config(&self) -> RouterConfig {
        let r = &self.router;
        RouterConfig {
            pool: PoolConfig {
                max_connections: r.max_connections,
                persistent: r.persistent,
            },
            min_tries: r.min_tries,
            default_port: r.default_port,
            default_connect_timeout: Duration::from_millis(r.default_connect_timeout_ms),
            default_lag_threshold: r.default_lag_threshold_secs,
            probe_enabled: self.probe.enabled,
            probe_ttl: Duration::from_secs(self.probe.cache_ttl_secs),
            pass_backoff: PassBackoff::new(r.pass_backoff_base_ms, r.pass_backoff_max_ms),
        }
    }
}
