//! Dataset-aware SQL connection router for replicated, partitioned database farms.
//!
//! # Architecture Overview
//!
//! ```text
//!   route(query)
//!       │
//!       ▼
//!   ┌──────────┐   dataset    ┌──────────┐  read/write   ┌──────────┐
//!   │ topology │─────────────▶│ routing  │──────────────▶│   pool   │── reuse ──▶ handle
//!   │ + hooks  │              │ classify │               │   LRU    │
//!   └──────────┘              └────┬─────┘               └────┬─────┘
//!                                  │ miss                     │
//!                                  ▼                          │
//!                       ┌─────────────────────┐               │
//!                       │ candidate selection │── install ────┘
//!                       │ lag · probe · retry │
//!                       └──────────┬──────────┘
//!                                  ▼
//!                           Connector (external)
//! ```
//!
//! Cross-cutting: `config` (TOML → topology), `health` (probes, lag),
//! `resilience` (pass backoff), `observability` (tracing, metrics).

// Core subsystems
pub mod config;
pub mod hooks;
pub mod pool;
pub mod routing;
pub mod topology;

// Cross-cutting concerns
pub mod health;
pub mod observability;
pub mod resilience;

pub use config::FarmConfig;
pub use pool::{ConnectionHandle, Connector, ConnectorError, PoolKey};
pub use routing::{Query, RouteError, RouteResult, Router, RouterConfig};
pub use topology::{Endpoint, Operation, ServerDescriptor, Topology};
