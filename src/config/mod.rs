//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → FarmConfig (validated, immutable)
//!     → build_topology() → Arc<Topology> shared by every router
//!     → router_config()  → RouterConfig per router
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the topology is built once at startup
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Callbacks (dataset resolvers, lag sources) are code, not config

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{FarmConfig, ObservabilityConfig, ProbeConfig, RouterSection, ServerConfig};
pub use validation::{validate_config, ValidationError};
