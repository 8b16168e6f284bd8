//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Router, pool and prober produce:
//!     → tracing events (per-candidate decisions, failures, exhaustion)
//!     → metrics.rs (counters via the metrics facade)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, text or JSON)
//!     → whatever metrics exporter the host process installs
//! ```
//!
//! # Design Decisions
//! - Every routing decision runs in a span tagged with the router session id
//! - Metrics are cheap (atomic increments), query text is never logged

pub mod logging;
pub mod metrics;
