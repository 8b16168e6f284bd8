//! Health and replication-lag subsystem.
//!
//! # Data Flow
//! ```text
//! Candidate selected (router)
//!     → lag.rs: cached lag reading → Ok / Behind / Unknown
//!     → probe.rs: TCP reachability (cached verdict or bounded connect)
//!     → physical connect (pool connector)
//!     → lag.rs: live lag reading on the new connection
//! ```
//!
//! # Design Decisions
//! - Probing is an optimization; it never replaces the real connect attempt
//! - Probe verdicts are per-endpoint and shared process-wide
//! - Lag samples live for one routing decision only

pub mod lag;
pub mod probe;

pub use lag::{classify, LagReading, LagSample, LagStatus};
pub use probe::{HealthProber, ProbeCache, ProbeOutcome, Prober, DEFAULT_PROBE_TTL};
