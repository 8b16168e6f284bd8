//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Candidate list (several full passes over the topology)
//!     → pass 0: no delay
//!     → pass n: backoff.rs delay (exponential, jittered, capped)
//! ```
//!
//! # Design Decisions
//! - Timeouts live on each server descriptor; the only cutoff is the connect timeout
//! - Retries are bounded by the candidate list, never open-ended
//! - Backoff is off unless configured

pub mod backoff;

pub use backoff::PassBackoff;
