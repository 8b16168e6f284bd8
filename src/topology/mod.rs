//! Farm topology subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (config loader or embedding code):
//!     register_server / bind_table / add_* callbacks
//!     → registry.rs: immutable Topology, shared via Arc
//!
//! Per routing decision:
//!     (table, query) → resolve_dataset → dataset (+ optional override)
//!     (dataset, operation) → build_candidates → ordered Candidate list
//! ```
//!
//! # Design Decisions
//! - Lower priority number = preferred
//! - Members of one priority group are equally preferred and shuffled
//! - Per-query overrides are an explicit structure merged over descriptors

pub mod descriptor;
pub mod registry;

pub use descriptor::{
    DescriptorOverride, Endpoint, Operation, ServerDescriptor, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT,
};
pub use registry::{Candidate, Topology, DEFAULT_DATASET};
