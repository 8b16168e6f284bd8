//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! route(query)
//!     → RESOLVE_DATASET   topology binding, else "dataset" chain, else "global"
//!     → CLASSIFY          query.rs + classify.rs (verb, table, write memo)
//!     → TRY_REUSE         pool checkout of dataset:read / dataset:write
//!     → BUILD_CANDIDATES  priority groups ascending, shuffled within a group
//!     → SELECT_LOOP       lag pre-check → probe → connect → live lag → select db
//!     → lag-ignoring pass (once) or ConnectionExhausted
//! ```
//!
//! # Design Decisions
//! - The write memo belongs to one router (one session), never global
//! - Deterministic termination: the candidate list is finite
//! - Only total exhaustion is reported to the caller

pub mod classify;
pub mod error;
pub mod explain;
pub mod query;
pub mod router;

pub use classify::{guess_table, is_read_statement, leading_verb, WriteMemo};
pub use error::{AttemptFailure, ExhaustionReport, FailureReason, RouteError, RouteResult};
pub use explain::{ExplainedCandidate, Explanation};
pub use query::{classify_operation, Classification, Query, Reason};
pub use router::{Router, RouterConfig, DEFAULT_MIN_TRIES};
