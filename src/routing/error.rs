//! Routing error taxonomy.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::health::LagSample;
use crate::pool::PoolKey;
use crate::topology::{Endpoint, Operation};

/// Why one candidate was given up on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FailureReason {
    /// TCP pre-check failed; no physical connect was made.
    Unreachable(String),
    /// The connector refused or timed out.
    Connect {
        code: Option<u32>,
        message: String,
    },
    /// Replication lag above threshold.
    Lagged,
    /// The database could not be selected after connecting.
    SelectDatabase(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable(detail) => write!(f, "unreachable ({})", detail),
            Self::Connect {
                code: Some(code),
                message,
            } => write!(f, "connect failed [{}] {}", code, message),
            Self::Connect { code: None, message } => write!(f, "connect failed {}", message),
            Self::Lagged => f.write_str("replication lag above threshold"),
            Self::SelectDatabase(db) => write!(f, "cannot select database {}", db),
        }
    }
}

/// Diagnostic record for one failed candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptFailure {
    pub endpoint: Endpoint,
    pub reason: FailureReason,
    /// Probe verdict, when a probe ran.
    pub reachable: Option<bool>,
    /// Lag measurement, when one was taken.
    pub lag: Option<LagSample>,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.endpoint, self.reason)?;
        if let Some(lag) = &self.lag {
            write!(f, ", lag {}", lag)?;
        }
        Ok(())
    }
}

/// Everything known about a routing decision that found no server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExhaustionReport {
    pub dataset: String,
    pub table: Option<String>,
    pub operation: Operation,
    pub key: PoolKey,
    pub last_endpoint: Option<Endpoint>,
    pub attempts: Vec<AttemptFailure>,
    /// Whether the lag-ignoring pass ran.
    pub lag_ignored: bool,
}

impl ExhaustionReport {
    /// Distinct endpoints tried, in first-attempt order.
    pub fn endpoints(&self) -> Vec<&Endpoint> {
        let mut seen: Vec<&Endpoint> = Vec::new();
        for attempt in &self.attempts {
            if !seen.contains(&&attempt.endpoint) {
                seen.push(&attempt.endpoint);
            }
        }
        seen
    }
}

impl fmt::Display for ExhaustionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no {} server for dataset '{}' (key {}",
            self.operation, self.dataset, self.key
        )?;
        if let Some(table) = &self.table {
            write!(f, ", table {}", table)?;
        }
        write!(f, ") after {} attempt(s)", self.attempts.len())?;
        for (i, attempt) in self.attempts.iter().enumerate() {
            write!(f, "{}{}", if i == 0 { ": " } else { "; " }, attempt)?;
        }
        Ok(())
    }
}

/// Terminal routing failures.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The dataset could not be resolved.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The topology has no servers for the dataset and operation.
    #[error("no servers registered for dataset '{dataset}' ({operation})")]
    NoServersAvailable { dataset: String, operation: Operation },

    /// Every candidate failed.
    #[error("connection exhausted: {0}")]
    ConnectionExhausted(Box<ExhaustionReport>),
}

impl RouteError {
    pub fn report(&self) -> Option<&ExhaustionReport> {
        match self {
            Self::ConnectionExhausted(report) => Some(report),
            _ => None,
        }
    }
}

/// Result type for routing operations.
pub type RouteResult<T> = Result<T, RouteError>;
