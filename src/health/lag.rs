//! Replication lag classification.
//!
//! # States
//! - Ok: lag at or below the threshold
//! - Behind: lag above the threshold
//! - Unknown: no lag value could be produced
//!
//! Unknown is acceptable for selection purposes; only Behind excludes a
//! replica.

use std::fmt;

use serde::Serialize;

/// Raw answer from a lag source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum LagReading {
    /// Seconds behind the primary.
    Seconds(f64),
    /// The source answered, but could not measure lag.
    Unknown,
}

impl LagReading {
    pub fn seconds(&self) -> Option<f64> {
        match self {
            Self::Seconds(s) if s.is_finite() => Some(*s),
            _ => None,
        }
    }
}

impl fmt::Display for LagReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seconds(s) => write!(f, "{:.3}s", s),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Lag classification against a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LagStatus {
    Ok,
    Behind,
    Unknown,
}

impl LagStatus {
    pub fn is_behind(&self) -> bool {
        matches!(self, Self::Behind)
    }
}

/// Classify a lag reading. `None` means no source in the chain answered.
pub fn classify(reading: Option<LagReading>, threshold: f64) -> LagStatus {
    match reading.and_then(|r| r.seconds()) {
        Some(lag) if lag <= threshold => LagStatus::Ok,
        Some(_) => LagStatus::Behind,
        None => LagStatus::Unknown,
    }
}

/// One lag measurement, kept only for the duration of a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LagSample {
    pub reading: Option<LagReading>,
    pub status: LagStatus,
}

impl LagSample {
    pub fn measure(reading: Option<LagReading>, threshold: f64) -> Self {
        Self {
            reading,
            status: classify(reading, threshold),
        }
    }
}

impl fmt::Display for LagSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reading {
            Some(r) => write!(f, "{} ({:?})", r, self.status),
            None => write!(f, "no reading ({:?})", self.status),
        }
    }
}
