//! TCP reachability probing.
//!
//! # Responsibilities
//! - Bounded-time TCP connect to an endpoint, no data exchanged
//! - Cache verdicts per endpoint for a short TTL
//!
//! # Design Decisions
//! - The cache is process-wide and read-mostly; a stale verdict only changes
//!   whether a probe is skipped, never whether a real connect is attempted
//! - Both up and down verdicts are cached

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::observability::metrics;
use crate::topology::{Endpoint, DEFAULT_CONNECT_TIMEOUT};

/// How long a cached verdict stays fresh by default.
pub const DEFAULT_PROBE_TTL: Duration = Duration::from_secs(10);

/// Result of a reachability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable,
    Unreachable(String),
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable)
    }
}

/// Anything that can tell whether an endpoint accepts TCP connections.
pub trait Prober {
    fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> ProbeOutcome;
}

#[derive(Debug, Clone)]
struct CachedVerdict {
    outcome: ProbeOutcome,
    checked_at: Instant,
}

/// Endpoint → last verdict, shared between probers.
#[derive(Debug, Default)]
pub struct ProbeCache {
    entries: DashMap<Endpoint, CachedVerdict>,
}

impl ProbeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache.
    pub fn global() -> Arc<ProbeCache> {
        static GLOBAL: OnceLock<Arc<ProbeCache>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(ProbeCache::new())).clone()
    }

    /// Cached verdict, if younger than `ttl`.
    pub fn get(&self, endpoint: &Endpoint, ttl: Duration) -> Option<ProbeOutcome> {
        let entry = self.entries.get(endpoint)?;
        if entry.checked_at.elapsed() < ttl {
            Some(entry.outcome.clone())
        } else {
            None
        }
    }

    pub fn insert(&self, endpoint: Endpoint, outcome: ProbeOutcome) {
        self.entries.insert(
            endpoint,
            CachedVerdict {
                outcome,
                checked_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, endpoint: &Endpoint) {
        self.entries.remove(endpoint);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// TCP connect prober backed by a [`ProbeCache`].
#[derive(Debug, Clone)]
pub struct HealthProber {
    cache: Arc<ProbeCache>,
    ttl: Duration,
}

impl HealthProber {
    /// Prober on the process-wide cache with the default TTL.
    pub fn new() -> Self {
        Self::with_cache(ProbeCache::global(), DEFAULT_PROBE_TTL)
    }

    pub fn with_cache(cache: Arc<ProbeCache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn cache(&self) -> &Arc<ProbeCache> {
        &self.cache
    }

    fn connect(endpoint: &Endpoint, timeout: Duration) -> ProbeOutcome {
        let timeout = if timeout.is_zero() {
            DEFAULT_CONNECT_TIMEOUT
        } else {
            timeout
        };

        let addrs = match (endpoint.host.as_str(), endpoint.port).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => return ProbeOutcome::Unreachable(format!("resolve failed: {}", e)),
        };

        let mut last_error = String::from("no addresses resolved");
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(_stream) => return ProbeOutcome::Reachable,
                Err(e) => last_error = format!("{}: {}", addr, e),
            }
        }
        ProbeOutcome::Unreachable(last_error)
    }
}

impl Default for HealthProber {
    fn default() -> Self {
        Self::new()
    }
}

impl Prober for HealthProber {
    fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> ProbeOutcome {
        if let Some(outcome) = self.cache.get(endpoint, self.ttl) {
            tracing::trace!(endpoint = %endpoint, reachable = outcome.is_reachable(), "Probe cache hit");
            metrics::record_probe(endpoint, outcome.is_reachable(), true);
            return outcome;
        }

        let outcome = Self::connect(endpoint, timeout);
        if let ProbeOutcome::Unreachable(detail) = &outcome {
            tracing::debug!(endpoint = %endpoint, detail = %detail, "Probe failed");
        }
        metrics::record_probe(endpoint, outcome.is_reachable(), false);
        self.cache.insert(endpoint.clone(), outcome.clone());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn closed_port() -> u16 {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_probe_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let prober = HealthProber::with_cache(Arc::new(ProbeCache::new()), DEFAULT_PROBE_TTL);

        let outcome = prober.probe(&Endpoint::new("127.0.0.1", port), Duration::from_millis(500));
        assert_eq!(outcome, ProbeOutcome::Reachable);
    }

    #[test]
    fn test_probe_unreachable() {
        let port = closed_port();
        let prober = HealthProber::with_cache(Arc::new(ProbeCache::new()), DEFAULT_PROBE_TTL);

        let outcome = prober.probe(&Endpoint::new("127.0.0.1", port), Duration::from_millis(500));
        assert!(!outcome.is_reachable());
    }

    #[test]
    fn test_verdict_is_cached_within_ttl() {
        let cache = Arc::new(ProbeCache::new());
        let endpoint = Endpoint::new("127.0.0.1", closed_port());
        cache.insert(endpoint.clone(), ProbeOutcome::Reachable);

        // The cached verdict wins over the real (closed) port.
        let prober = HealthProber::with_cache(cache.clone(), DEFAULT_PROBE_TTL);
        assert!(prober.probe(&endpoint, Duration::from_millis(200)).is_reachable());

        // With a zero TTL the entry is stale and a real probe runs.
        let prober = HealthProber::with_cache(cache.clone(), Duration::ZERO);
        assert!(!prober.probe(&endpoint, Duration::from_millis(200)).is_reachable());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate() {
        let cache = ProbeCache::new();
        let endpoint = Endpoint::new("db1", 3306);
        cache.insert(endpoint.clone(), ProbeOutcome::Unreachable("down".into()));
        assert!(cache.get(&endpoint, DEFAULT_PROBE_TTL).is_some());

        cache.invalidate(&endpoint);
        assert!(cache.get(&endpoint, DEFAULT_PROBE_TTL).is_none());
        assert!(cache.is_empty());
    }
}
