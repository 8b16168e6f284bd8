//! Query router.
//!
//! # Responsibilities
//! - Resolve dataset, classify read/write, maintain the session write memo
//! - Reuse pooled connections when they are still alive
//! - Walk priority-ordered candidates: lag checks, probes, connects, database selection
//! - Surface a diagnostic report only when every candidate failed
//!
//! # Design Decisions
//! - Synchronous: probes and connects block, bounded by their timeouts
//! - One router per execution context; no internal locking
//! - Per-candidate failures are absorbed; only exhaustion is returned
//! - At most one extra pass that ignores replication lag

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use uuid::Uuid;

use crate::health::{HealthProber, LagSample, LagStatus, Prober, ProbeOutcome, DEFAULT_PROBE_TTL};
use crate::hooks::{LagProbe, ResolveRequest};
use crate::observability::metrics;
use crate::pool::{ConnectionHandle, ConnectionPool, Connector, PoolConfig, PoolKey};
use crate::resilience::PassBackoff;
use crate::routing::classify::WriteMemo;
use crate::routing::error::{AttemptFailure, ExhaustionReport, FailureReason, RouteError, RouteResult};
use crate::routing::query::{classify_operation, Query};
use crate::topology::{
    Candidate, DescriptorOverride, Endpoint, ServerDescriptor, Topology, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_PORT,
};

/// Minimum candidate-list length when nothing else is configured.
pub const DEFAULT_MIN_TRIES: usize = 3;

/// Runtime knobs for a router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub pool: PoolConfig,
    /// Candidate lists are extended with full passes until this many entries exist.
    pub min_tries: usize,
    pub default_port: u16,
    pub default_connect_timeout: Duration,
    /// Lag threshold for servers without their own. `None` + no per-server value = no lag checks.
    pub default_lag_threshold: Option<f64>,
    pub probe_enabled: bool,
    pub probe_ttl: Duration,
    pub pass_backoff: PassBackoff,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            min_tries: DEFAULT_MIN_TRIES,
            default_port: DEFAULT_PORT,
            default_connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            default_lag_threshold: None,
            probe_enabled: true,
            probe_ttl: DEFAULT_PROBE_TTL,
            pass_backoff: PassBackoff::disabled(),
        }
    }
}

/// Routes queries for one session.
pub struct Router<C: Connector> {
    topology: Arc<Topology<C>>,
    connector: C,
    prober: Box<dyn Prober>,
    pool: ConnectionPool<C::Conn>,
    memo: WriteMemo,
    config: RouterConfig,
    session_id: Uuid,
    current: Option<PoolKey>,
    rng: StdRng,
}

impl<C: Connector> Router<C> {
    pub fn new(topology: Arc<Topology<C>>, connector: C, config: RouterConfig) -> Self {
        let prober = HealthProber::new().with_ttl(config.probe_ttl);
        Self {
            topology,
            connector,
            prober: Box::new(prober),
            pool: ConnectionPool::new(config.pool),
            memo: WriteMemo::new(),
            config,
            session_id: Uuid::new_v4(),
            current: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the TCP prober.
    pub fn with_prober(mut self, prober: impl Prober + 'static) -> Self {
        self.prober = Box::new(prober);
        self
    }

    /// Seed the shuffle of equally preferred servers.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Route a query to a live connection.
    pub fn route(&mut self, query: &Query) -> RouteResult<&mut ConnectionHandle<C::Conn>> {
        let span = tracing::debug_span!("route", session = %self.session_id);
        let _guard = span.enter();

        let table = query.table_name();
        let request = ResolveRequest {
            session_id: self.session_id,
            query: query.sql(),
            table,
        };
        let (dataset, server_override) = self.topology.resolve_dataset(&request)?.into_parts();

        let class = classify_operation(query, &self.memo);
        if class.record_table {
            if let Some(table) = table {
                if self.memo.mark(table) {
                    tracing::debug!(table = %table, "Table pinned to primary");
                }
            }
        }

        let key = PoolKey::new(dataset.as_str(), class.operation);
        tracing::debug!(
            dataset = %dataset,
            operation = %class.operation,
            reason = ?class.reason,
            table = ?table,
            "Query classified"
        );

        let database = server_override.as_ref().and_then(|o| o.database.as_deref());
        let selection = Selection {
            topology: self.topology.as_ref(),
            connector: &self.connector,
            prober: self.prober.as_ref(),
            config: &self.config,
            rng: &mut self.rng,
            session_id: self.session_id,
            dataset: &dataset,
            table,
            key: &key,
            server_override: server_override.as_ref(),
        };

        let handle = self
            .pool
            .checkout(&self.connector, &key, database, || selection.run())?;
        self.current = Some(key);
        Ok(handle)
    }

    /// Pin `table` to the primary for the rest of the session.
    pub fn mark_table_dirty(&mut self, table: &str) {
        self.memo.mark(table);
    }

    /// Send every subsequent read of this session to the primary.
    pub fn force_all_reads_to_primary(&mut self) {
        self.memo.force_all();
    }

    /// Close and forget the connection for `key`.
    pub fn disconnect(&mut self, key: &PoolKey) -> bool {
        if self.current.as_ref() == Some(key) {
            self.current = None;
        }
        self.pool.evict(&self.connector, key, "disconnect")
    }

    /// Close every pooled connection.
    pub fn disconnect_all(&mut self) {
        self.pool.clear(&self.connector);
        self.current = None;
    }

    /// Key of the connection handed out by the last successful `route`.
    pub fn current_key(&self) -> Option<&PoolKey> {
        self.current.as_ref()
    }

    pub fn current_endpoint(&self) -> Option<&Endpoint> {
        self.current
            .as_ref()
            .and_then(|k| self.pool.peek(k))
            .map(|h| h.endpoint())
    }

    pub fn connection(&mut self, key: &PoolKey) -> Option<&mut ConnectionHandle<C::Conn>> {
        self.pool.peek_mut(key)
    }

    pub fn open_connections(&self) -> usize {
        self.pool.len()
    }

    /// Pooled keys from least to most recently used.
    pub fn pooled_keys(&self) -> Vec<PoolKey> {
        self.pool.keys()
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn write_memo(&self) -> &WriteMemo {
        &self.memo
    }

    pub fn topology(&self) -> &Arc<Topology<C>> {
        &self.topology
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }
}

impl<C: Connector> Drop for Router<C> {
    fn drop(&mut self) {
        if !self.pool.is_empty() {
            tracing::debug!(session = %self.session_id, open = self.pool.len(), "Closing pooled connections");
            self.pool.clear(&self.connector);
        }
    }
}

impl<C: Connector> std::fmt::Debug for Router<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("session_id", &self.session_id)
            .field("current", &self.current)
            .field("pool", &self.pool)
            .field("memo", &self.memo)
            .field("config", &self.config)
            .finish()
    }
}

/// Outcome of walking one candidate list.
enum Walk<T> {
    Connected(ConnectionHandle<T>),
    Exhausted { any_lagged: bool },
}

/// Candidate after overrides and defaults are applied.
struct Resolved {
    server: ServerDescriptor,
    endpoint: Endpoint,
}

/// State borrowed from the router for one fresh-connection search.
struct Selection<'a, C: Connector> {
    topology: &'a Topology<C>,
    connector: &'a C,
    prober: &'a dyn Prober,
    config: &'a RouterConfig,
    rng: &'a mut StdRng,
    session_id: Uuid,
    dataset: &'a str,
    table: Option<&'a str>,
    key: &'a PoolKey,
    server_override: Option<&'a DescriptorOverride>,
}

impl<C: Connector> Selection<'_, C> {
    fn run(self) -> RouteResult<ConnectionHandle<C::Conn>> {
        let operation = self.key.operation;
        let mut search = Search {
            attempts: Vec::new(),
            last_endpoint: None,
            passes_started: 0,
        };

        let mut ignore_lag = operation.is_write();
        let mut lag_ignored = false;
        loop {
            let candidates =
                self.topology
                    .build_candidates(self.dataset, operation, self.config.min_tries, &mut *self.rng)?;
            match self.walk(&candidates, ignore_lag, &mut search) {
                Walk::Connected(handle) => return Ok(handle),
                Walk::Exhausted { any_lagged } if any_lagged && !ignore_lag => {
                    tracing::info!(dataset = %self.dataset, "No unlagged replica connected, retrying ignoring lag");
                    ignore_lag = true;
                    lag_ignored = true;
                }
                Walk::Exhausted { .. } => break,
            }
        }

        let (dataset, key) = (self.dataset, self.key);
        let report = ExhaustionReport {
            dataset: dataset.to_string(),
            table: self.table.map(str::to_string),
            operation,
            key: key.clone(),
            last_endpoint: search.last_endpoint,
            attempts: search.attempts,
            lag_ignored,
        };
        tracing::error!(
            dataset = %dataset,
            operation = %operation,
            key = %key,
            attempts = report.attempts.len(),
            "Connection exhausted"
        );
        metrics::record_exhausted(dataset, operation);
        self.topology.hooks().connection_failed(&report);
        Err(RouteError::ConnectionExhausted(Box::new(report)))
    }

    fn resolve(&self, candidate: &Candidate) -> Resolved {
        let server = match self.server_override {
            Some(ov) => ov.apply(&candidate.server),
            None => (*candidate.server).clone(),
        };
        let endpoint = server.endpoint(self.config.default_port);
        Resolved { server, endpoint }
    }

    fn lag_probe<'p>(
        &'p self,
        resolved: &'p Resolved,
        connection: Option<&'p mut C::Conn>,
    ) -> LagProbe<'p, C> {
        LagProbe {
            session_id: self.session_id,
            dataset: self.dataset,
            server: &resolved.server,
            endpoint: &resolved.endpoint,
            connection,
        }
    }

    fn walk(
        &self,
        candidates: &[Candidate],
        ignore_lag: bool,
        search: &mut Search,
    ) -> Walk<C::Conn> {
        let resolved: Vec<Resolved> = candidates.iter().map(|c| self.resolve(c)).collect();
        let all_endpoints: HashSet<&Endpoint> = resolved.iter().map(|r| &r.endpoint).collect();
        let hooks = self.topology.hooks();
        let mut lagged: HashMap<Endpoint, LagSample> = HashMap::new();
        let mut current_pass = None;

        for (i, (candidate, r)) in candidates.iter().zip(&resolved).enumerate() {
            if !lagged.is_empty() && all_endpoints.iter().all(|e| lagged.contains_key(*e)) {
                tracing::debug!(dataset = %self.dataset, lagged = lagged.len(), "Every endpoint lagged");
                break;
            }

            if current_pass != Some(candidate.pass) {
                current_pass = Some(candidate.pass);
                self.config.pass_backoff.wait(search.passes_started);
                search.passes_started += 1;
            }

            let endpoint = &r.endpoint;
            let rest = &resolved[i + 1..];
            let is_final = rest.is_empty();
            let timeout = r.server.timeout(self.config.default_connect_timeout);
            let threshold = if ignore_lag {
                None
            } else {
                r.server.effective_lag_threshold(self.config.default_lag_threshold)
            };

            tracing::debug!(
                endpoint = %endpoint,
                priority = candidate.priority,
                pass = candidate.pass,
                "Trying candidate"
            );

            // Lag pre-check: endpoints already found behind in this walk, then cached readings.
            let mut lag = None;
            let mut lag_settled = false;
            if let (Some(sample), Some(_)) = (lagged.get(endpoint).copied(), threshold) {
                if !is_last_chance(rest, endpoint) {
                    tracing::debug!(endpoint = %endpoint, lag = %sample, "Replica already found lagged");
                    search.fail(endpoint, FailureReason::Lagged, None, Some(sample));
                    continue;
                }
                tracing::debug!(endpoint = %endpoint, lag = %sample, "Last chance, ignoring lag");
                lag_settled = true;
                lag = Some(sample);
            } else if let Some(threshold) = threshold {
                let reading = hooks.cached_lag(&mut self.lag_probe(r, None));
                let sample = LagSample::measure(reading, threshold);
                match sample.status {
                    LagStatus::Ok => lag_settled = true,
                    LagStatus::Behind if is_last_chance(rest, endpoint) => {
                        tracing::debug!(endpoint = %endpoint, lag = %sample, "Last chance, ignoring lag");
                        lag_settled = true;
                    }
                    LagStatus::Behind => {
                        tracing::debug!(endpoint = %endpoint, lag = %sample, "Skipping lagged replica");
                        metrics::record_lag_skip(endpoint);
                        lagged.insert(endpoint.clone(), sample);
                        search.fail(endpoint, FailureReason::Lagged, None, Some(sample));
                        continue;
                    }
                    LagStatus::Unknown => {}
                }
                lag = Some(sample);
            }

            // TCP pre-check.
            let mut reachable = None;
            if self.config.probe_enabled && !self.key.operation.is_write() && !is_final {
                match self.prober.probe(endpoint, timeout) {
                    ProbeOutcome::Reachable => reachable = Some(true),
                    ProbeOutcome::Unreachable(detail) => {
                        tracing::warn!(endpoint = %endpoint, detail = %detail, "Candidate unreachable");
                        search.fail(endpoint, FailureReason::Unreachable(detail), Some(false), lag);
                        continue;
                    }
                }
            }

            let mut conn = match self
                .connector
                .connect(endpoint, &r.server.user, &r.server.credential, timeout)
            {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint, error = %e, code = ?e.code, "Connect failed");
                    metrics::record_connect(endpoint, "failed");
                    let reason = FailureReason::Connect {
                        code: e.code,
                        message: e.message,
                    };
                    search.fail(endpoint, reason, reachable, lag);
                    continue;
                }
            };

            // Live lag check, unless the cached reading already settled it.
            if let Some(threshold) = threshold.filter(|_| !lag_settled) {
                let reading = hooks.live_lag(&mut self.lag_probe(r, Some(&mut conn)));
                let sample = LagSample::measure(reading, threshold);
                if sample.status.is_behind() && !is_last_chance(rest, endpoint) {
                    tracing::debug!(endpoint = %endpoint, lag = %sample, "Connected replica is lagged");
                    self.connector.close(conn);
                    metrics::record_connect(endpoint, "lagged");
                    metrics::record_lag_skip(endpoint);
                    lagged.insert(endpoint.clone(), sample);
                    search.fail(endpoint, FailureReason::Lagged, reachable, Some(sample));
                    continue;
                }
                lag = Some(sample);
            }

            if let Err(e) = self.connector.set_session_options(&mut conn) {
                tracing::debug!(endpoint = %endpoint, error = %e, "Session options not applied");
            }

            if !self.connector.select_db(&mut conn, &r.server.database) {
                tracing::warn!(endpoint = %endpoint, database = %r.server.database, "Database selection failed");
                self.connector.close(conn);
                metrics::record_connect(endpoint, "select_failed");
                search.fail(
                    endpoint,
                    FailureReason::SelectDatabase(r.server.database.clone()),
                    reachable,
                    lag,
                );
                continue;
            }

            tracing::info!(
                key = %self.key,
                endpoint = %endpoint,
                database = %r.server.database,
                lag = ?lag.and_then(|s| s.reading),
                "Connected"
            );
            metrics::record_connect(endpoint, "connected");
            search.last_endpoint = Some(endpoint.clone());
            return Walk::Connected(ConnectionHandle::new(
                self.key.clone(),
                conn,
                r.server.database.clone(),
                endpoint.clone(),
            ));
        }

        Walk::Exhausted {
            any_lagged: !lagged.is_empty(),
        }
    }
}

/// Failures accumulated across every pass of one search.
struct Search {
    attempts: Vec<AttemptFailure>,
    last_endpoint: Option<Endpoint>,
    passes_started: u32,
}

impl Search {
    fn fail(
        &mut self,
        endpoint: &Endpoint,
        reason: FailureReason,
        reachable: Option<bool>,
        lag: Option<LagSample>,
    ) {
        self.last_endpoint = Some(endpoint.clone());
        self.attempts.push(AttemptFailure {
            endpoint: endpoint.clone(),
            reason,
            reachable,
            lag,
        });
    }
}

/// A lagged candidate is the last chance when every later candidate in the
/// list is the same endpoint.
fn is_last_chance(rest: &[Resolved], endpoint: &Endpoint) -> bool {
    rest.iter().all(|r| &r.endpoint == endpoint)
}
