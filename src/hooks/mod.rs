//! Ordered callback chains.
//!
//! # Groups
//! - dataset: map a query to a dataset name (or a dataset plus server overrides)
//! - dataset_found: notified once a dataset is resolved
//! - get_lag / get_lag_cache: produce replication lag, live or cached
//! - db_connection_error: notified when every candidate failed
//!
//! # Design Decisions
//! - One trait per group, members stored in registration order
//! - Answering chains stop at the first member that returns `Some`
//! - Notify chains run every member
//! - Closures with the right signature implement the traits directly

use uuid::Uuid;

use crate::health::LagReading;
use crate::pool::Connector;
use crate::routing::ExhaustionReport;
use crate::topology::{DescriptorOverride, Endpoint, ServerDescriptor};

/// Ordered list of callbacks sharing one capability.
pub struct Chain<T: ?Sized> {
    members: Vec<Box<T>>,
}

impl<T: ?Sized> Chain<T> {
    pub fn new() -> Self {
        Self { members: Vec::new() }
    }

    pub fn push(&mut self, member: Box<T>) {
        self.members.push(member);
    }

    /// Run members in order, returning the first `Some`.
    pub fn first<R>(&self, mut f: impl FnMut(&T) -> Option<R>) -> Option<R> {
        self.members.iter().find_map(|m| f(m.as_ref()))
    }

    /// Run every member.
    pub fn notify(&self, mut f: impl FnMut(&T)) {
        for member in &self.members {
            f(member.as_ref());
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl<T: ?Sized> Default for Chain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> std::fmt::Debug for Chain<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain").field("members", &self.members.len()).finish()
    }
}

/// What a dataset resolver sees.
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    pub session_id: Uuid,
    pub query: &'a str,
    pub table: Option<&'a str>,
}

/// A dataset resolver's answer.
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetChoice {
    Named(String),
    /// Dataset plus explicit replacements merged over every candidate.
    Override {
        dataset: String,
        server: DescriptorOverride,
    },
}

impl DatasetChoice {
    pub fn dataset(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Override { dataset, .. } => dataset,
        }
    }

    pub fn into_parts(self) -> (String, Option<DescriptorOverride>) {
        match self {
            Self::Named(name) => (name, None),
            Self::Override { dataset, server } => (dataset, Some(server)),
        }
    }
}

impl From<&str> for DatasetChoice {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for DatasetChoice {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

/// "dataset" group.
pub trait DatasetResolver: Send + Sync {
    fn resolve(&self, request: &ResolveRequest<'_>) -> Option<DatasetChoice>;
}

impl<F> DatasetResolver for F
where
    F: Fn(&ResolveRequest<'_>) -> Option<DatasetChoice> + Send + Sync,
{
    fn resolve(&self, request: &ResolveRequest<'_>) -> Option<DatasetChoice> {
        self(request)
    }
}

/// "dataset_found" group.
pub trait DatasetObserver: Send + Sync {
    fn dataset_found(&self, dataset: &str, request: &ResolveRequest<'_>);
}

impl<F> DatasetObserver for F
where
    F: Fn(&str, &ResolveRequest<'_>) + Send + Sync,
{
    fn dataset_found(&self, dataset: &str, request: &ResolveRequest<'_>) {
        self(dataset, request)
    }
}

/// What a lag source sees. `connection` is set only for live (post-connect) lookups.
pub struct LagProbe<'a, C: Connector> {
    pub session_id: Uuid,
    pub dataset: &'a str,
    pub server: &'a ServerDescriptor,
    pub endpoint: &'a Endpoint,
    pub connection: Option<&'a mut C::Conn>,
}

/// "get_lag" and "get_lag_cache" groups.
pub trait LagSource<C: Connector>: Send + Sync {
    fn lag(&self, probe: &mut LagProbe<'_, C>) -> Option<LagReading>;
}

impl<C, F> LagSource<C> for F
where
    C: Connector,
    F: Fn(&mut LagProbe<'_, C>) -> Option<LagReading> + Send + Sync,
{
    fn lag(&self, probe: &mut LagProbe<'_, C>) -> Option<LagReading> {
        self(probe)
    }
}

/// "db_connection_error" group.
pub trait ConnectionErrorObserver: Send + Sync {
    fn connection_failed(&self, report: &ExhaustionReport);
}

impl<F> ConnectionErrorObserver for F
where
    F: Fn(&ExhaustionReport) + Send + Sync,
{
    fn connection_failed(&self, report: &ExhaustionReport) {
        self(report)
    }
}

/// All callback chains consulted by a router.
pub struct Hooks<C: Connector> {
    pub(crate) dataset: Chain<dyn DatasetResolver>,
    pub(crate) dataset_found: Chain<dyn DatasetObserver>,
    pub(crate) lag: Chain<dyn LagSource<C>>,
    pub(crate) lag_cache: Chain<dyn LagSource<C>>,
    pub(crate) connection_error: Chain<dyn ConnectionErrorObserver>,
}

impl<C: Connector> Hooks<C> {
    pub fn new() -> Self {
        Self {
            dataset: Chain::new(),
            dataset_found: Chain::new(),
            lag: Chain::new(),
            lag_cache: Chain::new(),
            connection_error: Chain::new(),
        }
    }

    /// Ask the "dataset" chain.
    pub fn resolve_dataset(&self, request: &ResolveRequest<'_>) -> Option<DatasetChoice> {
        self.dataset.first(|r| r.resolve(request))
    }

    pub fn dataset_found(&self, dataset: &str, request: &ResolveRequest<'_>) {
        self.dataset_found.notify(|o| o.dataset_found(dataset, request));
    }

    /// Ask the "get_lag" chain (live connection available).
    pub fn live_lag(&self, probe: &mut LagProbe<'_, C>) -> Option<LagReading> {
        self.lag.first(|s| s.lag(probe))
    }

    /// Ask the "get_lag_cache" chain (no connection yet).
    pub fn cached_lag(&self, probe: &mut LagProbe<'_, C>) -> Option<LagReading> {
        self.lag_cache.first(|s| s.lag(probe))
    }

    pub fn connection_failed(&self, report: &ExhaustionReport) {
        self.connection_error.notify(|o| o.connection_failed(report));
    }
}

impl<C: Connector> Default for Hooks<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> std::fmt::Debug for Hooks<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("dataset", &self.dataset.len())
            .field("dataset_found", &self.dataset_found.len())
            .field("get_lag", &self.lag.len())
            .field("get_lag_cache", &self.lag_cache.len())
            .field("db_connection_error", &self.connection_error.len())
            .finish()
    }
}
