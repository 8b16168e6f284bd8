//! Topology registry.
//!
//! # Responsibilities
//! - Store priority groups of servers per dataset and operation
//! - Store table → dataset bindings and the callback chains
//! - Resolve a query's dataset
//! - Build randomized, priority-ordered candidate lists
//!
//! # Design Decisions
//! - Built once at startup, immutable afterwards (shared via Arc)
//! - Ordering is computed at lookup time, not at registration
//! - An explicit table binding always wins over resolver callbacks

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::hooks::{
    ConnectionErrorObserver, DatasetChoice, DatasetObserver, DatasetResolver, Hooks, LagSource,
    ResolveRequest,
};
use crate::pool::Connector;
use crate::routing::{RouteError, RouteResult};
use crate::topology::{Endpoint, Operation, ServerDescriptor};

/// Dataset used when nothing else answers.
pub const DEFAULT_DATASET: &str = "global";

type PriorityGroups = BTreeMap<u32, Vec<Arc<ServerDescriptor>>>;

#[derive(Debug, Default, Clone)]
struct DatasetServers {
    read: PriorityGroups,
    write: PriorityGroups,
}

impl DatasetServers {
    fn groups(&self, operation: Operation) -> &PriorityGroups {
        match operation {
            Operation::Read => &self.read,
            Operation::Write => &self.write,
        }
    }

    fn groups_mut(&mut self, operation: Operation) -> &mut PriorityGroups {
        match operation {
            Operation::Read => &mut self.read,
            Operation::Write => &mut self.write,
        }
    }
}

/// One entry in a candidate list.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub server: Arc<ServerDescriptor>,
    pub priority: u32,
    /// Which full pass over the topology produced this entry.
    pub pass: usize,
}

/// Servers, bindings and callbacks for a whole database farm.
pub struct Topology<C: Connector> {
    datasets: HashMap<String, DatasetServers>,
    tables: HashMap<String, String>,
    hooks: Hooks<C>,
}

impl<C: Connector> Topology<C> {
    pub fn new() -> Self {
        Self {
            datasets: HashMap::new(),
            tables: HashMap::new(),
            hooks: Hooks::new(),
        }
    }

    /// Append a server to the priority group of (dataset, operation).
    pub fn register_server(
        &mut self,
        dataset: impl Into<String>,
        operation: Operation,
        priority: u32,
        descriptor: ServerDescriptor,
    ) {
        self.datasets
            .entry(dataset.into())
            .or_default()
            .groups_mut(operation)
            .entry(priority)
            .or_default()
            .push(Arc::new(descriptor));
    }

    /// Route every query on `table` to `dataset`.
    pub fn bind_table(&mut self, table: impl Into<String>, dataset: impl Into<String>) {
        self.tables.insert(table.into(), dataset.into());
    }

    pub fn add_dataset_resolver(&mut self, resolver: impl DatasetResolver + 'static) {
        self.hooks.dataset.push(Box::new(resolver));
    }

    pub fn add_dataset_observer(&mut self, observer: impl DatasetObserver + 'static) {
        self.hooks.dataset_found.push(Box::new(observer));
    }

    /// Lag source consulted after connecting.
    pub fn add_lag_source(&mut self, source: impl LagSource<C> + 'static) {
        self.hooks.lag.push(Box::new(source));
    }

    /// Lag source consulted before connecting.
    pub fn add_cached_lag_source(&mut self, source: impl LagSource<C> + 'static) {
        self.hooks.lag_cache.push(Box::new(source));
    }

    pub fn add_connection_error_observer(&mut self, observer: impl ConnectionErrorObserver + 'static) {
        self.hooks.connection_error.push(Box::new(observer));
    }

    pub fn hooks(&self) -> &Hooks<C> {
        &self.hooks
    }

    pub fn table_binding(&self, table: &str) -> Option<&str> {
        self.tables.get(table).map(String::as_str)
    }

    /// Every dataset with at least one registered server.
    pub fn datasets(&self) -> BTreeSet<&str> {
        self.datasets.keys().map(String::as_str).collect()
    }

    /// Servers for (dataset, operation) in ascending priority, registration order within a group.
    pub fn servers(&self, dataset: &str, operation: Operation) -> Vec<(u32, Arc<ServerDescriptor>)> {
        self.datasets
            .get(dataset)
            .map(|d| {
                d.groups(operation)
                    .iter()
                    .flat_map(|(p, members)| members.iter().map(move |s| (*p, s.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn server_count(&self, dataset: &str, operation: Operation) -> usize {
        self.datasets
            .get(dataset)
            .map(|d| d.groups(operation).values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn has_servers(&self, dataset: &str, operation: Operation) -> bool {
        self.server_count(dataset, operation) > 0
    }

    /// Distinct endpoints registered for (dataset, operation).
    pub fn distinct_endpoints(&self, dataset: &str, operation: Operation, default_port: u16) -> HashSet<Endpoint> {
        self.servers(dataset, operation)
            .into_iter()
            .map(|(_, s)| s.endpoint(default_port))
            .collect()
    }

    /// Resolve the dataset for a query and notify the "dataset_found" chain.
    pub fn resolve_dataset(&self, request: &ResolveRequest<'_>) -> RouteResult<DatasetChoice> {
        let choice = self.choose_dataset(request)?;
        self.hooks.dataset_found(choice.dataset(), request);
        Ok(choice)
    }

    /// Same as [`resolve_dataset`](Self::resolve_dataset) without notifying
    /// the dataset observers.
    pub fn choose_dataset(&self, request: &ResolveRequest<'_>) -> RouteResult<DatasetChoice> {
        let bound = request.table.and_then(|t| self.table_binding(t));
        let choice = match bound {
            Some(dataset) => DatasetChoice::Named(dataset.to_string()),
            None => match self.hooks.resolve_dataset(request) {
                Some(choice) if choice.dataset().is_empty() => {
                    return Err(RouteError::Configuration(format!(
                        "dataset resolver returned an empty dataset name (table {})",
                        request.table.unwrap_or("<none>")
                    )));
                }
                Some(choice) => choice,
                None => DatasetChoice::Named(DEFAULT_DATASET.to_string()),
            },
        };

        tracing::debug!(dataset = %choice.dataset(), table = ?request.table, bound = bound.is_some(), "Dataset resolved");
        Ok(choice)
    }

    /// Candidate list: groups in ascending priority, members shuffled within
    /// each group, full passes repeated until `min_tries` entries exist.
    pub fn build_candidates<R: Rng + ?Sized>(
        &self,
        dataset: &str,
        operation: Operation,
        min_tries: usize,
        rng: &mut R,
    ) -> RouteResult<Vec<Candidate>> {
        let groups = self
            .datasets
            .get(dataset)
            .map(|d| d.groups(operation))
            .filter(|g| g.values().any(|members| !members.is_empty()))
            .ok_or_else(|| RouteError::NoServersAvailable {
                dataset: dataset.to_string(),
                operation,
            })?;

        let mut candidates = Vec::new();
        let mut pass = 0;
        loop {
            for (priority, members) in groups {
                let mut shuffled = members.clone();
                shuffled.shuffle(rng);
                candidates.extend(shuffled.into_iter().map(|server| Candidate {
                    server,
                    priority: *priority,
                    pass,
                }));
            }
            pass += 1;
            if candidates.len() >= min_tries {
                break;
            }
        }
        Ok(candidates)
    }
}

impl<C: Connector> Default for Topology<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> std::fmt::Debug for Topology<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topology")
            .field("datasets", &self.datasets)
            .field("tables", &self.tables)
            .field("hooks", &self.hooks)
            .finish()
    }
}
