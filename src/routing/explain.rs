//! Dry-run routing: what would happen to a query, without connecting.

use serde::Serialize;

use crate::hooks::ResolveRequest;
use crate::pool::{Connector, PoolKey};
use crate::routing::classify::WriteMemo;
use crate::routing::error::RouteResult;
use crate::routing::query::{classify_operation, Query, Reason};
use crate::routing::router::RouterConfig;
use crate::topology::{Endpoint, Operation, Topology};

/// One entry of an explained candidate list.
#[derive(Debug, Clone, Serialize)]
pub struct ExplainedCandidate {
    pub endpoint: Endpoint,
    pub priority: u32,
    pub pass: usize,
    pub database: String,
    pub lag_threshold: Option<f64>,
}

/// Routing decision for one query.
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub dataset: String,
    pub table: Option<String>,
    pub operation: Operation,
    pub reason: Reason,
    pub key: PoolKey,
    pub overridden: bool,
    pub candidates: Vec<ExplainedCandidate>,
}

impl<C: Connector> Topology<C> {
    /// Resolve, classify and build candidates for `query` as a router would.
    /// Neither the memo nor the dataset observers are touched.
    pub fn explain(&self, query: &Query, memo: &WriteMemo, config: &RouterConfig) -> RouteResult<Explanation> {
        let table = query.table_name();
        let request = ResolveRequest {
            session_id: uuid::Uuid::nil(),
            query: query.sql(),
            table,
        };
        let (dataset, server_override) = self.choose_dataset(&request)?.into_parts();
        let class = classify_operation(query, memo);

        let mut rng = rand::thread_rng();
        let candidates = self
            .build_candidates(&dataset, class.operation, config.min_tries, &mut rng)?
            .into_iter()
            .map(|c| {
                let server = match &server_override {
                    Some(ov) => ov.apply(&c.server),
                    None => (*c.server).clone(),
                };
                ExplainedCandidate {
                    endpoint: server.endpoint(config.default_port),
                    priority: c.priority,
                    pass: c.pass,
                    lag_threshold: if class.operation.is_write() {
                        None
                    } else {
                        server.effective_lag_threshold(config.default_lag_threshold)
                    },
                    database: server.database,
                }
            })
            .collect();

        Ok(Explanation {
            key: PoolKey::new(dataset.as_str(), class.operation),
            dataset,
            table: table.map(str::to_string),
            operation: class.operation,
            reason: class.reason,
            overridden: server_override.is_some(),
            candidates,
        })
    }
}
