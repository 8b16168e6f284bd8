//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use farm_router::health::{LagReading, ProbeOutcome, Prober};
use farm_router::hooks::LagProbe;
use farm_router::routing::{Router, RouterConfig};
use farm_router::topology::{Endpoint, ServerDescriptor, Topology};
use farm_router::{Connector, ConnectorError};

/// Connection handed out by [`ScriptedConnector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeConn {
    pub id: u32,
    pub host: String,
}

/// Everything the router asked the connector to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect(String),
    Refused(String),
    SessionOptions(u32),
    Select(u32, String),
    Ping(u32),
    Close(u32),
}

/// In-memory connector with per-host failure scripts.
#[derive(Default)]
pub struct ScriptedConnector {
    refuse: RefCell<HashSet<String>>,
    refuse_select: RefCell<HashSet<String>>,
    dead: RefCell<HashSet<u32>>,
    next_id: Cell<u32>,
    log: RefCell<Vec<Event>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects to `host` fail.
    pub fn refusing(self, host: &str) -> Self {
        self.refuse.borrow_mut().insert(host.to_string());
        self
    }

    /// Database selection on `host` fails.
    pub fn refusing_select(self, host: &str) -> Self {
        self.refuse_select.borrow_mut().insert(host.to_string());
        self
    }

    pub fn refuse_now(&self, host: &str) {
        self.refuse.borrow_mut().insert(host.to_string());
    }

    /// Make the connection `id` fail its next pings.
    pub fn kill(&self, id: u32) {
        self.dead.borrow_mut().insert(id);
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.borrow().clone()
    }

    /// Hosts of every physical connect attempt, successful or not.
    pub fn attempts(&self) -> Vec<String> {
        self.log
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Connect(h) | Event::Refused(h) => Some(h.clone()),
                _ => None,
            })
            .collect()
    }

    /// Hosts of successful connects.
    pub fn connected(&self) -> Vec<String> {
        self.log
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Connect(h) => Some(h.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn closed(&self) -> Vec<u32> {
        self.log
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Close(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn selects(&self) -> Vec<String> {
        self.log
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Select(_, db) => Some(db.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Connector for ScriptedConnector {
    type Conn = FakeConn;

    fn connect(&self, endpoint: &Endpoint, _user: &str, _credential: &str, _timeout: Duration) -> Result<FakeConn, ConnectorError> {
        if self.refuse.borrow().contains(&endpoint.host) {
            self.log.borrow_mut().push(Event::Refused(endpoint.host.clone()));
            return Err(ConnectorError::with_code(2003, format!("Can't connect to MySQL server on '{}'", endpoint)));
        }
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.log.borrow_mut().push(Event::Connect(endpoint.host.clone()));
        Ok(FakeConn {
            id,
            host: endpoint.host.clone(),
        })
    }

    fn ping(&self, conn: &mut FakeConn) -> bool {
        self.log.borrow_mut().push(Event::Ping(conn.id));
        !self.dead.borrow().contains(&conn.id)
    }

    fn select_db(&self, conn: &mut FakeConn, database: &str) -> bool {
        self.log.borrow_mut().push(Event::Select(conn.id, database.to_string()));
        !self.refuse_select.borrow().contains(&conn.host)
    }

    fn close(&self, conn: FakeConn) -> bool {
        self.log.borrow_mut().push(Event::Close(conn.id));
        true
    }

    fn set_session_options(&self, conn: &mut FakeConn) -> Result<(), ConnectorError> {
        self.log.borrow_mut().push(Event::SessionOptions(conn.id));
        Ok(())
    }
}

/// Prober that reports a fixed set of hosts as down and records every call.
pub struct StubProber {
    down: HashSet<String>,
    calls: Rc<RefCell<Vec<String>>>,
}

impl StubProber {
    pub fn new(down: &[&str]) -> (Self, Rc<RefCell<Vec<String>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let prober = Self {
            down: down.iter().map(|h| h.to_string()).collect(),
            calls: calls.clone(),
        };
        (prober, calls)
    }
}

impl Prober for StubProber {
    fn probe(&self, endpoint: &Endpoint, _timeout: Duration) -> ProbeOutcome {
        self.calls.borrow_mut().push(endpoint.host.clone());
        if self.down.contains(&endpoint.host) {
            ProbeOutcome::Unreachable("stub: connection refused".into())
        } else {
            ProbeOutcome::Reachable
        }
    }
}

/// Lag source answering from a fixed host → seconds table. Unlisted hosts get no answer.
pub fn lag_table(
    entries: &[(&str, f64)],
) -> impl Fn(&mut LagProbe<'_, ScriptedConnector>) -> Option<LagReading> + Send + Sync {
    let table: HashMap<String, f64> = entries.iter().map(|(h, s)| (h.to_string(), *s)).collect();
    move |probe: &mut LagProbe<'_, ScriptedConnector>| {
        table.get(&probe.endpoint.host).map(|s| LagReading::Seconds(*s))
    }
}

pub fn server(host: &str) -> ServerDescriptor {
    ServerDescriptor::new(host, "app", "secret", "main")
}

pub fn router(
    topology: Topology<ScriptedConnector>,
    connector: ScriptedConnector,
    prober: StubProber,
) -> Router<ScriptedConnector> {
    router_with(topology, connector, prober, RouterConfig::default())
}

pub fn router_with(
    topology: Topology<ScriptedConnector>,
    connector: ScriptedConnector,
    prober: StubProber,
    config: RouterConfig,
) -> Router<ScriptedConnector> {
    Router::new(Arc::new(topology), connector, config)
        .with_prober(prober)
        .with_seed(42)
}
