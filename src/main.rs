//! farm-router command line.
//!
//! Offline tooling around a farm configuration: validate it, explain how a
//! query would be routed, and probe every configured endpoint.

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use serde::Serialize;

use farm_router::config::{load_config, FarmConfig};
use farm_router::health::{HealthProber, ProbeCache, ProbeOutcome, Prober};
use farm_router::observability::logging::init_logging;
use farm_router::routing::WriteMemo;
use farm_router::topology::{Endpoint, Operation, Topology};
use farm_router::{Connector, ConnectorError, Query};

#[derive(Parser)]
#[command(name = "farm-router")]
#[command(about = "Inspect and test a database farm routing configuration", long_about = None)]
struct Cli {
    /// Path to the farm configuration (TOML).
    #[arg(short, long, default_value = "farm.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and summarize the topology
    Check,
    /// Show how a query would be routed, without connecting
    Explain {
        /// SQL text
        sql: String,
        /// Table name, instead of guessing it from the SQL
        #[arg(long)]
        table: Option<String>,
        /// Force routing to the primary
        #[arg(long)]
        master: bool,
        /// Tables already written in this session
        #[arg(long = "written", value_delimiter = ',')]
        written: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// TCP-probe every configured endpoint
    Probe {
        #[arg(long)]
        json: bool,
    },
}

/// Placeholder connector for offline commands; it never connects.
struct Offline;

impl Connector for Offline {
    type Conn = Infallible;

    fn connect(&self, endpoint: &Endpoint, _: &str, _: &str, _: Duration) -> Result<Infallible, ConnectorError> {
        Err(ConnectorError::new(format!("offline: not connecting to {}", endpoint)))
    }

    fn ping(&self, conn: &mut Infallible) -> bool {
        match *conn {}
    }

    fn select_db(&self, conn: &mut Infallible, _: &str) -> bool {
        match *conn {}
    }

    fn close(&self, conn: Infallible) -> bool {
        match conn {}
    }
}

#[derive(Serialize)]
struct ProbeRow {
    endpoint: Endpoint,
    datasets: BTreeSet<String>,
    reachable: bool,
    detail: Option<String>,
    elapsed_ms: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    if let Err(e) = init_logging(&config.observability) {
        eprintln!("warning: logging not initialized: {}", e);
    }

    match cli.command {
        Commands::Check => check(&config),
        Commands::Explain {
            sql,
            table,
            master,
            written,
            json,
        } => {
            let mut query = Query::new(sql);
            if let Some(table) = table {
                query = query.table(table);
            }
            if master {
                query = query.force_master();
            }
            let mut memo = WriteMemo::new();
            for table in &written {
                memo.mark(table);
            }
            explain(&config, &query, &memo, json)
        }
        Commands::Probe { json } => probe(&config, json),
    }
}

fn check(config: &FarmConfig) -> Result<(), Box<dyn std::error::Error>> {
    let topology: Topology<Offline> = config.build_topology();
    let router = config.router_config();

    println!("configuration OK");
    println!(
        "  max_connections={} persistent={} min_tries={} default_lag_threshold={}",
        router.pool.max_connections,
        router.pool.persistent,
        router.min_tries,
        router
            .default_lag_threshold
            .map(|t| format!("{}s", t))
            .unwrap_or_else(|| "off".to_string())
    );
    for dataset in topology.datasets() {
        println!("dataset {}", dataset);
        for operation in [Operation::Write, Operation::Read] {
            for (priority, server) in topology.servers(dataset, operation) {
                println!(
                    "  {:<5} p{:<3} {} db={}",
                    operation.as_str(),
                    priority,
                    server.endpoint(router.default_port),
                    server.database
                );
            }
        }
        if !topology.has_servers(dataset, Operation::Write) {
            println!("  warning: no write servers");
        }
    }
    for (table, dataset) in &config.tables {
        println!("table {} -> {}", table, dataset);
    }
    Ok(())
}

fn explain(
    config: &FarmConfig,
    query: &Query,
    memo: &WriteMemo,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let topology: Topology<Offline> = config.build_topology();
    let explanation = topology.explain(query, memo, &config.router_config())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&explanation)?);
        return Ok(());
    }

    println!(
        "dataset={} table={} operation={} ({:?}) key={}",
        explanation.dataset,
        explanation.table.as_deref().unwrap_or("-"),
        explanation.operation,
        explanation.reason,
        explanation.key
    );
    for (i, c) in explanation.candidates.iter().enumerate() {
        println!(
            "  {:>2}. pass {} p{} {} db={} lag<={}",
            i + 1,
            c.pass,
            c.priority,
            c.endpoint,
            c.database,
            c.lag_threshold
                .map(|t| format!("{}s", t))
                .unwrap_or_else(|| "-".to_string())
        );
    }
    Ok(())
}

fn probe(config: &FarmConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let router = config.router_config();
    let prober = HealthProber::with_cache(ProbeCache::new().into(), Duration::ZERO);

    let mut endpoints: Vec<(Endpoint, Duration, BTreeSet<String>)> = Vec::new();
    for server in &config.servers {
        let descriptor = server.descriptor();
        let endpoint = descriptor.endpoint(router.default_port);
        match endpoints.iter_mut().find(|(e, _, _)| *e == endpoint) {
            Some((_, _, datasets)) => {
                datasets.insert(server.dataset.clone());
            }
            None => endpoints.push((
                endpoint,
                descriptor.timeout(router.default_connect_timeout),
                BTreeSet::from([server.dataset.clone()]),
            )),
        }
    }

    let rows: Vec<ProbeRow> = endpoints
        .into_iter()
        .map(|(endpoint, timeout, datasets)| {
            let started = Instant::now();
            let outcome = prober.probe(&endpoint, timeout);
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let (reachable, detail) = match outcome {
                ProbeOutcome::Reachable => (true, None),
                ProbeOutcome::Unreachable(detail) => (false, Some(detail)),
            };
            ProbeRow {
                endpoint,
                datasets,
                reachable,
                detail,
                elapsed_ms,
            }
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for row in &rows {
        let datasets: Vec<&str> = row.datasets.iter().map(String::as_str).collect();
        match &row.detail {
            None => println!("UP    {} ({} ms) [{}]", row.endpoint, row.elapsed_ms, datasets.join(",")),
            Some(detail) => println!("DOWN  {} [{}] {}", row.endpoint, datasets.join(","), detail),
        }
    }
    Ok(())
}
