//! Replication-lag aware replica selection.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{lag_table, router, router_with, server, ScriptedConnector, StubProber};
use farm_router::health::LagReading;
use farm_router::hooks::LagProbe;
use farm_router::routing::{FailureReason, RouterConfig};
use farm_router::topology::{Operation, Topology};
use farm_router::Query;

fn read_farm(replicas: &[(u32, &str)], threshold: f64) -> Topology<ScriptedConnector> {
    let mut t = Topology::new();
    t.register_server("global", Operation::Write, 1, server("primary"));
    for (priority, host) in replicas {
        t.register_server(
            "global",
            Operation::Read,
            *priority,
            server(host).with_lag_threshold(threshold),
        );
    }
    t
}

#[test]
fn test_lagged_replica_skipped_while_alternative_exists() {
    for seed in 0..16 {
        let mut t = read_farm(&[(1, "slow"), (1, "fast")], 5.0);
        t.add_cached_lag_source(lag_table(&[("slow", 30.0), ("fast", 0.5)]));

        let (prober, _) = StubProber::new(&[]);
        let mut r = router(t, ScriptedConnector::new(), prober).with_seed(seed);

        let handle = r.route(&Query::new("SELECT * FROM users")).unwrap();
        assert_eq!(handle.endpoint().host, "fast", "seed {}", seed);
        assert_eq!(r.connector().attempts(), vec!["fast"]);
    }
}

#[test]
fn test_lagged_replica_used_when_nothing_else_left() {
    let mut t = read_farm(&[(1, "slow")], 5.0);
    t.add_cached_lag_source(lag_table(&[("slow", 30.0)]));

    let (prober, _) = StubProber::new(&[]);
    let mut r = router(t, ScriptedConnector::new(), prober);

    let handle = r.route(&Query::new("SELECT * FROM users")).unwrap();
    assert_eq!(handle.endpoint().host, "slow");
    assert_eq!(r.connector().attempts(), vec!["slow"]);
}

#[test]
fn test_lagged_replica_used_once_alternatives_fail() {
    let mut t = read_farm(&[(1, "slow"), (2, "broken")], 5.0);
    t.add_cached_lag_source(lag_table(&[("slow", 30.0)]));

    let (prober, _) = StubProber::new(&[]);
    let mut r = router(t, ScriptedConnector::new().refusing("broken"), prober);

    let handle = r.route(&Query::new("SELECT * FROM users")).unwrap();
    assert_eq!(handle.endpoint().host, "slow");

    // slow skipped twice, broken refused twice, then the lag-ignoring pass.
    assert_eq!(r.connector().attempts(), vec!["broken", "broken", "slow"]);
}

#[test]
fn test_all_lagged_prefers_best_priority_on_retry() {
    let mut t = read_farm(&[(1, "near"), (2, "far")], 5.0);
    t.add_cached_lag_source(lag_table(&[("near", 20.0), ("far", 40.0)]));

    let (prober, _) = StubProber::new(&[]);
    let mut r = router(t, ScriptedConnector::new(), prober);

    let handle = r.route(&Query::new("SELECT * FROM users")).unwrap();
    assert_eq!(handle.endpoint().host, "near");
    assert_eq!(r.connector().attempts(), vec!["near"]);
}

#[test]
fn test_exhaustion_after_lag_ignoring_pass_is_reported() {
    let mut t = read_farm(&[(1, "slow"), (2, "broken")], 5.0);
    t.add_cached_lag_source(lag_table(&[("slow", 30.0)]));

    let connector = ScriptedConnector::new().refusing("broken").refusing("slow");
    let (prober, _) = StubProber::new(&[]);
    let mut r = router(t, connector, prober);

    let err = r.route(&Query::new("SELECT * FROM users")).unwrap_err();
    let report = err.report().unwrap();
    assert!(report.lag_ignored);
    assert!(report
        .attempts
        .iter()
        .any(|a| a.reason == FailureReason::Lagged && a.lag.is_some()));
    assert!(report
        .attempts
        .iter()
        .any(|a| a.endpoint.host == "slow" && matches!(a.reason, FailureReason::Connect { .. })));
}

#[test]
fn test_unknown_lag_is_acceptable() {
    let mut t = read_farm(&[(1, "mystery")], 5.0);
    t.add_cached_lag_source(|_: &mut LagProbe<'_, ScriptedConnector>| Some(LagReading::Unknown));
    t.add_lag_source(|_: &mut LagProbe<'_, ScriptedConnector>| Some(LagReading::Unknown));

    let (prober, _) = StubProber::new(&[]);
    let mut r = router(t, ScriptedConnector::new(), prober);

    let handle = r.route(&Query::new("SELECT 1")).unwrap();
    assert_eq!(handle.endpoint().host, "mystery");
}

#[test]
fn test_no_threshold_disables_lag_checks() {
    let mut t = Topology::new();
    t.register_server("global", Operation::Read, 1, server("replica"));

    let calls = Arc::new(AtomicUsize::new(0));
    let (c1, c2) = (calls.clone(), calls.clone());
    t.add_cached_lag_source(move |_: &mut LagProbe<'_, ScriptedConnector>| {
        c1.fetch_add(1, Ordering::SeqCst);
        Some(LagReading::Seconds(1000.0))
    });
    t.add_lag_source(move |_: &mut LagProbe<'_, ScriptedConnector>| {
        c2.fetch_add(1, Ordering::SeqCst);
        Some(LagReading::Seconds(1000.0))
    });

    let (prober, _) = StubProber::new(&[]);
    let mut r = router(t, ScriptedConnector::new(), prober);
    r.route(&Query::new("SELECT 1")).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_default_threshold_applies_to_servers_without_one() {
    let mut t = Topology::new();
    t.register_server("global", Operation::Read, 1, server("slow"));
    t.register_server("global", Operation::Read, 2, server("fast"));
    t.add_cached_lag_source(lag_table(&[("slow", 30.0), ("fast", 0.0)]));

    let config = RouterConfig {
        default_lag_threshold: Some(10.0),
        ..Default::default()
    };
    let (prober, _) = StubProber::new(&[]);
    let mut r = router_with(t, ScriptedConnector::new(), prober, config);

    let handle = r.route(&Query::new("SELECT 1")).unwrap();
    assert_eq!(handle.endpoint().host, "fast");
}

#[test]
fn test_live_lag_checked_on_new_connection() {
    let mut t = read_farm(&[(1, "slow"), (2, "fast")], 5.0);

    let saw_connection = Arc::new(AtomicUsize::new(0));
    let seen = saw_connection.clone();
    let table = lag_table(&[("slow", 30.0), ("fast", 1.0)]);
    t.add_lag_source(move |probe: &mut LagProbe<'_, ScriptedConnector>| {
        if probe.connection.as_ref().is_some_and(|c| c.host == probe.endpoint.host) {
            seen.fetch_add(1, Ordering::SeqCst);
        }
        table(probe)
    });

    let (prober, _) = StubProber::new(&[]);
    let mut r = router(t, ScriptedConnector::new(), prober);

    let handle = r.route(&Query::new("SELECT 1")).unwrap();
    assert_eq!(handle.endpoint().host, "fast");
    assert_eq!(handle.conn().id, 2);

    assert_eq!(r.connector().attempts(), vec!["slow", "fast"]);
    assert_eq!(r.connector().closed(), vec![1]);
    assert_eq!(saw_connection.load(Ordering::SeqCst), 2);
}

#[test]
fn test_cached_ok_skips_live_check() {
    let mut t = read_farm(&[(1, "replica")], 5.0);
    t.add_cached_lag_source(lag_table(&[("replica", 1.0)]));

    let live_calls = Arc::new(AtomicUsize::new(0));
    let c = live_calls.clone();
    t.add_lag_source(move |_: &mut LagProbe<'_, ScriptedConnector>| {
        c.fetch_add(1, Ordering::SeqCst);
        Some(LagReading::Seconds(99.0))
    });

    let (prober, _) = StubProber::new(&[]);
    let mut r = router(t, ScriptedConnector::new(), prober);
    r.route(&Query::new("SELECT 1")).unwrap();
    assert_eq!(live_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_writes_ignore_lag() {
    let mut t = Topology::new();
    t.register_server(
        "global",
        Operation::Write,
        1,
        server("primary").with_lag_threshold(1.0),
    );
    t.add_cached_lag_source(lag_table(&[("primary", 50.0)]));

    let (prober, probes) = StubProber::new(&[]);
    let mut r = router(t, ScriptedConnector::new(), prober);

    let handle = r.route(&Query::new("UPDATE users SET a = 1")).unwrap();
    assert_eq!(handle.endpoint().host, "primary");
    assert!(probes.borrow().is_empty());
}

#[test]
fn test_lagged_endpoint_not_reconnected_within_one_walk() {
    let mut t = read_farm(&[(1, "slow"), (2, "broken")], 5.0);
    t.add_lag_source(lag_table(&[("slow", 30.0)]));

    let (prober, _) = StubProber::new(&[]);
    let mut r = router(t, ScriptedConnector::new().refusing("broken"), prober);

    let handle = r.route(&Query::new("SELECT * FROM users")).unwrap();
    assert_eq!(handle.endpoint().host, "slow");
    assert_eq!(handle.conn().id, 2);

    // First walk: slow connected once and found behind, its second slot skipped.
    // The lag-ignoring pass connects it again.
    assert_eq!(r.connector().attempts(), vec!["slow", "broken", "broken", "slow"]);
    assert_eq!(r.connector().closed(), vec![1]);
}

#[test]
fn test_known_lagged_endpoint_recorded_without_connecting() {
    let mut t = read_farm(&[(1, "slow"), (2, "broken")], 5.0);
    t.add_lag_source(lag_table(&[("slow", 30.0)]));

    let connector = ScriptedConnector::new().refusing("broken").refusing_select("slow");
    let (prober, _) = StubProber::new(&[]);
    let mut r = router(t, connector, prober);

    let err = r.route(&Query::new("SELECT * FROM users")).unwrap_err();
    let report = err.report().unwrap();
    let slow_lagged = report
        .attempts
        .iter()
        .filter(|a| a.endpoint.host == "slow" && a.reason == FailureReason::Lagged)
        .count();
    assert_eq!(slow_lagged, 2);

    // One connect in the lag-aware walk, one per slot in the lag-ignoring walk.
    assert_eq!(
        r.connector().connected().iter().filter(|h| *h == "slow").count(),
        3
    );
}
