//! Requests answered by the built-in `testdata` and `math` executors.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tsdb_core::{builtin_handler, Request, SchedulerConfig, TsdbError};

fn request(json: &str) -> Request {
    Request::from_json(json).unwrap()
}

#[tokio::test]
async fn math_combines_two_testdata_series() {
    let req = request(
        r##"{
            "maxDataPoints": 5,
            "queries": [
                {"refId": "A", "query": "constant 6", "datasource": {"id": 1, "type": "testdata"}},
                {"refId": "B", "query": "constant 3", "datasource": {"id": 2, "type": "testdata"}},
                {"refId": "C", "query": "#A / #B", "depends": ["A", "B"],
                 "datasource": {"id": 3, "type": "math"}}
            ]
        }"##,
    );
    let res = builtin_handler(SchedulerConfig::default()).handle(req).await.unwrap();

    assert_eq!(res.batch_timings.len(), 3);
    let c = &res.results["C"];
    assert!(!c.is_error(), "{:?}", c.error);
    assert_eq!(c.series[0].name, "#A / #B");
    assert_eq!(c.series[0].points.len(), 5);
    assert!(c.series[0].points.iter().all(|p| p.value == Some(2.0)));
    // Timestamps come from A.
    let a_ts: Vec<i64> = res.results["A"].series[0].points.iter().map(|p| p.timestamp_ms).collect();
    let c_ts: Vec<i64> = c.series[0].points.iter().map(|p| p.timestamp_ms).collect();
    assert_eq!(a_ts, c_ts);
}

#[tokio::test]
async fn failed_input_fails_only_the_expression() {
    let req = request(
        r##"{
            "queries": [
                {"refId": "A", "query": "error upstream down", "datasource": {"id": 1, "type": "testdata"}},
                {"refId": "B", "query": "random_walk", "datasource": {"id": 1, "type": "testdata"}},
                {"refId": "C", "query": "#A * 2", "depends": ["A"], "datasource": {"id": 2, "type": "math"}}
            ]
        }"##,
    );
    let res = builtin_handler(SchedulerConfig::default()).handle(req).await.unwrap();

    assert_eq!(res.results["A"].error.as_deref(), Some("backend error: upstream down"));
    assert!(!res.results["B"].is_error());
    assert_eq!(
        res.results["C"].error.as_deref(),
        Some("dependency A failed: backend error: upstream down")
    );
    assert_eq!(res.errors().count(), 2);
}

#[tokio::test]
async fn random_walk_is_deterministic_per_ref_id() {
    let json = r##"{
        "maxDataPoints": 20,
        "queries": [{"refId": "A", "datasource": {"id": 1, "type": "testdata"}}]
    }"##;
    let handler = builtin_handler(SchedulerConfig::default());
    let first = handler.handle(request(json)).await.unwrap();
    let second = handler.handle(request(json)).await.unwrap();

    let values = |r: &tsdb_core::Response| -> Vec<Option<f64>> {
        r.results["A"].series[0].points.iter().map(|p| p.value).collect()
    };
    assert_eq!(values(&first).len(), 20);
    assert_eq!(values(&first), values(&second));
}

#[tokio::test]
async fn default_max_data_points_applies_without_request_value() {
    let json = r##"{"queries": [{"refId": "A", "query": "constant 1", "datasource": {"id": 1, "type": "testdata"}}]}"##;
    let config = SchedulerConfig {
        default_max_data_points: 7,
        ..Default::default()
    };
    let res = builtin_handler(config).handle(request(json)).await.unwrap();
    assert_eq!(res.results["A"].series[0].points.len(), 7);
}

#[tokio::test]
async fn unknown_data_source_type_is_rejected() {
    let json = r##"{"queries": [{"refId": "A", "datasource": {"id": 1, "type": "graphite"}}]}"##;
    let err = builtin_handler(SchedulerConfig::default())
        .handle(request(json))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No executor registered for data source type: graphite");
    assert!(err.is_validation());
}

#[tokio::test]
async fn slow_scenario_hits_request_timeout() {
    let json = r##"{"queries": [{"refId": "A", "query": "sleep 10000", "datasource": {"id": 1, "type": "testdata"}}]}"##;
    let config = SchedulerConfig {
        request_timeout: Some(Duration::from_millis(100)),
        ..Default::default()
    };

    let started = Instant::now();
    let err = builtin_handler(config).handle(request(json)).await.unwrap_err();
    assert!(matches!(err, TsdbError::Timeout { timeout_ms: 100 }));
    assert!(err.is_warning());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn cancellation_interrupts_sleeping_scenario() {
    let json = r##"{
        "queries": [
            {"refId": "A", "query": "sleep 10000", "datasource": {"id": 1, "type": "testdata"}},
            {"refId": "B", "query": "#A + 1", "depends": ["A"], "datasource": {"id": 2, "type": "math"}}
        ]
    }"##;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = builtin_handler(SchedulerConfig::default())
        .handle_with_cancel(request(json), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, TsdbError::Cancelled { pending: 1, in_flight: 1 }));
}

#[tokio::test]
async fn expression_must_declare_every_reference() {
    // A finishes long before C is dispatched, but C only declares X.
    let req = request(
        r##"{
            "queries": [
                {"refId": "A", "query": "constant 1", "datasource": {"id": 1, "type": "testdata"}},
                {"refId": "X", "query": "sleep 50", "datasource": {"id": 2, "type": "testdata"}},
                {"refId": "C", "query": "#A * 2", "depends": ["X"], "datasource": {"id": 3, "type": "math"}}
            ]
        }"##,
    );
    let res = builtin_handler(SchedulerConfig::default()).handle(req).await.unwrap();

    assert!(!res.results["A"].is_error());
    assert_eq!(
        res.results["C"].error.as_deref(),
        Some("invalid query: #A is not declared in depends")
    );
}

#[tokio::test]
async fn oversized_max_data_points_is_capped() {
    let json = r##"{
        "maxDataPoints": 250000,
        "queries": [{"refId": "A", "query": "constant 1", "datasource": {"id": 1, "type": "testdata"}}]
    }"##;
    let res = builtin_handler(SchedulerConfig::default()).handle(request(json)).await.unwrap();
    assert_eq!(
        res.results["A"].series[0].points.len(),
        tsdb_core::executor::MAX_DATA_POINTS_CEILING as usize
    );
}
