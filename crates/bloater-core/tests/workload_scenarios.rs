//! End-to-end engine scenarios on a paused clock with a scripted transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use bloater_core::client::{Client, ClientSettings, Target};
use bloater_core::error::BloaterError;
use bloater_core::halt::Halt;
use bloater_core::retry::RetryPolicy;
use bloater_core::scheduler::WorkloadStage;
use bloater_core::stats::{names, StatsMgr};
use bloater_core::transport::TransportError;
use common::scripted::ScriptedTransport;

fn settings(tenant_id: u32, retry: RetryPolicy, workload: Vec<WorkloadStage>) -> ClientSettings {
    ClientSettings {
        tenant_id,
        target: Target {
            address: "127.0.0.1".to_string(),
            port: 8080,
        },
        request_timeout: Duration::from_secs(1),
        retry,
        workload,
    }
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        factor: 2,
        base: Duration::from_millis(10),
        max_interval: Duration::from_secs(1),
    }
}

fn stage(rps: u32, millis: u64) -> WorkloadStage {
    WorkloadStage::new(rps, Duration::from_millis(millis))
}

#[tokio::test(start_paused = true)]
async fn ten_rps_for_one_second_all_success() {
    let stats = Arc::new(StatsMgr::new());
    let transport = ScriptedTransport::always(Ok(200));
    let client = Client::new(
        settings(0, fast_retry(2), vec![stage(10, 1000)]),
        stats.clone(),
        transport.clone(),
        Halt::new(),
    );

    let report = client.run().await.expect("run");
    client.drain().await;

    assert_eq!(report.total_ticks(), 10);
    assert_eq!(transport.call_count(), 10);
    assert_eq!(stats.counter(names::RQ_SUCCESS_COUNT, 0), 10);
    assert_eq!(stats.counter(names::RQ_TOTAL_COUNT, 0), 10);
    assert_eq!(stats.counter(names::RQ_RETRY_COUNT, 0), 0);
    assert_eq!(stats.point_count(names::RPS, 0), 10);
    assert!(stats.series(names::RPS, 0).iter().all(|p| p.value == 10.0));
    assert_eq!(client.requests_issued(), 10);
}

#[tokio::test(start_paused = true)]
async fn ticks_are_evenly_spaced_and_stop_at_the_deadline() {
    let transport = ScriptedTransport::always(Ok(200));
    let client = Client::new(
        settings(0, fast_retry(0), vec![stage(4, 1000)]),
        Arc::new(StatsMgr::new()),
        transport.clone(),
        Halt::new(),
    );
    let start = tokio::time::Instant::now();
    client.run().await.unwrap();
    client.drain().await;

    let offsets: Vec<Duration> = transport.calls().iter().map(|t| *t - start).collect();
    assert_eq!(
        offsets,
        vec![
            Duration::from_millis(250),
            Duration::from_millis(500),
            Duration::from_millis(750),
            Duration::from_millis(1000),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn trigger_count_matches_rate_times_duration() {
    for (rps, millis) in [(1, 3000), (3, 1000), (7, 1000), (4, 2500), (25, 400), (100, 1000)] {
        let transport = ScriptedTransport::always(Ok(200));
        let s = stage(rps, millis);
        let client = Client::new(
            settings(0, fast_retry(0), vec![s]),
            Arc::new(StatsMgr::new()),
            transport.clone(),
            Halt::new(),
        );
        let report = client.run().await.unwrap();
        client.drain().await;

        let expected = (millis as f64 / (1000.0 / rps as f64)).round() as i64;
        let ticks = report.total_ticks() as i64;
        assert!(
            (ticks - expected).abs() <= 1,
            "rps {} for {}ms: {} ticks, expected {}",
            rps,
            millis,
            ticks,
            expected
        );
        assert_eq!(transport.call_count() as i64, ticks);
    }
}

#[tokio::test(start_paused = true)]
async fn five_rps_all_overloaded_exhausts_each_chain() {
    let stats = Arc::new(StatsMgr::new());
    let transport = ScriptedTransport::always(Ok(503));
    let client = Client::new(
        settings(0, fast_retry(2), vec![stage(5, 1000)]),
        stats.clone(),
        transport.clone(),
        Halt::new(),
    );

    let report = client.run().await.expect("overload is never fatal");
    client.drain().await;

    assert_eq!(report.total_ticks(), 5);
    // Each of the 5 chains sends attempts 0, 1 and 2.
    assert_eq!(transport.call_count(), 15);
    assert_eq!(stats.counter(names::RQ_RETRY_COUNT, 0), 10);
    assert_eq!(stats.counter(names::RQ_FAILURE_COUNT, 0), 15);
    assert_eq!(stats.counter(names::RQ_TOTAL_COUNT, 0), 15);
    assert_eq!(stats.point_count(names::RQ_OVERLOAD, 0), 15);
    assert_eq!(stats.counter(names::RQ_SUCCESS_COUNT, 0), 0);
    assert!(!client.halt().is_raised());
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn timeout_responses_are_not_retried_by_the_engine() {
    let stats = Arc::new(StatsMgr::new());
    let transport = ScriptedTransport::always(Ok(504));
    let client = Client::new(
        settings(0, fast_retry(3), vec![stage(5, 1000)]),
        stats.clone(),
        transport.clone(),
        Halt::new(),
    );
    client.run().await.unwrap();
    client.drain().await;

    assert_eq!(transport.call_count(), 5);
    assert_eq!(stats.point_count(names::RQ_TIMEOUT, 0), 5);
    assert_eq!(stats.point_count(names::RQ_TIMEOUT_ORIGIN, 0), 5);
    assert_eq!(stats.counter(names::RQ_RETRY_COUNT, 0), 0);
}

#[tokio::test(start_paused = true)]
async fn transport_timeouts_are_retried_by_the_engine() {
    let stats = Arc::new(StatsMgr::new());
    let transport = ScriptedTransport::always(Err(TransportError::Timeout));
    let client = Client::new(
        settings(0, fast_retry(1), vec![stage(5, 1000)]),
        stats.clone(),
        transport.clone(),
        Halt::new(),
    );
    client.run().await.unwrap();
    client.drain().await;

    assert_eq!(transport.call_count(), 10);
    assert_eq!(stats.counter(names::RQ_TIMEOUT_COUNT, 0), 10);
    assert_eq!(stats.counter(names::RQ_RETRY_COUNT, 0), 5);
}

#[tokio::test(start_paused = true)]
async fn unmodeled_status_halts_the_tenant() {
    let stats = Arc::new(StatsMgr::new());
    let transport = ScriptedTransport::script(vec![Ok(201)], Ok(200));
    let client = Client::new(
        settings(3, fast_retry(2), vec![stage(10, 1000), stage(10, 1000)]),
        stats.clone(),
        transport.clone(),
        Halt::new(),
    );

    let err = client.run().await.unwrap_err();
    assert_eq!(
        err,
        BloaterError::UnmodeledStatus {
            tenant: 3,
            request_id: "3-1".to_string(),
            status: 201,
        }
    );
    client.drain().await;
    assert_eq!(transport.call_count(), 1);
    assert_eq!(client.requests_issued(), 1);
    assert_eq!(stats.counter(names::RQ_TOTAL_COUNT, 3), 1);
}

#[tokio::test(start_paused = true)]
async fn zero_rate_is_reported_before_sending() {
    let transport = ScriptedTransport::always(Ok(200));
    let client = Client::new(
        settings(0, fast_retry(2), vec![stage(5, 1000), stage(0, 1000), stage(5, 1000)]),
        Arc::new(StatsMgr::new()),
        transport.clone(),
        Halt::new(),
    );
    let err = client.run().await.unwrap_err();
    assert_eq!(err, BloaterError::InvalidRate { stage: 1 });
    client.drain().await;
    // Only the first stage sent anything.
    assert_eq!(transport.call_count(), 5);

    let transport = ScriptedTransport::always(Ok(200));
    let client = Client::new(
        settings(0, fast_retry(2), vec![stage(0, 1000)]),
        Arc::new(StatsMgr::new()),
        transport.clone(),
        Halt::new(),
    );
    assert_eq!(client.run().await.unwrap_err(), BloaterError::InvalidRate { stage: 0 });
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn sub_nanosecond_spacing_is_an_invalid_rate() {
    let transport = ScriptedTransport::always(Ok(200));
    let client = Client::new(
        settings(0, fast_retry(2), vec![stage(2_000_000_000, 1000)]),
        Arc::new(StatsMgr::new()),
        transport.clone(),
        Halt::new(),
    );
    assert_eq!(client.run().await.unwrap_err(), BloaterError::InvalidRate { stage: 0 });
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn tail_retries_overlap_the_next_stage() {
    let stats = Arc::new(StatsMgr::new());
    // Stage 1's only request is overloaded; everything after succeeds.
    let transport = ScriptedTransport::script(vec![Ok(503)], Ok(200));
    let retry = RetryPolicy {
        max_attempts: 1,
        factor: 2,
        base: Duration::from_millis(500),
        max_interval: Duration::from_secs(2),
    };
    let client = Client::new(
        settings(0, retry, vec![stage(1, 1000), stage(10, 1000)]),
        stats.clone(),
        transport.clone(),
        Halt::new(),
    );

    let report = client.run().await.unwrap();
    client.drain().await;

    assert_eq!(report.stages[0].ticks, 1);
    assert_eq!(report.stages[0].in_flight_at_end, 1, "stage 1 retry still pending");
    assert_eq!(report.stages[1].ticks, 10);

    let calls = transport.calls();
    // 1 stage-1 request, 10 stage-2 requests, 1 retry.
    assert_eq!(calls.len(), 12);
    // Stage 2 ticked (100ms in) before the retry's 500ms+ backoff elapsed.
    assert!(calls[1] - calls[0] < Duration::from_millis(500));
    assert_eq!(stats.counter(names::RQ_RETRY_COUNT, 0), 1);
    assert_eq!(stats.counter(names::RQ_SUCCESS_COUNT, 0), 11);
}

#[tokio::test(start_paused = true)]
async fn shared_halt_stops_every_tenant() {
    let halt = Halt::new();
    let bad = ScriptedTransport::always(Ok(201));
    let good = ScriptedTransport::always(Ok(200));
    let stats = Arc::new(StatsMgr::new());
    let a = Client::new(
        settings(1, fast_retry(2), vec![stage(10, 1000)]),
        stats.clone(),
        bad.clone(),
        halt.clone(),
    );
    let b = Client::new(
        settings(2, fast_retry(2), vec![stage(10, 1000)]),
        stats.clone(),
        good.clone(),
        halt.clone(),
    );

    let (ra, rb) = tokio::join!(a.run(), b.run());
    a.drain().await;
    b.drain().await;

    let expected = BloaterError::UnmodeledStatus {
        tenant: 1,
        request_id: "1-1".to_string(),
        status: 201,
    };
    assert_eq!(ra.unwrap_err(), expected);
    assert_eq!(rb.unwrap_err(), expected);
    assert_eq!(bad.call_count(), 1);
    assert!(good.call_count() <= 1);
}

#[tokio::test(start_paused = true)]
async fn separate_halts_isolate_tenants() {
    let bad = ScriptedTransport::always(Ok(201));
    let good = ScriptedTransport::always(Ok(200));
    let stats = Arc::new(StatsMgr::new());
    let a = Client::new(
        settings(1, fast_retry(2), vec![stage(10, 1000)]),
        stats.clone(),
        bad.clone(),
        Halt::new(),
    );
    let b = Client::new(
        settings(2, fast_retry(2), vec![stage(10, 1000)]),
        stats.clone(),
        good.clone(),
        Halt::new(),
    );

    let (ra, rb) = tokio::join!(a.run(), b.run());
    b.drain().await;

    assert!(ra.is_err());
    assert_eq!(rb.unwrap().total_ticks(), 10);
    assert_eq!(good.call_count(), 10);
    assert_eq!(stats.counter(names::RQ_SUCCESS_COUNT, 2), 10);
}
