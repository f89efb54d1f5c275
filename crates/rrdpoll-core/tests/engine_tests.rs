//! End-to-end engine tests against an in-process stub agent
//!
//! These run the real event loop with real loopback sockets; timing
//! assertions are kept coarse on purpose.

use rrdpoll_core::engine::{Engine, EngineOptions};
use rrdpoll_core::oid::Oid;
use rrdpoll_core::persist::{CycleRecord, RecordingPersist};
use rrdpoll_core::poll::{PollGroup, PollItem, QuerySpec, SampleValue};
use rrdpoll_core::snmp::{SnmpValue, SnmpVersion};
use rrdpoll_core::testing::{StubAgent, StubBehavior, table};
use std::time::Duration;

const UPTIME: &str = "1.3.6.1.2.1.1.3.0";
const SYSNAME: &str = "1.3.6.1.2.1.1.5.0";
const IF_DESCR: &str = "1.3.6.1.2.1.2.2.1.2";
const IF_IN_OCTETS: &str = "1.3.6.1.2.1.2.2.1.10";

fn oid(text: &str) -> Oid {
    Oid::parse(text).unwrap()
}

fn item_to(port: u16, field: &str, field_oid: &str) -> PollItem {
    let mut item = PollItem::new(
        field,
        vec!["127.0.0.1".to_string()],
        "public",
        SnmpVersion::V2c,
        oid(field_oid),
    );
    item.port = port;
    item
}

fn group_of(interval_ms: u64, timeout_ms: u64, items: Vec<PollItem>) -> PollGroup {
    let mut group = PollGroup::new(interval_ms, timeout_ms, Vec::new());
    group.items = items;
    group
}

async fn engine_with(groups: Vec<PollGroup>) -> (Engine, RecordingPersist) {
    let recorder = RecordingPersist::new();
    let engine = Engine::new(
        EngineOptions::for_tests(),
        groups,
        Box::new(recorder.clone()),
    )
    .await
    .unwrap();
    (engine, recorder)
}

/// Run the engine until the recorder holds `want` cycles or the deadline
/// passes, then stop it and return what was persisted.
async fn run_until_cycles(
    mut engine: Engine,
    recorder: &RecordingPersist,
    want: usize,
    deadline: Duration,
) -> Vec<CycleRecord> {
    let stop = engine.stop_handle();
    let watch = recorder.clone();
    let watcher = tokio::spawn(async move {
        let started = std::time::Instant::now();
        while watch.records().len() < want && started.elapsed() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        stop.stop();
    });

    engine.run().await.unwrap();
    watcher.await.unwrap();
    engine.shutdown();
    recorder.records()
}

#[tokio::test]
async fn single_field_poll_records_the_value() {
    let agent = StubAgent::start(
        table(&[(UPTIME, SnmpValue::TimeTicks(123_456))]),
        StubBehavior {
            delay: Some(Duration::from_millis(20)),
            ..StubBehavior::default()
        },
    )
    .await;

    let group = group_of(1000, 2000, vec![item_to(agent.port(), "uptime", UPTIME)]);
    let (engine, recorder) = engine_with(vec![group]).await;
    let records = run_until_cycles(engine, &recorder, 1, Duration::from_secs(5)).await;

    assert!(!records.is_empty(), "no cycle persisted");
    let record = &records[0];
    assert_eq!(record.samples.len(), 1);
    assert_eq!(record.samples[0].0, "uptime");
    assert_eq!(record.samples[0].1, SampleValue::Integer(123_456));
    // The item's completion stamp is set and no earlier than the group's start
    assert!(record.samples[0].2 > 0);
    assert!(agent.requests_seen() >= 1);
}

#[tokio::test]
async fn items_sharing_a_host_batch_into_one_packet() {
    let agent = StubAgent::start(
        table(&[
            (UPTIME, SnmpValue::TimeTicks(10)),
            (SYSNAME, SnmpValue::OctetString(b"core1".to_vec())),
        ]),
        StubBehavior::default(),
    )
    .await;

    let group = group_of(
        2000,
        1000,
        vec![
            item_to(agent.port(), "uptime", UPTIME),
            item_to(agent.port(), "name", SYSNAME),
        ],
    );
    let (engine, recorder) = engine_with(vec![group]).await;
    let records = run_until_cycles(engine, &recorder, 1, Duration::from_secs(5)).await;

    assert!(!records.is_empty());
    // Both bindings traveled in a single PDU
    assert_eq!(agent.requests_seen(), 1);
    let samples = &records[0].samples;
    assert_eq!(samples[0].1, SampleValue::Integer(10));
    // A string value cannot be sampled and records as unset
    assert_eq!(samples[1].1, SampleValue::Unset);
}

#[tokio::test]
async fn silent_agent_times_out_after_retries() {
    let agent = StubAgent::start(
        table(&[(UPTIME, SnmpValue::TimeTicks(1))]),
        StubBehavior {
            silent: true,
            ..StubBehavior::default()
        },
    )
    .await;

    // interval > 2 s picks the 600 ms retry spacing; the timeout lands at
    // 3 * 600 + 300 ms, before the next cycle
    let group = group_of(2500, 300, vec![item_to(agent.port(), "uptime", UPTIME)]);
    let (engine, recorder) = engine_with(vec![group]).await;
    let records = run_until_cycles(engine, &recorder, 1, Duration::from_secs(6)).await;

    assert!(!records.is_empty());
    assert_eq!(records[0].samples[0].1, SampleValue::Unset);
    // Initial send plus three retries
    assert_eq!(agent.requests_seen(), 4);
}

fn query_item(port: u16) -> PollItem {
    let mut item = item_to(port, "eth0_in", IF_IN_OCTETS);
    item.query = Some(QuerySpec {
        oid: oid(IF_DESCR),
        match_text: Some("eth0".to_string()),
    });
    item
}

fn if_table() -> std::collections::BTreeMap<Oid, SnmpValue> {
    table(&[
        ("1.3.6.1.2.1.2.2.1.2.1", SnmpValue::OctetString(b"lo".to_vec())),
        ("1.3.6.1.2.1.2.2.1.2.2", SnmpValue::OctetString(b"eth0".to_vec())),
        ("1.3.6.1.2.1.2.2.1.2.3", SnmpValue::OctetString(b"eth1".to_vec())),
        ("1.3.6.1.2.1.2.2.1.10.2", SnmpValue::Counter32(991)),
        ("1.3.6.1.2.1.2.2.1.10.3", SnmpValue::Counter32(777)),
    ])
}

#[tokio::test]
async fn table_lookup_walks_then_pairs() {
    let agent = StubAgent::start(if_table(), StubBehavior::default()).await;

    let group = group_of(700, 500, vec![query_item(agent.port())]);
    let (engine, recorder) = engine_with(vec![group]).await;
    let records = run_until_cycles(engine, &recorder, 2, Duration::from_secs(6)).await;

    assert!(records.len() >= 2);
    // Both cycles read ifInOctets.2 for the row whose ifDescr is eth0
    assert_eq!(records[0].samples[0].1, SampleValue::Integer(991));
    assert_eq!(records[1].samples[0].1, SampleValue::Integer(991));

    // First cycle: two GetNext steps plus the value read (3 packets).
    // Second cycle: one paired Get re-checking the remembered row.
    assert_eq!(agent.requests_seen(), 4);
}

#[tokio::test]
async fn moved_table_row_cancels_the_paired_read_and_research_finds_it() {
    let agent = StubAgent::start(if_table(), StubBehavior::default()).await;

    let group = group_of(700, 500, vec![query_item(agent.port())]);
    let recorder = RecordingPersist::new();
    let mut engine = Engine::new(
        EngineOptions::for_tests(),
        vec![group],
        Box::new(recorder.clone()),
    )
    .await
    .unwrap();

    let stop = engine.stop_handle();
    let watch = recorder.clone();
    let values = agent.values();
    let driver = tokio::spawn(async move {
        let started = std::time::Instant::now();
        // Wait out the first cycle, then move eth0 to row 3
        while watch.records().is_empty() && started.elapsed() < Duration::from_secs(5) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        {
            let mut table = values.lock().unwrap();
            table.insert(
                Oid::parse("1.3.6.1.2.1.2.2.1.2.2").unwrap(),
                SnmpValue::OctetString(b"wan0".to_vec()),
            );
            table.insert(
                Oid::parse("1.3.6.1.2.1.2.2.1.2.3").unwrap(),
                SnmpValue::OctetString(b"eth0".to_vec()),
            );
        }
        while watch.records().len() < 2 && started.elapsed() < Duration::from_secs(8) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        stop.stop();
    });

    engine.run().await.unwrap();
    driver.await.unwrap();
    engine.shutdown();

    let records = recorder.records();
    assert!(records.len() >= 2);
    assert_eq!(records[0].samples[0].1, SampleValue::Integer(991));
    // After the move the pairing mismatch cancelled the speculative read,
    // the walk found row 3 and sampled its counter
    assert_eq!(records[1].samples[0].1, SampleValue::Integer(777));
}

#[tokio::test]
async fn query_without_matching_row_records_unset() {
    let agent = StubAgent::start(if_table(), StubBehavior::default()).await;

    let mut item = query_item(agent.port());
    item.query = Some(QuerySpec {
        oid: oid(IF_DESCR),
        match_text: Some("wan9".to_string()),
    });
    let group = group_of(2000, 500, vec![item]);
    let (engine, recorder) = engine_with(vec![group]).await;
    let records = run_until_cycles(engine, &recorder, 1, Duration::from_secs(5)).await;

    assert!(!records.is_empty());
    assert_eq!(records[0].samples[0].1, SampleValue::Unset);
    // The walk visited every row and the end-of-table answer
    assert_eq!(agent.requests_seen(), 4);
}

#[tokio::test]
async fn failed_host_rotates_to_the_alternate() {
    // The primary host never answers; the alternate lives on 127.0.0.2
    // with the same port
    let primary = StubAgent::start(
        if_table(),
        StubBehavior {
            silent: true,
            ..StubBehavior::default()
        },
    )
    .await;
    let alternate = StubAgent::start_at(
        format!("127.0.0.2:{}", primary.port()).parse().unwrap(),
        table(&[(UPTIME, SnmpValue::TimeTicks(4242))]),
        StubBehavior::default(),
    )
    .await;

    let mut item = item_to(primary.port(), "uptime", UPTIME);
    item.hostnames = vec!["127.0.0.1".to_string(), "127.0.0.2".to_string()];
    let group = group_of(2500, 300, vec![item]);

    let (engine, recorder) = engine_with(vec![group]).await;
    let records = run_until_cycles(engine, &recorder, 2, Duration::from_secs(8)).await;

    assert!(records.len() >= 2);
    // First cycle timed out against the silent primary
    assert_eq!(records[0].samples[0].1, SampleValue::Unset);
    // Second cycle went to the alternate and got a value
    assert_eq!(records[1].samples[0].1, SampleValue::Integer(4242));
    assert!(primary.requests_seen() >= 1);
    assert!(alternate.requests_seen() >= 1);
}

#[tokio::test]
async fn forced_cycle_persists_once_with_midpoint_stamp() {
    // The agent answers far too slowly; the next tick forces the cycle
    let agent = StubAgent::start(
        table(&[(UPTIME, SnmpValue::TimeTicks(5))]),
        StubBehavior {
            silent: true,
            ..StubBehavior::default()
        },
    )
    .await;

    // Timeout larger than the interval keeps the request outstanding when
    // the next tick arrives
    let group = group_of(1000, 5000, vec![item_to(agent.port(), "uptime", UPTIME)]);
    let (engine, recorder) = engine_with(vec![group]).await;
    let records = run_until_cycles(engine, &recorder, 1, Duration::from_secs(5)).await;

    assert!(!records.is_empty());
    let record = &records[0];
    assert_eq!(record.samples[0].1, SampleValue::Unset);
    // The forced completion is stamped before the forcing tick
    assert!(record.last_polled > 0);
}
