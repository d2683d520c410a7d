//! Spawned jobs: event streams and registry lifecycle

mod common;

use common::*;
use futures::StreamExt;
use keyscope_core::RespValue;
use keyscope_jobs::*;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

/// Yield until the registry has forgotten `id`
async fn wait_until_removed(registry: &JobRegistry, id: &JobId) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while registry.contains(id) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("job never left the registry");
}

fn three_pages() -> MockExecutor {
    MockExecutor::new()
        .on("SCAN", "0", scan_page("1", &["a:1"]))
        .on("SCAN", "1", scan_page("2", &["a:2"]))
        .on("SCAN", "2", scan_page("0", &["a:3"]))
}

#[tokio::test]
async fn test_discovery_stream_ends_with_done() {
    let registry = JobRegistry::new();
    let mock = Arc::new(three_pages());
    let handle = KeyDiscoveryJob::new(mock, DiscoveryRequest::default()).spawn(&registry);
    let id = handle.id();
    assert!(registry.contains(&id));

    let events: Vec<_> = handle.collect().await;
    assert_eq!(events.len(), 4);
    assert!(events.iter().all(|event| event.job_id() == id));
    assert!(events[..3].iter().all(|event| !event.is_done()));

    let done = events.last().unwrap();
    assert!(done.is_done());
    assert_eq!(done.status(), JobStatus::Completed);

    wait_until_removed(&registry, &id).await;
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_inspector_stream() {
    let registry = JobRegistry::new();
    let mock = Arc::new(
        MockExecutor::new()
            .on("TYPE", "greeting", RespValue::SimpleString("string".into()))
            .on("TTL", "greeting", RespValue::Integer(-1))
            .on("GET", "greeting", bulk("hello")),
    );
    let handle = InspectorJob::new(mock, "greeting").spawn(&registry);
    let id = handle.id();

    let events: Vec<_> = handle.collect().await;
    assert_eq!(events.len(), 2);
    match events[1].payload() {
        Some(InspectionResult::String(preview)) => assert_eq!(preview.value, "hello"),
        other => panic!("unexpected payload {:?}", other),
    }

    wait_until_removed(&registry, &id).await;
}

#[tokio::test]
async fn test_cancel_through_registry() {
    let registry = JobRegistry::new();
    let mock = Arc::new(three_pages());
    let handle = KeyDiscoveryJob::new(mock.clone(), DiscoveryRequest::default()).spawn(&registry);
    let id = handle.id();

    // The task has not been polled yet, so the first check sees the flag
    assert!(registry.cancel(&id));

    let events: Vec<_> = handle.collect().await;
    let done = events.last().unwrap();
    assert_eq!(done.status(), JobStatus::Cancelled);
    assert_eq!(mock.count("SCAN"), 0);

    wait_until_removed(&registry, &id).await;
    assert!(!registry.cancel(&id));
}

#[tokio::test]
async fn test_cancel_all_stops_every_job() {
    let registry = JobRegistry::new();
    let first = KeyDiscoveryJob::new(Arc::new(three_pages()), DiscoveryRequest::default())
        .spawn(&registry);
    let second = KeyDiscoveryJob::new(Arc::new(three_pages()), DiscoveryRequest::default())
        .spawn(&registry);

    assert_eq!(registry.cancel_all(), 2);

    for handle in [first, second] {
        let events: Vec<_> = handle.collect().await;
        assert_eq!(events.last().unwrap().status(), JobStatus::Cancelled);
    }
}

#[tokio::test]
async fn test_handle_cancel() {
    let registry = JobRegistry::new();
    let mock = Arc::new(three_pages());
    let handle = KeyDiscoveryJob::new(mock, DiscoveryRequest::default()).spawn(&registry);

    handle.cancel();
    assert!(format!("{:?}", handle).contains("cancelled: true"));

    let events: Vec<_> = handle.collect().await;
    assert_eq!(events.last().unwrap().status(), JobStatus::Cancelled);
}

#[tokio::test]
async fn test_dropping_handle_cancels_job() {
    let registry = JobRegistry::new();
    let mock = Arc::new(three_pages());
    let handle = KeyDiscoveryJob::new(mock.clone(), DiscoveryRequest::default()).spawn(&registry);
    let id = handle.id();
    drop(handle);

    wait_until_removed(&registry, &id).await;
    // The first page could not be delivered, so no further page was read
    assert_eq!(mock.count("SCAN"), 1);
}

#[tokio::test]
async fn test_events_serialize_as_tagged_json() {
    let registry = JobRegistry::new();
    let mock = Arc::new(MockExecutor::new().on("SCAN", "0", scan_page("0", &["k"])));
    let handle = KeyDiscoveryJob::new(mock, DiscoveryRequest::default()).spawn(&registry);

    let events: Vec<_> = handle.collect().await;
    let progress = serde_json::to_value(&events[0]).unwrap();
    assert_eq!(progress["event"], "progress");
    assert_eq!(progress["status"], "running");
    assert_eq!(progress["payload"]["items"][0]["key"], "k");

    let done = serde_json::to_value(&events[1]).unwrap();
    assert_eq!(done["event"], "done");
    assert_eq!(done["status"], "completed");
    assert!(done.get("error").is_none());
    assert!(done.get("continuation").is_none());
}
