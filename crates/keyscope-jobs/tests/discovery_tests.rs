//! Key discovery job tests

mod common;

use common::*;
use keyscope_core::{CapReason, DiscoveryLimits, KeyscopeError, RespValue};
use keyscope_driver_redis::KeyType;
use keyscope_jobs::*;
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn keys(batch: &DiscoveryBatch) -> Vec<&str> {
    batch.items.iter().map(|item| item.key.as_str()).collect()
}

fn limits(max_keys: usize) -> DiscoveryLimits {
    DiscoveryLimits {
        max_keys,
        ..DiscoveryLimits::default()
    }
}

async fn run(job: &KeyDiscoveryJob) -> RecordingSink<DiscoveryBatch> {
    let sink = RecordingSink::new();
    job.run(JobId::new(), CancellationToken::new(), &sink).await;
    sink
}

fn continuation(event: &JobEvent<DiscoveryBatch>) -> Option<Continuation> {
    match event {
        JobEvent::Done { continuation, .. } => continuation.clone(),
        JobEvent::Progress { .. } => None,
    }
}

mod scan_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_pages_are_deduplicated_and_sorted() {
        let mock = Arc::new(
            MockExecutor::new()
                .on("SCAN", "0", scan_page("1", &["app:z", "app:a", "app:a"]))
                .on("SCAN", "1", scan_page("0", &["app:b"])),
        );
        let job = KeyDiscoveryJob::new(mock.clone(), DiscoveryRequest::default());
        let sink = run(&job).await;

        let progress = sink.progress();
        assert_eq!(progress.len(), 2);
        assert_eq!(keys(&progress[0]), vec!["app:a", "app:z"]);
        assert_eq!(keys(&progress[1]), vec!["app:b"]);
        assert_eq!(progress[0].scanned_count, 3);
        assert_eq!(progress[0].cursor, "1");

        let done = sink.done();
        assert_eq!(done.status(), JobStatus::Completed);
        let summary = done.payload().unwrap();
        assert_eq!(summary.emitted_count, 3);
        assert_eq!(summary.scanned_count, 4);
        assert!(!summary.cap_reached);
        assert!(summary.items.is_empty());
        assert_eq!(continuation(&done), None);
    }

    #[tokio::test]
    async fn test_keys_repeated_across_pages_are_emitted_once() {
        let mock = Arc::new(
            MockExecutor::new()
                .on("SCAN", "0", scan_page("7", &["a", "b"]))
                .on("SCAN", "7", scan_page("9", &["b", "c"]))
                .on("SCAN", "9", scan_page("0", &["a", "c", "d"])),
        );
        let job = KeyDiscoveryJob::new(mock.clone(), DiscoveryRequest::default());
        let sink = run(&job).await;

        let emitted: Vec<String> = sink
            .progress()
            .iter()
            .flat_map(|batch| batch.items.iter().map(|item| item.key.clone()))
            .collect();
        let unique: HashSet<&String> = emitted.iter().collect();
        assert_eq!(emitted.len(), unique.len());
        assert_eq!(emitted, vec!["a", "b", "c", "d"]);
        assert_eq!(mock.count("SCAN"), 3);
    }

    #[tokio::test]
    async fn test_scan_uses_pattern_and_count_hint() {
        let mock = Arc::new(MockExecutor::new().on("SCAN", "0", scan_page("0", &[])));
        let request = DiscoveryRequest::default()
            .with_query("invoice")
            .with_prefix("service:payments");
        let job = KeyDiscoveryJob::new(mock.clone(), request).with_limits(DiscoveryLimits {
            count_hint: 50,
            ..DiscoveryLimits::default()
        });
        run(&job).await;

        assert_eq!(
            mock.commands(),
            vec![vec![
                "SCAN",
                "0",
                "MATCH",
                "service:payments*invoice*",
                "COUNT",
                "50"
            ]]
        );
    }

    #[tokio::test]
    async fn test_resume_cursor_starts_scan() {
        let mock = Arc::new(MockExecutor::new().on("SCAN", "42", scan_page("0", &["k"])));
        let job = KeyDiscoveryJob::new(mock.clone(), DiscoveryRequest::default().resume_from("42"));
        let sink = run(&job).await;

        assert_eq!(sink.done().status(), JobStatus::Completed);
        assert_eq!(mock.commands()[0][1], "42");
    }

    #[tokio::test]
    async fn test_malformed_scan_reply_fails_job() {
        let mock = Arc::new(
            MockExecutor::new()
                .on("SCAN", "0", scan_page("3", &["a"]))
                .on("SCAN", "3", RespValue::Integer(1)),
        );
        let job = KeyDiscoveryJob::new(mock.clone(), DiscoveryRequest::default());
        let sink = run(&job).await;

        match sink.done() {
            JobEvent::Done {
                status,
                error,
                payload,
                ..
            } => {
                assert_eq!(status, JobStatus::Error);
                assert_eq!(error.unwrap().code, "INVALID_SCAN_RESPONSE");
                assert_eq!(payload.unwrap().emitted_count, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_failure_fails_job() {
        let mock = Arc::new(MockExecutor::new().on_error(
            "SCAN",
            "0",
            KeyscopeError::Timeout("no reply".to_string()),
        ));
        let job = KeyDiscoveryJob::new(mock.clone(), DiscoveryRequest::default());
        let sink = run(&job).await;

        let done = sink.done();
        assert_eq!(done.status(), JobStatus::Error);
        assert!(sink.progress().is_empty());
    }
}

mod cap_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_key_cap_drops_excess_and_resumes_from_page_start() {
        let mock = Arc::new(
            MockExecutor::new()
                .on("SCAN", "0", scan_page("5", &["a", "b"]))
                .on("SCAN", "5", scan_page("8", &["e", "d", "c"])),
        );
        let job = KeyDiscoveryJob::new(mock.clone(), DiscoveryRequest::default())
            .with_limits(limits(4));
        let sink = run(&job).await;

        let progress = sink.progress();
        assert_eq!(keys(&progress[1]), vec!["c", "d"]);
        assert!(progress[1].cap_reached);

        let done = sink.done();
        assert_eq!(done.status(), JobStatus::LimitReached);
        let summary = done.payload().unwrap();
        assert_eq!(summary.emitted_count, 4);
        assert_eq!(summary.cap_reason, Some(CapReason::DiscoveryKeyLimit));
        assert_eq!(
            continuation(&done),
            Some(Continuation::new(ContinuationHint::RefineSearch, "5"))
        );
    }

    #[tokio::test]
    async fn test_key_cap_reached_exactly_resumes_from_next_cursor() {
        let mock = Arc::new(MockExecutor::new().on("SCAN", "0", scan_page("7", &["a", "b"])));
        let job = KeyDiscoveryJob::new(mock.clone(), DiscoveryRequest::default())
            .with_limits(limits(2));
        let sink = run(&job).await;

        let done = sink.done();
        assert_eq!(done.status(), JobStatus::LimitReached);
        assert_eq!(
            continuation(&done),
            Some(Continuation::new(ContinuationHint::RefineSearch, "7"))
        );
        assert_eq!(mock.count("SCAN"), 1);
    }

    #[tokio::test]
    async fn test_budget_exactly_used_on_last_page_completes() {
        let mock = Arc::new(MockExecutor::new().on("SCAN", "0", scan_page("0", &["a", "b"])));
        let job = KeyDiscoveryJob::new(mock.clone(), DiscoveryRequest::default())
            .with_limits(limits(2));
        let sink = run(&job).await;

        assert_eq!(sink.done().status(), JobStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_cap_narrows_prefix() {
        let mock = Arc::new(
            MockExecutor::new()
                .with_delay(Duration::from_millis(60))
                .on("SCAN", "0", scan_page("1", &["a"]))
                .on("SCAN", "1", scan_page("2", &["b"]))
                .on("SCAN", "2", scan_page("0", &["c"])),
        );
        let job = KeyDiscoveryJob::new(mock.clone(), DiscoveryRequest::default()).with_limits(
            DiscoveryLimits {
                max_duration_ms: 100,
                ..DiscoveryLimits::default()
            },
        );
        let sink = run(&job).await;

        let done = sink.done();
        assert_eq!(done.status(), JobStatus::LimitReached);
        assert_eq!(
            done.payload().unwrap().cap_reason,
            Some(CapReason::DiscoveryTimeLimit)
        );
        assert_eq!(
            continuation(&done),
            Some(Continuation::new(ContinuationHint::NarrowPrefix, "2"))
        );
        assert_eq!(mock.count("SCAN"), 2);
    }
}

mod cancellation_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_cancel_before_start_sends_nothing() {
        let mock = Arc::new(MockExecutor::new());
        let job = KeyDiscoveryJob::new(mock.clone(), DiscoveryRequest::default());

        let token = CancellationToken::new();
        token.cancel();
        let sink: RecordingSink<DiscoveryBatch> = RecordingSink::new();
        job.run(JobId::new(), token, &sink).await;

        let done = sink.done();
        assert_eq!(done.status(), JobStatus::Cancelled);
        assert_eq!(
            continuation(&done),
            Some(Continuation::new(ContinuationHint::ResumeLater, "0"))
        );
        assert!(mock.commands().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_between_pages_keeps_cursor() {
        let mock = Arc::new(
            MockExecutor::new()
                .on("SCAN", "0", scan_page("11", &["a"]))
                .on("SCAN", "11", scan_page("0", &["b"])),
        );
        let job = KeyDiscoveryJob::new(mock.clone(), DiscoveryRequest::default());

        let token = CancellationToken::new();
        let sink = RecordingSink::cancelling_after(1, token.clone());
        job.run(JobId::new(), token, &sink).await;

        let done = sink.done();
        assert_eq!(done.status(), JobStatus::Cancelled);
        assert_eq!(
            continuation(&done),
            Some(Continuation::new(ContinuationHint::ResumeLater, "11"))
        );
        assert_eq!(mock.count("SCAN"), 1);
    }
}

mod metadata_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_metadata_enrichment() {
        let mock = Arc::new(
            MockExecutor::new()
                .on("SCAN", "0", scan_page("0", &["user:1", "user:2"]))
                .on("TYPE", "user:1", RespValue::SimpleString("hash".into()))
                .on("TTL", "user:1", RespValue::Integer(-1))
                .on("TYPE", "user:2", RespValue::SimpleString("string".into()))
                .on("TTL", "user:2", RespValue::Integer(300)),
        );
        let job = KeyDiscoveryJob::new(mock.clone(), DiscoveryRequest::default().with_metadata(true));
        let sink = run(&job).await;

        let progress = sink.progress();
        assert_eq!(progress.len(), 3);
        assert!(
            progress[0]
                .items
                .iter()
                .all(|item| item.metadata_state == MetadataState::Pending)
        );

        let mut resolved: Vec<DiscoveryItem> = progress[1..]
            .iter()
            .flat_map(|batch| batch.items.clone())
            .collect();
        resolved.sort_by(|a, b| a.key.cmp(&b.key));

        assert_eq!(resolved[0].key, "user:1");
        assert_eq!(resolved[0].key_type, Some(KeyType::Hash));
        assert_eq!(resolved[0].ttl_seconds, Some(-1));
        assert_eq!(resolved[0].metadata_state, MetadataState::Ready);
        assert_eq!(resolved[1].key_type, Some(KeyType::String));
        assert_eq!(resolved[1].ttl_seconds, Some(300));

        assert_eq!(sink.done().status(), JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_binary_key_is_addressed_by_its_raw_bytes() {
        let raw = vec![b's', b':', 0xc3, 0x28];
        let shown = String::from_utf8_lossy(&raw).into_owned();
        let page = RespValue::Array(vec![
            bulk("0"),
            RespValue::Array(vec![RespValue::bulk(raw.clone())]),
        ]);
        let mock = Arc::new(
            MockExecutor::new()
                .on("SCAN", "0", page)
                .on("TYPE", &shown, RespValue::SimpleString("string".into()))
                .on("TTL", &shown, RespValue::Integer(-1)),
        );
        let job = KeyDiscoveryJob::new(mock.clone(), DiscoveryRequest::default().with_metadata(true));
        let sink = run(&job).await;

        let progress = sink.progress();
        assert_eq!(progress.len(), 2);
        assert_eq!(progress[0].items[0].key, shown);
        assert_eq!(progress[0].items[0].raw_key.as_deref(), Some(raw.as_slice()));

        let item = &progress[1].items[0];
        assert_eq!(item.metadata_state, MetadataState::Ready);
        assert_eq!(item.key_bytes(), raw.as_slice());

        let sent = mock.raw_commands();
        assert!(sent.contains(&vec![b"TYPE".to_vec(), raw.clone()]));
        assert!(sent.contains(&vec![b"TTL".to_vec(), raw]));
    }

    #[tokio::test]
    async fn test_failed_lookup_degrades_only_that_key() {
        let mock = Arc::new(
            MockExecutor::new()
                .on("SCAN", "0", scan_page("0", &["bad", "good"]))
                .on_error(
                    "TYPE",
                    "bad",
                    KeyscopeError::Protocol("garbled".to_string()),
                )
                .on("TYPE", "good", RespValue::SimpleString("set".into()))
                .on("TTL", "good", RespValue::Integer(5)),
        );
        let job = KeyDiscoveryJob::new(mock.clone(), DiscoveryRequest::default().with_metadata(true))
            .with_limits(DiscoveryLimits {
                metadata_concurrency: 1,
                ..DiscoveryLimits::default()
            });
        let sink = run(&job).await;

        let progress = sink.progress();
        let bad = &progress[1].items[0];
        assert_eq!(bad.key, "bad");
        assert_eq!(bad.metadata_state, MetadataState::Unavailable);
        assert_eq!(bad.key_type, None);

        let good = &progress[2].items[0];
        assert_eq!(good.metadata_state, MetadataState::Ready);

        // TTL is skipped once TYPE failed
        assert_eq!(mock.count("TTL"), 1);
        assert_eq!(sink.done().status(), JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_ttl_failure_marks_unavailable_but_keeps_type() {
        let mock = Arc::new(
            MockExecutor::new()
                .on("SCAN", "0", scan_page("0", &["k"]))
                .on("TYPE", "k", RespValue::SimpleString("list".into()))
                .on("TTL", "k", RespValue::bulk("soon")),
        );
        let job = KeyDiscoveryJob::new(mock.clone(), DiscoveryRequest::default().with_metadata(true));
        let sink = run(&job).await;

        let item = &sink.progress()[1].items[0];
        assert_eq!(item.key_type, Some(KeyType::List));
        assert_eq!(item.ttl_seconds, None);
        assert_eq!(item.metadata_state, MetadataState::Unavailable);
    }

    #[tokio::test]
    async fn test_cancel_leaves_unstarted_lookups_pending() {
        let mock = Arc::new(
            MockExecutor::new()
                .on("SCAN", "0", scan_page("4", &["a", "b", "c"]))
                .on("SCAN", "4", scan_page("0", &["d"])),
        );
        let job = KeyDiscoveryJob::new(mock.clone(), DiscoveryRequest::default().with_metadata(true));

        let token = CancellationToken::new();
        let sink = RecordingSink::cancelling_after(1, token.clone());
        job.run(JobId::new(), token, &sink).await;

        assert_eq!(mock.count("TYPE"), 0);
        assert_eq!(mock.count("SCAN"), 1);
        assert_eq!(sink.progress().len(), 1);
        assert_eq!(sink.done().status(), JobStatus::Cancelled);
    }
}
