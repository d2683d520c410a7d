//! Shared fixtures for job tests

#![allow(dead_code)]

use async_trait::async_trait;
use keyscope_core::{CommandExecutor, KeyscopeError, RespValue, Result, display_command};
use keyscope_jobs::{CancellationToken, EventSink, JobEvent};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Executor answering from per-command queues.
///
/// Replies are keyed by command name and first argument (`SCAN 0`,
/// `TYPE user:1`, `HSCAN profile`, ...) and popped in order. Anything
/// unscripted gets an error reply.
#[derive(Default)]
pub struct MockExecutor {
    replies: Mutex<HashMap<(String, String), VecDeque<Result<RespValue>>>>,
    log: Mutex<Vec<Vec<Vec<u8>>>>,
    delay: Option<Duration>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long (on the tokio clock) before every reply
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn on(self, name: &str, arg: &str, reply: RespValue) -> Self {
        self.push(name, arg, Ok(reply));
        self
    }

    pub fn on_error(self, name: &str, arg: &str, err: KeyscopeError) -> Self {
        self.push(name, arg, Err(err));
        self
    }

    fn push(&self, name: &str, arg: &str, reply: Result<RespValue>) {
        self.replies
            .lock()
            .unwrap()
            .entry((name.to_string(), arg.to_string()))
            .or_default()
            .push_back(reply);
    }

    /// Every command sent so far, arguments decoded lossily
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.raw_commands()
            .iter()
            .map(|parts| parts.iter().map(|p| lossy(p)).collect())
            .collect()
    }

    /// Every command sent so far, exactly as written to the wire
    pub fn raw_commands(&self) -> Vec<Vec<Vec<u8>>> {
        self.log.lock().unwrap().clone()
    }

    /// How many times `name` was sent
    pub fn count(&self, name: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|parts| parts[0] == name.as_bytes())
            .count()
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn execute(&self, parts: &[Vec<u8>]) -> Result<RespValue> {
        self.log.lock().unwrap().push(parts.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let key = (
            lossy(&parts[0]),
            parts.get(1).map(|arg| lossy(arg)).unwrap_or_default(),
        );
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(|queue| queue.pop_front());
        reply.unwrap_or_else(|| {
            Ok(RespValue::Error(format!(
                "ERR no scripted reply for {}",
                display_command(parts)
            )))
        })
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Sink keeping every event, optionally cancelling after N progress events
pub struct RecordingSink<P> {
    events: Mutex<Vec<JobEvent<P>>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl<P: Clone> RecordingSink<P> {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            cancel_after: None,
        }
    }

    pub fn cancelling_after(progress_events: usize, token: CancellationToken) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            cancel_after: Some((progress_events, token)),
        }
    }

    pub fn events(&self) -> Vec<JobEvent<P>> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<P> {
        self.events()
            .into_iter()
            .filter(|event| !event.is_done())
            .filter_map(|event| event.payload().cloned())
            .collect()
    }

    /// The terminal event; panics unless it is the last and only one
    pub fn done(&self) -> JobEvent<P> {
        let events = self.events();
        let done: Vec<_> = events.iter().filter(|e| e.is_done()).collect();
        assert_eq!(done.len(), 1, "expected exactly one done event");
        let last = events.last().unwrap().clone();
        assert!(last.is_done(), "done must be the last event");
        last
    }
}

#[async_trait]
impl<P: Send + 'static> EventSink<P> for RecordingSink<P> {
    async fn emit(&self, event: JobEvent<P>) -> bool {
        let mut events = self.events.lock().unwrap();
        events.push(event);
        if let Some((after, token)) = &self.cancel_after {
            if events.iter().filter(|e| !e.is_done()).count() >= *after {
                token.cancel();
            }
        }
        true
    }
}

pub fn bulk(s: &str) -> RespValue {
    RespValue::bulk(s)
}

/// Flat array of bulk strings
pub fn array(items: &[&str]) -> RespValue {
    RespValue::Array(items.iter().map(|s| bulk(s)).collect())
}

/// `[cursor, [items...]]`
pub fn scan_page(cursor: &str, items: &[&str]) -> RespValue {
    RespValue::Array(vec![bulk(cursor), array(items)])
}
