use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::gateway::{Backend, Endpoint, FetchError};

enum Reply {
    Json(Value),
    Blob(Vec<u8>),
    Fail(FetchError),
}

/// In-memory backend answering from per-route queues. The last queued
/// reply of a route is repeated once the queue drains to a single entry.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, route: &str, reply: Reply) {
        let mut replies = self.replies.lock().expect("replies lock");
        replies.entry(route.to_string()).or_default().push_back(reply);
    }

    pub fn push_json(&self, route: &str, value: Value) {
        self.push(route, Reply::Json(value));
    }

    pub fn push_blob(&self, route: &str, bytes: &[u8]) {
        self.push(route, Reply::Blob(bytes.to_vec()));
    }

    pub fn push_error(&self, route: &str, err: FetchError) {
        self.push(route, Reply::Fail(err));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn calls_to(&self, route: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == route).count()
    }

    fn answer(&self, endpoint: &Endpoint) -> Reply {
        let route = endpoint.route();
        self.calls.lock().expect("calls lock").push(route.clone());

        let mut replies = self.replies.lock().expect("replies lock");
        let Some(queue) = replies.get_mut(&route) else {
            return Reply::Fail(FetchError::Transport(format!("no reply scripted for {route}")));
        };
        if queue.len() > 1 {
            return queue.pop_front().expect("non-empty queue");
        }
        match queue.front() {
            Some(Reply::Json(v)) => Reply::Json(v.clone()),
            Some(Reply::Blob(b)) => Reply::Blob(b.clone()),
            Some(Reply::Fail(e)) => Reply::Fail(e.clone()),
            None => Reply::Fail(FetchError::Transport(format!("no reply scripted for {route}"))),
        }
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn fetch_json(&self, endpoint: &Endpoint) -> Result<Value, FetchError> {
        match self.answer(endpoint) {
            Reply::Json(v) => Ok(v),
            Reply::Blob(_) => Err(FetchError::Parse("binary body".to_string())),
            Reply::Fail(e) => Err(e),
        }
    }

    async fn fetch_blob(&self, endpoint: &Endpoint) -> Result<Vec<u8>, FetchError> {
        match self.answer(endpoint) {
            Reply::Json(v) => Ok(v.to_string().into_bytes()),
            Reply::Blob(b) => Ok(b),
            Reply::Fail(e) => Err(e),
        }
    }

    fn resource_url(&self, endpoint: &Endpoint) -> String {
        let query = endpoint
            .query()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("http://backend{}?{}", endpoint.route(), query)
    }
}

pub(crate) fn http_error(status: u16) -> FetchError {
    FetchError::HttpStatus {
        status,
        message: "scripted failure".to_string(),
    }
}
