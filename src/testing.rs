//! Scripted in-memory transport for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::FailureReason;
use crate::transport::{Transport, TransportResponse};

type Scripted = Result<TransportResponse, FailureReason>;

/// Answers 200 to every post and `true` to every probe unless told otherwise.
/// A scripted queue is consumed first; the last entry repeats.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    posts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    probes: Mutex<HashMap<String, bool>>,
    post_log: Mutex<Vec<String>>,
    probe_log: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, url: &str, responses: Vec<Scripted>) {
        self.posts.lock().unwrap().insert(url.to_string(), responses.into());
    }

    pub(crate) fn status(&self, url: &str, status: u16) {
        self.respond(url, vec![Ok(TransportResponse::new(status))]);
    }

    pub(crate) fn probe_result(&self, url: &str, alive: bool) {
        self.probes.lock().unwrap().insert(url.to_string(), alive);
    }

    pub(crate) fn posts(&self) -> Vec<String> {
        self.post_log.lock().unwrap().clone()
    }

    pub(crate) fn probes(&self) -> Vec<String> {
        self.probe_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post(
        &self,
        url: &str,
        _body: &serde_json::Value,
        _timeout: Duration,
    ) -> Result<TransportResponse, FailureReason> {
        self.post_log.lock().unwrap().push(url.to_string());
        let mut posts = self.posts.lock().unwrap();
        match posts.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(Ok(TransportResponse::new(200))),
            None => Ok(TransportResponse::new(200)),
        }
    }

    async fn probe(&self, url: &str, _timeout: Duration) -> bool {
        self.probe_log.lock().unwrap().push(url.to_string());
        self.probes.lock().unwrap().get(url).copied().unwrap_or(true)
    }
}
