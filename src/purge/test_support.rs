use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::transport::{OutboundRequest, RawResponse, Transport, TransportError};

/// Transport that records requests and replies with a fixed response.
#[derive(Default)]
pub(crate) struct SpyTransport {
    calls: AtomicUsize,
    requests: Mutex<Vec<OutboundRequest>>,
    status: u16,
    body: String,
}

impl SpyTransport {
    pub(crate) fn replying(status: u16, body: &str) -> Arc<Self> {
        Arc::new(Self {
            status,
            body: body.to_string(),
            ..Self::default()
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last(&self) -> OutboundRequest {
        self.requests
            .lock()
            .expect("spy lock")
            .last()
            .cloned()
            .expect("a request was sent")
    }

    /// Objects of the last request body.
    pub(crate) fn last_objects(&self) -> Vec<String> {
        let body = self.last().body.expect("request has a body");
        let value: serde_json::Value = serde_json::from_str(&body).expect("json body");
        value["objects"]
            .as_array()
            .expect("objects array")
            .iter()
            .map(|object| object.as_str().expect("string object").to_string())
            .collect()
    }
}

#[async_trait]
impl Transport for SpyTransport {
    async fn send(&self, request: OutboundRequest) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().expect("spy lock").push(request);
        Ok(RawResponse::new(self.status, self.body.clone()))
    }
}
