// src/net/testing.rs
// =============================================================================
// In-memory Transport used by the dispatcher, pool and crawl tests.
//
// Routes are keyed by the full URL string. Anything without a route answers
// HTTP 404, which is what an unrelated web server would do.
// =============================================================================

use super::client::{RequestError, Transport};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Status(u16),
    // Never answers; only a timeout or cancellation ends the request
    Hang,
    // Answers after a pause. Counted in `peak_in_flight`.
    Delay(Duration, Value),
}

#[derive(Debug, Default)]
pub struct StaticTransport {
    routes: Mutex<HashMap<String, Reply>>,
    hits: Mutex<HashMap<String, usize>>,
    delayed: AtomicUsize,
    peak: AtomicUsize,
}

// Holds one slot of the delayed-request count until dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StaticTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: &str, reply: Reply) -> &Self {
        self.routes.lock().unwrap().insert(url.to_string(), reply);
        self
    }

    pub fn json(&self, url: &str, body: Value) -> &Self {
        self.route(url, Reply::Json(body))
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    // Most `Delay` replies ever pending at the same moment
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter_delay(&self) -> InFlight<'_> {
        let now = self.delayed.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.delayed)
    }

    // Registers the nodeinfo document for `base`
    pub fn node(&self, base: &str, software: &str, version: &str) -> &Self {
        self.json(
            &format!("{base}/nodeinfo/2.1"),
            json!({ "software": { "name": software, "version": version } }),
        )
    }

    // Registers a peer list at `path` (v3 or v1) for `base`
    pub fn peers(&self, base: &str, path: &str, linked: Value) -> &Self {
        self.json(
            &format!("{base}{path}"),
            json!({ "federated_instances": { "linked": linked } }),
        )
    }

    // Registers a v3 site document for `base`
    pub fn site_v3(&self, base: &str, users_active_month: u64, private: bool) -> &Self {
        self.json(
            &format!("{base}/api/v3/site"),
            json!({
                "site_view": {
                    "site": { "description": format!("{base} community"), "icon": null },
                    "local_site": { "registration_mode": "Open", "private_instance": private },
                    "counts": { "users_active_month": users_active_month }
                }
            }),
        )
    }
}

#[async_trait]
impl Transport for StaticTransport {
    async fn get_json(&self, url: &Url) -> Result<Value, RequestError> {
        let key = url.as_str().to_string();
        *self.hits.lock().unwrap().entry(key.clone()).or_default() += 1;

        let reply = self.routes.lock().unwrap().get(&key).cloned();
        match reply {
            Some(Reply::Json(body)) => Ok(body),
            Some(Reply::Status(status)) => Err(RequestError::Status { url: key, status }),
            Some(Reply::Hang) => std::future::pending().await,
            Some(Reply::Delay(wait, body)) => {
                let _slot = self.enter_delay();
                tokio::time::sleep(wait).await;
                Ok(body)
            }
            None => Err(RequestError::Status {
                url: key,
                status: 404,
            }),
        }
    }
}
