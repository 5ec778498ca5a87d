//! Scripted upstream for resolver and API tests.

use async_trait::async_trait;
use depot_server::{FetchError, UpstreamFetcher, UpstreamProbe};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Upstream that answers from a table of URLs. Unknown URLs are not found.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, Result<UpstreamProbe, FetchError>>>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with `result` from now on.
    pub fn respond(&self, url: &str, result: Result<UpstreamProbe, FetchError>) {
        self.responses
            .lock()
            .expect("scripted responses poisoned")
            .insert(url.to_string(), result);
    }

    /// Answer `url` as present with the given etag.
    pub fn serve(&self, url: &str, etag: Option<&str>) {
        self.respond(
            url,
            Ok(UpstreamProbe {
                etag: etag.map(str::to_string),
                content_type: Some("application/java-archive".to_string()),
                size: Some(3),
            }),
        );
    }

    /// Number of probes issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamFetcher for ScriptedFetcher {
    async fn probe(
        &self,
        url: &str,
        _headers: &[(String, String)],
    ) -> Result<UpstreamProbe, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .expect("scripted responses poisoned")
            .get(url)
            .cloned()
            .unwrap_or(Err(FetchError::NotFound))
    }
}
