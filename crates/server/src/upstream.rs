//! Upstream prober.
//!
//! The server never downloads artifact bytes itself. It only asks the
//! upstream whether an artifact exists and what its current etag is; the
//! streaming proxy performs the actual transfer.

use async_trait::async_trait;
use depot_core::config::ProxyConfig;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG, HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

/// What an upstream reported about an artifact.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpstreamProbe {
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<u64>,
}

/// Why an upstream could not confirm an artifact.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("artifact not found upstream")]
    NotFound,

    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("upstream timed out")]
    Timeout,
}

/// Client used to probe upstream registries. Owns its own timeouts.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    async fn probe(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<UpstreamProbe, FetchError>;
}

/// Maximum redirects followed while probing.
const MAX_REDIRECTS: usize = 5;

/// `reqwest`-backed prober issuing `HEAD` requests.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Build a prober using the proxy's dial and response-header timeouts.
    pub fn new(config: &ProxyConfig) -> reqwest::Result<Self> {
        Self::with_timeouts(config.dial_timeout(), config.response_header_timeout())
    }

    pub fn with_timeouts(dial: Duration, response_header: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(dial)
            .timeout(dial + response_header)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(concat!("depot/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, FetchError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FetchError::Unavailable(format!("invalid header name: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| FetchError::Unavailable(format!("invalid header value: {e}")))?;
        map.append(name, value);
    }
    Ok(map)
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl UpstreamFetcher for ReqwestFetcher {
    async fn probe(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<UpstreamProbe, FetchError> {
        let timer = crate::metrics::UPSTREAM_PROBE_DURATION.start_timer();
        let response = self
            .client
            .head(url)
            .headers(header_map(headers)?)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Unavailable(e.to_string())
                }
            })?;
        timer.observe_duration();

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => return Err(FetchError::NotFound),
            s if !s.is_success() => {
                tracing::debug!(url = %url, status = %s, "Upstream probe failed");
                return Err(FetchError::Unavailable(format!("upstream returned {s}")));
            }
            _ => {}
        }

        let headers = response.headers();
        Ok(UpstreamProbe {
            etag: header_str(headers, ETAG),
            content_type: header_str(headers, CONTENT_TYPE),
            size: header_str(headers, CONTENT_LENGTH).and_then(|v| v.parse().ok()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_map_rejects_invalid_names() {
        let bad = vec![("bad header".to_string(), "x".to_string())];
        assert!(matches!(header_map(&bad), Err(FetchError::Unavailable(_))));

        let good = vec![("Authorization".to_string(), "Basic dTpw".to_string())];
        assert_eq!(header_map(&good).unwrap().len(), 1);
    }

    #[test]
    fn test_builds_from_config() {
        assert!(ReqwestFetcher::new(&ProxyConfig::default()).is_ok());
    }
}
