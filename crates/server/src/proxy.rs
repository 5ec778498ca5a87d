//! Instructions for the trusted streaming proxy in front of the server.
//!
//! Large payloads never pass through this process. Instead a response carries
//! a `Depot-Proxy-Send-Data` header of the form `<command>:<base64url(json)>`
//! and an empty body; the proxy intercepts it and performs the transfer.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use depot_core::config::ProxyConfig;
use ipnet::IpNet;
use reqwest::Url;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::LazyLock;

/// Response header carrying a proxy instruction.
pub const SEND_DATA_HEADER: &str = "Depot-Proxy-Send-Data";

/// Header correlating an upload callback with the upstream that served it.
pub const UPSTREAM_GLOBAL_ID_HEADER: &str = "X-Vendor-Virtual-Registry-Upstream-Global-Id";

/// Headers that keep stored content from executing in a browser.
pub const NO_BROWSER_EXECUTION_HEADERS: [(&str, &str); 2] = [
    ("Content-Security-Policy", "default-src 'none'"),
    ("X-Content-Type-Options", "nosniff"),
];

/// Status the proxy returns when the upstream fails.
const ERROR_RESPONSE_STATUS: u16 = 502;

/// Status the proxy returns when the upstream times out.
const TIMEOUT_RESPONSE_STATUS: u16 = 504;

/// Proxy commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Fetch from the upstream, store, call back, and stream to the client.
    SendDependency,
    /// Stream an object straight from object storage.
    SendObject,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendDependency => "send-dependency",
            Self::SendObject => "send-object",
        }
    }
}

/// Where the proxy writes the fetched object.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthorizedUploadResponse {
    pub object_storage_key: String,
    pub maximum_size: u64,
}

/// How the proxy reports the object it wrote.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UploadConfig {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, Vec<String>>,
    pub authorized_upload_response: AuthorizedUploadResponse,
}

/// Parameters of a `send-dependency` instruction.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SendDependency {
    pub headers: BTreeMap<String, Vec<String>>,
    pub url: String,
    pub allow_localhost: bool,
    #[serde(rename = "SSRFFilter")]
    pub ssrf_filter: bool,
    #[serde(rename = "AllowedURIs")]
    pub allowed_uris: Vec<String>,
    pub dial_timeout: String,
    pub response_header_timeout: String,
    pub error_response_status: u16,
    pub timeout_response_status: u16,
    pub response_headers: BTreeMap<String, String>,
    pub upload_config: UploadConfig,
}

/// Parameters of a `send-object` instruction.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SendObject {
    pub key: String,
    pub size: u64,
    pub content_type: String,
    pub response_headers: BTreeMap<String, String>,
}

/// Inputs for building a `send-dependency` instruction.
pub struct DependencyRequest<'a> {
    /// Upstream URL of the artifact.
    pub upstream_url: &'a str,
    /// Headers for the upstream request (credentials).
    pub upstream_headers: &'a [(String, String)],
    /// URL the proxy calls back with the written object.
    pub callback_url: &'a str,
    /// Authorization header of the original request, forwarded on callback.
    pub authorization: Option<&'a str>,
    /// Global id of the upstream, echoed on callback.
    pub upstream_global_id: &'a str,
    /// Pre-computed object storage key.
    pub object_storage_key: &'a str,
}

fn go_duration(duration: std::time::Duration) -> String {
    format!("{}s", duration.as_secs())
}

fn no_browser_execution_headers() -> BTreeMap<String, String> {
    NO_BROWSER_EXECUTION_HEADERS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl SendDependency {
    /// Build the instruction for fetching and caching one artifact.
    pub fn new(request: &DependencyRequest<'_>, config: &ProxyConfig) -> Self {
        let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in request.upstream_headers {
            headers.entry(name.clone()).or_default().push(value.clone());
        }

        let mut upload_headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        upload_headers.insert(
            UPSTREAM_GLOBAL_ID_HEADER.to_string(),
            vec![request.upstream_global_id.to_string()],
        );
        if let Some(auth) = request.authorization {
            upload_headers.insert("Authorization".to_string(), vec![auth.to_string()]);
        }

        Self {
            headers,
            url: request.upstream_url.to_string(),
            allow_localhost: config.allow_local_requests,
            ssrf_filter: true,
            allowed_uris: config.allowed_uris.clone(),
            dial_timeout: go_duration(config.dial_timeout()),
            response_header_timeout: go_duration(config.response_header_timeout()),
            error_response_status: ERROR_RESPONSE_STATUS,
            timeout_response_status: TIMEOUT_RESPONSE_STATUS,
            response_headers: no_browser_execution_headers(),
            upload_config: UploadConfig {
                method: "PUT".to_string(),
                url: request.callback_url.to_string(),
                headers: upload_headers,
                authorized_upload_response: AuthorizedUploadResponse {
                    object_storage_key: request.object_storage_key.to_string(),
                    maximum_size: config.max_upload_size,
                },
            },
        }
    }
}

impl SendObject {
    pub fn new(key: &str, size: u64, content_type: &str) -> Self {
        Self {
            key: key.to_string(),
            size,
            content_type: content_type.to_string(),
            response_headers: no_browser_execution_headers(),
        }
    }
}

/// Encode an instruction as a header value.
pub fn encode<T: Serialize>(command: Command, params: &T) -> serde_json::Result<String> {
    let json = serde_json::to_vec(params)?;
    Ok(format!("{}:{}", command.as_str(), URL_SAFE.encode(json)))
}

/// Decode a header value back into its command name and JSON payload.
pub fn decode(value: &str) -> Option<(&str, serde_json::Value)> {
    let (command, payload) = value.split_once(':')?;
    let json = URL_SAFE.decode(payload).ok()?;
    let params = serde_json::from_slice(&json).ok()?;
    Some((command, params))
}

/// Reasons an upstream URL is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockedUrl {
    #[error("invalid upstream url: {0}")]
    Invalid(String),
    #[error("unsupported scheme: {0}")]
    Scheme(String),
    #[error("requests to the local network are not allowed: {0}")]
    LocalNetwork(String),
}

/// Check an upstream URL before the proxy (or the prober) is sent there.
///
/// Only http and https are accepted. Literal private, loopback and
/// link-local addresses and `localhost` names are refused unless local
/// requests are enabled or the URL starts with an allowed URI.
pub fn validate_upstream_url(url: &str, config: &ProxyConfig) -> Result<Url, BlockedUrl> {
    let parsed = Url::parse(url).map_err(|e| BlockedUrl::Invalid(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(BlockedUrl::Scheme(other.to_string())),
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| BlockedUrl::Invalid("missing host".to_string()))?;

    if config.allow_local_requests
        || config
            .allowed_uris
            .iter()
            .any(|allowed| !allowed.is_empty() && url.starts_with(allowed.as_str()))
    {
        return Ok(parsed);
    }

    let bare = host.trim_start_matches('[').trim_end_matches(']');
    let is_local = match bare.parse::<IpAddr>() {
        Ok(addr) => is_private_ip(addr),
        Err(_) => {
            let name = bare.trim_end_matches('.').to_ascii_lowercase();
            name == "localhost" || name.ends_with(".localhost")
        }
    };
    if is_local {
        return Err(BlockedUrl::LocalNetwork(host.to_string()));
    }

    Ok(parsed)
}

/// Returns true if the address is within a private, loopback or link-local range.
pub fn is_private_ip(addr: IpAddr) -> bool {
    if PRIVATE_NETS.iter().any(|net| net.contains(&addr)) {
        return true;
    }

    if let IpAddr::V6(v6) = addr
        && let Some(mapped) = v6.to_ipv4_mapped()
    {
        let mapped_addr = IpAddr::V4(mapped);
        return PRIVATE_NETS.iter().any(|net| net.contains(&mapped_addr));
    }

    false
}

static PRIVATE_NETS: LazyLock<Vec<IpNet>> = LazyLock::new(|| {
    [
        "0.0.0.0/8",
        "10.0.0.0/8",
        "100.64.0.0/10",
        "127.0.0.0/8",
        "169.254.0.0/16",
        "172.16.0.0/12",
        "192.0.0.0/24",
        "192.168.0.0/16",
        "198.18.0.0/15",
        "224.0.0.0/4",
        "240.0.0.0/4",
        "255.255.255.255/32",
        "::/128",
        "::1/128",
        "fc00::/7",
        "fe80::/10",
        "ff00::/8",
    ]
    .into_iter()
    .map(|cidr| cidr.parse::<IpNet>().expect("static CIDR parse failed"))
    .collect()
});
