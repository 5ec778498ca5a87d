//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Public base URL of this server, used to build the upload callback URL
    /// handed to the streaming proxy. Falls back to `http://<bind>`.
    #[serde(default)]
    pub public_url: Option<String>,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// SECURITY: When enabled, ensure this endpoint is network-restricted
    /// to authorized Prometheus scraper IPs only at the infrastructure level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: None,
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Base URL for links back to this server, without a trailing slash.
    pub fn base_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.bind),
        }
    }
}

/// Admin token configuration.
///
/// The admin token provides initial access to the cache-entry admin API.
/// If the token hash changes between restarts, the previous admin token is
/// automatically revoked and a new one is created.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Pre-computed hash of the admin token (SHA256 hex, 64 characters).
    /// Generate with: `echo -n "your-secret-token" | sha256sum`
    pub token_hash: String,
    /// Scopes for the admin token (default: ["registry:admin"]).
    pub token_scopes: Option<Vec<String>>,
    /// Description for the admin token.
    pub token_description: Option<String>,
}

impl AdminConfig {
    /// Create a test configuration with a dummy token hash.
    ///
    /// **For testing only.** The hash is deterministic but not a real token.
    pub fn for_testing() -> Self {
        Self {
            // SHA256 of "test-admin-token"
            token_hash: "17d6bfe05d1b1fb7bc499f8e3f639c7b3eda4c40f321eef8887a0c04c89a99c5"
                .to_string(),
            token_scopes: None,
            token_description: Some("Test admin token".to_string()),
        }
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (testing and small deployments).
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds (advisory only - SQLite cannot force-cancel queries).
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL (optional if using individual fields).
        /// Takes precedence over individual fields if both are provided.
        url: Option<String>,
        /// Database host (e.g., "localhost" or "db.example.com").
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password.
        /// WARNING: Prefer DEPOT_METADATA__PASSWORD env var over storing in config.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// SSL mode for connections.
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds (prevents hung queries).
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30_000)
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(600) // advisory only
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => {
                    Err("postgres config requires either 'url' or 'host' + 'database'".to_string())
                }
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields".to_string(),
                ),
            },
        }
    }
}

/// Settings handed to the streaming proxy and the upstream prober.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Let the proxy serve cached objects straight from object storage.
    /// When false, the server streams the bytes itself.
    #[serde(default = "default_direct_download")]
    pub direct_download: bool,
    /// Allow upstreams on loopback and private networks (local development only).
    #[serde(default)]
    pub allow_local_requests: bool,
    /// Upstream URIs exempt from the SSRF filter.
    #[serde(default)]
    pub allowed_uris: Vec<String>,
    /// Connect timeout for upstream requests.
    #[serde(default = "default_upstream_timeout_secs")]
    pub dial_timeout_secs: u64,
    /// Time allowed for upstream response headers.
    #[serde(default = "default_upstream_timeout_secs")]
    pub response_header_timeout_secs: u64,
    /// Largest object the proxy may write.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
}

fn default_direct_download() -> bool {
    true
}

fn default_upstream_timeout_secs() -> u64 {
    10
}

fn default_max_upload_size() -> u64 {
    crate::MAX_UPLOAD_SIZE
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            direct_download: default_direct_download(),
            allow_local_requests: false,
            allowed_uris: Vec::new(),
            dial_timeout_secs: default_upstream_timeout_secs(),
            response_header_timeout_secs: default_upstream_timeout_secs(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

impl ProxyConfig {
    pub fn dial_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.dial_timeout_secs)
    }

    pub fn response_header_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.response_header_timeout_secs)
    }

    /// Validate proxy configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.dial_timeout_secs == 0 || self.response_header_timeout_secs == 0 {
            return Err("proxy timeouts must be at least 1 second".to_string());
        }
        if self.max_upload_size == 0 || self.max_upload_size > crate::MAX_UPLOAD_SIZE {
            return Err(format!(
                "proxy.max_upload_size must be between 1 and {}",
                crate::MAX_UPLOAD_SIZE
            ));
        }
        Ok(())
    }
}

/// Eviction (reaper) configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvictionConfig {
    /// Claim lease in seconds for stores without row locks.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
    /// Default number of entries one reaper run processes.
    #[serde(default = "default_eviction_batch_size")]
    pub batch_size: u32,
}

fn default_lease_secs() -> u64 {
    300
}

fn default_eviction_batch_size() -> u32 {
    100
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            lease_secs: default_lease_secs(),
            batch_size: default_eviction_batch_size(),
        }
    }
}

impl EvictionConfig {
    /// Get the claim lease as a Duration.
    pub fn lease(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.lease_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    /// Validate eviction configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.lease_secs == 0 {
            return Err("eviction.lease_secs cannot be 0".to_string());
        }
        if self.lease_secs > i64::MAX as u64 {
            return Err(format!(
                "eviction.lease_secs {} exceeds maximum value {}",
                self.lease_secs,
                i64::MAX
            ));
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Admin token configuration (optional).
    #[serde(default)]
    pub admin: Option<AdminConfig>,
    /// Streaming proxy configuration.
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Eviction configuration.
    #[serde(default)]
    pub eviction: EvictionConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage, SQLite metadata,
    /// and a dummy admin token.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            metadata: MetadataConfig::default(),
            admin: Some(AdminConfig::for_testing()),
            proxy: ProxyConfig::default(),
            eviction: EvictionConfig::default(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.metadata.validate()?;
        self.proxy.validate()?;
        self.eviction.validate()?;
        Ok(())
    }
}
