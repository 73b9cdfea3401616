//! Configuration for the node lifecycle pipeline
//!
//! Values that change core semantics: dedup window, default schema,
//! schema location, tag limits, retention windows and revalidation cadence.

use std::time::Duration;

/// Default dedup window for `(profile_url, version)` keys
pub const DEFAULT_DEDUP_TTL_SECS: u64 = 60 * 60;

/// Schema every profile must satisfy before its linked schemas are checked
pub const DEFAULT_SCHEMA: &str = "default-v1";

/// Core pipeline configuration
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// How long a processed `(profile_url, version)` suppresses duplicates
    pub dedup_ttl: Duration,

    /// Name of the mandatory schema
    pub default_schema: String,

    /// Base URL schemas are fetched from (`<base>/<name>.json`)
    pub schemas_url: String,

    /// Maximum number of tags kept when indexing
    pub tags_array_size: usize,

    /// Maximum characters kept per tag
    pub tags_string_length: usize,

    /// How long validation_failed nodes are kept before purge
    pub validation_failed_ttl: Duration,

    /// How long soft-deleted tombstones are kept before purge
    pub deleted_ttl: Duration,

    /// Revalidation cadence, also the staleness threshold for candidates
    pub revalidate_interval: Duration,

    /// How often the running server purges expired records
    pub cleanup_interval: Duration,

    /// Bound on outbound HTTP requests (profiles, schemas, delete probes)
    pub http_timeout: Duration,

    /// Search index holding node projections
    pub node_index: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            dedup_ttl: Duration::from_secs(DEFAULT_DEDUP_TTL_SECS),
            default_schema: DEFAULT_SCHEMA.to_string(),
            schemas_url: "https://cdn.murmurations.network/schemas".to_string(),
            tags_array_size: 100,
            tags_string_length: 100,
            validation_failed_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            deleted_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            revalidate_interval: Duration::from_secs(24 * 60 * 60),
            cleanup_interval: Duration::from_secs(24 * 60 * 60),
            http_timeout: Duration::from_secs(10),
            node_index: "nodes".to_string(),
        }
    }
}

impl CoreConfig {
    /// Create a new config builder
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::new()
    }

    /// Create config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            dedup_ttl: env_secs("DEDUP_TTL_SECS").unwrap_or(defaults.dedup_ttl),
            default_schema: std::env::var("DEFAULT_SCHEMA").unwrap_or(defaults.default_schema),
            schemas_url: std::env::var("SCHEMAS_URL").unwrap_or(defaults.schemas_url),
            tags_array_size: env_parse("TAGS_ARRAY_SIZE").unwrap_or(defaults.tags_array_size),
            tags_string_length: env_parse("TAGS_STRING_LENGTH")
                .unwrap_or(defaults.tags_string_length),
            validation_failed_ttl: env_secs("VALIDATION_FAILED_TTL_SECS")
                .unwrap_or(defaults.validation_failed_ttl),
            deleted_ttl: env_secs("DELETED_TTL_SECS").unwrap_or(defaults.deleted_ttl),
            revalidate_interval: env_secs("REVALIDATE_INTERVAL_SECS")
                .unwrap_or(defaults.revalidate_interval),
            cleanup_interval: env_secs("CLEANUP_INTERVAL_SECS")
                .unwrap_or(defaults.cleanup_interval),
            http_timeout: env_parse("HTTP_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.http_timeout),
            node_index: std::env::var("NODE_INDEX").unwrap_or(defaults.node_index),
        }
    }

    /// URL of a named schema
    pub fn schema_url(&self, name: &str) -> String {
        format!("{}/{}.json", self.schemas_url.trim_end_matches('/'), name)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_secs)
}

/// Builder for CoreConfig
pub struct CoreConfigBuilder {
    config: CoreConfig,
}

impl CoreConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self {
            config: CoreConfig::default(),
        }
    }

    pub fn dedup_ttl(mut self, ttl: Duration) -> Self {
        self.config.dedup_ttl = ttl;
        self
    }

    pub fn default_schema(mut self, name: impl Into<String>) -> Self {
        self.config.default_schema = name.into();
        self
    }

    pub fn schemas_url(mut self, url: impl Into<String>) -> Self {
        self.config.schemas_url = url.into();
        self
    }

    /// Set tag count and per-tag length limits
    pub fn tag_limits(mut self, max_count: usize, max_len: usize) -> Self {
        self.config.tags_array_size = max_count;
        self.config.tags_string_length = max_len;
        self
    }

    pub fn validation_failed_ttl(mut self, ttl: Duration) -> Self {
        self.config.validation_failed_ttl = ttl;
        self
    }

    pub fn deleted_ttl(mut self, ttl: Duration) -> Self {
        self.config.deleted_ttl = ttl;
        self
    }

    pub fn revalidate_interval(mut self, interval: Duration) -> Self {
        self.config.revalidate_interval = interval;
        self
    }

    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.config.cleanup_interval = interval;
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.config.http_timeout = timeout;
        self
    }

    pub fn node_index(mut self, index: impl Into<String>) -> Self {
        self.config.node_index = index.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> CoreConfig {
        self.config
    }
}

impl Default for CoreConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
