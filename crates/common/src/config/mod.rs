//! Configuration management for PaperGraph services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (graph cache store)
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Redis configuration (provider response side-cache)
    #[serde(default)]
    pub redis: RedisConfig,

    /// OpenAlex client configuration
    #[serde(default)]
    pub openalex: OpenAlexConfig,

    /// Semantic Scholar client configuration
    #[serde(default)]
    pub semantic_scholar: SemanticScholarConfig,

    /// Graph pipeline configuration
    #[serde(default)]
    pub graph: GraphConfig,

    /// Compute service configuration (reduction + clustering)
    #[serde(default)]
    pub compute: ComputeConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Postgres URL; when absent, caching is disabled rather than fatal
    pub url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RedisConfig {
    /// Redis URL; when absent, the side-cache is disabled
    pub url: Option<String>,

    /// TTL for cached provider reference/citation responses, in seconds
    #[serde(default = "default_refs_ttl")]
    pub refs_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAlexConfig {
    /// Polite-pool contact email (mailto param)
    pub email: Option<String>,

    /// Premium API key
    pub api_key: Option<String>,

    /// Daily credit budget for the premium API
    #[serde(default = "default_oa_credit_limit")]
    pub daily_credit_limit: u64,

    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries per request
    #[serde(default = "default_provider_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SemanticScholarConfig {
    /// API key (raises the rate limit to 1 rps)
    pub api_key: Option<String>,

    /// Requests per second budget
    #[serde(default = "default_s2_rps")]
    pub requests_per_second: u32,

    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries per request
    #[serde(default = "default_provider_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphConfig {
    /// Minimum cosine similarity for a similarity edge
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Degree cap per node in the similarity graph
    #[serde(default = "default_max_edges_per_node")]
    pub max_edges_per_node: usize,

    /// Minimum cluster size passed to the clusterer
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,

    /// Cache freshness window in hours
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: i64,

    /// How many top-cited papers the background enrichment fetches references for
    #[serde(default = "default_enrichment_top_n")]
    pub enrichment_top_n: usize,

    /// Reference fan-out per enriched paper
    #[serde(default = "default_enrichment_refs_limit")]
    pub enrichment_refs_limit: usize,

    /// Standard deviation of the per-axis placement jitter
    #[serde(default = "default_layout_jitter")]
    pub layout_jitter: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ComputeConfig {
    /// Base URL of the reduce/cluster compute service
    #[serde(default = "default_compute_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_compute_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 60 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 10 }
fn default_connect_timeout() -> u64 { 10 }
fn default_refs_ttl() -> u64 { 60 * 60 * 24 * 7 }
fn default_oa_credit_limit() -> u64 { 100_000 }
fn default_provider_timeout() -> u64 { 30 }
fn default_provider_retries() -> u32 { 3 }
fn default_s2_rps() -> u32 { 1 }
fn default_similarity_threshold() -> f32 { 0.7 }
fn default_max_edges_per_node() -> usize { 10 }
fn default_min_cluster_size() -> usize { 5 }
fn default_cache_ttl_hours() -> i64 { 24 }
fn default_enrichment_top_n() -> usize { 20 }
fn default_enrichment_refs_limit() -> usize { 200 }
fn default_layout_jitter() -> f32 { 2.0 }
fn default_compute_url() -> String { "http://localhost:8000".to_string() }
fn default_compute_timeout() -> u64 { 120 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "papergraph".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for OpenAlexConfig {
    fn default() -> Self {
        Self {
            email: None,
            api_key: None,
            daily_credit_limit: default_oa_credit_limit(),
            timeout_secs: default_provider_timeout(),
            max_retries: default_provider_retries(),
        }
    }
}

impl Default for SemanticScholarConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            requests_per_second: default_s2_rps(),
            timeout_secs: default_provider_timeout(),
            max_retries: default_provider_retries(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_edges_per_node: default_max_edges_per_node(),
            min_cluster_size: default_min_cluster_size(),
            cache_ttl_hours: default_cache_ttl_hours(),
            enrichment_top_n: default_enrichment_top_n(),
            enrichment_refs_limit: default_enrichment_refs_limit(),
            layout_jitter: default_layout_jitter(),
        }
    }
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            base_url: default_compute_url(),
            timeout_secs: default_compute_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            openalex: OpenAlexConfig::default(),
            semantic_scholar: SemanticScholarConfig::default(),
            graph: GraphConfig::default(),
            compute: ComputeConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.graph.similarity_threshold, 0.7);
        assert_eq!(config.graph.cache_ttl_hours, 24);
        assert!(config.database.url.is_none());
    }

    #[test]
    fn test_provider_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.openalex.daily_credit_limit, 100_000);
        assert_eq!(config.semantic_scholar.requests_per_second, 1);
        assert_eq!(config.semantic_scholar.max_retries, 3);
    }
}
