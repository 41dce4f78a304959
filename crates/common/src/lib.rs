//! PaperGraph Common Library
//!
//! Shared code for the PaperGraph services including:
//! - Unified record and graph data model
//! - Error types and handling
//! - Configuration management
//! - Postgres-backed graph cache store
//! - Redis side-cache for provider responses
//! - Metrics and observability

pub mod cache;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod store;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use models::{GraphEdge, GraphNode, GraphPayload, UnifiedRecord};
pub use store::GraphCacheStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Dimensionality of the paper embeddings flowing through the pipeline
/// (SPECTER vectors from the Semantic Scholar graph API).
pub const EMBEDDING_DIMENSION: usize = 768;

/// Reserved cluster id for noise/unclustered points.
pub const NOISE_CLUSTER: i32 = -1;
