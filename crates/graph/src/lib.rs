//! PaperGraph graph construction and analytics
//!
//! Everything between fused records and an assembled 3D graph response:
//! - Bounded-degree similarity edge construction
//! - External dimensionality-reduction and clustering seams
//! - Incremental node placement without global re-layout
//! - Bridge, gap, and trend analytics

pub mod analytics;
pub mod cluster;
pub mod layout;
pub mod reduce;
pub mod similarity;

pub use analytics::{AnalysisPaper, BridgeDetector, ClusterRef, GapDetector, TrendAnalyzer};
pub use cluster::{label_clusters, Clusterer, MockClusterer, RemoteClusterer};
pub use layout::{cluster_centroids, AnchorNode, IncrementalLayoutEngine};
pub use reduce::{override_temporal_z, EmbeddingReducer, MockReducer, RemoteReducer};
pub use similarity::{cosine_similarity, SimilarityGraphBuilder};
