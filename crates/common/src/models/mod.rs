//! Core data model for PaperGraph
//!
//! Explicit tagged structs for everything that flows between fusion,
//! graph construction, analytics, and the cache pipeline. Required vs.
//! optional fields are spelled out here rather than carried in loose maps.

use crate::errors::Provider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Paper author with optional institutional affiliations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affiliations: Vec<String>,
}

/// Topic tag attached to a record (from the primary metadata source).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TopicTag {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// A merged paper record combining both providers.
///
/// Created once per search request during fusion and immutable afterwards;
/// background enrichment only ever appends citation edges referencing its id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnifiedRecord {
    /// Normalized DOI (lowercased, URL/`doi:` prefixes stripped)
    pub doi: Option<String>,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub citation_count: i64,
    #[serde(default)]
    pub fields_of_study: Vec<String>,
    #[serde(default)]
    pub topics: Vec<TopicTag>,
    /// Short machine-generated summary
    pub tldr: Option<String>,
    /// SPECTER embedding; only embedded records enter the graph pipeline
    pub embedding: Option<Vec<f32>>,
    pub is_open_access: bool,
    pub oa_url: Option<String>,
    #[serde(default)]
    pub authors: Vec<Author>,
    pub openalex_id: Option<String>,
    pub s2_paper_id: Option<String>,
    /// Reciprocal Rank Fusion score over both provider rank lists
    pub rrf_score: f64,
}

impl UnifiedRecord {
    /// Stable dedup key: normalized DOI when present, else normalized title.
    pub fn dedup_key(&self) -> String {
        self.doi
            .clone()
            .unwrap_or_else(|| self.title.to_lowercase().trim().to_string())
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }
}

/// Edge kind in the result graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Undirected embedding-similarity edge
    Similarity,
    /// Directed citation edge (source cites target)
    Citation,
}

/// Edge between two graph nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    pub weight: f32,
    /// Best-effort intent classification (e.g. supports/background)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
}

impl GraphEdge {
    /// Canonical key for an unordered node pair.
    pub fn unordered_key(&self) -> (String, String) {
        if self.source <= self.target {
            (self.source.clone(), self.target.clone())
        } else {
            (self.target.clone(), self.source.clone())
        }
    }
}

/// A unified record placed in 3D space with a cluster assignment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub citation_count: i64,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub topics: Vec<TopicTag>,
    pub tldr: Option<String>,
    pub is_open_access: bool,
    pub oa_url: Option<String>,
    #[serde(default)]
    pub authors: Vec<Author>,
    pub doi: Option<String>,
    pub s2_paper_id: Option<String>,
    pub openalex_id: Option<String>,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub cluster_id: i32,
    #[serde(default)]
    pub cluster_label: String,
    /// Set only after bridge analytics run
    #[serde(default)]
    pub is_bridge: bool,
}

/// Summary of one cluster in the result graph.
///
/// Cluster id -1 is the reserved noise/unclustered sentinel and is present
/// whenever any node is unclustered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub id: i32,
    pub label: String,
    #[serde(default)]
    pub topic_names: Vec<String>,
    pub paper_count: usize,
    pub color: String,
    #[serde(default)]
    pub hull_points: Vec<[f32; 3]>,
}

/// Outcome of one provider fetch, surfaced in response metadata.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Ok,
    Failed,
    RateLimited,
}

/// Per-provider fetch outcomes for a fused search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMeta {
    pub provider: Provider,
    pub status: SourceStatus,
    pub result_count: usize,
}

/// Response metadata attached to a graph payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphMeta {
    pub query: String,
    pub total: usize,
    pub with_embeddings: usize,
    pub clusters: usize,
    pub similarity_edges: usize,
    pub citation_edges: usize,
    pub citation_enriched: bool,
    pub bridge_nodes: usize,
    #[serde(default)]
    pub sources: Vec<SourceMeta>,
    pub elapsed_ms: u64,
}

/// Complete graph response: nodes, edges, clusters, and metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphPayload {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub clusters: Vec<ClusterSummary>,
    pub meta: GraphMeta,
}

impl GraphPayload {
    /// Count of edges of the given kind.
    pub fn edge_count(&self, kind: EdgeKind) -> usize {
        self.edges.iter().filter(|e| e.kind == kind).count()
    }
}

/// One cached search result row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cache_key: String,
    pub payload: GraphPayload,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_key_prefers_doi() {
        let record = UnifiedRecord {
            doi: Some("10.1/x".into()),
            title: "Some Title".into(),
            ..Default::default()
        };
        assert_eq!(record.dedup_key(), "10.1/x");
    }

    #[test]
    fn test_dedup_key_falls_back_to_title() {
        let record = UnifiedRecord {
            doi: None,
            title: "  Attention Is All You Need ".into(),
            ..Default::default()
        };
        assert_eq!(record.dedup_key(), "attention is all you need");
    }

    #[test]
    fn test_unordered_key_is_canonical() {
        let ab = GraphEdge {
            source: "a".into(),
            target: "b".into(),
            kind: EdgeKind::Similarity,
            weight: 0.9,
            intent: None,
        };
        let ba = GraphEdge {
            source: "b".into(),
            target: "a".into(),
            kind: EdgeKind::Similarity,
            weight: 0.9,
            intent: None,
        };
        assert_eq!(ab.unordered_key(), ba.unordered_key());
    }

    #[test]
    fn test_edge_kind_serializes_as_type() {
        let edge = GraphEdge {
            source: "0".into(),
            target: "1".into(),
            kind: EdgeKind::Citation,
            weight: 0.8,
            intent: Some("background".into()),
        };
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["type"], "citation");
    }
}
