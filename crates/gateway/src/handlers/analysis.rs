//! Trend and gap analysis handlers
//!
//! Stateless compute endpoints: the caller supplies a graph snapshot
//! (papers, clusters, edges) and gets the analysis back.

use crate::AppState;
use axum::{extract::State, Json};
use papergraph_common::models::{EdgeKind, GraphEdge};
use papergraph_graph::analytics::{
    AnalysisPaper, ClusterRef, GapAnalysisResult, GapDetector, TrendAnalysisResult, TrendAnalyzer,
};
use serde::Deserialize;

/// Edge as supplied by callers; kind defaults to similarity.
#[derive(Debug, Deserialize)]
pub struct EdgeInput {
    pub source: String,
    pub target: String,
    #[serde(rename = "type", default = "default_edge_type")]
    pub kind: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

fn default_edge_type() -> String {
    "similarity".to_string()
}
fn default_weight() -> f32 {
    1.0
}

impl EdgeInput {
    fn into_edge(self) -> GraphEdge {
        let kind = if self.kind == "citation" {
            EdgeKind::Citation
        } else {
            EdgeKind::Similarity
        };
        GraphEdge {
            source: self.source,
            target: self.target,
            kind,
            weight: self.weight,
            intent: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TrendRequest {
    pub papers: Vec<AnalysisPaper>,
    pub clusters: Vec<ClusterRef>,
}

#[derive(Debug, Deserialize)]
pub struct GapRequest {
    pub papers: Vec<AnalysisPaper>,
    pub clusters: Vec<ClusterRef>,
    #[serde(default)]
    pub edges: Vec<EdgeInput>,
}

/// Classify clusters as emerging, stable, or declining.
pub async fn analyze_trends(
    State(_state): State<AppState>,
    Json(request): Json<TrendRequest>,
) -> Json<TrendAnalysisResult> {
    Json(TrendAnalyzer.analyze_trends(&request.papers, &request.clusters))
}

/// Detect structural gaps between cluster pairs.
pub async fn detect_gaps(
    State(_state): State<AppState>,
    Json(request): Json<GapRequest>,
) -> Json<GapAnalysisResult> {
    let edges: Vec<GraphEdge> = request.edges.into_iter().map(EdgeInput::into_edge).collect();
    Json(GapDetector.detect_gaps(&request.papers, &request.clusters, &edges))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_input_defaults_to_similarity() {
        let input: EdgeInput =
            serde_json::from_value(serde_json::json!({"source": "a", "target": "b"})).unwrap();
        let edge = input.into_edge();
        assert_eq!(edge.kind, EdgeKind::Similarity);
        assert_eq!(edge.weight, 1.0);
    }

    #[test]
    fn test_edge_input_parses_citation_kind() {
        let input: EdgeInput = serde_json::from_value(serde_json::json!({
            "source": "a",
            "target": "b",
            "type": "citation",
            "weight": 0.8
        }))
        .unwrap();
        let edge = input.into_edge();
        assert_eq!(edge.kind, EdgeKind::Citation);
        assert_eq!(edge.weight, 0.8);
    }
}
