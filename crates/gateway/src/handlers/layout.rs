//! Incremental placement handler
//!
//! Places one new paper into an existing graph without re-running the
//! global reduction: interpolated position plus nearest-centroid cluster.

use crate::AppState;
use axum::{extract::State, Json};
use papergraph_common::errors::{AppError, Result};
use papergraph_graph::layout::{cluster_centroids, AnchorNode, IncrementalLayoutEngine};
use serde::{Deserialize, Serialize};

/// An existing node of the caller's graph.
#[derive(Debug, Deserialize)]
pub struct PlacementNode {
    pub embedding: Vec<f32>,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(default = "default_cluster")]
    pub cluster_id: i32,
}

fn default_cluster() -> i32 {
    papergraph_common::NOISE_CLUSTER
}

#[derive(Debug, Deserialize)]
pub struct PlaceRequest {
    /// Embedding of the paper being placed
    pub embedding: Vec<f32>,

    /// Existing placed nodes to anchor against
    #[serde(default)]
    pub nodes: Vec<PlacementNode>,

    /// Number of nearest neighbors to interpolate between
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    3
}

#[derive(Debug, Serialize)]
pub struct PlaceResponse {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub cluster_id: i32,
}

/// Place a new paper into an existing 3D graph.
pub async fn place_paper(
    State(state): State<AppState>,
    Json(request): Json<PlaceRequest>,
) -> Result<Json<PlaceResponse>> {
    if request.embedding.is_empty() {
        return Err(AppError::MissingField {
            field: "embedding".to_string(),
        });
    }
    if request.k == 0 {
        return Err(AppError::Validation {
            message: "k must be at least 1".to_string(),
            field: Some("k".to_string()),
        });
    }

    let anchors: Vec<AnchorNode> = request
        .nodes
        .iter()
        .filter(|n| !n.embedding.is_empty())
        .map(|n| AnchorNode {
            embedding: n.embedding.clone(),
            position: [n.x, n.y, n.z],
        })
        .collect();

    let engine =
        IncrementalLayoutEngine::new(request.k, state.config.graph.layout_jitter, 0.5);
    let position = engine.place(&request.embedding, &anchors);

    let labels: Vec<i32> = request.nodes.iter().map(|n| n.cluster_id).collect();
    let embeddings: Vec<Vec<f32>> = request.nodes.iter().map(|n| n.embedding.clone()).collect();
    let centroids = cluster_centroids(&labels, &embeddings);
    let cluster_id = engine.assign_cluster(&request.embedding, &centroids);

    Ok(Json(PlaceResponse {
        x: position[0],
        y: position[1],
        z: position[2],
        cluster_id,
    }))
}
