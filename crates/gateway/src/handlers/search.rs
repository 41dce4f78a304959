//! Graph search handler
//!
//! The main endpoint: fused provider search rendered as a 3D graph with
//! clusters, similarity edges, and bridge flags.

use crate::orchestrator::SearchParams;
use crate::AppState;
use axum::{extract::State, Json};
use papergraph_common::errors::{AppError, Result};
use papergraph_common::models::GraphPayload;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

/// Graph search request
#[derive(Debug, Deserialize, Validate)]
pub struct SearchRequest {
    #[validate(length(min = 1, max = 500))]
    pub query: String,

    /// Maximum results to return
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 500))]
    pub limit: usize,

    pub year_start: Option<i32>,
    pub year_end: Option<i32>,

    pub fields_of_study: Option<Vec<String>>,

    /// Minimum cosine similarity for a similarity edge
    #[serde(default = "default_similarity_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub similarity_threshold: f32,

    /// Minimum cluster size passed to the clusterer
    #[serde(default = "default_min_cluster_size")]
    #[validate(range(min = 2, max = 50))]
    pub min_cluster_size: usize,
}

fn default_limit() -> usize {
    200
}
fn default_similarity_threshold() -> f32 {
    0.7
}
fn default_min_cluster_size() -> usize {
    5
}

impl SearchRequest {
    /// Open-ended bounds are filled in so a single year still filters.
    fn year_range(&self) -> Option<(i32, i32)> {
        match (self.year_start, self.year_end) {
            (Some(start), Some(end)) => Some((start, end)),
            (Some(start), None) => Some((start, 2030)),
            (None, Some(end)) => Some((1900, end)),
            (None, None) => None,
        }
    }
}

/// Search papers and return a 3D graph payload.
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<GraphPayload>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let params = SearchParams {
        query: request.query.clone(),
        limit: request.limit,
        year_range: request.year_range(),
        fields_of_study: request.fields_of_study.clone(),
        similarity_threshold: request.similarity_threshold,
        min_cluster_size: request.min_cluster_size,
    };

    let payload = state.orchestrator.search(&params).await;

    info!(
        query = %request.query,
        nodes = payload.nodes.len(),
        edges = payload.edges.len(),
        "Graph search served"
    );

    Ok(Json(payload))
}
