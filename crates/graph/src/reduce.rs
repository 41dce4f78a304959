//! Dimensionality-reduction seam
//!
//! The reduction routine itself (UMAP-style manifold projection) is an
//! external collaborator reached over HTTP; this module defines the trait
//! boundary, the remote client, the temporal z-axis override applied on
//! this side of the boundary, and a mock for tests.

use async_trait::async_trait;
use papergraph_common::config::ComputeConfig;
use papergraph_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Symmetric range the temporal z-axis is rescaled into.
const TEMPORAL_Z_RANGE: f32 = 10.0;

/// Reduces high-dimensional embeddings to 3D coordinates.
///
/// Contract: the output row count equals the input row count.
#[async_trait]
pub trait EmbeddingReducer: Send + Sync {
    async fn reduce_to_3d(&self, embeddings: &[Vec<f32>]) -> Result<Vec<[f32; 3]>>;
}

/// Override the z coordinate with a linear rescaling of publication year
/// into [-TEMPORAL_Z_RANGE, +TEMPORAL_Z_RANGE]. Unknown years map to the
/// midpoint; a degenerate single-year range collapses to the midpoint too.
pub fn override_temporal_z(coords: &mut [[f32; 3]], years: &[Option<i32>]) {
    debug_assert_eq!(coords.len(), years.len());

    let known: Vec<i32> = years.iter().flatten().copied().collect();
    let (Some(&min_year), Some(&max_year)) = (known.iter().min(), known.iter().max()) else {
        for coord in coords.iter_mut() {
            coord[2] = 0.0;
        }
        return;
    };

    let span = (max_year - min_year) as f32;
    for (coord, year) in coords.iter_mut().zip(years) {
        coord[2] = match year {
            Some(year) if span > 0.0 => {
                -TEMPORAL_Z_RANGE + 2.0 * TEMPORAL_Z_RANGE * (year - min_year) as f32 / span
            }
            _ => 0.0,
        };
    }
}

// ==================== Remote implementation ====================

#[derive(Serialize)]
struct ReduceRequest<'a> {
    embeddings: &'a [Vec<f32>],
    n_components: usize,
}

#[derive(Deserialize)]
struct ReduceResponse {
    coords: Vec<[f32; 3]>,
}

/// Reducer backed by the HTTP compute service.
pub struct RemoteReducer {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteReducer {
    pub fn new(config: &ComputeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to build compute HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingReducer for RemoteReducer {
    async fn reduce_to_3d(&self, embeddings: &[Vec<f32>]) -> Result<Vec<[f32; 3]>> {
        // Too few points for a meaningful projection
        if embeddings.len() < 2 {
            return Ok(vec![[0.0; 3]; embeddings.len()]);
        }

        let url = format!("{}/reduce3d", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ReduceRequest {
                embeddings,
                n_components: 3,
            })
            .send()
            .await
            .map_err(|e| AppError::ReductionError {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(AppError::ReductionError {
                message: format!("compute service returned HTTP {}", response.status()),
            });
        }

        let body: ReduceResponse =
            response.json().await.map_err(|e| AppError::ReductionError {
                message: format!("invalid reduce3d response: {}", e),
            })?;

        if body.coords.len() != embeddings.len() {
            return Err(AppError::ReductionError {
                message: format!(
                    "row count mismatch: {} embeddings, {} coordinates",
                    embeddings.len(),
                    body.coords.len()
                ),
            });
        }

        debug!(rows = body.coords.len(), "Reduced embeddings to 3D");
        Ok(body.coords)
    }
}

// ==================== Mock implementation ====================

/// Deterministic reducer for tests: projects onto the first three
/// dimensions of each embedding.
pub struct MockReducer;

#[async_trait]
impl EmbeddingReducer for MockReducer {
    async fn reduce_to_3d(&self, embeddings: &[Vec<f32>]) -> Result<Vec<[f32; 3]>> {
        Ok(embeddings
            .iter()
            .map(|e| {
                [
                    e.first().copied().unwrap_or(0.0),
                    e.get(1).copied().unwrap_or(0.0),
                    e.get(2).copied().unwrap_or(0.0),
                ]
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_reducer_preserves_row_count() {
        let embeddings = vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]];
        let coords = MockReducer.reduce_to_3d(&embeddings).await.unwrap();
        assert_eq!(coords.len(), 2);
        assert_eq!(coords[0], [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_temporal_z_rescales_years() {
        let mut coords = [[0.0; 3], [0.0; 3], [0.0; 3]];
        let years = [Some(2000), Some(2010), Some(2020)];
        override_temporal_z(&mut coords, &years);

        assert!((coords[0][2] + 10.0).abs() < 1e-6);
        assert!(coords[1][2].abs() < 1e-6);
        assert!((coords[2][2] - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_temporal_z_unknown_year_maps_to_midpoint() {
        let mut coords = [[1.0, 1.0, 5.0], [1.0, 1.0, 5.0], [1.0, 1.0, 5.0]];
        let years = [Some(1990), None, Some(2020)];
        override_temporal_z(&mut coords, &years);

        assert!(coords[1][2].abs() < 1e-6);
        // x/y untouched
        assert_eq!(coords[1][0], 1.0);
    }

    #[test]
    fn test_temporal_z_degenerate_range() {
        let mut coords = [[0.0; 3], [0.0; 3]];
        override_temporal_z(&mut coords, &[Some(2021), Some(2021)]);
        assert_eq!(coords[0][2], 0.0);
        assert_eq!(coords[1][2], 0.0);

        let mut coords = [[0.0, 0.0, 3.0]];
        override_temporal_z(&mut coords, &[None]);
        assert_eq!(coords[0][2], 0.0);
    }
}
