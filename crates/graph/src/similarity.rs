//! Cosine similarity edge computation for paper embeddings
//!
//! Computes pairwise cosine similarity between embeddings and emits a
//! bounded-degree edge set above a configurable threshold.

use papergraph_common::models::{EdgeKind, GraphEdge};
use tracing::debug;

/// Cosine similarity between two vectors; 0.0 when either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

pub(crate) fn l2_norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// L2-normalize a vector, leaving zero vectors untouched.
pub(crate) fn normalized(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v);
    if norm == 0.0 {
        v.to_vec()
    } else {
        v.iter().map(|x| x / norm).collect()
    }
}

/// Builds similarity edges between paper embeddings.
///
/// Degree capping is a strict first-come allocation in canonical node-index
/// order: an edge is emitted only while neither endpoint has reached the
/// cap from previously emitted edges. This is deliberately not a globally
/// optimal packing.
#[derive(Debug, Clone)]
pub struct SimilarityGraphBuilder {
    /// Minimum similarity to create an edge
    pub threshold: f32,

    /// Maximum edges per node (top-k)
    pub max_edges_per_node: usize,
}

impl Default for SimilarityGraphBuilder {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            max_edges_per_node: 10,
        }
    }
}

impl SimilarityGraphBuilder {
    pub fn new(threshold: f32, max_edges_per_node: usize) -> Self {
        Self {
            threshold,
            max_edges_per_node,
        }
    }

    /// Compute similarity edges between papers above the threshold.
    ///
    /// Guarantees: no self-loops, no duplicate unordered pairs, every edge
    /// weight is the exact similarity-matrix value, and no node exceeds
    /// `max_edges_per_node` edges.
    pub fn build_edges(&self, embeddings: &[Vec<f32>], ids: &[String]) -> Vec<GraphEdge> {
        debug_assert_eq!(embeddings.len(), ids.len());

        let n = embeddings.len();
        if n < 2 {
            return Vec::new();
        }

        let normalized: Vec<Vec<f32>> = embeddings.iter().map(|e| normalized(e)).collect();

        // Full pairwise cosine similarity matrix
        let mut matrix = vec![vec![0.0f32; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let sim = dot(&normalized[i], &normalized[j]);
                matrix[i][j] = sim;
                matrix[j][i] = sim;
            }
        }

        let mut edges = Vec::new();
        let mut degree = vec![0usize; n];

        for i in 0..n {
            // Candidates above threshold, excluding self, best first;
            // index as tiebreak keeps the ordering deterministic.
            let mut candidates: Vec<usize> = (0..n)
                .filter(|&j| j != i && matrix[i][j] >= self.threshold)
                .collect();
            candidates.sort_by(|&a, &b| {
                matrix[i][b]
                    .partial_cmp(&matrix[i][a])
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.cmp(&b))
            });
            candidates.truncate(self.max_edges_per_node);

            for j in candidates {
                // Each unordered pair is considered once, from its lower index
                if i >= j {
                    continue;
                }
                if degree[i] >= self.max_edges_per_node || degree[j] >= self.max_edges_per_node {
                    continue;
                }
                edges.push(GraphEdge {
                    source: ids[i].clone(),
                    target: ids[j].clone(),
                    kind: EdgeKind::Similarity,
                    weight: matrix[i][j],
                    intent: None,
                });
                degree[i] += 1;
                degree[j] += 1;
            }
        }

        debug!(
            edges = edges.len(),
            papers = n,
            threshold = self.threshold,
            "Computed similarity edges"
        );

        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_identical_unit_vectors_make_one_edge() {
        let v = vec![0.0, 1.0, 0.0, 0.0, 0.0];
        let builder = SimilarityGraphBuilder::new(0.7, 10);
        let edges = builder.build_edges(&[v.clone(), v], &ids(2));

        assert_eq!(edges.len(), 1);
        assert!(edges[0].weight >= 0.99);
    }

    #[test]
    fn test_orthogonal_vectors_make_no_edges() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let builder = SimilarityGraphBuilder::new(0.7, 10);
        assert!(builder.build_edges(&[a, b], &ids(2)).is_empty());
    }

    #[test]
    fn test_single_embedding_makes_no_edges() {
        let builder = SimilarityGraphBuilder::default();
        assert!(builder.build_edges(&[vec![1.0, 0.0]], &ids(1)).is_empty());
    }

    #[test]
    fn test_no_self_loops_or_duplicate_pairs() {
        // A clique of nearly identical vectors
        let embeddings: Vec<Vec<f32>> = (0..6)
            .map(|i| vec![1.0, 0.001 * i as f32, 0.0])
            .collect();
        let builder = SimilarityGraphBuilder::new(0.5, 10);
        let edges = builder.build_edges(&embeddings, &ids(6));

        let mut pairs = HashSet::new();
        for edge in &edges {
            assert_ne!(edge.source, edge.target);
            let key = if edge.source < edge.target {
                (edge.source.clone(), edge.target.clone())
            } else {
                (edge.target.clone(), edge.source.clone())
            };
            assert!(pairs.insert(key), "duplicate pair {:?}", edge);
        }
    }

    #[test]
    fn test_degree_cap_is_enforced() {
        // 8 near-identical vectors with a cap of 2 edges per node
        let embeddings: Vec<Vec<f32>> = (0..8)
            .map(|i| vec![1.0, 0.0001 * i as f32])
            .collect();
        let builder = SimilarityGraphBuilder::new(0.5, 2);
        let edges = builder.build_edges(&embeddings, &ids(8));

        let mut degree: HashMap<String, usize> = HashMap::new();
        for edge in &edges {
            *degree.entry(edge.source.clone()).or_default() += 1;
            *degree.entry(edge.target.clone()).or_default() += 1;
        }
        for (node, d) in degree {
            assert!(d <= 2, "node {} has degree {}", node, d);
        }
    }

    #[test]
    fn test_weights_are_exact_and_bounded() {
        let a = vec![1.0, 0.2, 0.0];
        let b = vec![0.9, 0.3, 0.1];
        let expected = cosine_similarity(&a, &b);

        let builder = SimilarityGraphBuilder::new(0.5, 10);
        let edges = builder.build_edges(&[a, b], &ids(2));

        assert_eq!(edges.len(), 1);
        assert!((edges[0].weight - expected).abs() < 1e-6);
        assert!(edges[0].weight >= 0.0 && edges[0].weight <= 1.0 + 1e-6);
    }

    #[test]
    fn test_zero_vector_is_harmless() {
        let builder = SimilarityGraphBuilder::new(0.5, 10);
        let edges = builder.build_edges(&[vec![0.0, 0.0], vec![1.0, 0.0]], &ids(2));
        assert!(edges.is_empty());
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
