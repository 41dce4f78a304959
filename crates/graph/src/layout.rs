//! Incremental graph layout for stable expansion
//!
//! Places a newly fetched paper into an existing 3D graph without
//! re-running global dimensionality reduction, using nearest-neighbor
//! position interpolation plus a small jitter so points do not overlap.

use crate::similarity::{cosine_similarity, l2_norm};
use papergraph_common::NOISE_CLUSTER;
use rand::thread_rng;
use rand_distr::{Distribution, Normal};
use std::collections::HashMap;

/// An existing node usable as a placement anchor.
#[derive(Debug, Clone)]
pub struct AnchorNode {
    pub embedding: Vec<f32>,
    pub position: [f32; 3],
}

/// Places new papers into an existing layout and assigns them to the
/// nearest existing cluster.
#[derive(Debug, Clone)]
pub struct IncrementalLayoutEngine {
    /// Number of nearest neighbors to interpolate between
    pub k: usize,

    /// Standard deviation of the per-axis Gaussian jitter
    pub jitter_scale: f32,

    /// Minimum centroid similarity for a cluster assignment
    pub assign_threshold: f32,
}

impl Default for IncrementalLayoutEngine {
    fn default() -> Self {
        Self {
            k: 3,
            jitter_scale: 2.0,
            assign_threshold: 0.5,
        }
    }
}

impl IncrementalLayoutEngine {
    pub fn new(k: usize, jitter_scale: f32, assign_threshold: f32) -> Self {
        Self {
            k,
            jitter_scale,
            assign_threshold,
        }
    }

    /// Compute a 3D position for a new paper.
    ///
    /// Takes the top-k most similar anchors, clamps negative similarities
    /// to zero, renormalizes the weights to sum to 1 (uniform fallback when
    /// nothing is positive), and returns the weighted average position plus
    /// independent Gaussian jitter per axis.
    pub fn place(&self, new_embedding: &[f32], existing: &[AnchorNode]) -> [f32; 3] {
        if existing.is_empty() || l2_norm(new_embedding) == 0.0 {
            return [0.0; 3];
        }

        let mut similarities: Vec<(usize, f32)> = existing
            .iter()
            .enumerate()
            .map(|(i, anchor)| (i, cosine_similarity(new_embedding, &anchor.embedding)))
            .collect();
        similarities.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        let k = self.k.min(existing.len());
        let top_k = &similarities[..k];

        let mut weights: Vec<f32> = top_k.iter().map(|&(_, sim)| sim.max(0.0)).collect();
        let weight_sum: f32 = weights.iter().sum();
        if weight_sum == 0.0 {
            weights = vec![1.0 / k as f32; k];
        } else {
            for w in &mut weights {
                *w /= weight_sum;
            }
        }

        let mut position = [0.0f32; 3];
        for (&(i, _), &w) in top_k.iter().zip(&weights) {
            for axis in 0..3 {
                position[axis] += existing[i].position[axis] * w;
            }
        }

        if self.jitter_scale > 0.0 {
            let normal = Normal::new(0.0f32, self.jitter_scale)
                .expect("jitter_scale is positive and finite");
            let mut rng = thread_rng();
            for axis in &mut position {
                *axis += normal.sample(&mut rng);
            }
        }

        position
    }

    /// Assign a new paper to the most similar existing cluster centroid,
    /// or the noise sentinel when nothing clears the threshold.
    pub fn assign_cluster(
        &self,
        new_embedding: &[f32],
        centroids: &HashMap<i32, Vec<f32>>,
    ) -> i32 {
        if centroids.is_empty() || l2_norm(new_embedding) == 0.0 {
            return NOISE_CLUSTER;
        }

        let mut best_cluster = NOISE_CLUSTER;
        let mut best_sim = f32::NEG_INFINITY;

        // Iterate in key order so ties resolve deterministically
        let mut cluster_ids: Vec<i32> = centroids.keys().copied().collect();
        cluster_ids.sort_unstable();

        for cid in cluster_ids {
            let centroid = &centroids[&cid];
            if l2_norm(centroid) == 0.0 {
                continue;
            }
            let sim = cosine_similarity(new_embedding, centroid);
            if sim > best_sim {
                best_sim = sim;
                best_cluster = cid;
            }
        }

        if best_sim >= self.assign_threshold {
            best_cluster
        } else {
            NOISE_CLUSTER
        }
    }
}

/// Mean embedding centroid per non-noise cluster.
///
/// `labels` and `embeddings` are parallel; rows without an embedding are
/// passed as empty slices and skipped.
pub fn cluster_centroids(labels: &[i32], embeddings: &[Vec<f32>]) -> HashMap<i32, Vec<f32>> {
    debug_assert_eq!(labels.len(), embeddings.len());

    let mut sums: HashMap<i32, (Vec<f32>, usize)> = HashMap::new();
    for (&label, embedding) in labels.iter().zip(embeddings) {
        if label == NOISE_CLUSTER || embedding.is_empty() {
            continue;
        }
        let entry = sums
            .entry(label)
            .or_insert_with(|| (vec![0.0; embedding.len()], 0));
        for (sum, value) in entry.0.iter_mut().zip(embedding) {
            *sum += value;
        }
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(label, (mut sum, count))| {
            for value in &mut sum {
                *value /= count as f32;
            }
            (label, sum)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(embedding: Vec<f32>, position: [f32; 3]) -> AnchorNode {
        AnchorNode {
            embedding,
            position,
        }
    }

    fn engine_without_jitter() -> IncrementalLayoutEngine {
        IncrementalLayoutEngine::new(3, 0.0, 0.5)
    }

    #[test]
    fn test_place_interpolates_between_neighbors() {
        let engine = engine_without_jitter();
        let existing = vec![
            anchor(vec![1.0, 0.0], [0.0, 0.0, 0.0]),
            anchor(vec![1.0, 0.05], [2.0, 2.0, 2.0]),
            anchor(vec![0.0, 1.0], [100.0, 100.0, 100.0]),
        ];

        // Similar to the first two anchors, dissimilar to the outlier
        let position = engine.place(&[1.0, 0.02], &existing);

        // Lands between the two similar anchors, far from the outlier
        assert!(position[0] > 0.0 && position[0] < 3.0);
        assert!(position[1] > 0.0 && position[1] < 3.0);
    }

    #[test]
    fn test_place_exactly_on_single_match() {
        let engine = IncrementalLayoutEngine::new(1, 0.0, 0.5);
        let existing = vec![
            anchor(vec![1.0, 0.0], [4.0, -2.0, 7.0]),
            anchor(vec![0.0, 1.0], [0.0, 0.0, 0.0]),
        ];

        let position = engine.place(&[1.0, 0.0], &existing);
        assert_eq!(position, [4.0, -2.0, 7.0]);
    }

    #[test]
    fn test_place_with_no_anchors_is_origin() {
        let engine = engine_without_jitter();
        assert_eq!(engine.place(&[1.0, 0.0], &[]), [0.0; 3]);
        // Zero embedding cannot be compared to anything
        let existing = vec![anchor(vec![1.0, 0.0], [1.0, 1.0, 1.0])];
        assert_eq!(engine.place(&[0.0, 0.0], &existing), [0.0; 3]);
    }

    #[test]
    fn test_place_uniform_fallback_for_negative_similarities() {
        let engine = IncrementalLayoutEngine::new(2, 0.0, 0.5);
        let existing = vec![
            anchor(vec![-1.0, 0.0], [2.0, 0.0, 0.0]),
            anchor(vec![0.0, -1.0], [0.0, 2.0, 0.0]),
        ];

        // All similarities negative: uniform weights over the top-k
        let position = engine.place(&[1.0, 1.0], &existing);
        assert!((position[0] - 1.0).abs() < 1e-6);
        assert!((position[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_jitter_perturbs_but_stays_near_anchor() {
        let engine = IncrementalLayoutEngine::new(1, 0.5, 0.5);
        let existing = vec![anchor(vec![1.0, 0.0], [10.0, 10.0, 10.0])];

        let position = engine.place(&[1.0, 0.0], &existing);
        for axis in 0..3 {
            assert!((position[axis] - 10.0).abs() < 10.0);
        }
    }

    #[test]
    fn test_assign_cluster_nearest_centroid() {
        let engine = engine_without_jitter();
        let mut centroids = HashMap::new();
        centroids.insert(0, vec![1.0, 0.0]);
        centroids.insert(1, vec![0.0, 1.0]);

        assert_eq!(engine.assign_cluster(&[0.9, 0.1], &centroids), 0);
        assert_eq!(engine.assign_cluster(&[0.1, 0.9], &centroids), 1);
    }

    #[test]
    fn test_assign_cluster_below_threshold_is_noise() {
        let engine = engine_without_jitter();
        let mut centroids = HashMap::new();
        centroids.insert(0, vec![1.0, 0.0, 0.0]);

        // Orthogonal: similarity 0 < 0.5
        assert_eq!(engine.assign_cluster(&[0.0, 1.0, 0.0], &centroids), NOISE_CLUSTER);
        // No centroids at all
        assert_eq!(engine.assign_cluster(&[1.0, 0.0, 0.0], &HashMap::new()), NOISE_CLUSTER);
    }

    #[test]
    fn test_cluster_centroids_means_and_skips_noise() {
        let labels = vec![0, 0, 1, -1];
        let embeddings = vec![
            vec![1.0, 0.0],
            vec![3.0, 2.0],
            vec![0.0, 4.0],
            vec![9.0, 9.0],
        ];

        let centroids = cluster_centroids(&labels, &embeddings);
        assert_eq!(centroids.len(), 2);
        assert_eq!(centroids[&0], vec![2.0, 1.0]);
        assert_eq!(centroids[&1], vec![0.0, 4.0]);
    }
}
