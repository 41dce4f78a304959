//! Bridge node detection
//!
//! Detects papers that act as hubs connecting multiple research clusters.

use super::percentile;
use papergraph_common::models::GraphEdge;
use papergraph_common::NOISE_CLUSTER;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Detects bridge nodes: papers with cross-cluster edges into two or more
/// other clusters, scored by how many distinct clusters they reach.
#[derive(Debug, Clone)]
pub struct BridgeDetector {
    /// Top fraction of candidates eligible for the percentile threshold
    pub top_percentile: f64,
}

impl Default for BridgeDetector {
    fn default() -> Self {
        Self { top_percentile: 0.05 }
    }
}

impl BridgeDetector {
    pub fn new(top_percentile: f64) -> Self {
        Self { top_percentile }
    }

    /// Return the ids of bridge nodes.
    ///
    /// For every edge spanning two different non-noise clusters, each
    /// endpoint is credited with the other side's cluster id. Candidates
    /// reach at least 2 distinct clusters; the final threshold is the
    /// smaller of 2 and the score at the `(1 - top_percentile)` percentile
    /// of candidate scores. No candidates means an empty set.
    pub fn detect(
        &self,
        node_clusters: &HashMap<String, i32>,
        edges: &[GraphEdge],
    ) -> HashSet<String> {
        if node_clusters.is_empty() || edges.is_empty() {
            return HashSet::new();
        }

        // Distinct other-side clusters credited to each node
        let mut credited: HashMap<&str, HashSet<i32>> = HashMap::new();

        for edge in edges {
            let src_cluster = *node_clusters.get(&edge.source).unwrap_or(&NOISE_CLUSTER);
            let tgt_cluster = *node_clusters.get(&edge.target).unwrap_or(&NOISE_CLUSTER);

            // Only cross-cluster edges between real clusters count
            if src_cluster == tgt_cluster {
                continue;
            }
            if src_cluster == NOISE_CLUSTER || tgt_cluster == NOISE_CLUSTER {
                continue;
            }

            credited.entry(&edge.source).or_default().insert(tgt_cluster);
            credited.entry(&edge.target).or_default().insert(src_cluster);
        }

        let candidates: HashMap<&str, usize> = credited
            .into_iter()
            .map(|(id, clusters)| (id, clusters.len()))
            .filter(|&(_, score)| score >= 2)
            .collect();

        if candidates.is_empty() {
            return HashSet::new();
        }

        let mut scores: Vec<f64> = candidates.values().map(|&s| s as f64).collect();
        scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let cutoff = percentile(&scores, (1.0 - self.top_percentile) * 100.0);
        let threshold = cutoff.min(2.0);

        let bridges: HashSet<String> = candidates
            .into_iter()
            .filter(|&(_, score)| score as f64 >= threshold)
            .map(|(id, _)| id.to_string())
            .collect();

        info!(
            bridges = bridges.len(),
            threshold, "Bridge detection complete"
        );

        bridges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use papergraph_common::models::EdgeKind;

    fn edge(source: &str, target: &str) -> GraphEdge {
        GraphEdge {
            source: source.to_string(),
            target: target.to_string(),
            kind: EdgeKind::Similarity,
            weight: 0.9,
            intent: None,
        }
    }

    /// Three tight clusters, disconnected except for one paper linked into
    /// two foreign clusters: exactly that paper is a bridge.
    #[test]
    fn test_single_linking_paper_is_the_only_bridge() {
        let mut node_clusters = HashMap::new();
        let mut edges = Vec::new();

        // 15 nodes per cluster, chained internally
        for cluster in 0..3 {
            for i in 0..15 {
                let id = format!("c{}-{}", cluster, i);
                node_clusters.insert(id, cluster);
                if i > 0 {
                    edges.push(edge(
                        &format!("c{}-{}", cluster, i - 1),
                        &format!("c{}-{}", cluster, i),
                    ));
                }
            }
        }

        // One paper in cluster 0 linked into clusters 1 and 2
        edges.push(edge("c0-0", "c1-3"));
        edges.push(edge("c0-0", "c2-7"));

        let bridges = BridgeDetector::default().detect(&node_clusters, &edges);
        assert_eq!(bridges.len(), 1);
        assert!(bridges.contains("c0-0"));
    }

    #[test]
    fn test_no_candidates_returns_empty_set() {
        let mut node_clusters = HashMap::new();
        node_clusters.insert("a".to_string(), 0);
        node_clusters.insert("b".to_string(), 0);
        node_clusters.insert("c".to_string(), 1);

        // Only one cross-cluster edge: each endpoint reaches just 1 cluster
        let edges = vec![edge("a", "b"), edge("b", "c")];

        let bridges = BridgeDetector::default().detect(&node_clusters, &edges);
        assert!(bridges.is_empty());
    }

    #[test]
    fn test_noise_cluster_edges_are_ignored() {
        let mut node_clusters = HashMap::new();
        node_clusters.insert("n".to_string(), NOISE_CLUSTER);
        node_clusters.insert("a".to_string(), 0);
        node_clusters.insert("b".to_string(), 1);
        node_clusters.insert("c".to_string(), 2);

        // "n" touches three clusters but sits in noise; its edges credit the
        // other endpoints with the noise cluster, which never counts
        let edges = vec![edge("n", "a"), edge("n", "b"), edge("n", "c")];

        let bridges = BridgeDetector::default().detect(&node_clusters, &edges);
        assert!(bridges.is_empty());
    }

    #[test]
    fn test_empty_inputs() {
        let detector = BridgeDetector::default();
        assert!(detector.detect(&HashMap::new(), &[]).is_empty());
    }
}
