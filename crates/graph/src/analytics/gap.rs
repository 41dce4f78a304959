//! Structural gap detection between clusters
//!
//! Analyzes inter-cluster edge density and embedding similarity to find
//! cluster pairs whose research connections are missing.

use super::{percentile, round4, AnalysisPaper, ClusterRef};
use crate::similarity::cosine_similarity;
use papergraph_common::models::GraphEdge;
use papergraph_common::NOISE_CLUSTER;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// Cluster identity carried inside a gap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapCluster {
    pub id: i32,
    pub label: String,
    pub paper_count: usize,
}

/// A paper that could bridge two clusters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgePaper {
    pub paper_id: String,
    pub title: String,
    pub score: f64,
}

/// A high-similarity cross-cluster pair with no existing edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PotentialEdge {
    pub source: String,
    pub target: String,
    pub similarity: f64,
}

/// A detected research gap between two clusters.
///
/// Created fresh per analysis call; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralGap {
    pub gap_id: String,
    pub cluster_a: GapCluster,
    pub cluster_b: GapCluster,
    /// 0 (well-connected) to 1 (complete gap)
    pub gap_strength: f64,
    pub bridge_papers: Vec<BridgePaper>,
    pub potential_edges: Vec<PotentialEdge>,
    /// Filled downstream by hypothesis generation; always empty here
    pub research_questions: Vec<String>,
}

/// Summary over all significant gaps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GapSummary {
    pub total_gaps: usize,
    pub avg_gap_strength: f64,
    pub strongest_gap: Option<StrongestGap>,
    pub threshold_used: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrongestGap {
    pub gap_id: String,
    pub clusters: (String, String),
    pub strength: f64,
}

/// Complete gap analysis across all cluster pairs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GapAnalysisResult {
    pub gaps: Vec<StructuralGap>,
    /// "a-b" cluster pair -> inter-cluster edge count
    pub cluster_connectivity_matrix: HashMap<String, usize>,
    pub summary: GapSummary,
}

/// Detects research gaps between clusters from edge density, centroid
/// similarity, and cross-cluster ghost edges.
#[derive(Debug, Clone, Default)]
pub struct GapDetector;

impl GapDetector {
    /// Detect structural gaps between non-noise cluster pairs.
    ///
    /// With fewer than two non-noise clusters the result is empty with a
    /// zeroed summary, never an error.
    pub fn detect_gaps(
        &self,
        papers: &[AnalysisPaper],
        clusters: &[ClusterRef],
        edges: &[GraphEdge],
    ) -> GapAnalysisResult {
        let valid_clusters: Vec<&ClusterRef> = clusters
            .iter()
            .filter(|c| c.id != NOISE_CLUSTER)
            .collect();

        if papers.is_empty() || valid_clusters.len() < 2 {
            return GapAnalysisResult::default();
        }

        // Cluster membership and id lookup
        let mut cluster_papers: HashMap<i32, Vec<&AnalysisPaper>> = HashMap::new();
        let mut paper_cluster: HashMap<&str, i32> = HashMap::new();
        for paper in papers {
            paper_cluster.insert(paper.id.as_str(), paper.cluster_id);
            if paper.cluster_id != NOISE_CLUSTER {
                cluster_papers.entry(paper.cluster_id).or_default().push(paper);
            }
        }

        let connectivity = Self::compute_connectivity(edges, &paper_cluster);
        let centroids = Self::compute_centroids(&cluster_papers);

        // One gap candidate per unordered non-noise cluster pair
        let mut gaps: Vec<StructuralGap> = Vec::new();
        for (ai, cluster_a) in valid_clusters.iter().enumerate() {
            for cluster_b in valid_clusters.iter().skip(ai + 1) {
                let papers_a = cluster_papers.get(&cluster_a.id);
                let papers_b = cluster_papers.get(&cluster_b.id);
                let (Some(papers_a), Some(papers_b)) = (papers_a, papers_b) else {
                    continue;
                };
                if papers_a.is_empty() || papers_b.is_empty() {
                    continue;
                }

                let pair = pair_key(cluster_a.id, cluster_b.id);
                let actual_edges = connectivity.get(&pair).copied().unwrap_or(0);
                let max_possible = papers_a.len() * papers_b.len();
                let gap_strength = 1.0 - actual_edges as f64 / max_possible as f64;

                let bridge_papers = Self::find_bridge_papers(
                    papers_a,
                    papers_b,
                    centroids.get(&cluster_a.id),
                    centroids.get(&cluster_b.id),
                );

                let potential_edges = Self::find_potential_edges(papers_a, papers_b, 0.5, 5);

                gaps.push(StructuralGap {
                    gap_id: Uuid::new_v4().to_string(),
                    cluster_a: GapCluster {
                        id: cluster_a.id,
                        label: cluster_a.label.clone(),
                        paper_count: papers_a.len(),
                    },
                    cluster_b: GapCluster {
                        id: cluster_b.id,
                        label: cluster_b.label.clone(),
                        paper_count: papers_b.len(),
                    },
                    gap_strength: round4(gap_strength),
                    bridge_papers,
                    potential_edges,
                    research_questions: Vec::new(),
                });
            }
        }

        // Adaptive threshold: only clearly-sparse pairs survive
        let threshold = Self::adaptive_threshold(&gaps);
        let mut significant: Vec<StructuralGap> = gaps
            .into_iter()
            .filter(|g| g.gap_strength >= threshold)
            .collect();
        significant.sort_by(|a, b| {
            b.gap_strength
                .partial_cmp(&a.gap_strength)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let connectivity_matrix: HashMap<String, usize> = connectivity
            .into_iter()
            .map(|((a, b), count)| (format!("{}-{}", a, b), count))
            .collect();

        let avg_strength = if significant.is_empty() {
            0.0
        } else {
            significant.iter().map(|g| g.gap_strength).sum::<f64>() / significant.len() as f64
        };
        let strongest = significant.first().map(|g| StrongestGap {
            gap_id: g.gap_id.clone(),
            clusters: (g.cluster_a.label.clone(), g.cluster_b.label.clone()),
            strength: g.gap_strength,
        });

        info!(
            gaps = significant.len(),
            threshold = round4(threshold),
            "Gap analysis complete"
        );

        GapAnalysisResult {
            summary: GapSummary {
                total_gaps: significant.len(),
                avg_gap_strength: round4(avg_strength),
                strongest_gap: strongest,
                threshold_used: round4(threshold),
            },
            cluster_connectivity_matrix: connectivity_matrix,
            gaps: significant,
        }
    }

    /// Count edges between each non-noise cluster pair.
    fn compute_connectivity(
        edges: &[GraphEdge],
        paper_cluster: &HashMap<&str, i32>,
    ) -> HashMap<(i32, i32), usize> {
        let mut connectivity: HashMap<(i32, i32), usize> = HashMap::new();

        for edge in edges {
            let src = *paper_cluster
                .get(edge.source.as_str())
                .unwrap_or(&NOISE_CLUSTER);
            let tgt = *paper_cluster
                .get(edge.target.as_str())
                .unwrap_or(&NOISE_CLUSTER);

            if src == NOISE_CLUSTER || tgt == NOISE_CLUSTER || src == tgt {
                continue;
            }

            *connectivity.entry(pair_key(src, tgt)).or_default() += 1;
        }

        connectivity
    }

    /// Mean embedding centroid per cluster, None without any embeddings.
    fn compute_centroids(
        cluster_papers: &HashMap<i32, Vec<&AnalysisPaper>>,
    ) -> HashMap<i32, Vec<f32>> {
        let mut centroids = HashMap::new();

        for (&cid, papers) in cluster_papers {
            let embeddings: Vec<&Vec<f32>> =
                papers.iter().filter_map(|p| p.embedding.as_ref()).collect();
            if embeddings.is_empty() {
                continue;
            }

            let dim = embeddings[0].len();
            let mut centroid = vec![0.0f32; dim];
            for embedding in &embeddings {
                for (sum, value) in centroid.iter_mut().zip(embedding.iter()) {
                    *sum += value;
                }
            }
            for value in &mut centroid {
                *value /= embeddings.len() as f32;
            }
            centroids.insert(cid, centroid);
        }

        centroids
    }

    /// Papers from either cluster scored by the geometric mean of their
    /// similarity to both centroids; only positive-both scores qualify.
    fn find_bridge_papers(
        papers_a: &[&AnalysisPaper],
        papers_b: &[&AnalysisPaper],
        centroid_a: Option<&Vec<f32>>,
        centroid_b: Option<&Vec<f32>>,
    ) -> Vec<BridgePaper> {
        const TOP_N: usize = 3;

        let (Some(centroid_a), Some(centroid_b)) = (centroid_a, centroid_b) else {
            return Vec::new();
        };

        let mut candidates: Vec<(f64, &AnalysisPaper)> = Vec::new();
        for paper in papers_a.iter().chain(papers_b.iter()) {
            let Some(embedding) = paper.embedding.as_ref() else {
                continue;
            };
            let sim_a = cosine_similarity(embedding, centroid_a) as f64;
            let sim_b = cosine_similarity(embedding, centroid_b) as f64;
            if sim_a > 0.0 && sim_b > 0.0 {
                candidates.push(((sim_a * sim_b).sqrt(), paper));
            }
        }

        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.id.cmp(&b.1.id))
        });

        candidates
            .into_iter()
            .take(TOP_N)
            .map(|(score, paper)| BridgePaper {
                paper_id: paper.id.clone(),
                title: paper.title.clone(),
                score: round4(score),
            })
            .collect()
    }

    /// Cross-cluster paper pairs with cosine similarity above the
    /// threshold: ghost edges that could be missing real-world connections.
    fn find_potential_edges(
        papers_a: &[&AnalysisPaper],
        papers_b: &[&AnalysisPaper],
        threshold: f64,
        top_k: usize,
    ) -> Vec<PotentialEdge> {
        let embedded_a: Vec<(&str, &Vec<f32>)> = papers_a
            .iter()
            .filter_map(|p| p.embedding.as_ref().map(|e| (p.id.as_str(), e)))
            .collect();
        let embedded_b: Vec<(&str, &Vec<f32>)> = papers_b
            .iter()
            .filter_map(|p| p.embedding.as_ref().map(|e| (p.id.as_str(), e)))
            .collect();

        if embedded_a.is_empty() || embedded_b.is_empty() {
            return Vec::new();
        }

        let mut candidates: Vec<(f64, &str, &str)> = Vec::new();
        for &(id_a, emb_a) in &embedded_a {
            for &(id_b, emb_b) in &embedded_b {
                let sim = cosine_similarity(emb_a, emb_b) as f64;
                if sim >= threshold {
                    candidates.push((sim, id_a, id_b));
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then((a.1, a.2).cmp(&(b.1, b.2)))
        });

        candidates
            .into_iter()
            .take(top_k)
            .map(|(sim, source, target)| PotentialEdge {
                source: source.to_string(),
                target: target.to_string(),
                similarity: round4(sim),
            })
            .collect()
    }

    /// Adaptive inclusion threshold: min(0.7, p25 + 0.1) over all pair
    /// gap strengths.
    fn adaptive_threshold(gaps: &[StructuralGap]) -> f64 {
        if gaps.is_empty() {
            return 0.7;
        }

        let mut strengths: Vec<f64> = gaps.iter().map(|g| g.gap_strength).collect();
        strengths.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let p25 = percentile(&strengths, 25.0);

        (p25 + 0.1).min(0.7)
    }
}

fn pair_key(a: i32, b: i32) -> (i32, i32) {
    (a.min(b), a.max(b))
}
