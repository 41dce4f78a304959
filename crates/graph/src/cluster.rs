//! Clustering seam and cluster labeling
//!
//! The density-based clustering routine is an external collaborator reached
//! over HTTP; this module defines the trait boundary, the remote client,
//! the fewer-than-4-points hull rule applied on this side of the boundary,
//! and the purely local topic-based cluster labeling.

use async_trait::async_trait;
use papergraph_common::config::ComputeConfig;
use papergraph_common::errors::{AppError, Result};
use papergraph_common::models::UnifiedRecord;
use papergraph_common::NOISE_CLUSTER;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

/// Color palette for clusters
const CLUSTER_COLORS: [&str; 15] = [
    "#E63946", "#457B9D", "#2A9D8F", "#E9C46A", "#F4A261", "#264653", "#A8DADC", "#6D6875",
    "#B5838D", "#FFB4A2", "#CDB4DB", "#FFC8DD", "#BDE0FE", "#A2D2FF", "#CAFFBF",
];

const NOISE_COLOR: &str = "#888888";

/// Assigns integer cluster labels to embeddings (-1 = noise) and computes
/// 3D hulls for clustered points.
#[async_trait]
pub trait Clusterer: Send + Sync {
    /// Cluster embeddings; one label per input row, -1 for noise.
    async fn cluster(&self, embeddings: &[Vec<f32>], min_cluster_size: usize) -> Result<Vec<i32>>;

    /// Hull vertices per non-noise cluster. A cluster with fewer than 4
    /// points yields its raw points, not a hull.
    async fn compute_hulls(
        &self,
        coords: &[[f32; 3]],
        labels: &[i32],
    ) -> Result<HashMap<i32, Vec<[f32; 3]>>>;
}

// ==================== Remote implementation ====================

#[derive(Serialize)]
struct ClusterRequest<'a> {
    embeddings: &'a [Vec<f32>],
    min_cluster_size: usize,
}

#[derive(Deserialize)]
struct ClusterResponse {
    labels: Vec<i32>,
}

#[derive(Serialize)]
struct HullRequest<'a> {
    points: &'a [[f32; 3]],
}

#[derive(Deserialize)]
struct HullResponse {
    vertices: Vec<[f32; 3]>,
}

/// Clusterer backed by the HTTP compute service.
pub struct RemoteClusterer {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteClusterer {
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
impl Clusterer for RemoteClusterer {
    async fn cluster(&self, embeddings: &[Vec<f32>], min_cluster_size: usize) -> Result<Vec<i32>> {
        // Too few points to form any cluster
        if embeddings.len() < min_cluster_size {
            debug!(papers = embeddings.len(), "Too few papers for clustering");
            return Ok(vec![0; embeddings.len()]);
        }

        let url = format!("{}/cluster", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ClusterRequest {
                embeddings,
                min_cluster_size,
            })
            .send()
            .await
            .map_err(|e| AppError::ClusteringError {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(AppError::ClusteringError {
                message: format!("compute service returned HTTP {}", response.status()),
            });
        }

        let body: ClusterResponse =
            response.json().await.map_err(|e| AppError::ClusteringError {
                message: format!("invalid cluster response: {}", e),
            })?;

        if body.labels.len() != embeddings.len() {
            return Err(AppError::ClusteringError {
                message: format!(
                    "row count mismatch: {} embeddings, {} labels",
                    embeddings.len(),
                    body.labels.len()
                ),
            });
        }

        Ok(body.labels)
    }

    async fn compute_hulls(
        &self,
        coords: &[[f32; 3]],
        labels: &[i32],
    ) -> Result<HashMap<i32, Vec<[f32; 3]>>> {
        let mut hulls = HashMap::new();

        for (label, points) in group_points(coords, labels) {
            if points.len() < 4 {
                // Not enough points for a 3D convex hull
                hulls.insert(label, points);
                continue;
            }

            let url = format!("{}/hull", self.base_url);
            let response = self
                .client
                .post(&url)
                .json(&HullRequest { points: &points })
                .send()
                .await;

            // A failed hull falls back to the raw points rather than failing
            // the whole graph
            let vertices = match response {
                Ok(response) if response.status().is_success() => {
                    match response.json::<HullResponse>().await {
                        Ok(body) => body.vertices,
                        Err(e) => {
                            warn!(cluster = label, error = %e, "Invalid hull response, using raw points");
                            points
                        }
                    }
                }
                Ok(response) => {
                    warn!(cluster = label, status = %response.status(), "Hull request rejected, using raw points");
                    points
                }
                Err(e) => {
                    warn!(cluster = label, error = %e, "Hull request failed, using raw points");
                    points
                }
            };

            hulls.insert(label, vertices);
        }

        Ok(hulls)
    }
}

/// Group coordinates by cluster label, skipping noise.
fn group_points(coords: &[[f32; 3]], labels: &[i32]) -> Vec<(i32, Vec<[f32; 3]>)> {
    let unique: BTreeSet<i32> = labels.iter().copied().filter(|&l| l != NOISE_CLUSTER).collect();
    unique
        .into_iter()
        .map(|label| {
            let points = coords
                .iter()
                .zip(labels)
                .filter(|(_, &l)| l == label)
                .map(|(&p, _)| p)
                .collect();
            (label, points)
        })
        .collect()
}

// ==================== Mock implementation ====================

/// Deterministic clusterer for tests: returns preset labels and raw-point
/// hulls.
pub struct MockClusterer {
    pub labels: Vec<i32>,
}

impl MockClusterer {
    pub fn new(labels: Vec<i32>) -> Self {
        Self { labels }
    }
}

#[async_trait]
impl Clusterer for MockClusterer {
    async fn cluster(&self, embeddings: &[Vec<f32>], _min_cluster_size: usize) -> Result<Vec<i32>> {
        let mut labels = self.labels.clone();
        labels.resize(embeddings.len(), 0);
        Ok(labels)
    }

    async fn compute_hulls(
        &self,
        coords: &[[f32; 3]],
        labels: &[i32],
    ) -> Result<HashMap<i32, Vec<[f32; 3]>>> {
        Ok(group_points(coords, labels).into_iter().collect())
    }
}

// ==================== Cluster labeling ====================

/// Label metadata for one cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterLabel {
    pub label: String,
    pub topic_names: Vec<String>,
    pub paper_count: usize,
    pub color: String,
}

/// Label each cluster from its records' topic tags (top 3 topics), falling
/// back to field-of-study tags, then to a generic name. Cluster -1 is the
/// reserved "Unclustered" entry.
pub fn label_clusters(records: &[UnifiedRecord], labels: &[i32]) -> HashMap<i32, ClusterLabel> {
    debug_assert_eq!(records.len(), labels.len());

    let unique: BTreeSet<i32> = labels.iter().copied().collect();
    let mut cluster_info = HashMap::new();

    for label in unique {
        let count = labels.iter().filter(|&&l| l == label).count();

        if label == NOISE_CLUSTER {
            cluster_info.insert(
                NOISE_CLUSTER,
                ClusterLabel {
                    label: "Unclustered".to_string(),
                    topic_names: Vec::new(),
                    paper_count: count,
                    color: NOISE_COLOR.to_string(),
                },
            );
            continue;
        }

        let members = records
            .iter()
            .zip(labels)
            .filter(|(_, &l)| l == label)
            .map(|(record, _)| record);

        let mut topic_counts: HashMap<&str, usize> = HashMap::new();
        let mut field_counts: HashMap<&str, usize> = HashMap::new();
        for record in members {
            for topic in &record.topics {
                if !topic.name.is_empty() {
                    *topic_counts.entry(topic.name.as_str()).or_default() += 1;
                }
            }
            for field in &record.fields_of_study {
                if !field.is_empty() {
                    *field_counts.entry(field.as_str()).or_default() += 1;
                }
            }
        }

        let mut top_topics = most_common(&topic_counts, 3);
        if top_topics.is_empty() {
            top_topics = most_common(&field_counts, 3);
        }
        if top_topics.is_empty() {
            top_topics = vec![format!("Cluster {}", label)];
        }

        let cluster_label = if top_topics.len() >= 2 {
            format!("{} / {}", top_topics[0], top_topics[1])
        } else {
            top_topics[0].clone()
        };

        let color = CLUSTER_COLORS[(label.unsigned_abs() as usize) % CLUSTER_COLORS.len()];

        cluster_info.insert(
            label,
            ClusterLabel {
                label: cluster_label,
                topic_names: top_topics,
                paper_count: count,
                color: color.to_string(),
            },
        );
    }

    cluster_info
}

/// Top-n keys by count, name as tiebreak for determinism.
fn most_common(counts: &HashMap<&str, usize>, n: usize) -> Vec<String> {
    let mut entries: Vec<(&str, usize)> = counts.iter().map(|(&k, &v)| (k, v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    entries.into_iter().take(n).map(|(k, _)| k.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use papergraph_common::models::TopicTag;

    fn record_with_topics(topics: &[&str]) -> UnifiedRecord {
        UnifiedRecord {
            title: "t".into(),
            topics: topics
                .iter()
                .map(|&name| TopicTag {
                    name: name.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_label_clusters_uses_top_topics() {
        let records = vec![
            record_with_topics(&["Graph Learning", "Transformers"]),
            record_with_topics(&["Graph Learning"]),
            record_with_topics(&["Graph Learning", "Optimization"]),
        ];
        let labels = vec![0, 0, 0];

        let info = label_clusters(&records, &labels);
        let cluster = &info[&0];
        assert_eq!(cluster.paper_count, 3);
        assert_eq!(cluster.topic_names[0], "Graph Learning");
        assert!(cluster.label.starts_with("Graph Learning / "));
    }

    #[test]
    fn test_noise_cluster_is_reserved() {
        let records = vec![record_with_topics(&["A"]), record_with_topics(&["B"])];
        let labels = vec![0, -1];

        let info = label_clusters(&records, &labels);
        let noise = &info[&-1];
        assert_eq!(noise.label, "Unclustered");
        assert_eq!(noise.color, NOISE_COLOR);
        assert_eq!(noise.paper_count, 1);
    }

    #[test]
    fn test_label_falls_back_to_fields_then_generic() {
        let mut record = UnifiedRecord {
            title: "t".into(),
            ..Default::default()
        };
        record.fields_of_study = vec!["Biology".into()];
        let info = label_clusters(&[record], &[2]);
        assert_eq!(info[&2].label, "Biology");

        let bare = UnifiedRecord {
            title: "t".into(),
            ..Default::default()
        };
        let info = label_clusters(&[bare], &[5]);
        assert_eq!(info[&5].label, "Cluster 5");
    }

    #[tokio::test]
    async fn test_mock_clusterer_hulls_keep_small_clusters_raw() {
        let coords = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let labels = vec![0, 0, -1];

        let clusterer = MockClusterer::new(labels.clone());
        let hulls = clusterer.compute_hulls(&coords, &labels).await.unwrap();

        // Noise excluded, small cluster keeps its raw points
        assert_eq!(hulls.len(), 1);
        assert_eq!(hulls[&0].len(), 2);
    }
}
