//! Search orchestration: cache lookup, pipeline, detached enrichment
//!
//! Per-request state machine: cache check -> [hit: return] | [miss:
//! fuse -> reduce/cluster -> similarity -> analytics -> assemble ->
//! cache write -> spawn background citation enrichment -> return].
//!
//! The enrichment task owns immutable snapshots of everything it touches
//! and outlives the HTTP response; its failure can never affect the
//! already-returned payload or corrupt the cache row.

use papergraph_common::config::GraphConfig;
use papergraph_common::errors::Result;
use papergraph_common::metrics;
use papergraph_common::models::{
    ClusterSummary, EdgeKind, GraphEdge, GraphMeta, GraphNode, GraphPayload, SourceMeta,
    UnifiedRecord,
};
use papergraph_common::store::GraphCacheStore;
use papergraph_common::NOISE_CLUSTER;
use papergraph_graph::analytics::BridgeDetector;
use papergraph_graph::cluster::{label_clusters, Clusterer};
use papergraph_graph::reduce::{override_temporal_z, EmbeddingReducer};
use papergraph_graph::similarity::SimilarityGraphBuilder;
use papergraph_providers::fusion::{FusedSearch, FusionEngine};
use papergraph_providers::semantic_scholar::SemanticScholarClient;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Parameters of one graph search request.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub query: String,
    pub limit: usize,
    pub year_range: Option<(i32, i32)>,
    pub fields_of_study: Option<Vec<String>>,
    pub similarity_threshold: f32,
    pub min_cluster_size: usize,
}

struct GraphBuild {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    clusters: Vec<ClusterSummary>,
    bridge_nodes: usize,
}

/// Owns the request lifecycle for graph searches.
pub struct SearchOrchestrator {
    graph_config: GraphConfig,
    store: GraphCacheStore,
    fusion: FusionEngine,
    semantic_scholar: Arc<SemanticScholarClient>,
    reducer: Arc<dyn EmbeddingReducer>,
    clusterer: Arc<dyn Clusterer>,
}

impl SearchOrchestrator {
    pub fn new(
        graph_config: GraphConfig,
        store: GraphCacheStore,
        fusion: FusionEngine,
        semantic_scholar: Arc<SemanticScholarClient>,
        reducer: Arc<dyn EmbeddingReducer>,
        clusterer: Arc<dyn Clusterer>,
    ) -> Self {
        Self {
            graph_config,
            store,
            fusion,
            semantic_scholar,
            reducer,
            clusterer,
        }
    }

    /// Deterministic cache key over the normalized query and filters.
    pub fn cache_key(params: &SearchParams) -> String {
        let sorted_fields = params.fields_of_study.as_ref().map(|fields| {
            let mut fields = fields.clone();
            fields.sort();
            fields
        });

        // serde_json maps are ordered by key, so the encoding is canonical
        let key_data = serde_json::json!({
            "query": params.query.trim().to_lowercase(),
            "limit": params.limit,
            "year_range": params.year_range,
            "fields": sorted_fields,
        });

        hex::encode(Sha256::digest(key_data.to_string().as_bytes()))
    }

    /// Run one search request through the cache-or-pipeline state machine.
    ///
    /// Always produces a structurally valid (possibly empty) payload:
    /// provider failures degrade to the surviving source, graph-compute
    /// failures degrade to a non-graph layout, and cache trouble only
    /// disables caching.
    pub async fn search(&self, params: &SearchParams) -> GraphPayload {
        let started = Instant::now();
        let cache_key = Self::cache_key(params);

        if let Some(entry) = self
            .store
            .fetch_fresh(&cache_key, self.graph_config.cache_ttl_hours)
            .await
        {
            let payload = entry.payload;
            metrics::record_cache(true, "search");
            metrics::record_search(started.elapsed().as_secs_f64(), true, payload.nodes.len());
            info!(query = %params.query, nodes = payload.nodes.len(), "Cache hit");
            return payload;
        }
        metrics::record_cache(false, "search");

        let fused = self
            .fusion
            .search(
                &params.query,
                params.limit,
                params.year_range,
                params.fields_of_study.as_deref(),
            )
            .await;

        let payload = self.assemble(params, fused, started).await;

        self.store.upsert(&cache_key, &payload).await;
        self.spawn_enrichment(cache_key, &payload);

        metrics::record_search(started.elapsed().as_secs_f64(), false, payload.nodes.len());
        info!(
            query = %params.query,
            nodes = payload.nodes.len(),
            edges = payload.edges.len(),
            elapsed_ms = payload.meta.elapsed_ms,
            "Search completed"
        );

        payload
    }

    /// Turn fused records into a full graph payload.
    pub(crate) async fn assemble(
        &self,
        params: &SearchParams,
        fused: FusedSearch,
        started: Instant,
    ) -> GraphPayload {
        let FusedSearch { records, sources } = fused;

        if records.is_empty() {
            return GraphPayload {
                meta: Self::meta(&params.query, 0, 0, &[], &[], 0, sources, started),
                ..Default::default()
            };
        }

        let (embedded, unembedded): (Vec<UnifiedRecord>, Vec<UnifiedRecord>) =
            records.into_iter().partition(|r| r.has_embedding());

        let mut nodes;
        let mut edges = Vec::new();
        let mut clusters = Vec::new();
        let mut bridge_nodes = 0;

        if embedded.len() >= 2 {
            match self.build_graph(params, &embedded).await {
                Ok(graph) => {
                    nodes = graph.nodes;
                    edges = graph.edges;
                    clusters = graph.clusters;
                    bridge_nodes = graph.bridge_nodes;

                    // Records without embeddings are parked on a peripheral
                    // line rather than dropped
                    let offset = nodes.len();
                    for (i, record) in unembedded.iter().enumerate() {
                        let id = (offset + i).to_string();
                        let x = (offset + i) as f32 * 0.5;
                        let mut node =
                            record_to_node(record, id, [x, 10.0, 0.0], NOISE_CLUSTER);
                        node.cluster_label = "Unclustered".to_string();
                        nodes.push(node);
                    }
                    ensure_noise_summary(&mut clusters, &nodes);
                }
                Err(e) => {
                    warn!(error = %e, "Graph pipeline failed, returning non-graph layout");
                    let all: Vec<UnifiedRecord> =
                        embedded.iter().chain(unembedded.iter()).cloned().collect();
                    nodes = spiral_layout_nodes(&all);
                }
            }
        } else {
            // Not enough embeddings for a graph: arrange everything in a
            // deterministic 3D spiral instead of erroring
            let all: Vec<UnifiedRecord> =
                embedded.iter().chain(unembedded.iter()).cloned().collect();
            nodes = spiral_layout_nodes(&all);
        }

        let meta = Self::meta(
            &params.query,
            nodes.len(),
            embedded.len(),
            &clusters,
            &edges,
            bridge_nodes,
            sources,
            started,
        );

        GraphPayload {
            nodes,
            edges,
            clusters,
            meta,
        }
    }

    /// Reduce, cluster, label, hull, and link the embedded records.
    async fn build_graph(
        &self,
        params: &SearchParams,
        embedded: &[UnifiedRecord],
    ) -> Result<GraphBuild> {
        let embeddings: Vec<Vec<f32>> = embedded
            .iter()
            .map(|r| r.embedding.clone().unwrap_or_default())
            .collect();
        let ids: Vec<String> = (0..embedded.len()).map(|i| i.to_string()).collect();

        let mut coords = self.reducer.reduce_to_3d(&embeddings).await?;
        let years: Vec<Option<i32>> = embedded.iter().map(|r| r.year).collect();
        override_temporal_z(&mut coords, &years);

        let labels = self
            .clusterer
            .cluster(&embeddings, params.min_cluster_size)
            .await?;
        let label_info = label_clusters(embedded, &labels);

        let hulls = match self.clusterer.compute_hulls(&coords, &labels).await {
            Ok(hulls) => hulls,
            Err(e) => {
                warn!(error = %e, "Hull computation failed, omitting hulls");
                HashMap::new()
            }
        };

        let builder = SimilarityGraphBuilder::new(
            params.similarity_threshold,
            self.graph_config.max_edges_per_node,
        );
        let sim_edges = builder.build_edges(&embeddings, &ids);

        let mut nodes: Vec<GraphNode> = embedded
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let cluster_id = labels[i];
                let mut node = record_to_node(record, ids[i].clone(), coords[i], cluster_id);
                node.cluster_label = label_info
                    .get(&cluster_id)
                    .map(|info| info.label.clone())
                    .unwrap_or_default();
                node
            })
            .collect();

        let node_clusters: HashMap<String, i32> =
            nodes.iter().map(|n| (n.id.clone(), n.cluster_id)).collect();
        let bridges = BridgeDetector::default().detect(&node_clusters, &sim_edges);
        for node in &mut nodes {
            if bridges.contains(&node.id) {
                node.is_bridge = true;
            }
        }

        let edges: Vec<GraphEdge> = sim_edges
            .into_iter()
            .map(|mut edge| {
                edge.intent = Some(similarity_intent(edge.weight).to_string());
                edge
            })
            .collect();

        let mut clusters: Vec<ClusterSummary> = label_info
            .into_iter()
            .map(|(id, info)| ClusterSummary {
                id,
                label: info.label,
                topic_names: info.topic_names,
                paper_count: info.paper_count,
                color: info.color,
                hull_points: hulls.get(&id).cloned().unwrap_or_default(),
            })
            .collect();
        clusters.sort_by_key(|c| c.id);

        Ok(GraphBuild {
            nodes,
            edges,
            clusters,
            bridge_nodes: bridges.len(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn meta(
        query: &str,
        total: usize,
        with_embeddings: usize,
        clusters: &[ClusterSummary],
        edges: &[GraphEdge],
        bridge_nodes: usize,
        sources: Vec<SourceMeta>,
        started: Instant,
    ) -> GraphMeta {
        GraphMeta {
            query: query.to_string(),
            total,
            with_embeddings,
            clusters: clusters.iter().filter(|c| c.id != NOISE_CLUSTER).count(),
            similarity_edges: edges
                .iter()
                .filter(|e| e.kind == EdgeKind::Similarity)
                .count(),
            citation_edges: 0,
            citation_enriched: false,
            bridge_nodes,
            sources,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Spawn the detached citation-enrichment task.
    ///
    /// The task receives a full clone of the payload; it shares no mutable
    /// state with this request or any concurrent one, and it is not a child
    /// of the request's cancellation scope.
    fn spawn_enrichment(&self, cache_key: String, payload: &GraphPayload) {
        let eligible = payload
            .nodes
            .iter()
            .filter(|n| n.s2_paper_id.is_some())
            .count();
        if eligible < 2 {
            return;
        }

        let snapshot = payload.clone();
        let semantic_scholar = self.semantic_scholar.clone();
        let store = self.store.clone();
        let top_n = self.graph_config.enrichment_top_n;
        let refs_limit = self.graph_config.enrichment_refs_limit;

        tokio::spawn(async move {
            enrich_citations(
                semantic_scholar,
                store,
                cache_key,
                snapshot,
                top_n,
                refs_limit,
            )
            .await;
        });
    }
}

/// Intent heuristic for similarity edges: very high similarity suggests the
/// papers mutually support each other's findings.
fn similarity_intent(weight: f32) -> &'static str {
    if weight >= 0.85 {
        "supports"
    } else {
        "background"
    }
}

fn record_to_node(
    record: &UnifiedRecord,
    id: String,
    position: [f32; 3],
    cluster_id: i32,
) -> GraphNode {
    GraphNode {
        id,
        title: record.title.clone(),
        abstract_text: record.abstract_text.clone(),
        year: record.year,
        venue: record.venue.clone(),
        citation_count: record.citation_count,
        fields: record.fields_of_study.clone(),
        topics: record.topics.clone(),
        tldr: record.tldr.clone(),
        is_open_access: record.is_open_access,
        oa_url: record.oa_url.clone(),
        authors: record.authors.clone(),
        doi: record.doi.clone(),
        s2_paper_id: record.s2_paper_id.clone(),
        openalex_id: record.openalex_id.clone(),
        x: position[0],
        y: position[1],
        z: position[2],
        cluster_id,
        cluster_label: String::new(),
        is_bridge: false,
    }
}

/// Fallback layout when too few records carry embeddings: a 3D spiral.
fn spiral_layout_nodes(records: &[UnifiedRecord]) -> Vec<GraphNode> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let angle = i as f32 * 0.5;
            let radius = 5.0 + i as f32 * 0.3;
            let position = [
                radius * angle.cos(),
                i as f32 * 0.2,
                radius * angle.sin(),
            ];
            record_to_node(record, i.to_string(), position, 0)
        })
        .collect()
}

/// The noise summary is always present when any node is unclustered.
fn ensure_noise_summary(clusters: &mut Vec<ClusterSummary>, nodes: &[GraphNode]) {
    let unclustered = nodes.iter().filter(|n| n.cluster_id == NOISE_CLUSTER).count();
    if unclustered == 0 {
        return;
    }

    if let Some(noise) = clusters.iter_mut().find(|c| c.id == NOISE_CLUSTER) {
        noise.paper_count = unclustered;
        return;
    }

    clusters.insert(
        0,
        ClusterSummary {
            id: NOISE_CLUSTER,
            label: "Unclustered".to_string(),
            topic_names: Vec::new(),
            paper_count: unclustered,
            color: "#888888".to_string(),
            hull_points: Vec::new(),
        },
    );
}

/// New citation edges from `source_node` into `ref_node_ids`, skipping
/// self-references and any pair already present in `existing`.
fn citation_edges_for(
    source_node: &str,
    ref_node_ids: &[String],
    existing: &mut HashSet<(String, String)>,
) -> Vec<GraphEdge> {
    let mut edges = Vec::new();

    for target in ref_node_ids {
        if target == source_node {
            continue;
        }
        let key = if source_node <= target.as_str() {
            (source_node.to_string(), target.clone())
        } else {
            (target.clone(), source_node.to_string())
        };
        if existing.contains(&key) {
            continue;
        }
        existing.insert(key);
        edges.push(GraphEdge {
            source: source_node.to_string(),
            target: target.clone(),
            kind: EdgeKind::Citation,
            weight: 0.8,
            intent: Some("background".to_string()),
        });
    }

    edges
}

/// Fetch citation relationships among the result papers and rewrite the
/// cache row with the enriched edge set.
///
/// Runs after the response is already sent: the next identical search gets
/// citation edges from cache instead of waiting on the slow provider.
/// Per-paper failures are counted and skipped; the cache row is rewritten
/// only when at least one new edge was actually produced.
async fn enrich_citations(
    semantic_scholar: Arc<SemanticScholarClient>,
    store: GraphCacheStore,
    cache_key: String,
    mut payload: GraphPayload,
    top_n: usize,
    refs_limit: usize,
) {
    let s2_to_node: HashMap<String, String> = payload
        .nodes
        .iter()
        .filter_map(|n| n.s2_paper_id.clone().map(|s2_id| (s2_id, n.id.clone())))
        .collect();

    // Snapshot of edge pairs taken before any fetch starts
    let mut existing: HashSet<(String, String)> =
        payload.edges.iter().map(|e| e.unordered_key()).collect();

    // Limit provider calls to the highest-cited papers
    let mut ranked: Vec<(String, String, i64)> = payload
        .nodes
        .iter()
        .filter_map(|n| {
            n.s2_paper_id
                .clone()
                .map(|s2_id| (n.id.clone(), s2_id, n.citation_count))
        })
        .collect();
    ranked.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
    ranked.truncate(top_n);

    let mut added: Vec<GraphEdge> = Vec::new();
    let mut failed = 0usize;

    for (node_id, s2_id, _) in &ranked {
        match semantic_scholar.get_references(s2_id, refs_limit).await {
            Ok(refs) => {
                let ref_nodes: Vec<String> = refs
                    .iter()
                    .filter_map(|r| s2_to_node.get(&r.paper_id).cloned())
                    .collect();
                added.extend(citation_edges_for(node_id, &ref_nodes, &mut existing));
            }
            Err(e) => {
                failed += 1;
                debug!(paper = %s2_id, error = %e, "[bg] Reference fetch skipped");
            }
        }
    }

    metrics::record_enrichment(added.len(), failed);
    info!(
        cache_key = %&cache_key[..8.min(cache_key.len())],
        added = added.len(),
        skipped = failed,
        "[bg] Citation enrichment finished"
    );

    if added.is_empty() {
        return;
    }

    payload.meta.citation_edges = added.len();
    payload.meta.citation_enriched = true;
    payload.edges.extend(added);
    store.upsert(&cache_key, &payload).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use papergraph_common::config::{OpenAlexConfig, SemanticScholarConfig};
    use papergraph_common::models::SourceStatus;
    use papergraph_graph::cluster::MockClusterer;
    use papergraph_graph::reduce::MockReducer;
    use papergraph_providers::openalex::OpenAlexClient;

    fn params(query: &str) -> SearchParams {
        SearchParams {
            query: query.to_string(),
            limit: 100,
            year_range: None,
            fields_of_study: None,
            similarity_threshold: 0.7,
            min_cluster_size: 2,
        }
    }

    fn orchestrator(cluster_labels: Vec<i32>) -> SearchOrchestrator {
        let openalex = Arc::new(OpenAlexClient::new(&OpenAlexConfig::default()).unwrap());
        let semantic_scholar =
            Arc::new(SemanticScholarClient::new(&SemanticScholarConfig::default()).unwrap());
        SearchOrchestrator::new(
            GraphConfig::default(),
            GraphCacheStore::disabled(),
            FusionEngine::new(openalex, semantic_scholar.clone()),
            semantic_scholar,
            Arc::new(MockReducer),
            Arc::new(MockClusterer::new(cluster_labels)),
        )
    }

    fn embedded_record(title: &str, embedding: Vec<f32>) -> UnifiedRecord {
        UnifiedRecord {
            title: title.to_string(),
            embedding: Some(embedding),
            s2_paper_id: Some(format!("s2-{}", title)),
            year: Some(2022),
            ..Default::default()
        }
    }

    fn fused(records: Vec<UnifiedRecord>) -> FusedSearch {
        FusedSearch {
            records,
            sources: vec![SourceMeta {
                provider: papergraph_common::errors::Provider::OpenAlex,
                status: SourceStatus::Ok,
                result_count: 0,
            }],
        }
    }

    #[test]
    fn test_cache_key_is_deterministic_and_normalized() {
        let a = SearchParams {
            query: "  Graph Neural Networks ".to_string(),
            fields_of_study: Some(vec!["b".to_string(), "a".to_string()]),
            ..params("x")
        };
        let b = SearchParams {
            query: "graph neural networks".to_string(),
            fields_of_study: Some(vec!["a".to_string(), "b".to_string()]),
            ..params("x")
        };
        assert_eq!(
            SearchOrchestrator::cache_key(&a),
            SearchOrchestrator::cache_key(&b)
        );

        let c = SearchParams {
            limit: 50,
            ..a.clone()
        };
        assert_ne!(
            SearchOrchestrator::cache_key(&a),
            SearchOrchestrator::cache_key(&c)
        );
    }

    #[test]
    fn test_citation_edges_skip_existing_and_self() {
        let mut existing = HashSet::new();
        existing.insert(("0".to_string(), "1".to_string()));

        let refs = vec!["0".to_string(), "1".to_string(), "2".to_string()];
        let edges = citation_edges_for("0", &refs, &mut existing);

        // "0" is self, "0"-"1" exists, only "0"-"2" is new
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target, "2");
        assert_eq!(edges[0].kind, EdgeKind::Citation);

        // A reverse reference later must not duplicate the pair
        let edges = citation_edges_for("2", &["0".to_string()], &mut existing);
        assert!(edges.is_empty());
    }

    #[test]
    fn test_similarity_intent_thresholds() {
        assert_eq!(similarity_intent(0.9), "supports");
        assert_eq!(similarity_intent(0.85), "supports");
        assert_eq!(similarity_intent(0.80), "background");
    }

    #[test]
    fn test_noise_summary_added_when_missing() {
        let mut clusters = vec![ClusterSummary {
            id: 0,
            label: "A".to_string(),
            topic_names: vec![],
            paper_count: 2,
            color: "#fff".to_string(),
            hull_points: vec![],
        }];
        let nodes = vec![
            GraphNode {
                id: "0".into(),
                cluster_id: 0,
                ..Default::default()
            },
            GraphNode {
                id: "1".into(),
                cluster_id: NOISE_CLUSTER,
                ..Default::default()
            },
        ];

        ensure_noise_summary(&mut clusters, &nodes);
        let noise = clusters.iter().find(|c| c.id == NOISE_CLUSTER).unwrap();
        assert_eq!(noise.paper_count, 1);
        assert_eq!(noise.label, "Unclustered");
    }

    #[tokio::test]
    async fn test_assemble_builds_graph_from_embedded_records() {
        let orchestrator = orchestrator(vec![0, 0]);
        let records = vec![
            embedded_record("a", vec![0.0, 1.0, 0.0, 0.0, 0.0]),
            embedded_record("b", vec![0.0, 1.0, 0.0, 0.0, 0.0]),
        ];

        let payload = orchestrator
            .assemble(&params("graphs"), fused(records), Instant::now())
            .await;

        assert_eq!(payload.nodes.len(), 2);
        // Identical unit vectors above threshold: exactly one similarity edge
        assert_eq!(payload.meta.similarity_edges, 1);
        assert!(payload.edges[0].weight >= 0.99);
        assert_eq!(payload.meta.with_embeddings, 2);
        assert_eq!(payload.meta.clusters, 1);
        assert!(!payload.meta.citation_enriched);
    }

    #[tokio::test]
    async fn test_assemble_parks_unembedded_records_on_periphery() {
        let orchestrator = orchestrator(vec![0, 0]);
        let mut records = vec![
            embedded_record("a", vec![1.0, 0.0, 0.0]),
            embedded_record("b", vec![1.0, 0.0, 0.0]),
        ];
        records.push(UnifiedRecord {
            title: "no-embedding".to_string(),
            ..Default::default()
        });

        let payload = orchestrator
            .assemble(&params("graphs"), fused(records), Instant::now())
            .await;

        assert_eq!(payload.nodes.len(), 3);
        let parked = payload
            .nodes
            .iter()
            .find(|n| n.title == "no-embedding")
            .unwrap();
        assert_eq!(parked.cluster_id, NOISE_CLUSTER);
        assert_eq!(parked.cluster_label, "Unclustered");
        // The reserved noise summary exists because a node is unclustered
        assert!(payload.clusters.iter().any(|c| c.id == NOISE_CLUSTER));
    }

    #[tokio::test]
    async fn test_assemble_falls_back_to_spiral_without_embeddings() {
        let orchestrator = orchestrator(vec![]);
        let records = vec![
            UnifiedRecord {
                title: "one".to_string(),
                ..Default::default()
            },
            UnifiedRecord {
                title: "two".to_string(),
                ..Default::default()
            },
        ];

        let payload = orchestrator
            .assemble(&params("plain"), fused(records), Instant::now())
            .await;

        assert_eq!(payload.nodes.len(), 2);
        assert!(payload.edges.is_empty());
        assert!(payload.clusters.is_empty());
        assert_eq!(payload.meta.with_embeddings, 0);
        // Spiral positions differ between consecutive nodes
        assert_ne!(payload.nodes[0].x, payload.nodes[1].x);
    }

    #[tokio::test]
    async fn test_assemble_empty_records_yields_valid_empty_payload() {
        let orchestrator = orchestrator(vec![]);
        let payload = orchestrator
            .assemble(&params("nothing"), fused(vec![]), Instant::now())
            .await;

        assert!(payload.nodes.is_empty());
        assert!(payload.edges.is_empty());
        assert_eq!(payload.meta.total, 0);
        assert_eq!(payload.meta.sources.len(), 1);
    }
}
