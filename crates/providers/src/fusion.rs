//! Record fusion across both providers
//!
//! OpenAlex-first search + Semantic Scholar enrichment with DOI/title
//! dedup, Reciprocal Rank Fusion scoring, and an abstract fallback chain.
//! RRF combines the two independently ranked lists without score
//! normalization (Cormack et al., SIGIR 2009).

use crate::openalex::{OpenAlexClient, OpenAlexWork};
use crate::semantic_scholar::{SemanticScholarClient, SemanticScholarPaper};
use papergraph_common::errors::{AppError, Provider};
use papergraph_common::models::{SourceMeta, SourceStatus, UnifiedRecord};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// RRF constant (TREC-validated)
const RRF_K: f64 = 60.0;

/// Normalize a DOI for deduplication: lowercase, strip URL/`doi:` prefixes,
/// trim whitespace. Returns None for missing or empty input.
pub fn normalize_doi(doi: Option<&str>) -> Option<String> {
    let mut doi = doi?.trim().to_lowercase();
    for prefix in ["https://doi.org/", "http://doi.org/", "doi:"] {
        if let Some(stripped) = doi.strip_prefix(prefix) {
            doi = stripped.to_string();
        }
    }
    let doi = doi.trim().to_string();
    if doi.is_empty() {
        None
    } else {
        Some(doi)
    }
}

fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

fn is_blank(text: &Option<String>) -> bool {
    text.as_deref().map_or(true, |s| s.trim().is_empty())
}

fn oa_work_to_unified(work: OpenAlexWork) -> UnifiedRecord {
    let doi = normalize_doi(work.doi.as_deref());
    UnifiedRecord {
        doi,
        title: work.title,
        abstract_text: work.abstract_text,
        year: work.publication_year,
        venue: work.venue,
        citation_count: work.citation_count,
        fields_of_study: work.fields_of_study,
        topics: work.topics,
        tldr: None,
        embedding: None,
        is_open_access: work.is_open_access,
        oa_url: work.open_access_url,
        authors: work.authors,
        openalex_id: Some(work.id),
        s2_paper_id: None,
        rrf_score: 0.0,
    }
}

fn s2_paper_to_unified(paper: SemanticScholarPaper) -> UnifiedRecord {
    let doi = normalize_doi(paper.doi.as_deref());
    UnifiedRecord {
        doi,
        title: paper.title,
        abstract_text: paper.abstract_text,
        year: paper.year,
        venue: paper.venue,
        citation_count: paper.citation_count,
        fields_of_study: paper.fields_of_study,
        topics: Vec::new(),
        tldr: paper.tldr,
        embedding: paper.embedding,
        is_open_access: paper.is_open_access,
        oa_url: paper.open_access_pdf_url,
        authors: paper.authors,
        openalex_id: None,
        s2_paper_id: Some(paper.paper_id),
        rrf_score: 0.0,
    }
}

/// Result of a fused search: unified records plus per-source outcomes.
#[derive(Debug)]
pub struct FusedSearch {
    pub records: Vec<UnifiedRecord>,
    pub sources: Vec<SourceMeta>,
}

/// Merges both providers' result lists into unified, deduplicated,
/// RRF-ranked records.
///
/// Strategy:
/// 1. Concurrent OpenAlex + Semantic Scholar search
/// 2. DOI/title dedup + merge (OpenAlex metadata, S2 tldr/embeddings)
/// 3. RRF scoring from both source ranks
/// 4. Abstract fallback: OA abstract -> S2 abstract -> tldr -> none
/// 5. Embedded records first, then RRF score descending
pub struct FusionEngine {
    openalex: Arc<OpenAlexClient>,
    semantic_scholar: Arc<SemanticScholarClient>,
}

impl FusionEngine {
    pub fn new(
        openalex: Arc<OpenAlexClient>,
        semantic_scholar: Arc<SemanticScholarClient>,
    ) -> Self {
        Self {
            openalex,
            semantic_scholar,
        }
    }

    /// Run both provider searches concurrently and fuse the results.
    ///
    /// Either source may fail entirely (timeout, rate limit); fusion
    /// proceeds with the surviving source alone and the failure is
    /// reported in the returned source metadata, never as an error.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        year_range: Option<(i32, i32)>,
        fields_of_study: Option<&[String]>,
    ) -> FusedSearch {
        let (oa_raw, s2_raw) = tokio::join!(
            self.openalex.search_works(query, limit.min(250), year_range),
            self.semantic_scholar
                .search_papers(query, limit.min(100), year_range, fields_of_study, true),
        );

        let (oa_results, oa_meta) = Self::unpack(Provider::OpenAlex, oa_raw, query);
        let (s2_results, s2_meta) = Self::unpack(Provider::SemanticScholar, s2_raw, query);

        let mut records = Self::fuse(oa_results, s2_results);
        records.truncate(limit);

        let with_embeddings = records.iter().filter(|r| r.has_embedding()).count();
        info!(
            query = %query,
            total = records.len(),
            with_embeddings,
            "Fused search results"
        );

        FusedSearch {
            records,
            sources: vec![oa_meta, s2_meta],
        }
    }

    fn unpack<T>(
        provider: Provider,
        result: papergraph_common::errors::Result<Vec<T>>,
        query: &str,
    ) -> (Vec<T>, SourceMeta) {
        match result {
            Ok(results) => {
                let meta = SourceMeta {
                    provider,
                    status: SourceStatus::Ok,
                    result_count: results.len(),
                };
                (results, meta)
            }
            Err(e) => {
                let status = if matches!(e, AppError::ProviderRateLimited { .. }) {
                    SourceStatus::RateLimited
                } else {
                    SourceStatus::Failed
                };
                warn!(provider = %provider, query = %query, error = %e, "Provider search failed, continuing without it");
                (
                    Vec::new(),
                    SourceMeta {
                        provider,
                        status,
                        result_count: 0,
                    },
                )
            }
        }
    }

    /// Deterministic merge of two ranked result lists.
    ///
    /// RRF(d) = 1/(k + rank_OA(d)) + 1/(k + rank_S2(d)) with k = 60.
    /// A record missing from one list gets that list's length as its rank,
    /// a worse-than-any-real-rank value that scales with the list so scores
    /// stay comparable across searches of different sizes.
    pub fn fuse(
        oa_results: Vec<OpenAlexWork>,
        s2_results: Vec<SemanticScholarPaper>,
    ) -> Vec<UnifiedRecord> {
        // Rank indexes for RRF (position 0 = most relevant)
        let mut oa_rank_by_doi: HashMap<String, usize> = HashMap::new();
        let mut oa_rank_by_title: HashMap<String, usize> = HashMap::new();
        for (rank, work) in oa_results.iter().enumerate() {
            if let Some(doi) = normalize_doi(work.doi.as_deref()) {
                oa_rank_by_doi.entry(doi).or_insert(rank);
            }
            let key = title_key(&work.title);
            if !key.is_empty() {
                oa_rank_by_title.entry(key).or_insert(rank);
            }
        }

        let mut s2_rank_by_doi: HashMap<String, usize> = HashMap::new();
        let mut s2_rank_by_title: HashMap<String, usize> = HashMap::new();
        for (rank, paper) in s2_results.iter().enumerate() {
            if let Some(doi) = normalize_doi(paper.doi.as_deref()) {
                s2_rank_by_doi.entry(doi).or_insert(rank);
            }
            let key = title_key(&paper.title);
            if !key.is_empty() {
                s2_rank_by_title.entry(key).or_insert(rank);
            }
        }

        let n_oa = oa_results.len().max(1) as f64;
        let n_s2 = s2_results.len().max(1) as f64;

        let compute_rrf = |doi: Option<&str>, title: &str| -> f64 {
            let key = title_key(title);
            let oa_rank = doi
                .and_then(|d| oa_rank_by_doi.get(d))
                .or_else(|| oa_rank_by_title.get(&key))
                .map(|&r| r as f64)
                .unwrap_or(n_oa);
            let s2_rank = doi
                .and_then(|d| s2_rank_by_doi.get(d))
                .or_else(|| s2_rank_by_title.get(&key))
                .map(|&r| r as f64)
                .unwrap_or(n_s2);
            1.0 / (RRF_K + oa_rank) + 1.0 / (RRF_K + s2_rank)
        };

        // Lookup from dedup key to S2 index, entries removed as they match
        let mut s2_by_doi: HashMap<String, usize> = HashMap::new();
        let mut s2_by_title: HashMap<String, usize> = HashMap::new();
        for (i, paper) in s2_results.iter().enumerate() {
            if let Some(doi) = normalize_doi(paper.doi.as_deref()) {
                s2_by_doi.entry(doi).or_insert(i);
            }
            let key = title_key(&paper.title);
            if !key.is_empty() {
                s2_by_title.entry(key).or_insert(i);
            }
        }

        let mut consumed = vec![false; s2_results.len()];
        let mut merged: Vec<UnifiedRecord> = Vec::with_capacity(oa_results.len());
        let mut seen_dois: HashSet<String> = HashSet::new();
        let mut seen_titles: HashSet<String> = HashSet::new();

        // OpenAlex results first: the primary metadata source
        for work in oa_results {
            let doi = normalize_doi(work.doi.as_deref());
            let key = title_key(&work.title);

            if let Some(d) = &doi {
                if seen_dois.contains(d) {
                    continue;
                }
            } else if !key.is_empty() && seen_titles.contains(&key) {
                continue;
            }

            let mut unified = oa_work_to_unified(work);

            // Match an S2 paper by DOI first, else by title, for enrichment
            let s2_match = doi
                .as_deref()
                .and_then(|d| s2_by_doi.remove(d))
                .or_else(|| {
                    if key.is_empty() {
                        None
                    } else {
                        s2_by_title.remove(&key)
                    }
                })
                .filter(|&i| !consumed[i]);

            if let Some(i) = s2_match {
                consumed[i] = true;
                let paper = &s2_results[i];
                unified.s2_paper_id = Some(paper.paper_id.clone());
                unified.tldr = paper.tldr.clone();
                unified.embedding = paper.embedding.clone();
                if is_blank(&unified.abstract_text) && !is_blank(&paper.abstract_text) {
                    unified.abstract_text = paper.abstract_text.clone();
                }
            }

            if is_blank(&unified.abstract_text) && !is_blank(&unified.tldr) {
                unified.abstract_text = unified.tldr.clone();
            }

            unified.rrf_score = compute_rrf(doi.as_deref(), &unified.title);

            if let Some(d) = &doi {
                seen_dois.insert(d.clone());
            }
            if !key.is_empty() {
                seen_titles.insert(key);
            }
            merged.push(unified);
        }

        // Append S2-only records, deduped against what has been emitted
        for (i, paper) in s2_results.iter().enumerate() {
            if consumed[i] {
                continue;
            }
            let doi = normalize_doi(paper.doi.as_deref());
            if let Some(d) = &doi {
                if seen_dois.contains(d) {
                    continue;
                }
            }
            let key = title_key(&paper.title);
            if !key.is_empty() && seen_titles.contains(&key) {
                continue;
            }

            let mut unified = s2_paper_to_unified(paper.clone());
            if is_blank(&unified.abstract_text) && !is_blank(&unified.tldr) {
                unified.abstract_text = unified.tldr.clone();
            }
            unified.rrf_score = compute_rrf(doi.as_deref(), &unified.title);

            if let Some(d) = doi {
                seen_dois.insert(d);
            }
            if !key.is_empty() {
                seen_titles.insert(key);
            }
            merged.push(unified);
        }

        // Embedded records always lead: only they can enter the graph
        // pipeline. Stable sort, so RRF order is preserved within each group.
        merged.sort_by(|a, b| {
            b.has_embedding()
                .cmp(&a.has_embedding())
                .then_with(|| {
                    b.rrf_score
                        .partial_cmp(&a.rrf_score)
                        .unwrap_or(Ordering::Equal)
                })
        });

        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oa_work(title: &str, doi: Option<&str>) -> OpenAlexWork {
        OpenAlexWork {
            id: format!("W-{}", title),
            title: title.to_string(),
            doi: doi.map(String::from),
            ..Default::default()
        }
    }

    fn s2_paper(title: &str, doi: Option<&str>) -> SemanticScholarPaper {
        SemanticScholarPaper {
            paper_id: format!("S-{}", title),
            title: title.to_string(),
            doi: doi.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_doi_strips_prefixes() {
        assert_eq!(
            normalize_doi(Some("https://doi.org/10.1/X")).as_deref(),
            Some("10.1/x")
        );
        assert_eq!(
            normalize_doi(Some("http://doi.org/10.1/X")).as_deref(),
            Some("10.1/x")
        );
        assert_eq!(normalize_doi(Some("doi:10.1/X ")).as_deref(), Some("10.1/x"));
        assert_eq!(normalize_doi(Some("  10.1/x")).as_deref(), Some("10.1/x"));
        assert_eq!(normalize_doi(Some("")), None);
        assert_eq!(normalize_doi(None), None);
    }

    #[test]
    fn test_doi_dedup_merges_across_providers() {
        // Same paper: plain DOI on one side, URL-prefixed uppercase on the other
        let oa = vec![oa_work("Paper X", Some("10.1/X"))];
        let mut s2 = s2_paper("Paper X (preprint)", Some("https://doi.org/10.1/x"));
        s2.tldr = Some("Short summary.".to_string());
        s2.embedding = Some(vec![0.5; 4]);

        let merged = FusionEngine::fuse(oa, vec![s2]);

        assert_eq!(merged.len(), 1);
        let record = &merged[0];
        assert_eq!(record.doi.as_deref(), Some("10.1/x"));
        // OpenAlex metadata kept, S2 enrichment attached
        assert_eq!(record.title, "Paper X");
        assert_eq!(record.tldr.as_deref(), Some("Short summary."));
        assert!(record.has_embedding());
        // Abstract fell back to the summary
        assert_eq!(record.abstract_text.as_deref(), Some("Short summary."));
    }

    #[test]
    fn test_title_dedup_without_doi() {
        let oa = vec![oa_work("Attention Is All You Need", None)];
        let s2 = vec![s2_paper("  attention is all you need ", None)];

        let merged = FusionEngine::fuse(oa, s2);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].s2_paper_id.is_some());
        assert!(merged[0].openalex_id.is_some());
    }

    #[test]
    fn test_unmatched_s2_records_are_appended() {
        let oa = vec![oa_work("Alpha", Some("10.1/a"))];
        let s2 = vec![
            s2_paper("Alpha", Some("10.1/a")),
            s2_paper("Beta", Some("10.1/b")),
        ];

        let merged = FusionEngine::fuse(oa, s2);
        assert_eq!(merged.len(), 2);
        let betas: Vec<_> = merged.iter().filter(|r| r.title == "Beta").collect();
        assert_eq!(betas.len(), 1);
        assert!(betas[0].openalex_id.is_none());
    }

    #[test]
    fn test_no_duplicate_dois_or_titles_in_output() {
        // Duplicates inside a single provider list must not leak through
        let oa = vec![
            oa_work("Gamma", Some("10.1/g")),
            oa_work("Gamma (again)", Some("doi:10.1/G")),
            oa_work("Delta", None),
            oa_work("delta", None),
        ];
        let s2 = vec![s2_paper("Gamma", Some("10.1/g"))];

        let merged = FusionEngine::fuse(oa, s2);

        let mut dois = HashSet::new();
        let mut titles = HashSet::new();
        for record in &merged {
            if let Some(doi) = &record.doi {
                assert!(dois.insert(doi.clone()), "duplicate DOI {}", doi);
            } else {
                let key = record.title.trim().to_lowercase();
                assert!(titles.insert(key.clone()), "duplicate title {}", key);
            }
        }
    }

    #[test]
    fn test_rrf_monotonicity() {
        // X ranks ahead of Y in both lists, so its score can never be lower
        let oa = vec![
            oa_work("X", Some("10.1/x")),
            oa_work("Y", Some("10.1/y")),
            oa_work("Z", Some("10.1/z")),
        ];
        let s2 = vec![
            s2_paper("X", Some("10.1/x")),
            s2_paper("Y", Some("10.1/y")),
        ];

        let merged = FusionEngine::fuse(oa, s2);
        let score = |title: &str| {
            merged
                .iter()
                .find(|r| r.title == title)
                .map(|r| r.rrf_score)
                .unwrap()
        };
        assert!(score("X") >= score("Y"));
        assert!(score("Y") >= score("Z"));
    }

    #[test]
    fn test_unmatched_rank_scales_with_list_length() {
        // OA-only record in a 2-element OA list against a 5-element S2 list:
        // the missing-side rank must be the S2 list length, not a constant.
        let oa = vec![oa_work("Solo", Some("10.1/solo")), oa_work("Other", None)];
        let s2: Vec<_> = (0..5)
            .map(|i| s2_paper(&format!("S2-{}", i), Some(&format!("10.2/{}", i))))
            .collect();

        let merged = FusionEngine::fuse(oa, s2);
        let solo = merged.iter().find(|r| r.title == "Solo").unwrap();

        let expected = 1.0 / (RRF_K + 0.0) + 1.0 / (RRF_K + 5.0);
        assert!((solo.rrf_score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_embedded_records_sort_first() {
        let oa = vec![
            oa_work("Top ranked, no embedding", Some("10.1/top")),
            oa_work("Lower ranked", Some("10.1/low")),
        ];
        let mut embedded = s2_paper("Lower ranked", Some("10.1/low"));
        embedded.embedding = Some(vec![0.1; 4]);

        let merged = FusionEngine::fuse(oa, vec![embedded]);
        assert!(merged[0].has_embedding());
        assert_eq!(merged[0].title, "Lower ranked");
    }

    #[test]
    fn test_abstract_chain_prefers_provider_abstracts() {
        let mut oa = oa_work("Has abstract", Some("10.1/a"));
        oa.abstract_text = Some("The real abstract.".to_string());
        let mut s2 = s2_paper("Has abstract", Some("10.1/a"));
        s2.abstract_text = Some("S2 abstract.".to_string());
        s2.tldr = Some("tldr.".to_string());

        let merged = FusionEngine::fuse(vec![oa], vec![s2]);
        assert_eq!(merged[0].abstract_text.as_deref(), Some("The real abstract."));

        // Without the OA abstract, the S2 abstract wins over the tldr
        let oa = oa_work("No abstract", Some("10.1/b"));
        let mut s2 = s2_paper("No abstract", Some("10.1/b"));
        s2.abstract_text = Some("S2 abstract.".to_string());
        s2.tldr = Some("tldr.".to_string());

        let merged = FusionEngine::fuse(vec![oa], vec![s2]);
        assert_eq!(merged[0].abstract_text.as_deref(), Some("S2 abstract."));
    }

    #[test]
    fn test_fuse_is_deterministic() {
        let make_inputs = || {
            let oa = vec![
                oa_work("A", Some("10.1/a")),
                oa_work("B", None),
                oa_work("C", Some("10.1/c")),
            ];
            let mut s2b = s2_paper("B", None);
            s2b.embedding = Some(vec![1.0; 4]);
            let s2 = vec![s2b, s2_paper("D", Some("10.1/d"))];
            (oa, s2)
        };

        let (oa1, s21) = make_inputs();
        let (oa2, s22) = make_inputs();
        let first = FusionEngine::fuse(oa1, s21);
        let second = FusionEngine::fuse(oa2, s22);

        let shape =
            |records: &[UnifiedRecord]| -> Vec<(String, Option<String>, String)> {
                records
                    .iter()
                    .map(|r| {
                        (
                            r.title.clone(),
                            r.doi.clone(),
                            format!("{:.12}", r.rrf_score),
                        )
                    })
                    .collect()
            };
        assert_eq!(shape(&first), shape(&second));
    }

    #[test]
    fn test_one_side_empty_still_fuses() {
        let merged = FusionEngine::fuse(vec![oa_work("Only OA", Some("10.1/o"))], Vec::new());
        assert_eq!(merged.len(), 1);
        assert!(merged[0].rrf_score > 0.0);

        let merged = FusionEngine::fuse(Vec::new(), vec![s2_paper("Only S2", None)]);
        assert_eq!(merged.len(), 1);
    }
}
