//! Paper detail, citation, reference, and expansion handlers
//!
//! Backed by the Semantic Scholar client with the best-effort redis
//! side-cache in front of the slow reference/citation lookups.

use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use papergraph_common::cache::keys;
use papergraph_common::errors::{AppError, Result};
use papergraph_common::models::Author;
use papergraph_providers::semantic_scholar::SemanticScholarPaper;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Full paper detail
#[derive(Debug, Serialize, Deserialize)]
pub struct PaperDetail {
    pub s2_paper_id: String,
    pub doi: Option<String>,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub citation_count: i64,
    pub fields_of_study: Vec<String>,
    pub tldr: Option<String>,
    pub is_open_access: bool,
    pub oa_url: Option<String>,
    pub authors: Vec<Author>,
}

/// Compact paper view for citation/reference lists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationPaper {
    pub paper_id: String,
    pub title: String,
    pub year: Option<i32>,
    pub citation_count: i64,
    pub venue: Option<String>,
    pub is_open_access: bool,
    pub doi: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

fn default_list_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct ExpandResponse {
    pub references: Vec<CitationPaper>,
    pub citations: Vec<CitationPaper>,
    pub total_references: usize,
    pub total_citations: usize,
}

fn to_citation_paper(paper: &SemanticScholarPaper) -> CitationPaper {
    CitationPaper {
        paper_id: paper.paper_id.clone(),
        title: paper.title.clone(),
        year: paper.year,
        citation_count: paper.citation_count,
        venue: paper.venue.clone(),
        is_open_access: paper.is_open_access,
        doi: paper.doi.clone(),
    }
}

fn to_detail(paper: SemanticScholarPaper) -> PaperDetail {
    PaperDetail {
        s2_paper_id: paper.paper_id,
        doi: paper.doi,
        title: paper.title,
        abstract_text: paper.abstract_text,
        year: paper.year,
        venue: paper.venue,
        citation_count: paper.citation_count,
        fields_of_study: paper.fields_of_study,
        tldr: paper.tldr,
        is_open_access: paper.is_open_access,
        oa_url: paper.open_access_pdf_url,
        authors: paper.authors,
    }
}

/// Get one paper by Semantic Scholar id or `DOI:...` reference.
pub async fn get_paper(
    State(state): State<AppState>,
    Path(paper_id): Path<String>,
) -> Result<Json<PaperDetail>> {
    let cache_key = keys::paper(&paper_id);
    if let Some(cached) = state.side_cache.get::<PaperDetail>(&cache_key).await {
        return Ok(Json(cached));
    }

    let paper = state
        .semantic_scholar
        .get_paper(&paper_id)
        .await?
        .ok_or_else(|| AppError::PaperNotFound {
            id: paper_id.clone(),
        })?;

    let detail = to_detail(paper);
    state
        .side_cache
        .set_with_ttl(&cache_key, &detail, state.side_cache.refs_ttl_secs())
        .await;

    Ok(Json(detail))
}

/// Papers referenced by this paper.
pub async fn get_references(
    State(state): State<AppState>,
    Path(paper_id): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<CitationPaper>>> {
    let cache_key = keys::refs(&paper_id, params.limit);
    if let Some(cached) = state.side_cache.get::<Vec<CitationPaper>>(&cache_key).await {
        return Ok(Json(cached));
    }

    let refs = state
        .semantic_scholar
        .get_references(&paper_id, params.limit)
        .await?;
    let papers: Vec<CitationPaper> = refs.iter().map(to_citation_paper).collect();

    state
        .side_cache
        .set_with_ttl(&cache_key, &papers, state.side_cache.refs_ttl_secs())
        .await;

    Ok(Json(papers))
}

/// Papers citing this paper.
pub async fn get_citations(
    State(state): State<AppState>,
    Path(paper_id): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<CitationPaper>>> {
    let cache_key = keys::cites(&paper_id, params.limit);
    if let Some(cached) = state.side_cache.get::<Vec<CitationPaper>>(&cache_key).await {
        return Ok(Json(cached));
    }

    let cites = state
        .semantic_scholar
        .get_citations(&paper_id, params.limit)
        .await?;
    let papers: Vec<CitationPaper> = cites.iter().map(to_citation_paper).collect();

    state
        .side_cache
        .set_with_ttl(&cache_key, &papers, state.side_cache.refs_ttl_secs())
        .await;

    Ok(Json(papers))
}

/// References and citations in one call, tolerating partial failure:
/// a failed side comes back empty rather than failing the expansion.
pub async fn expand_paper(
    State(state): State<AppState>,
    Path(paper_id): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<ExpandResponse>> {
    let (refs, cites) = tokio::join!(
        state.semantic_scholar.get_references(&paper_id, params.limit),
        state.semantic_scholar.get_citations(&paper_id, params.limit),
    );

    let references: Vec<CitationPaper> = match refs {
        Ok(refs) => refs.iter().map(to_citation_paper).collect(),
        Err(e) => {
            warn!(paper = %paper_id, error = %e, "Reference fetch failed during expand");
            Vec::new()
        }
    };
    let citations: Vec<CitationPaper> = match cites {
        Ok(cites) => cites.iter().map(to_citation_paper).collect(),
        Err(e) => {
            warn!(paper = %paper_id, error = %e, "Citation fetch failed during expand");
            Vec::new()
        }
    };

    Ok(Json(ExpandResponse {
        total_references: references.len(),
        total_citations: citations.len(),
        references,
        citations,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_citation_paper_mapping() {
        let paper = SemanticScholarPaper {
            paper_id: "p1".to_string(),
            title: "Title".to_string(),
            year: Some(2020),
            citation_count: 7,
            venue: Some("CHI".to_string()),
            is_open_access: true,
            doi: Some("10.1/p1".to_string()),
            ..Default::default()
        };

        let compact = to_citation_paper(&paper);
        assert_eq!(compact.paper_id, "p1");
        assert_eq!(compact.citation_count, 7);
        assert!(compact.is_open_access);
    }

    #[test]
    fn test_detail_serializes_abstract_field_name() {
        let detail = to_detail(SemanticScholarPaper {
            paper_id: "p1".to_string(),
            title: "T".to_string(),
            abstract_text: Some("body".to_string()),
            ..Default::default()
        });

        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["abstract"], "body");
    }
}
