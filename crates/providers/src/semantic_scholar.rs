//! Semantic Scholar API integration
//!
//! Provides:
//! - Paper search with SPECTER embeddings and tldr summaries
//! - Citation graph queries (references and citations)
//! - Rate limiting and retry logic
//!
//! Rate limits: 1 request/second with an API key, far lower without one.

use backoff::ExponentialBackoffBuilder;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use papergraph_common::config::SemanticScholarConfig;
use papergraph_common::errors::{AppError, Provider, Result};
use papergraph_common::metrics;
use papergraph_common::models::Author;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use tracing::debug;

const BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";

const PAPER_FIELDS: &str = "paperId,title,abstract,year,venue,citationCount,\
influentialCitationCount,openAccessPdf,externalIds,authors,fieldsOfStudy,tldr";

const PAPER_FIELDS_WITH_EMBEDDING: &str = "paperId,title,abstract,year,venue,citationCount,\
influentialCitationCount,openAccessPdf,externalIds,authors,fieldsOfStudy,tldr,embedding";

/// Semantic Scholar paper data model.
#[derive(Debug, Clone, Default)]
pub struct SemanticScholarPaper {
    pub paper_id: String,
    pub title: String,
    pub abstract_text: Option<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub citation_count: i64,
    pub influential_citation_count: i64,
    pub is_open_access: bool,
    pub open_access_pdf_url: Option<String>,
    pub doi: Option<String>,
    pub arxiv_id: Option<String>,
    pub authors: Vec<Author>,
    pub fields_of_study: Vec<String>,
    /// SPECTER document embedding
    pub embedding: Option<Vec<f32>>,
    /// Machine-generated one-sentence summary
    pub tldr: Option<String>,
}

// ==================== Raw API response shapes ====================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<RawPaper>,
}

#[derive(Debug, Deserialize)]
struct ReferencesResponse {
    #[serde(default)]
    data: Vec<ReferenceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReferenceEntry {
    cited_paper: Option<RawPaper>,
}

#[derive(Debug, Deserialize)]
struct CitationsResponse {
    #[serde(default)]
    data: Vec<CitationEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CitationEntry {
    citing_paper: Option<RawPaper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPaper {
    paper_id: Option<String>,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    year: Option<i32>,
    venue: Option<String>,
    #[serde(default)]
    citation_count: i64,
    #[serde(default)]
    influential_citation_count: i64,
    open_access_pdf: Option<RawOpenAccessPdf>,
    external_ids: Option<RawExternalIds>,
    authors: Option<Vec<RawAuthor>>,
    fields_of_study: Option<Vec<String>>,
    embedding: Option<RawEmbedding>,
    tldr: Option<RawTldr>,
}

#[derive(Debug, Deserialize)]
struct RawOpenAccessPdf {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "ArXiv")]
    arxiv: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAuthor {
    name: Option<String>,
    affiliations: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawEmbedding {
    vector: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct RawTldr {
    text: Option<String>,
}

impl From<RawPaper> for SemanticScholarPaper {
    fn from(raw: RawPaper) -> Self {
        let open_access_pdf_url = raw.open_access_pdf.and_then(|pdf| pdf.url);
        let external_ids = raw.external_ids.unwrap_or_default();

        Self {
            paper_id: raw.paper_id.unwrap_or_default(),
            title: raw.title.unwrap_or_default(),
            abstract_text: raw.abstract_text,
            year: raw.year,
            venue: raw.venue,
            citation_count: raw.citation_count,
            influential_citation_count: raw.influential_citation_count,
            is_open_access: open_access_pdf_url.is_some(),
            open_access_pdf_url,
            doi: external_ids.doi,
            arxiv_id: external_ids.arxiv,
            authors: raw
                .authors
                .unwrap_or_default()
                .into_iter()
                .map(|a| Author {
                    name: a.name.unwrap_or_else(|| "Unknown".to_string()),
                    affiliations: a.affiliations.unwrap_or_default(),
                })
                .collect(),
            fields_of_study: raw.fields_of_study.unwrap_or_default(),
            embedding: raw.embedding.and_then(|e| e.vector),
            tldr: raw.tldr.and_then(|t| t.text),
        }
    }
}

// ==================== Client ====================

/// Semantic Scholar API client with rate limiting and retry logic.
pub struct SemanticScholarClient {
    client: reqwest::Client,
    limiter: DefaultDirectRateLimiter,
    max_retries: u32,
}

impl SemanticScholarClient {
    /// Create a client from configuration.
    pub fn new(config: &SemanticScholarConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        if let Some(api_key) = config.api_key.as_deref() {
            headers.insert(
                "x-api-key",
                reqwest::header::HeaderValue::from_str(api_key).map_err(|e| {
                    AppError::Configuration {
                        message: format!("Invalid Semantic Scholar API key: {}", e),
                    }
                })?,
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(format!("papergraph/{}", papergraph_common::VERSION))
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to build Semantic Scholar HTTP client: {}", e),
            })?;

        let rps = NonZeroU32::new(config.requests_per_second.max(1))
            .expect("requests_per_second clamped to >= 1");

        Ok(Self {
            client,
            limiter: RateLimiter::direct(Quota::per_second(rps)),
            max_retries: config.max_retries,
        })
    }

    /// GET with client-side rate limiting and bounded backoff retries.
    ///
    /// A 429 with a short Retry-After hint is retried after the hinted
    /// delay; a longer hint immediately surfaces the distinguishable
    /// rate-limit error. Other 4xx are never retried.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<T> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_secs(1))
            .with_multiplier(2.0)
            .with_max_elapsed_time(Some(Duration::from_secs(self.max_retries as u64 * 4)))
            .build();

        let start = Instant::now();
        let result = backoff::future::retry(policy, || async {
            self.limiter.until_ready().await;

            let response = self
                .client
                .get(url)
                .query(params)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(AppError::ProviderError {
                        provider: Provider::SemanticScholar,
                        message: e.to_string(),
                    })
                })?;

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = retry_after_secs(&response).unwrap_or(60);
                metrics::record_rate_limited("semantic_scholar");
                let err = AppError::ProviderRateLimited {
                    provider: Provider::SemanticScholar,
                    retry_after_secs: retry_after,
                };
                return if retry_after <= 5 {
                    Err(backoff::Error::retry_after(
                        err,
                        Duration::from_secs(retry_after),
                    ))
                } else {
                    Err(backoff::Error::permanent(err))
                };
            }

            if status.is_client_error() {
                return Err(backoff::Error::permanent(AppError::ProviderError {
                    provider: Provider::SemanticScholar,
                    message: format!("HTTP {} for {}", status, url),
                }));
            }

            if status.is_server_error() {
                return Err(backoff::Error::transient(AppError::ProviderError {
                    provider: Provider::SemanticScholar,
                    message: format!("HTTP {} for {}", status, url),
                }));
            }

            response.json::<T>().await.map_err(|e| {
                backoff::Error::permanent(AppError::ProviderError {
                    provider: Provider::SemanticScholar,
                    message: format!("Invalid response body: {}", e),
                })
            })
        })
        .await;

        metrics::record_provider_call(
            "semantic_scholar",
            start.elapsed().as_secs_f64(),
            result.is_ok(),
        );
        result
    }

    /// Search papers by keyword relevance.
    pub async fn search_papers(
        &self,
        query: &str,
        limit: usize,
        year_range: Option<(i32, i32)>,
        fields_of_study: Option<&[String]>,
        include_embedding: bool,
    ) -> Result<Vec<SemanticScholarPaper>> {
        let fields = if include_embedding {
            PAPER_FIELDS_WITH_EMBEDDING
        } else {
            PAPER_FIELDS
        };

        let mut params = vec![
            ("query".to_string(), query.to_string()),
            ("limit".to_string(), limit.min(100).to_string()),
            ("fields".to_string(), fields.to_string()),
        ];
        if let Some((start, end)) = year_range {
            params.push(("year".to_string(), format!("{}-{}", start, end)));
        }
        if let Some(fos) = fields_of_study {
            if !fos.is_empty() {
                params.push(("fieldsOfStudy".to_string(), fos.join(",")));
            }
        }

        let url = format!("{}/paper/search", BASE_URL);
        let response: SearchResponse = self.get_json(&url, &params).await?;

        debug!(results = response.data.len(), "Semantic Scholar search");
        Ok(response
            .data
            .into_iter()
            .map(SemanticScholarPaper::from)
            .filter(|p| !p.paper_id.is_empty())
            .collect())
    }

    /// Get a single paper by Semantic Scholar ID or DOI (`DOI:10.x/...`).
    pub async fn get_paper(&self, paper_id: &str) -> Result<Option<SemanticScholarPaper>> {
        let url = format!("{}/paper/{}", BASE_URL, paper_id);
        let params = vec![("fields".to_string(), PAPER_FIELDS.to_string())];

        match self.get_json::<RawPaper>(&url, &params).await {
            Ok(raw) => Ok(Some(raw.into())),
            Err(AppError::ProviderError { message, .. }) if message.contains("HTTP 404") => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Get papers referenced by this paper.
    pub async fn get_references(
        &self,
        paper_id: &str,
        limit: usize,
    ) -> Result<Vec<SemanticScholarPaper>> {
        let url = format!("{}/paper/{}/references", BASE_URL, paper_id);
        let params = vec![
            ("fields".to_string(), PAPER_FIELDS.to_string()),
            ("limit".to_string(), limit.min(1000).to_string()),
        ];

        let response: ReferencesResponse = self.get_json(&url, &params).await?;
        Ok(response
            .data
            .into_iter()
            .filter_map(|entry| entry.cited_paper)
            .map(SemanticScholarPaper::from)
            .filter(|p| !p.paper_id.is_empty())
            .collect())
    }

    /// Get papers citing this paper.
    pub async fn get_citations(
        &self,
        paper_id: &str,
        limit: usize,
    ) -> Result<Vec<SemanticScholarPaper>> {
        let url = format!("{}/paper/{}/citations", BASE_URL, paper_id);
        let params = vec![
            ("fields".to_string(), PAPER_FIELDS.to_string()),
            ("limit".to_string(), limit.min(1000).to_string()),
        ];

        let response: CitationsResponse = self.get_json(&url, &params).await?;
        Ok(response
            .data
            .into_iter()
            .filter_map(|entry| entry.citing_paper)
            .map(SemanticScholarPaper::from)
            .filter(|p| !p.paper_id.is_empty())
            .collect())
    }
}

fn retry_after_secs(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_paper_conversion() {
        let raw: RawPaper = serde_json::from_value(serde_json::json!({
            "paperId": "abc123",
            "title": "Graph Learning",
            "abstract": "We study graphs.",
            "year": 2022,
            "venue": "ICML",
            "citationCount": 17,
            "influentialCitationCount": 3,
            "openAccessPdf": {"url": "https://example.org/p.pdf"},
            "externalIds": {"DOI": "10.1/xyz", "ArXiv": "2201.00001"},
            "authors": [{"name": "Grace Hopper", "affiliations": ["Navy"]}],
            "fieldsOfStudy": ["Computer Science"],
            "embedding": {"vector": [0.1, 0.2]},
            "tldr": {"text": "Graphs are studied."}
        }))
        .unwrap();

        let paper = SemanticScholarPaper::from(raw);
        assert_eq!(paper.paper_id, "abc123");
        assert_eq!(paper.doi.as_deref(), Some("10.1/xyz"));
        assert_eq!(paper.embedding.as_deref(), Some(&[0.1, 0.2][..]));
        assert_eq!(paper.tldr.as_deref(), Some("Graphs are studied."));
        assert!(paper.is_open_access);
        assert_eq!(paper.authors[0].name, "Grace Hopper");
    }

    #[test]
    fn test_references_response_skips_null_entries() {
        let response: ReferencesResponse = serde_json::from_value(serde_json::json!({
            "data": [
                {"citedPaper": {"paperId": "p1", "title": "One"}},
                {"citedPaper": null},
                {"citedPaper": {"paperId": null, "title": "Anonymous"}}
            ]
        }))
        .unwrap();

        let papers: Vec<SemanticScholarPaper> = response
            .data
            .into_iter()
            .filter_map(|entry| entry.cited_paper)
            .map(SemanticScholarPaper::from)
            .filter(|p| !p.paper_id.is_empty())
            .collect();

        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].paper_id, "p1");
    }

    #[test]
    fn test_missing_fields_default() {
        let raw: RawPaper = serde_json::from_value(serde_json::json!({
            "paperId": "bare",
            "title": "Bare Paper"
        }))
        .unwrap();

        let paper = SemanticScholarPaper::from(raw);
        assert_eq!(paper.citation_count, 0);
        assert!(paper.embedding.is_none());
        assert!(!paper.is_open_access);
        assert!(paper.fields_of_study.is_empty());
    }
}
