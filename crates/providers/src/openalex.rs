//! OpenAlex API integration
//!
//! OpenAlex is a free, open catalog of the global research system.
//! Uses the polite pool (mailto param) for higher rate limits and tracks
//! daily credit usage for premium API keys.
//!
//! API: https://docs.openalex.org/

use backoff::ExponentialBackoffBuilder;
use papergraph_common::config::OpenAlexConfig;
use papergraph_common::errors::{AppError, Provider, Result};
use papergraph_common::metrics;
use papergraph_common::models::{Author, TopicTag};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const BASE_URL: &str = "https://api.openalex.org";

/// Credits consumed by one page of search results
const SEARCH_CREDITS: u64 = 10;

/// OpenAlex work (paper/publication) data model.
#[derive(Debug, Clone, Default)]
pub struct OpenAlexWork {
    /// OpenAlex ID (e.g. "https://openalex.org/W2741809807")
    pub id: String,
    pub title: String,
    pub abstract_text: Option<String>,
    pub publication_year: Option<i32>,
    pub doi: Option<String>,
    pub venue: Option<String>,
    pub citation_count: i64,
    pub is_open_access: bool,
    pub open_access_url: Option<String>,
    pub authors: Vec<Author>,
    /// Level-0/1 concept names (coarse fields of study)
    pub fields_of_study: Vec<String>,
    pub topics: Vec<TopicTag>,
}

// ==================== Raw API response shapes ====================

#[derive(Debug, Deserialize)]
struct WorksResponse {
    #[serde(default)]
    results: Vec<RawWork>,
}

#[derive(Debug, Deserialize)]
struct RawWork {
    #[serde(default)]
    id: String,
    title: Option<String>,
    display_name: Option<String>,
    abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
    publication_year: Option<i32>,
    doi: Option<String>,
    #[serde(default)]
    ids: RawIds,
    #[serde(default)]
    open_access: RawOpenAccess,
    #[serde(default)]
    cited_by_count: i64,
    #[serde(default)]
    authorships: Vec<RawAuthorship>,
    #[serde(default)]
    concepts: Vec<RawConcept>,
    #[serde(default)]
    topics: Vec<RawTopic>,
    primary_location: Option<RawLocation>,
}

#[derive(Debug, Default, Deserialize)]
struct RawIds {
    doi: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawOpenAccess {
    #[serde(default)]
    is_oa: bool,
    oa_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAuthorship {
    author: Option<RawAuthor>,
    #[serde(default)]
    institutions: Vec<RawInstitution>,
}

#[derive(Debug, Deserialize)]
struct RawAuthor {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInstitution {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawConcept {
    display_name: Option<String>,
    level: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct RawTopic {
    display_name: Option<String>,
    score: Option<f32>,
    field: Option<RawNamed>,
}

#[derive(Debug, Deserialize)]
struct RawNamed {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    source: Option<RawNamed>,
}

impl From<RawWork> for OpenAlexWork {
    fn from(raw: RawWork) -> Self {
        let abstract_text = raw
            .abstract_inverted_index
            .as_ref()
            .map(reconstruct_abstract)
            .filter(|s| !s.is_empty());

        let venue = raw
            .primary_location
            .and_then(|loc| loc.source)
            .and_then(|source| source.display_name);

        let authors = raw
            .authorships
            .into_iter()
            .map(|authorship| Author {
                name: authorship
                    .author
                    .and_then(|a| a.display_name)
                    .unwrap_or_else(|| "Unknown".to_string()),
                affiliations: authorship
                    .institutions
                    .into_iter()
                    .filter_map(|i| i.display_name)
                    .collect(),
            })
            .collect();

        // Only coarse concepts (level <= 1) make useful field tags
        let fields_of_study = raw
            .concepts
            .into_iter()
            .filter(|c| c.level.unwrap_or(i32::MAX) <= 1)
            .filter_map(|c| c.display_name)
            .collect();

        let topics = raw
            .topics
            .into_iter()
            .filter_map(|t| {
                t.display_name.map(|name| TopicTag {
                    name,
                    score: t.score,
                    field: t.field.and_then(|f| f.display_name),
                })
            })
            .collect();

        Self {
            id: raw.id,
            title: raw.title.or(raw.display_name).unwrap_or_default(),
            abstract_text,
            publication_year: raw.publication_year,
            doi: raw.ids.doi.or(raw.doi),
            venue,
            citation_count: raw.cited_by_count,
            is_open_access: raw.open_access.is_oa,
            open_access_url: raw.open_access.oa_url,
            authors,
            fields_of_study,
            topics,
        }
    }
}

/// Reconstruct an abstract from OpenAlex's inverted-index representation.
fn reconstruct_abstract(inverted_index: &HashMap<String, Vec<usize>>) -> String {
    let max_pos = inverted_index
        .values()
        .flat_map(|positions| positions.iter().copied())
        .max();

    let Some(max_pos) = max_pos else {
        return String::new();
    };

    let mut words: Vec<&str> = vec![""; max_pos + 1];
    for (word, positions) in inverted_index {
        for &pos in positions {
            words[pos] = word;
        }
    }

    words.join(" ")
}

// ==================== Credit tracking ====================

#[derive(Debug)]
struct CreditState {
    credits_used: u64,
    day_start: Instant,
}

/// Tracks daily OpenAlex API credit usage.
///
/// The premium API provides a fixed daily budget (~10 credits per search
/// page, ~1 per single entity). State is short-lived in-process bookkeeping
/// behind a mutex; slightly stale reads are acceptable.
#[derive(Debug)]
pub struct CreditTracker {
    daily_limit: u64,
    state: Mutex<CreditState>,
}

impl CreditTracker {
    pub fn new(daily_limit: u64) -> Self {
        Self {
            daily_limit,
            state: Mutex::new(CreditState {
                credits_used: 0,
                day_start: Instant::now(),
            }),
        }
    }

    /// Record spent credits, warning as the budget runs out.
    pub async fn track(&self, credits: u64) {
        let mut state = self.state.lock().await;
        Self::maybe_reset_day(&mut state);
        state.credits_used += credits;

        if self.daily_limit > 0 {
            let usage_pct = (state.credits_used as f64 / self.daily_limit as f64) * 100.0;
            if usage_pct >= 95.0 {
                warn!(
                    used = state.credits_used,
                    limit = self.daily_limit,
                    "OpenAlex credits at {:.0}%, cache-first mode",
                    usage_pct
                );
            } else if usage_pct >= 80.0 {
                warn!(
                    used = state.credits_used,
                    limit = self.daily_limit,
                    "OpenAlex credits at {:.0}%",
                    usage_pct
                );
            }
        }
    }

    /// Check whether spending `credits` stays within the daily budget.
    pub async fn can_spend(&self, credits: u64) -> bool {
        let mut state = self.state.lock().await;
        Self::maybe_reset_day(&mut state);
        state.credits_used + credits <= self.daily_limit
    }

    pub async fn usage_percent(&self) -> f64 {
        if self.daily_limit == 0 {
            return 0.0;
        }
        let state = self.state.lock().await;
        (state.credits_used as f64 / self.daily_limit as f64) * 100.0
    }

    fn maybe_reset_day(state: &mut CreditState) {
        if state.day_start.elapsed() >= Duration::from_secs(86_400) {
            state.credits_used = 0;
            state.day_start = Instant::now();
        }
    }
}

// ==================== Client ====================

/// OpenAlex API client with polite-pool access and credit tracking.
pub struct OpenAlexClient {
    client: reqwest::Client,
    email: Option<String>,
    max_retries: u32,
    credit_tracker: CreditTracker,
}

impl OpenAlexClient {
    /// Create a client from configuration.
    pub fn new(config: &OpenAlexConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        if let Some(api_key) = config.api_key.as_deref() {
            let value = format!("Bearer {}", api_key);
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&value).map_err(|e| {
                    AppError::Configuration {
                        message: format!("Invalid OpenAlex API key: {}", e),
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
                message: format!("Failed to build OpenAlex HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            email: config.email.clone(),
            max_retries: config.max_retries,
            credit_tracker: CreditTracker::new(config.daily_credit_limit),
        })
    }

    pub fn credit_tracker(&self) -> &CreditTracker {
        &self.credit_tracker
    }

    /// Build query parameters with the polite-pool email attached.
    fn build_params(&self, mut params: Vec<(String, String)>) -> Vec<(String, String)> {
        if let Some(email) = self.email.as_deref() {
            params.push(("mailto".to_string(), email.to_string()));
        }
        params
    }

    /// GET with bounded exponential-backoff retries.
    ///
    /// 429s with a short Retry-After hint are retried after the hinted
    /// delay; longer hints surface as a rate-limit error. Other 4xx are
    /// never retried.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<T> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_multiplier(2.0)
            .with_max_elapsed_time(Some(Duration::from_secs(self.max_retries as u64 * 4)))
            .build();

        let start = Instant::now();
        let result = backoff::future::retry(policy, || async {
            let response = self
                .client
                .get(url)
                .query(params)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(AppError::ProviderError {
                        provider: Provider::OpenAlex,
                        message: e.to_string(),
                    })
                })?;

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = retry_after_secs(&response).unwrap_or(60);
                metrics::record_rate_limited("openalex");
                let err = AppError::ProviderRateLimited {
                    provider: Provider::OpenAlex,
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
                    provider: Provider::OpenAlex,
                    message: format!("HTTP {} for {}", status, url),
                }));
            }

            if status.is_server_error() {
                return Err(backoff::Error::transient(AppError::ProviderError {
                    provider: Provider::OpenAlex,
                    message: format!("HTTP {} for {}", status, url),
                }));
            }

            response.json::<T>().await.map_err(|e| {
                backoff::Error::permanent(AppError::ProviderError {
                    provider: Provider::OpenAlex,
                    message: format!("Invalid response body: {}", e),
                })
            })
        })
        .await;

        metrics::record_provider_call("openalex", start.elapsed().as_secs_f64(), result.is_ok());
        result
    }

    /// Search for works, sorted by relevance.
    pub async fn search_works(
        &self,
        query: &str,
        per_page: usize,
        year_range: Option<(i32, i32)>,
    ) -> Result<Vec<OpenAlexWork>> {
        let mut filters = Vec::new();
        if let Some((start, end)) = year_range {
            filters.push(format!("publication_year:{}-{}", start, end));
        }
        self.works_query(Some(query), filters, "relevance_score:desc", per_page)
            .await
    }

    /// Get works referenced by this work.
    pub async fn get_references(&self, work_id: &str, limit: usize) -> Result<Vec<OpenAlexWork>> {
        self.works_query(None, vec![format!("cited_by:{}", work_id)], "relevance_score:desc", limit)
            .await
    }

    /// Get works that cite this work, most-cited first.
    pub async fn get_citations(&self, work_id: &str, limit: usize) -> Result<Vec<OpenAlexWork>> {
        self.works_query(None, vec![format!("cites:{}", work_id)], "cited_by_count:desc", limit)
            .await
    }

    async fn works_query(
        &self,
        query: Option<&str>,
        filters: Vec<String>,
        sort: &str,
        per_page: usize,
    ) -> Result<Vec<OpenAlexWork>> {
        if !self.credit_tracker.can_spend(SEARCH_CREDITS).await {
            warn!("OpenAlex daily credit limit reached, skipping search");
            return Ok(Vec::new());
        }

        let mut params = vec![
            ("sort".to_string(), sort.to_string()),
            ("per_page".to_string(), per_page.min(200).to_string()),
        ];
        if let Some(query) = query {
            params.push(("search".to_string(), query.to_string()));
        }
        if !filters.is_empty() {
            params.push(("filter".to_string(), filters.join(",")));
        }
        let params = self.build_params(params);

        let url = format!("{}/works", BASE_URL);
        let response: WorksResponse = self.get_json(&url, &params).await?;

        self.credit_tracker.track(SEARCH_CREDITS).await;

        debug!(results = response.results.len(), "OpenAlex works query");
        Ok(response.results.into_iter().map(OpenAlexWork::from).collect())
    }

    /// Get a single work by OpenAlex ID or DOI.
    pub async fn get_work(&self, work_id: &str) -> Result<Option<OpenAlexWork>> {
        let path = if work_id.starts_with("10.") {
            format!("works/https://doi.org/{}", work_id)
        } else {
            format!("works/{}", work_id)
        };
        let url = format!("{}/{}", BASE_URL, path);
        let params = self.build_params(Vec::new());

        match self.get_json::<RawWork>(&url, &params).await {
            Ok(raw) => {
                self.credit_tracker.track(1).await;
                Ok(Some(raw.into()))
            }
            Err(AppError::ProviderError { message, .. }) if message.contains("HTTP 404") => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
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
    fn test_reconstruct_abstract() {
        let mut index = HashMap::new();
        index.insert("deep".to_string(), vec![0]);
        index.insert("learning".to_string(), vec![1, 3]);
        index.insert("of".to_string(), vec![2]);

        assert_eq!(reconstruct_abstract(&index), "deep learning of learning");
    }

    #[test]
    fn test_reconstruct_abstract_empty() {
        assert_eq!(reconstruct_abstract(&HashMap::new()), "");
    }

    #[test]
    fn test_work_conversion_extracts_venue_and_fields() {
        let raw: RawWork = serde_json::from_value(serde_json::json!({
            "id": "https://openalex.org/W1",
            "display_name": "A Paper",
            "publication_year": 2021,
            "ids": {"doi": "https://doi.org/10.1/ABC"},
            "cited_by_count": 42,
            "open_access": {"is_oa": true, "oa_url": "https://example.org/pdf"},
            "primary_location": {"source": {"display_name": "NeurIPS"}},
            "concepts": [
                {"display_name": "Computer Science", "level": 0},
                {"display_name": "Obscure Subfield", "level": 3}
            ],
            "authorships": [
                {"author": {"display_name": "Ada Lovelace"}, "institutions": [{"display_name": "Analytical Engine Lab"}]}
            ]
        }))
        .unwrap();

        let work = OpenAlexWork::from(raw);
        assert_eq!(work.title, "A Paper");
        assert_eq!(work.venue.as_deref(), Some("NeurIPS"));
        assert_eq!(work.citation_count, 42);
        assert_eq!(work.fields_of_study, vec!["Computer Science"]);
        assert_eq!(work.authors[0].name, "Ada Lovelace");
        assert!(work.is_open_access);
    }

    #[tokio::test]
    async fn test_credit_tracker_budget() {
        let tracker = CreditTracker::new(25);
        assert!(tracker.can_spend(10).await);

        tracker.track(10).await;
        tracker.track(10).await;
        assert!(tracker.can_spend(5).await);
        assert!(!tracker.can_spend(10).await);
        assert!((tracker.usage_percent().await - 80.0).abs() < f64::EPSILON);
    }
}
