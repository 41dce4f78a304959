//! PaperGraph provider integrations
//!
//! Clients for the two upstream bibliographic catalogs and the fusion
//! engine that merges their result lists:
//! - OpenAlex: primary metadata source (polite pool, daily credit budget)
//! - Semantic Scholar: enrichment source (tldr summaries, SPECTER embeddings)
//! - FusionEngine: DOI/title dedup + Reciprocal Rank Fusion scoring

pub mod fusion;
pub mod openalex;
pub mod semantic_scholar;

pub use fusion::{normalize_doi, FusedSearch, FusionEngine};
pub use openalex::{OpenAlexClient, OpenAlexWork};
pub use semantic_scholar::{SemanticScholarClient, SemanticScholarPaper};
