//! HTTP API request/response types and the chunking job's progress events.

use crate::core::model::{
    Chunk, PageResult, Project, ProjectError, ProjectStats, ProjectStatus, ScrapedPage,
};
use crate::core::settings::ProjectSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─────────────────────────────────────────────────────────────────────────────
// Error body
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    pub fn for_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Projects
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub queue: Option<Vec<String>>,
    #[serde(default)]
    pub processed: Option<Vec<String>>,
    #[serde(default)]
    pub results: Option<Vec<PageResult>>,
    #[serde(default)]
    pub errors: Option<Vec<ProjectError>>,
    #[serde(default)]
    pub stats: Option<ProjectStats>,
    #[serde(default)]
    pub settings: Option<ProjectSettings>,
}

/// Partial update; every field optional, absent fields untouched.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub queue: Option<Vec<String>>,
    #[serde(default)]
    pub processed: Option<Vec<String>>,
    #[serde(default)]
    pub results: Option<Vec<PageResult>>,
    #[serde(default)]
    pub errors: Option<Vec<ProjectError>>,
    #[serde(default)]
    pub stats: Option<ProjectStats>,
    #[serde(default)]
    pub settings: Option<ProjectSettings>,
    #[serde(default)]
    pub chunks: Option<Vec<Chunk>>,
    #[serde(default)]
    pub last_exported_at: Option<String>,
    #[serde(default)]
    pub exported_chunk_hashes: Option<HashMap<String, String>>,
}

/// Listing view: large result sets are trimmed to keep the listing cheap.
/// `_resultsCount`/`_scrapedCount`/`_chunksCount` carry the real totals.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub id: i64,
    pub domain: String,
    pub display_name: String,
    pub status: ProjectStatus,
    pub queue: Vec<String>,
    pub processed: Vec<String>,
    pub results: Vec<PageResult>,
    pub errors: Vec<ProjectError>,
    pub stats: ProjectStats,
    pub settings: ProjectSettings,
    pub created_at: String,
    #[serde(rename = "_resultsCount", skip_serializing_if = "Option::is_none")]
    pub results_count: Option<usize>,
    #[serde(rename = "_scrapedCount", skip_serializing_if = "Option::is_none")]
    pub scraped_count: Option<usize>,
    #[serde(rename = "_chunksCount", skip_serializing_if = "Option::is_none")]
    pub chunks_count: Option<usize>,
}

impl ProjectSummary {
    pub fn from_project(project: Project) -> Self {
        let results_total = project.results.len();
        let scraped_total = project.results.iter().filter(|r| r.success).count();
        let chunks_total = project.chunks.len();
        let trimmed = results_total > 100;
        let results = if trimmed {
            project.results.into_iter().take(20).collect()
        } else {
            project.results
        };
        Self {
            id: project.id,
            domain: project.domain,
            display_name: project.display_name,
            status: project.status,
            queue: project.queue,
            processed: project.processed,
            results,
            errors: project.errors,
            stats: project.stats,
            settings: project.settings,
            created_at: project.created_at,
            results_count: trimmed.then_some(results_total),
            scraped_count: trimmed.then_some(scraped_total),
            chunks_count: trimmed.then_some(chunks_total),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scraping endpoints
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DiscoverRequest {
    pub domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverResponse {
    pub sitemaps: Vec<String>,
    pub is_wiki_js: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wiki_js_pages: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct SitemapRequest {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SitemapImage {
    pub loc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SitemapVideo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_loc: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SitemapEntry {
    pub loc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastmod: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changefreq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<SitemapImage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub videos: Vec<SitemapVideo>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SitemapResponse {
    pub urls: Vec<SitemapEntry>,
    pub sub_sitemaps: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentScrapeRequest {
    pub urls: Vec<String>,
    #[serde(default)]
    pub project_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentScrapeResult {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ScrapedPage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_proxy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitState {
    pub current_delay_ms: u64,
    pub consecutive_successes: u32,
    pub consecutive_errors: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyInfo {
    pub total: usize,
    pub available: usize,
    pub benched: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentScrapeResponse {
    pub results: Vec<ContentScrapeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_state: Option<RateLimitState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_info: Option<ProxyInfo>,
}

#[derive(Debug, Deserialize)]
pub struct CrawlRequest {
    pub urls: Vec<String>,
    pub domain: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct CrawlPageMeta {
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub videos: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CrawlLinkResult {
    pub url: String,
    pub links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CrawlPageMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CrawlResponse {
    pub results: Vec<CrawlLinkResult>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Chunking job progress
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Chunking,
    Deduplication,
    Embeddings,
    Enrichment,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BatchProgress {
    pub current: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DedupStats {
    pub total: usize,
    pub exact_duplicates: usize,
    pub near_duplicates: usize,
    pub unique_chunks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiPhaseSummary {
    pub processed: usize,
    pub skipped: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_chunk_ids: Vec<String>,
}

/// One server-pushed event on the chunking stream. Serialized as a single
/// JSON object per SSE message; `type` discriminates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    Progress {
        current: usize,
        total: usize,
        chunks_generated: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        phase: Option<Phase>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        embeddings_progress: Option<BatchProgress>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        enrichment_progress: Option<BatchProgress>,
    },
    Warning {
        message: String,
    },
    Error {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Cancelled {
        chunks_generated: usize,
        pages_processed: usize,
    },
    #[serde(rename_all = "camelCase")]
    Complete {
        chunks_generated: usize,
        pages_processed: usize,
        total: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deduplication: Option<DedupStats>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        embeddings: Option<AiPhaseSummary>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        enrichment: Option<AiPhaseSummary>,
    },
}
