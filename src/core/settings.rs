//! Project settings tree — every knob the scraper, chunker, AI pass and
//! exporter honor, with the documented defaults baked into serde so partial
//! JSON from clients round-trips cleanly.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrapingSettings {
    pub parallel_requests: usize,
    pub delay_ms: u64,
    /// Site-specific main-content selectors probed before the built-in list.
    pub content_selectors: Vec<String>,
    /// Subtrees to drop wholesale, on top of the built-in noise filter.
    pub exclude_selectors: Vec<String>,
    pub max_depth: usize,
    pub rate_limiting: RateLimitSettings,
    pub proxies: Vec<String>,
    pub rotate_proxies: bool,
    pub extract_structured_data: bool,
}

impl Default for ScrapingSettings {
    fn default() -> Self {
        Self {
            parallel_requests: 10,
            delay_ms: 500,
            content_selectors: Vec::new(),
            exclude_selectors: Vec::new(),
            max_depth: 5,
            rate_limiting: RateLimitSettings::default(),
            proxies: Vec::new(),
            rotate_proxies: false,
            extract_structured_data: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct QualityCheckSettings {
    pub enabled: bool,
    pub min_word_count: usize,
    pub warn_on_short_chunks: bool,
    pub warn_on_no_content: bool,
}

impl Default for QualityCheckSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_word_count: 10,
            warn_on_short_chunks: true,
            warn_on_no_content: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DedupSettings {
    pub enabled: bool,
    pub similarity_threshold: f64,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: 0.95,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChunkingSettings {
    pub target_tokens: usize,
    pub overlap_tokens: usize,
    pub min_chunk_tokens: usize,
    pub boundary_rules: Vec<String>,
    pub preserve_heading_hierarchy: bool,
    pub preserve_tables: bool,
    pub preserve_code_blocks: bool,
    pub multi_language_tokenization: bool,
    pub quality_checks: QualityCheckSettings,
    pub deduplication: DedupSettings,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            target_tokens: 350,
            overlap_tokens: 55,
            min_chunk_tokens: 50,
            boundary_rules: vec!["paragraph".into(), "heading".into()],
            preserve_heading_hierarchy: true,
            preserve_tables: true,
            preserve_code_blocks: true,
            multi_language_tokenization: true,
            quality_checks: QualityCheckSettings::default(),
            deduplication: DedupSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingSettings {
    pub enabled: bool,
    pub model: String,
    pub dimensions: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            model: "text-embedding-3-small".into(),
            dimensions: 1536,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EnrichmentSettings {
    pub enabled: bool,
    pub extract_keywords: bool,
    pub generate_summary: bool,
    pub detect_category: bool,
    pub extract_entities: bool,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            extract_keywords: true,
            generate_summary: true,
            detect_category: false,
            extract_entities: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AiSettings {
    pub enabled: bool,
    pub model: String,
    pub embeddings: EmbeddingSettings,
    pub metadata_enrichment: EnrichmentSettings,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            model: "gpt-4o-mini".into(),
            embeddings: EmbeddingSettings::default(),
            metadata_enrichment: EnrichmentSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportSettings {
    pub formats: Vec<String>,
    pub include_embeddings: bool,
    pub incremental_updates: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            formats: vec!["json".into()],
            include_embeddings: false,
            incremental_updates: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectSettings {
    pub scraping: ScrapingSettings,
    pub chunking: ChunkingSettings,
    pub ai: AiSettings,
    pub export: ExportSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = ProjectSettings::default();
        assert_eq!(s.scraping.parallel_requests, 10);
        assert_eq!(s.scraping.delay_ms, 500);
        assert_eq!(s.scraping.rate_limiting.max_delay_ms, 30_000);
        assert_eq!(s.chunking.target_tokens, 350);
        assert_eq!(s.chunking.overlap_tokens, 55);
        assert_eq!(s.chunking.min_chunk_tokens, 50);
        assert!((s.chunking.deduplication.similarity_threshold - 0.95).abs() < 1e-9);
        assert!(!s.ai.enabled);
        assert_eq!(s.ai.embeddings.dimensions, 1536);
        assert_eq!(s.export.formats, vec!["json".to_string()]);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: ProjectSettings =
            serde_json::from_str(r#"{"chunking":{"targetTokens":200}}"#).unwrap();
        assert_eq!(s.chunking.target_tokens, 200);
        assert_eq!(s.chunking.overlap_tokens, 55);
        assert_eq!(s.scraping.parallel_requests, 10);
    }

    #[test]
    fn keys_are_camel_case() {
        let v = serde_json::to_value(ProjectSettings::default()).unwrap();
        assert!(v["scraping"]["parallelRequests"].is_number());
        assert!(v["chunking"]["minChunkTokens"].is_number());
        assert!(v["ai"]["metadataEnrichment"]["extractKeywords"].is_boolean());
    }
}
