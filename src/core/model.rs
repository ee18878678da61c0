//! Domain model — the element stream, scraped pages, sections, chunks and
//! projects that flow through the pipeline.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

// ─────────────────────────────────────────────────────────────────────────────
// Elements
// ─────────────────────────────────────────────────────────────────────────────

/// One image found inside a table cell, with its grid position.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CellImage {
    pub src: String,
    pub alt: String,
    pub row: usize,
    pub col: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct TableData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cell_images: Vec<CellImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CodeBlockData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub text: String,
    pub line_count: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// A single extracted content element, in document order.
///
/// Every element originates from the selected main-content subtree (or the
/// `<body>` fallback); the extractor guarantees ordering.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    Heading {
        level: u8,
        text: String,
    },
    Paragraph {
        text: String,
    },
    List {
        ordered: bool,
        items: Vec<String>,
    },
    Blockquote {
        text: String,
    },
    Code {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        text: String,
        line_count: usize,
    },
    Table {
        #[serde(flatten)]
        data: TableData,
    },
    Media {
        kind: MediaKind,
        src: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alt: Option<String>,
        /// `"table"` when the media was lifted out of a table cell.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
}

impl Element {
    /// Readable text carried by this element, used for word counts and the
    /// whole-page language probe. Media contributes nothing.
    pub fn text_content(&self) -> String {
        match self {
            Element::Heading { text, .. }
            | Element::Paragraph { text }
            | Element::Blockquote { text }
            | Element::Code { text, .. } => text.clone(),
            Element::List { items, .. } => items.join("\n"),
            Element::Table { data } => {
                let mut parts: Vec<String> = Vec::new();
                if let Some(headers) = &data.headers {
                    parts.push(headers.join(" "));
                }
                for row in &data.rows {
                    parts.push(row.join(" "));
                }
                parts.join("\n")
            }
            Element::Media { .. } => String::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scraped pages
// ─────────────────────────────────────────────────────────────────────────────

/// One independent `itemscope` entry harvested from Schema.org microdata.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct SchemaOrgItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct StructuredData {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub json_ld: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schema_org: Vec<SchemaOrgItem>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub open_graph: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub twitter_card: HashMap<String, String>,
}

impl StructuredData {
    pub fn is_empty(&self) -> bool {
        self.json_ld.is_empty()
            && self.schema_org.is_empty()
            && self.open_graph.is_empty()
            && self.twitter_card.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ScrapedPage {
    pub url: String,
    pub title: String,
    /// RFC 3339 scrape time. Doubles as the `created_at` of chunks cut from
    /// this page so re-chunking an unchanged project is byte-stable.
    pub timestamp: String,
    pub word_count: usize,
    pub language: String,
    pub elements: Vec<Element>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<StructuredData>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Text,
    Table,
    Code,
}

/// A contiguous run of content anchored under one heading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    pub text: String,
    pub kind: SectionKind,
    pub heading: Option<String>,
    /// Ancestor heading texts, indexed by heading level (level N lives at
    /// index N−1). Truncation replaces deeper entries.
    pub heading_path: Vec<String>,
    pub table_data: Option<TableData>,
    pub code_block: Option<CodeBlockData>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Chunks
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Text,
    Table,
    Code,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QualityGrade {
    Good,
    Warning,
    Poor,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ChunkQuality {
    pub token_count: usize,
    pub word_count: usize,
    pub sentence_count: usize,
    pub has_content: bool,
    pub grade: QualityGrade,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ChunkLocation {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading_path: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ChunkStructure {
    /// Heading path joined with `" > "`, or null at top level.
    pub section_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ChunkSource {
    pub source_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ChunkHashes {
    pub text_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Entity {
    pub name: String,
    pub entity_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct AiMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<Entity>>,
}

impl AiMetadata {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_none()
            && self.summary.is_none()
            && self.category.is_none()
            && self.entities.is_none()
    }
}

/// A retrieval unit of bounded token count with stable id and provenance.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Chunk {
    /// `"{doc_id}::c{nnnn}"` — per-document sequence, zero-padded to 4.
    pub chunk_id: String,
    /// `"doc_" + sha256(url)[0..12]`.
    pub doc_id: String,
    /// Project-global insertion order.
    pub chunk_index: usize,
    pub text: String,
    pub location: ChunkLocation,
    pub structure: ChunkStructure,
    pub language: String,
    pub source: ChunkSource,
    pub hashes: ChunkHashes,
    pub tokens_estimate: usize,
    /// `"<page title or path>, <heading or 'content'>"`.
    pub citation: String,
    pub chunk_type: ChunkType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_data: Option<TableData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_block: Option<CodeBlockData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<ChunkQuality>,
    /// SHA-256 of `text`; drives dedup and the incremental diff.
    pub content_hash: String,
    pub is_duplicate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_metadata: Option<AiMetadata>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Stable document id for a page URL.
pub fn doc_id_for_url(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    format!("doc_{}", &hex::encode(digest)[..12])
}

/// Lowercase hex SHA-256 of a chunk's canonical text.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

pub fn chunk_id(doc_id: &str, doc_seq: usize) -> String {
    format!("{}::c{:04}", doc_id, doc_seq)
}

// ─────────────────────────────────────────────────────────────────────────────
// Projects
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Idle,
    Scraping,
    ContentScraping,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ProjectError {
    pub url: String,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    #[serde(default)]
    pub discovered_urls: usize,
    #[serde(default)]
    pub processed_count: usize,
    #[serde(default)]
    pub error_count: usize,
    #[serde(default)]
    pub chunk_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scraped_at: Option<String>,
}

/// Per-URL scrape envelope stored on the project.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PageResult {
    pub url: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ScrapedPage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_proxy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub domain: String,
    pub display_name: String,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub queue: Vec<String>,
    #[serde(default)]
    pub processed: Vec<String>,
    #[serde(default)]
    pub results: Vec<PageResult>,
    #[serde(default)]
    pub errors: Vec<ProjectError>,
    #[serde(default)]
    pub stats: ProjectStats,
    #[serde(default)]
    pub settings: crate::core::settings::ProjectSettings,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_exported_at: Option<String>,
    /// `chunk_id → content_hash` snapshot from the last export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_chunk_hashes: Option<HashMap<String, String>>,
    pub created_at: String,
}

impl Project {
    /// Pages with extracted content, in insertion order — the chunking input.
    pub fn scraped_pages(&self) -> impl Iterator<Item = &ScrapedPage> {
        self.results
            .iter()
            .filter(|r| r.success)
            .filter_map(|r| r.data.as_ref())
    }
}
