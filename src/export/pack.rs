//! RAG pack assembly: a zip archive holding the manifest, newline-delimited
//! document and chunk records, and JSON Schemas for all three.

use crate::core::config::generator_name;
use crate::core::model::{Chunk, Project};
use crate::core::settings::ChunkingSettings;
use anyhow::{Context, Result};
use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// One line of `documents.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub doc_id: String,
    pub title: String,
    pub url: String,
    pub language: String,
    pub source: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    pub content_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSource {
    pub domain: String,
    pub project_id: i64,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestCounts {
    pub documents: usize,
    pub chunks: usize,
    pub unique_chunks: usize,
}

/// `manifest.json` — everything a consumer needs to validate and ingest the
/// pack. Checksum values are `"sha256:<hex>"`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: String,
    pub created_at: String,
    pub generator: String,
    pub source: ManifestSource,
    pub chunking: ChunkingSettings,
    pub counts: ManifestCounts,
    pub checksums: HashMap<String, String>,
}

pub const PACK_VERSION: &str = "1.0";

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Per-document content hash: the page's chunk texts in order.
fn document_records(project: &Project) -> Vec<DocumentRecord> {
    let mut chunk_texts_by_doc: HashMap<&str, Vec<&str>> = HashMap::new();
    for chunk in &project.chunks {
        chunk_texts_by_doc
            .entry(chunk.doc_id.as_str())
            .or_default()
            .push(chunk.text.as_str());
    }

    project
        .scraped_pages()
        .map(|page| {
            let doc_id = crate::core::model::doc_id_for_url(&page.url);
            let content = chunk_texts_by_doc
                .get(doc_id.as_str())
                .map(|texts| texts.join("\n"))
                .unwrap_or_default();
            DocumentRecord {
                doc_id,
                title: page.title.clone(),
                url: page.url.clone(),
                language: page.language.clone(),
                source: project.domain.clone(),
                created_at: page.timestamp.clone(),
                updated_at: None,
                content_sha256: sha256_hex(content.as_bytes()),
            }
        })
        .collect()
}

fn jsonl<T: Serialize>(records: impl IntoIterator<Item = T>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for record in records {
        serde_json::to_writer(&mut out, &record).context("serialize jsonl record")?;
        out.push(b'\n');
    }
    Ok(out)
}

fn chunk_for_export(chunk: &Chunk, include_embeddings: bool) -> Chunk {
    let mut c = chunk.clone();
    if !include_embeddings {
        c.embedding = None;
    }
    c
}

/// Build the full archive in memory and return its bytes.
pub fn pack(project: &Project, include_embeddings: bool) -> Result<Vec<u8>> {
    let documents = document_records(project);
    let documents_jsonl = jsonl(&documents)?;
    let chunks_jsonl = jsonl(
        project
            .chunks
            .iter()
            .map(|c| chunk_for_export(c, include_embeddings)),
    )?;

    let mut checksums = HashMap::new();
    checksums.insert(
        "documents.jsonl".to_string(),
        format!("sha256:{}", sha256_hex(&documents_jsonl)),
    );
    checksums.insert(
        "chunks.jsonl".to_string(),
        format!("sha256:{}", sha256_hex(&chunks_jsonl)),
    );

    let manifest = Manifest {
        version: PACK_VERSION.to_string(),
        created_at: Utc::now().to_rfc3339(),
        generator: generator_name(),
        source: ManifestSource {
            domain: project.domain.clone(),
            project_id: project.id,
            display_name: project.display_name.clone(),
        },
        chunking: project.settings.chunking.clone(),
        counts: ManifestCounts {
            documents: documents.len(),
            chunks: project.chunks.len(),
            unique_chunks: project.chunks.iter().filter(|c| !c.is_duplicate).count(),
        },
        checksums,
    };

    let cursor = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(cursor);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest_json =
        serde_json::to_vec_pretty(&manifest).context("serialize manifest")?;
    zip.start_file("manifest.json", options)?;
    zip.write_all(&manifest_json)?;

    zip.start_file("documents.jsonl", options)?;
    zip.write_all(&documents_jsonl)?;

    zip.start_file("chunks.jsonl", options)?;
    zip.write_all(&chunks_jsonl)?;

    for (name, schema_json) in schema_files()? {
        zip.start_file(format!("schema/{name}"), options)?;
        zip.write_all(schema_json.as_bytes())?;
    }

    let cursor = zip.finish().context("finalize archive")?;
    Ok(cursor.into_inner())
}

/// The three JSON Schemas shipped in every pack.
pub fn schema_files() -> Result<Vec<(&'static str, String)>> {
    let documents = serde_json::to_string_pretty(&schemars::schema_for!(DocumentRecord))?;
    let chunks = serde_json::to_string_pretty(&schemars::schema_for!(Chunk))?;
    let manifest = serde_json::to_string_pretty(&schemars::schema_for!(Manifest))?;
    Ok(vec![
        ("documents.schema.json", documents),
        ("chunks.schema.json", chunks),
        ("manifest.schema.json", manifest),
    ])
}
