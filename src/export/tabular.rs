//! Flat tabular projections of the chunk list: CSV and Parquet. Both share
//! one row shape so the columnar and delimited outputs never drift.

use crate::core::model::{Chunk, QualityGrade};
use anyhow::{Context, Result};
use arrow_array::{ArrayRef, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use std::sync::Arc;

struct FlatRow<'a> {
    chunk_id: &'a str,
    doc_id: &'a str,
    text: &'a str,
    url: &'a str,
    heading: Option<&'a str>,
    tokens: i64,
    quality: Option<&'static str>,
    keywords: Option<String>,
    embedding: Option<String>,
}

fn grade_label(grade: QualityGrade) -> &'static str {
    match grade {
        QualityGrade::Good => "good",
        QualityGrade::Warning => "warning",
        QualityGrade::Poor => "poor",
    }
}

fn flatten<'a>(chunks: &'a [Chunk], include_embeddings: bool) -> Vec<FlatRow<'a>> {
    chunks
        .iter()
        .map(|c| FlatRow {
            chunk_id: &c.chunk_id,
            doc_id: &c.doc_id,
            text: &c.text,
            url: &c.location.url,
            heading: c.structure.heading.as_deref(),
            tokens: c.tokens_estimate as i64,
            quality: c.quality.as_ref().map(|q| grade_label(q.grade)),
            keywords: c
                .ai_metadata
                .as_ref()
                .and_then(|m| m.keywords.as_ref())
                .map(|k| k.join("; ")),
            embedding: if include_embeddings {
                c.embedding
                    .as_ref()
                    .and_then(|e| serde_json::to_string(e).ok())
            } else {
                None
            },
        })
        .collect()
}

const COLUMNS: &[&str] = &[
    "chunk_id", "doc_id", "text", "url", "heading", "tokens", "quality", "keywords", "embedding",
];

/// CSV projection; one row per chunk.
pub fn to_csv(chunks: &[Chunk], include_embeddings: bool) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(COLUMNS).context("csv header")?;

    for row in flatten(chunks, include_embeddings) {
        let tokens = row.tokens.to_string();
        writer
            .write_record([
                row.chunk_id,
                row.doc_id,
                row.text,
                row.url,
                row.heading.unwrap_or(""),
                tokens.as_str(),
                row.quality.unwrap_or(""),
                row.keywords.as_deref().unwrap_or(""),
                row.embedding.as_deref().unwrap_or(""),
            ])
            .context("csv row")?;
    }

    writer.into_inner().context("csv finish")
}

/// Parquet projection via an Arrow record batch.
pub fn to_parquet(chunks: &[Chunk], include_embeddings: bool) -> Result<Vec<u8>> {
    let rows = flatten(chunks, include_embeddings);

    let schema = Arc::new(Schema::new(vec![
        Field::new("chunk_id", DataType::Utf8, false),
        Field::new("doc_id", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("url", DataType::Utf8, false),
        Field::new("heading", DataType::Utf8, true),
        Field::new("tokens", DataType::Int64, false),
        Field::new("quality", DataType::Utf8, true),
        Field::new("keywords", DataType::Utf8, true),
        Field::new("embedding", DataType::Utf8, true),
    ]));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.chunk_id),
        )),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.doc_id))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.text))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.url))),
        Arc::new(StringArray::from_iter(rows.iter().map(|r| r.heading))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.tokens))),
        Arc::new(StringArray::from_iter(rows.iter().map(|r| r.quality))),
        Arc::new(StringArray::from_iter(
            rows.iter().map(|r| r.keywords.as_deref()),
        )),
        Arc::new(StringArray::from_iter(
            rows.iter().map(|r| r.embedding.as_deref()),
        )),
    ];

    let batch = RecordBatch::try_new(Arc::clone(&schema), columns).context("record batch")?;

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, schema, None).context("parquet writer")?;
    writer.write(&batch).context("parquet write")?;
    writer.close().context("parquet close")?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::*;

    fn chunk_with(text: &str, index: usize, keywords: Option<Vec<String>>) -> Chunk {
        Chunk {
            chunk_id: format!("doc_abc::c{index:04}"),
            doc_id: "doc_abc".into(),
            chunk_index: index,
            text: text.to_string(),
            location: ChunkLocation {
                url: "https://example.com/p".into(),
                heading_path: None,
            },
            structure: ChunkStructure {
                section_path: None,
                heading: Some("Intro".into()),
            },
            language: "en".into(),
            source: ChunkSource {
                source_url: "https://example.com/p".into(),
            },
            hashes: ChunkHashes {
                text_sha256: content_hash(text),
            },
            tokens_estimate: 5,
            citation: "P, Intro".into(),
            chunk_type: ChunkType::Text,
            table_data: None,
            code_block: None,
            quality: None,
            content_hash: content_hash(text),
            is_duplicate: false,
            duplicate_of: None,
            embedding: Some(vec![0.5, -0.5]),
            ai_metadata: keywords.map(|k| AiMetadata {
                keywords: Some(k),
                ..Default::default()
            }),
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: None,
        }
    }

    #[test]
    fn csv_has_header_and_joined_keywords() {
        let chunks = vec![chunk_with(
            "Some text, with a comma.",
            0,
            Some(vec!["alpha".into(), "beta".into()]),
        )];
        let csv_bytes = to_csv(&chunks, false).unwrap();
        let text = String::from_utf8(csv_bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "chunk_id,doc_id,text,url,heading,tokens,quality,keywords,embedding"
        );
        let row = lines.next().unwrap();
        assert!(row.contains("alpha; beta"));
        assert!(row.contains("\"Some text, with a comma.\""));
    }

    #[test]
    fn csv_embedding_column_respects_flag() {
        let chunks = vec![chunk_with("t", 0, None)];
        let without = String::from_utf8(to_csv(&chunks, false).unwrap()).unwrap();
        assert!(!without.contains("[0.5,-0.5]"));
        let with = String::from_utf8(to_csv(&chunks, true).unwrap()).unwrap();
        assert!(with.contains("[0.5,-0.5]"));
    }

    #[test]
    fn parquet_round_trips_row_count() {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

        let chunks = vec![chunk_with("a", 0, None), chunk_with("b", 1, None)];
        let bytes = to_parquet(&chunks, true).unwrap();

        let reader = ParquetRecordBatchReaderBuilder::try_new(bytes::Bytes::from(bytes))
            .unwrap()
            .build()
            .unwrap();
        let total: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(total, 2);
    }
}
