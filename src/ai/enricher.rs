//! Enrichment phase: per-chunk keywords/summary/category/entities via the
//! chat RPC. Sub-tasks for one chunk run in parallel; chunks inside a batch
//! run in parallel; batches are spaced out.

use crate::ai::provider::AiProvider;
use crate::core::errors::AiError;
use crate::core::model::{AiMetadata, Chunk, Entity};
use crate::core::settings::EnrichmentSettings;
use crate::core::types::{AiPhaseSummary, BatchProgress, Phase, ProgressEvent};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub const ENRICH_BATCH_SIZE: usize = 5;
pub const ENRICH_BATCH_DELAY_MS: u64 = 200;

/// Fixed category vocabulary; anything else from the model is discarded.
pub const CATEGORIES: &[&str] = &[
    "documentation",
    "blog",
    "news",
    "product",
    "reference",
    "tutorial",
    "legal",
    "marketing",
    "forum",
    "other",
];

/// Fixed entity-type vocabulary.
pub const ENTITY_TYPES: &[&str] = &[
    "person",
    "organization",
    "location",
    "product",
    "technology",
    "other",
];

const MAX_KEYWORDS: usize = 8;
const PROMPT_TEXT_CAP: usize = 4000;

fn clipped(text: &str) -> &str {
    match text.char_indices().nth(PROMPT_TEXT_CAP) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Strip a markdown code fence if the model wrapped its JSON in one.
fn unfence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim_start_matches('\n').trim_end_matches('`').trim()
}

pub fn parse_keywords(response: &str) -> Option<Vec<String>> {
    let parsed: serde_json::Value = serde_json::from_str(unfence(response)).ok()?;
    let arr = parsed.as_array()?;
    let keywords: Vec<String> = arr
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .take(MAX_KEYWORDS)
        .collect();
    (!keywords.is_empty()).then_some(keywords)
}

pub fn parse_category(response: &str) -> Option<String> {
    let cleaned = unfence(response)
        .trim_matches(|c: char| c == '"' || c == '.' || c.is_whitespace())
        .to_lowercase();
    CATEGORIES.contains(&cleaned.as_str()).then_some(cleaned)
}

pub fn parse_entities(response: &str) -> Option<Vec<Entity>> {
    let parsed: serde_json::Value = serde_json::from_str(unfence(response)).ok()?;
    let arr = parsed.as_array()?;
    let entities: Vec<Entity> = arr
        .iter()
        .filter_map(|v| {
            let name = v.get("name")?.as_str()?.trim().to_string();
            let entity_type = v
                .get("type")
                .or_else(|| v.get("entity_type"))?
                .as_str()?
                .trim()
                .to_lowercase();
            if name.is_empty() || !ENTITY_TYPES.contains(&entity_type.as_str()) {
                return None;
            }
            Some(Entity { name, entity_type })
        })
        .collect();
    (!entities.is_empty()).then_some(entities)
}

async fn enrich_one(
    provider: &AiProvider,
    text: &str,
    settings: &EnrichmentSettings,
) -> Result<AiMetadata, AiError> {
    let body = clipped(text);

    let keywords_task = async {
        if !settings.extract_keywords {
            return Ok(None);
        }
        let prompt = format!(
            "Extract up to {MAX_KEYWORDS} topical keywords from the text below. \
             Respond with a JSON array of lowercase strings and nothing else.\n\n{body}"
        );
        provider.chat(&prompt).await.map(|r| parse_keywords(&r))
    };

    let summary_task = async {
        if !settings.generate_summary {
            return Ok(None);
        }
        let prompt = format!(
            "Summarize the text below in one or two sentences. Respond with the \
             summary only.\n\n{body}"
        );
        provider.chat(&prompt).await.map(|r| {
            let s = r.trim().to_string();
            (!s.is_empty()).then_some(s)
        })
    };

    let category_task = async {
        if !settings.detect_category {
            return Ok(None);
        }
        let prompt = format!(
            "Classify the text below into exactly one of these categories: {}. \
             Respond with the single category word only.\n\n{body}",
            CATEGORIES.join(", ")
        );
        provider.chat(&prompt).await.map(|r| parse_category(&r))
    };

    let entities_task = async {
        if !settings.extract_entities {
            return Ok(None);
        }
        let prompt = format!(
            "Extract named entities from the text below. Respond with a JSON array \
             of objects {{\"name\": string, \"type\": one of [{}]}} and nothing else.\n\n{body}",
            ENTITY_TYPES.join(", ")
        );
        provider.chat(&prompt).await.map(|r| parse_entities(&r))
    };

    let (keywords, summary, category, entities) =
        tokio::join!(keywords_task, summary_task, category_task, entities_task);

    // Auth failures abort the phase; any other single-task failure just
    // leaves that field null.
    if matches!(keywords, Err(AiError::Auth))
        || matches!(summary, Err(AiError::Auth))
        || matches!(category, Err(AiError::Auth))
        || matches!(entities, Err(AiError::Auth))
    {
        return Err(AiError::Auth);
    }

    Ok(AiMetadata {
        keywords: keywords.ok().flatten(),
        summary: summary.ok().flatten(),
        category: category.ok().flatten(),
        entities: entities.ok().flatten(),
    })
}

/// Run the enrichment phase in place over the canonical chunks.
pub async fn run_enrichment_phase(
    provider: &AiProvider,
    chunks: &mut [Chunk],
    settings: &EnrichmentSettings,
    cancel: &Arc<AtomicBool>,
    events: &broadcast::Sender<ProgressEvent>,
) -> AiPhaseSummary {
    let candidates: Vec<usize> = chunks
        .iter()
        .enumerate()
        .filter(|(_, c)| {
            !c.is_duplicate && !(c.ai_metadata.is_some() && c.updated_at.is_some())
        })
        .map(|(i, _)| i)
        .collect();
    let total = candidates.len();
    let mut summary = AiPhaseSummary {
        skipped: chunks.len() - total,
        ..Default::default()
    };

    info!("enriching {} chunks ({} skipped)", total, summary.skipped);

    'batches: for (batch_no, batch) in candidates.chunks(ENRICH_BATCH_SIZE).enumerate() {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        if batch_no > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(ENRICH_BATCH_DELAY_MS)).await;
        }

        let texts: Vec<(usize, String)> =
            batch.iter().map(|&i| (i, chunks[i].text.clone())).collect();
        let results = futures::future::join_all(
            texts
                .iter()
                .map(|(i, text)| async move { (*i, enrich_one(provider, text, settings).await) }),
        )
        .await;

        let now = Utc::now().to_rfc3339();
        for (i, result) in results {
            match result {
                Ok(metadata) => {
                    chunks[i].ai_metadata =
                        (!metadata.is_empty()).then_some(metadata).or(Some(AiMetadata::default()));
                    chunks[i].updated_at = Some(now.clone());
                    summary.processed += 1;
                }
                Err(AiError::Auth) => {
                    let _ = events.send(ProgressEvent::Warning {
                        message: "enrichment provider rejected the API key — phase aborted"
                            .into(),
                    });
                    summary.failed_chunk_ids.push(chunks[i].chunk_id.clone());
                    break 'batches;
                }
                Err(e) => {
                    warn!("enrichment failed for {}: {e}", chunks[i].chunk_id);
                    summary.failed_chunk_ids.push(chunks[i].chunk_id.clone());
                }
            }
        }

        let done = summary.processed + summary.failed_chunk_ids.len();
        let _ = events.send(ProgressEvent::Progress {
            current: done,
            total,
            chunks_generated: chunks.len(),
            current_url: None,
            phase: Some(Phase::Enrichment),
            embeddings_progress: None,
            enrichment_progress: Some(BatchProgress {
                current: done,
                total,
            }),
        });
    }

    summary
}
