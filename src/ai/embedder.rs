//! Embedding phase: batched vector calls over the canonical (non-duplicate)
//! chunks, with resumption — chunks that already carry a vector are skipped.

use crate::ai::provider::AiProvider;
use crate::core::errors::AiError;
use crate::core::model::Chunk;
use crate::core::types::{AiPhaseSummary, BatchProgress, Phase, ProgressEvent};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub const EMBED_BATCH_SIZE: usize = 20;
pub const EMBED_BATCH_DELAY_MS: u64 = 100;

/// Run the embeddings phase in place. Returns the phase summary; the caller
/// persists and decides what the cancel flag means next.
pub async fn run_embedding_phase(
    provider: &AiProvider,
    chunks: &mut [Chunk],
    cancel: &Arc<AtomicBool>,
    events: &broadcast::Sender<ProgressEvent>,
) -> AiPhaseSummary {
    let candidates: Vec<usize> = chunks
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_duplicate && c.embedding.is_none())
        .map(|(i, _)| i)
        .collect();
    let total = candidates.len();
    let mut summary = AiPhaseSummary {
        skipped: chunks.len() - total,
        ..Default::default()
    };

    info!("embedding {} chunks ({} skipped)", total, summary.skipped);

    for (batch_no, batch) in candidates.chunks(EMBED_BATCH_SIZE).enumerate() {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        if batch_no > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(EMBED_BATCH_DELAY_MS)).await;
        }

        let texts: Vec<String> = batch.iter().map(|&i| chunks[i].text.clone()).collect();
        match provider.embed(&texts).await {
            Ok(vectors) => {
                let now = Utc::now().to_rfc3339();
                for (&i, vector) in batch.iter().zip(vectors) {
                    chunks[i].embedding = Some(vector);
                    chunks[i].updated_at = Some(now.clone());
                }
                summary.processed += batch.len();
            }
            Err(AiError::Auth) => {
                let _ = events.send(ProgressEvent::Warning {
                    message: "embedding provider rejected the API key — phase aborted".into(),
                });
                summary
                    .failed_chunk_ids
                    .extend(batch.iter().map(|&i| chunks[i].chunk_id.clone()));
                break;
            }
            Err(e) => {
                warn!("embedding batch failed after retries: {e}");
                summary
                    .failed_chunk_ids
                    .extend(batch.iter().map(|&i| chunks[i].chunk_id.clone()));
            }
        }

        let done = summary.processed + summary.failed_chunk_ids.len();
        let _ = events.send(ProgressEvent::Progress {
            current: done,
            total,
            chunks_generated: chunks.len(),
            current_url: None,
            phase: Some(Phase::Embeddings),
            embeddings_progress: Some(BatchProgress {
                current: done,
                total,
            }),
            enrichment_progress: None,
        });
    }

    summary
}
