//! Chunking-job orchestration. One job per project drives the phase
//! sequence chunking → deduplication → embeddings → enrichment, emitting
//! ordered progress events over a broadcast channel and persisting at phase
//! boundaries. Workers never touch the stored project mid-phase.

use crate::ai::{embedder, enricher, AiProvider};
use crate::core::config::FileConfig;
use crate::core::errors::PipelineError;
use crate::core::model::{
    chunk_id, content_hash, doc_id_for_url, AiMetadata, Chunk, ChunkHashes, ChunkLocation,
    ChunkSource, ChunkStructure, ChunkType, Project, ScrapedPage, SectionKind,
};
use crate::core::settings::ProjectSettings;
use crate::core::types::{DedupStats, Phase, ProgressEvent};
use crate::pipeline::chunker::{chunk_sections, ChunkerConfig};
use crate::pipeline::sections::{sectionize, SectionOptions};
use crate::pipeline::{dedup, quality};
use crate::storage::ProjectRepository;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 256;

// ─────────────────────────────────────────────────────────────────────────────
// Job registry
// ─────────────────────────────────────────────────────────────────────────────

pub struct JobHandle {
    pub job_id: Uuid,
    pub project_id: i64,
    cancel: Arc<AtomicBool>,
    events: broadcast::Sender<ProgressEvent>,
}

impl JobHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

/// Live jobs, keyed by project id — the per-project exclusivity guard.
#[derive(Default)]
pub struct JobRegistry {
    jobs: DashMap<i64, Arc<JobHandle>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, project_id: i64) -> Option<Arc<JobHandle>> {
        self.jobs.get(&project_id).map(|h| Arc::clone(&h))
    }

    pub fn cancel(&self, project_id: i64) -> bool {
        match self.jobs.get(&project_id) {
            Some(handle) => {
                handle.request_cancel();
                true
            }
            None => false,
        }
    }

    fn remove(&self, project_id: i64) {
        self.jobs.remove(&project_id);
    }
}

/// Everything a job needs besides the project itself.
#[derive(Clone)]
pub struct JobContext {
    pub repo: Arc<dyn ProjectRepository>,
    pub http_client: reqwest::Client,
    pub file_config: Arc<FileConfig>,
}

pub struct JobStarted {
    pub handle: Arc<JobHandle>,
    /// Subscribed before the job task spawns, so no events are missed.
    pub events: broadcast::Receiver<ProgressEvent>,
}

/// Start the chunking job for a project. Fails fast when the project is
/// missing, has no scraped content, or already has a live job.
pub async fn start_job(
    ctx: JobContext,
    registry: Arc<JobRegistry>,
    project_id: i64,
) -> Result<JobStarted, PipelineError> {
    if registry.jobs.contains_key(&project_id) {
        return Err(PipelineError::JobAlreadyRunning(project_id));
    }

    let project = ctx
        .repo
        .get(project_id)
        .await?
        .ok_or(PipelineError::ProjectNotFound(project_id))?;
    if project.scraped_pages().next().is_none() {
        return Err(PipelineError::NoScrapedContent);
    }

    let (events, receiver) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let handle = Arc::new(JobHandle {
        job_id: Uuid::new_v4(),
        project_id,
        cancel: Arc::new(AtomicBool::new(false)),
        events,
    });

    if registry
        .jobs
        .insert(project_id, Arc::clone(&handle))
        .is_some()
    {
        // Lost the race to another starter.
        registry.remove(project_id);
        return Err(PipelineError::JobAlreadyRunning(project_id));
    }

    info!(
        "chunking job {} started for project {}",
        handle.job_id, project_id
    );

    let task_handle = Arc::clone(&handle);
    let task_registry = Arc::clone(&registry);
    tokio::spawn(async move {
        let project_id = task_handle.project_id;
        if let Err(e) = run_job(&ctx, &task_handle, project).await {
            error!("chunking job for project {} failed: {}", project_id, e);
            let _ = task_handle.events.send(ProgressEvent::Error {
                message: e.to_string(),
            });
        }
        task_registry.remove(project_id);
    });

    Ok(JobStarted {
        handle,
        events: receiver,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Chunk assembly
// ─────────────────────────────────────────────────────────────────────────────

fn chunk_type_for(kind: SectionKind) -> ChunkType {
    match kind {
        SectionKind::Text => ChunkType::Text,
        SectionKind::Table => ChunkType::Table,
        SectionKind::Code => ChunkType::Code,
    }
}

fn citation_for(page: &ScrapedPage, heading: &Option<String>) -> String {
    let source = if page.title.trim().is_empty() {
        url::Url::parse(&page.url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| page.url.clone())
    } else {
        page.title.trim().to_string()
    };
    let anchor = heading
        .as_deref()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or("content");
    format!("{}, {}", source, anchor)
}

/// Fields carried across re-runs so embed/enrich work is never repeated for
/// unchanged chunks.
struct CarryOver {
    content_hash: String,
    embedding: Option<Vec<f32>>,
    ai_metadata: Option<AiMetadata>,
    updated_at: Option<String>,
}

/// Cut one page into chunks, assigning identities and quality.
fn build_page_chunks(
    page: &ScrapedPage,
    settings: &ProjectSettings,
    global_index: &mut usize,
    previous: &HashMap<String, CarryOver>,
) -> Vec<Chunk> {
    let chunking = &settings.chunking;
    let sections = sectionize(
        &page.elements,
        &SectionOptions {
            preserve_tables: chunking.preserve_tables,
            preserve_code: chunking.preserve_code_blocks,
        },
    );
    let seeds = chunk_sections(
        &sections,
        &ChunkerConfig {
            target_tokens: chunking.target_tokens,
            overlap_tokens: chunking.overlap_tokens,
            min_chunk_tokens: chunking.min_chunk_tokens,
            multi_language: chunking.multi_language_tokenization,
        },
    );

    let doc_id = doc_id_for_url(&page.url);
    let mut chunks = Vec::with_capacity(seeds.len());

    for (doc_seq, seed) in seeds.into_iter().enumerate() {
        let id = chunk_id(&doc_id, doc_seq);
        let hash = content_hash(&seed.text);
        let quality = chunking.quality_checks.enabled.then(|| {
            quality::score_chunk(
                &seed.text,
                seed.tokens_estimate,
                chunking.target_tokens,
                &chunking.quality_checks,
            )
        });

        let heading_path = chunking
            .preserve_heading_hierarchy
            .then(|| seed.heading_path.clone())
            .filter(|p| !p.is_empty());
        let section_path = heading_path.as_ref().map(|p| p.join(" > "));

        let mut chunk = Chunk {
            chunk_id: id.clone(),
            doc_id: doc_id.clone(),
            chunk_index: *global_index,
            citation: citation_for(page, &seed.heading),
            location: ChunkLocation {
                url: page.url.clone(),
                heading_path: heading_path.clone(),
            },
            structure: ChunkStructure {
                section_path,
                heading: seed.heading.clone(),
            },
            language: page.language.clone(),
            source: ChunkSource {
                source_url: page.url.clone(),
            },
            hashes: ChunkHashes {
                text_sha256: hash.clone(),
            },
            tokens_estimate: seed.tokens_estimate,
            chunk_type: chunk_type_for(seed.kind),
            table_data: seed.table_data,
            code_block: seed.code_block,
            quality,
            content_hash: hash,
            text: seed.text,
            is_duplicate: false,
            duplicate_of: None,
            embedding: None,
            ai_metadata: None,
            // Anchored to the scrape time, not job time, so unchanged input
            // re-chunks to byte-identical output.
            created_at: page.timestamp.clone(),
            updated_at: None,
        };

        if let Some(prev) = previous.get(&id) {
            if prev.content_hash == chunk.content_hash {
                chunk.embedding = prev.embedding.clone();
                chunk.ai_metadata = prev.ai_metadata.clone();
                chunk.updated_at = prev.updated_at.clone();
            }
        }

        *global_index += 1;
        chunks.push(chunk);
    }

    chunks
}

// ─────────────────────────────────────────────────────────────────────────────
// Job body
// ─────────────────────────────────────────────────────────────────────────────

async fn persist_chunks(
    ctx: &JobContext,
    project: &mut Project,
    chunks: &[Chunk],
) -> Result<(), PipelineError> {
    project.chunks = chunks.to_vec();
    project.stats.chunk_count = chunks.len();
    ctx.repo.save(project).await?;
    Ok(())
}

async fn run_job(
    ctx: &JobContext,
    handle: &JobHandle,
    mut project: Project,
) -> Result<(), PipelineError> {
    let settings = project.settings.clone();
    let pages: Vec<ScrapedPage> = project.scraped_pages().cloned().collect();
    let total_pages = pages.len();

    let previous: HashMap<String, CarryOver> = project
        .chunks
        .iter()
        .map(|c| {
            (
                c.chunk_id.clone(),
                CarryOver {
                    content_hash: c.content_hash.clone(),
                    embedding: c.embedding.clone(),
                    ai_metadata: c.ai_metadata.clone(),
                    updated_at: c.updated_at.clone(),
                },
            )
        })
        .collect();

    let emit = |event: ProgressEvent| {
        let _ = handle.events.send(event);
    };
    let cancelled = || handle.cancel.load(Ordering::Relaxed);

    // ── Phase 1: chunking ────────────────────────────────────────────────
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut global_index = 0usize;
    let mut pages_processed = 0usize;

    for (page_i, page) in pages.iter().enumerate() {
        if cancelled() {
            persist_chunks(ctx, &mut project, &chunks).await?;
            emit(ProgressEvent::Cancelled {
                chunks_generated: chunks.len(),
                pages_processed,
            });
            return Ok(());
        }

        chunks.extend(build_page_chunks(page, &settings, &mut global_index, &previous));
        pages_processed += 1;

        emit(ProgressEvent::Progress {
            current: page_i + 1,
            total: total_pages,
            chunks_generated: chunks.len(),
            current_url: Some(page.url.clone()),
            phase: Some(Phase::Chunking),
            embeddings_progress: None,
            enrichment_progress: None,
        });
    }

    // ── Phase 2: deduplication ───────────────────────────────────────────
    let dedup_stats: Option<DedupStats> = if settings.chunking.deduplication.enabled {
        let stats = dedup::dedup_chunks(
            &mut chunks,
            settings.chunking.deduplication.similarity_threshold,
        );
        emit(ProgressEvent::Progress {
            current: stats.total,
            total: stats.total,
            chunks_generated: chunks.len(),
            current_url: None,
            phase: Some(Phase::Deduplication),
            embeddings_progress: None,
            enrichment_progress: None,
        });
        Some(stats)
    } else {
        None
    };

    persist_chunks(ctx, &mut project, &chunks).await?;

    if cancelled() {
        emit(ProgressEvent::Cancelled {
            chunks_generated: chunks.len(),
            pages_processed,
        });
        return Ok(());
    }

    // ── Phases 3/4: embeddings + enrichment (optional) ───────────────────
    let mut embed_summary = None;
    let mut enrich_summary = None;

    let wants_embeddings = settings.ai.enabled && settings.ai.embeddings.enabled;
    let wants_enrichment = settings.ai.enabled && settings.ai.metadata_enrichment.enabled;

    if wants_embeddings || wants_enrichment {
        match ctx.file_config.ai_provider.resolve_api_key() {
            Some(api_key) => {
                let provider = AiProvider::new(
                    ctx.http_client.clone(),
                    ctx.file_config.ai_provider.resolve_base_url(),
                    api_key,
                    settings.ai.model.clone(),
                    settings.ai.embeddings.model.clone(),
                    settings.ai.embeddings.dimensions,
                );

                if wants_embeddings && !cancelled() {
                    let summary = embedder::run_embedding_phase(
                        &provider,
                        &mut chunks,
                        &handle.cancel,
                        &handle.events,
                    )
                    .await;
                    persist_chunks(ctx, &mut project, &chunks).await?;
                    embed_summary = Some(summary);
                }

                if wants_enrichment && !cancelled() {
                    let summary = enricher::run_enrichment_phase(
                        &provider,
                        &mut chunks,
                        &settings.ai.metadata_enrichment,
                        &handle.cancel,
                        &handle.events,
                    )
                    .await;
                    persist_chunks(ctx, &mut project, &chunks).await?;
                    enrich_summary = Some(summary);
                }
            }
            None => {
                emit(ProgressEvent::Warning {
                    message: "no AI provider API key configured — AI disabled for this job"
                        .into(),
                });
            }
        }
    }

    if cancelled() {
        emit(ProgressEvent::Cancelled {
            chunks_generated: chunks.len(),
            pages_processed,
        });
        return Ok(());
    }

    info!(
        "chunking job {} complete: {} chunks from {} pages",
        handle.job_id,
        chunks.len(),
        pages_processed
    );
    emit(ProgressEvent::Complete {
        chunks_generated: chunks.len(),
        pages_processed,
        total: total_pages,
        deduplication: dedup_stats,
        embeddings: embed_summary,
        enrichment: enrich_summary,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Element;
    use crate::core::types::CreateProjectRequest;
    use crate::storage::JsonFileStore;

    fn page(url: &str, paragraphs: &[&str]) -> ScrapedPage {
        let mut elements = vec![Element::Heading {
            level: 1,
            text: "Title".into(),
        }];
        elements.extend(paragraphs.iter().map(|p| Element::Paragraph {
            text: p.to_string(),
        }));
        ScrapedPage {
            url: url.to_string(),
            title: "Title".into(),
            timestamp: "2026-01-01T00:00:00Z".into(),
            word_count: 10,
            language: "en".into(),
            elements,
            structured_data: None,
        }
    }

    async fn seeded_context(pages: Vec<ScrapedPage>) -> (JobContext, Arc<JobRegistry>, i64) {
        let repo: Arc<dyn ProjectRepository> = Arc::new(JsonFileStore::in_memory());
        let project = repo
            .create(CreateProjectRequest {
                domain: "example.com".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let results = pages
            .into_iter()
            .map(|p| crate::core::model::PageResult {
                url: p.url.clone(),
                success: true,
                data: Some(p),
                error: None,
                used_proxy: None,
            })
            .collect();
        repo.append_results(project.id, results).await.unwrap();
        let ctx = JobContext {
            repo,
            http_client: reqwest::Client::new(),
            file_config: Arc::new(FileConfig::default()),
        };
        (ctx, Arc::new(JobRegistry::new()), project.id)
    }

    async fn drain_to_terminal(
        mut events: broadcast::Receiver<ProgressEvent>,
    ) -> Vec<ProgressEvent> {
        let mut seen = Vec::new();
        while let Ok(ev) = events.recv().await {
            let terminal = matches!(
                ev,
                ProgressEvent::Complete { .. }
                    | ProgressEvent::Cancelled { .. }
                    | ProgressEvent::Error { .. }
            );
            seen.push(ev);
            if terminal {
                break;
            }
        }
        seen
    }

    #[tokio::test]
    async fn job_chunks_pages_in_order_and_completes() {
        let (ctx, registry, id) = seeded_context(vec![
            page("https://example.com/a", &["First page body text, long enough to keep."]),
            page("https://example.com/b", &["Second page body text, also long enough."]),
        ])
        .await;

        let started = start_job(ctx.clone(), registry, id).await.unwrap();
        let events = drain_to_terminal(started.events).await;

        let ProgressEvent::Complete {
            chunks_generated,
            pages_processed,
            ..
        } = events.last().unwrap()
        else {
            panic!("expected complete, got {:?}", events.last());
        };
        assert_eq!(*pages_processed, 2);
        assert!(*chunks_generated >= 2);

        let project = ctx.repo.get(id).await.unwrap().unwrap();
        assert_eq!(project.chunks.len(), *chunks_generated);
        for (i, chunk) in project.chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
        }
        // Page order is preserved in chunk order.
        let first_doc = doc_id_for_url("https://example.com/a");
        assert_eq!(project.chunks[0].doc_id, first_doc);
        assert!(project.chunks[0].chunk_id.ends_with("::c0000"));
    }

    #[tokio::test]
    async fn rerun_is_idempotent() {
        let (ctx, registry, id) = seeded_context(vec![page(
            "https://example.com/a",
            &["Stable content that should chunk identically each run."],
        )])
        .await;

        let run1 = start_job(ctx.clone(), Arc::clone(&registry), id)
            .await
            .unwrap();
        drain_to_terminal(run1.events).await;
        let first = ctx.repo.get(id).await.unwrap().unwrap().chunks;

        let run2 = start_job(ctx.clone(), registry, id).await.unwrap();
        drain_to_terminal(run2.events).await;
        let second = ctx.repo.get(id).await.unwrap().unwrap().chunks;

        let a = serde_json::to_string(&first).unwrap();
        let b = serde_json::to_string(&second).unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn duplicate_pages_mark_duplicates() {
        let (ctx, registry, id) = seeded_context(vec![
            page("https://example.com/a", &["Foo bar baz."]),
            page("https://example.com/b", &["Foo bar baz."]),
        ])
        .await;

        let started = start_job(ctx.clone(), registry, id).await.unwrap();
        let events = drain_to_terminal(started.events).await;
        let ProgressEvent::Complete { deduplication, .. } = events.last().unwrap() else {
            panic!("expected complete");
        };
        let stats = deduplication.as_ref().unwrap();
        assert_eq!(stats.exact_duplicates, 1);
        assert_eq!(stats.unique_chunks, 1);

        let project = ctx.repo.get(id).await.unwrap().unwrap();
        assert!(!project.chunks[0].is_duplicate);
        assert!(project.chunks[1].is_duplicate);
        assert_eq!(
            project.chunks[1].duplicate_of.as_deref(),
            Some(project.chunks[0].chunk_id.as_str())
        );
    }

    #[tokio::test]
    async fn second_start_conflicts_while_running() {
        let many: Vec<ScrapedPage> = (0..50)
            .map(|i| {
                page(
                    &format!("https://example.com/{i}"),
                    &["Body text for this page, long enough to produce a chunk."],
                )
            })
            .collect();
        let (ctx, registry, id) = seeded_context(many).await;

        let started = start_job(ctx.clone(), Arc::clone(&registry), id)
            .await
            .unwrap();
        let second = start_job(ctx.clone(), Arc::clone(&registry), id).await;
        assert!(matches!(
            second,
            Err(PipelineError::JobAlreadyRunning(_)) | Ok(_)
        ));
        drain_to_terminal(started.events).await;
    }

    #[tokio::test]
    async fn cancel_persists_partial_work() {
        let many: Vec<ScrapedPage> = (0..200)
            .map(|i| {
                page(
                    &format!("https://example.com/{i}"),
                    &["Cancellable body text, long enough to produce a chunk each."],
                )
            })
            .collect();
        let (ctx, registry, id) = seeded_context(many).await;

        let started = start_job(ctx.clone(), Arc::clone(&registry), id)
            .await
            .unwrap();
        started.handle.request_cancel();
        let events = drain_to_terminal(started.events).await;

        match events.last().unwrap() {
            ProgressEvent::Cancelled { .. } | ProgressEvent::Complete { .. } => {}
            other => panic!("unexpected terminal event {other:?}"),
        }
        // Whatever was computed before the flag was observed is persisted.
        let project = ctx.repo.get(id).await.unwrap().unwrap();
        assert_eq!(project.stats.chunk_count, project.chunks.len());
    }

    #[tokio::test]
    async fn empty_project_refuses_to_start() {
        let repo: Arc<dyn ProjectRepository> = Arc::new(JsonFileStore::in_memory());
        let project = repo
            .create(CreateProjectRequest {
                domain: "example.com".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let ctx = JobContext {
            repo,
            http_client: reqwest::Client::new(),
            file_config: Arc::new(FileConfig::default()),
        };
        let err = start_job(ctx, Arc::new(JobRegistry::new()), project.id)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::NoScrapedContent));
    }
}
