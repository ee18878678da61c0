//! Project repository — an injected key-value store keyed by integer project
//! ids, plus a scalar settings store. The file-backed implementation keeps
//! everything in memory behind an `RwLock` and persists with atomic
//! write-then-rename; tests use the same implementation on a temp dir or the
//! in-memory store.

use crate::core::errors::StoreError;
use crate::core::model::{PageResult, Project};
use crate::core::types::{CreateProjectRequest, UpdateProjectRequest};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::info;

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Project>, StoreError>;
    async fn get(&self, id: i64) -> Result<Option<Project>, StoreError>;
    async fn create(&self, req: CreateProjectRequest) -> Result<Project, StoreError>;
    async fn update(
        &self,
        id: i64,
        patch: UpdateProjectRequest,
    ) -> Result<Option<Project>, StoreError>;
    /// Full-record write, last-writer-wins. The orchestrator calls this at
    /// phase boundaries only.
    async fn save(&self, project: &Project) -> Result<(), StoreError>;
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;
    /// Merge scrape results into a project, deduplicating by URL: a result
    /// for an already-present URL replaces the old envelope in place.
    async fn append_results(&self, id: i64, results: Vec<PageResult>) -> Result<(), StoreError>;

    async fn get_setting(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;
    async fn put_setting(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared mutation helpers
// ─────────────────────────────────────────────────────────────────────────────

fn build_project(id: i64, req: CreateProjectRequest) -> Project {
    let display_name = req
        .display_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| req.domain.clone());
    Project {
        id,
        domain: req.domain,
        display_name,
        status: req.status.unwrap_or_default(),
        queue: req.queue.unwrap_or_default(),
        processed: req.processed.unwrap_or_default(),
        results: req.results.unwrap_or_default(),
        errors: req.errors.unwrap_or_default(),
        stats: req.stats.unwrap_or_default(),
        settings: req.settings.unwrap_or_default(),
        chunks: Vec::new(),
        last_exported_at: None,
        exported_chunk_hashes: None,
        created_at: Utc::now().to_rfc3339(),
    }
}

fn apply_patch(project: &mut Project, patch: UpdateProjectRequest) {
    if let Some(v) = patch.domain {
        project.domain = v;
    }
    if let Some(v) = patch.display_name {
        project.display_name = v;
    }
    if let Some(v) = patch.status {
        project.status = v;
    }
    if let Some(v) = patch.queue {
        project.queue = v;
    }
    if let Some(v) = patch.processed {
        project.processed = v;
    }
    if let Some(v) = patch.results {
        project.results = v;
    }
    if let Some(v) = patch.errors {
        project.errors = v;
    }
    if let Some(v) = patch.stats {
        project.stats = v;
    }
    if let Some(v) = patch.settings {
        project.settings = v;
    }
    if let Some(v) = patch.chunks {
        project.chunks = v;
    }
    if let Some(v) = patch.last_exported_at {
        project.last_exported_at = Some(v);
    }
    if let Some(v) = patch.exported_chunk_hashes {
        project.exported_chunk_hashes = Some(v);
    }
}

fn merge_results(project: &mut Project, incoming: Vec<PageResult>) {
    let now = Utc::now().to_rfc3339();
    for result in incoming {
        let url = result.url.clone();
        if let Some(message) = &result.error {
            project.errors.push(crate::core::model::ProjectError {
                url: url.clone(),
                message: message.clone(),
                timestamp: now.clone(),
            });
        }
        match project.results.iter_mut().find(|r| r.url == result.url) {
            // Same URL scraped twice (parallel workers): replace in place so
            // insertion order — and therefore chunk ids — stays stable.
            Some(existing) => *existing = result,
            None => project.results.push(result),
        }
        if !project.processed.contains(&url) {
            project.processed.push(url.clone());
        }
        project.queue.retain(|q| q != &url);
    }
    project.stats.processed_count = project.results.iter().filter(|r| r.success).count();
    project.stats.error_count = project.results.iter().filter(|r| !r.success).count();
    project.stats.last_scraped_at = Some(Utc::now().to_rfc3339());
}

// ─────────────────────────────────────────────────────────────────────────────
// File-backed store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    next_id: i64,
    projects: HashMap<i64, Project>,
    #[serde(default)]
    settings: HashMap<String, serde_json::Value>,
}

pub struct JsonFileStore {
    path: Option<PathBuf>,
    state: RwLock<StoreState>,
}

impl JsonFileStore {
    /// Purely in-memory store (tests, ephemeral runs).
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(StoreState {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Open (or initialize) the store under `dir/projects.json`.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("projects.json");
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str::<StoreState>(&contents)
                .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))?
        } else {
            StoreState {
                next_id: 1,
                ..Default::default()
            }
        };
        info!(
            "project store opened at {} ({} projects)",
            path.display(),
            state.projects.len()
        );
        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    /// Atomic persist: serialize to a sibling temp file, then rename over.
    async fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string(state)
            .map_err(|e| StoreError::Corrupt(format!("serialize: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl ProjectRepository for JsonFileStore {
    async fn list(&self) -> Result<Vec<Project>, StoreError> {
        let state = self.state.read().await;
        let mut projects: Vec<Project> = state.projects.values().cloned().collect();
        projects.sort_by_key(|p| p.id);
        Ok(projects)
    }

    async fn get(&self, id: i64) -> Result<Option<Project>, StoreError> {
        Ok(self.state.read().await.projects.get(&id).cloned())
    }

    async fn create(&self, req: CreateProjectRequest) -> Result<Project, StoreError> {
        let mut state = self.state.write().await;
        let id = state.next_id;
        state.next_id += 1;
        let project = build_project(id, req);
        state.projects.insert(id, project.clone());
        self.persist(&state).await?;
        Ok(project)
    }

    async fn update(
        &self,
        id: i64,
        patch: UpdateProjectRequest,
    ) -> Result<Option<Project>, StoreError> {
        let mut state = self.state.write().await;
        let Some(project) = state.projects.get_mut(&id) else {
            return Ok(None);
        };
        apply_patch(project, patch);
        let updated = project.clone();
        self.persist(&state).await?;
        Ok(Some(updated))
    }

    async fn save(&self, project: &Project) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.projects.insert(project.id, project.clone());
        self.persist(&state).await
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let removed = state.projects.remove(&id).is_some();
        if removed {
            self.persist(&state).await?;
        }
        Ok(removed)
    }

    async fn append_results(&self, id: i64, results: Vec<PageResult>) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(project) = state.projects.get_mut(&id) {
            merge_results(project, results);
            self.persist(&state).await?;
        }
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.state.read().await.settings.get(key).cloned())
    }

    async fn put_setting(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.settings.insert(key.to_string(), value);
        self.persist(&state).await
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;

    /// Build a project without going through a repository; unit tests only.
    pub fn project_from_request(id: i64, req: CreateProjectRequest) -> Project {
        build_project(id, req)
    }
}
