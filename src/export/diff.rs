//! Incremental export diff: compares the project's current
//! `chunk_id → content_hash` map against the snapshot persisted by the last
//! export.

use crate::core::model::{Chunk, Project};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiffStats {
    pub total_new: usize,
    pub total_updated: usize,
    pub total_deleted: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementalDiff {
    pub new: Vec<Chunk>,
    pub updated: Vec<Chunk>,
    pub deleted_ids: Vec<String>,
    pub exported_at: String,
    pub stats: DiffStats,
}

/// Current snapshot for persistence after a successful export.
pub fn snapshot(project: &Project) -> HashMap<String, String> {
    project
        .chunks
        .iter()
        .map(|c| (c.chunk_id.clone(), c.content_hash.clone()))
        .collect()
}

/// Compute adds/updates/deletes relative to the stored snapshot. A project
/// that has never exported reports every chunk as new.
pub fn incremental_diff(project: &Project) -> IncrementalDiff {
    let previous = project.exported_chunk_hashes.clone().unwrap_or_default();
    let current_ids: HashMap<&str, &str> = project
        .chunks
        .iter()
        .map(|c| (c.chunk_id.as_str(), c.content_hash.as_str()))
        .collect();

    let mut new = Vec::new();
    let mut updated = Vec::new();
    for chunk in &project.chunks {
        match previous.get(&chunk.chunk_id) {
            None => new.push(chunk.clone()),
            Some(old_hash) if old_hash != &chunk.content_hash => updated.push(chunk.clone()),
            Some(_) => {}
        }
    }

    let mut deleted_ids: Vec<String> = previous
        .keys()
        .filter(|id| !current_ids.contains_key(id.as_str()))
        .cloned()
        .collect();
    deleted_ids.sort();

    let stats = DiffStats {
        total_new: new.len(),
        total_updated: updated.len(),
        total_deleted: deleted_ids.len(),
    };

    IncrementalDiff {
        new,
        updated,
        deleted_ids,
        exported_at: Utc::now().to_rfc3339(),
        stats,
    }
}
