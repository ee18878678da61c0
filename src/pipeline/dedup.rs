//! Two-pass duplicate detection: exact content-hash matches first, then
//! Jaccard word-set similarity against earlier canonical chunks.

use crate::core::model::Chunk;
use crate::core::types::DedupStats;
use std::collections::{HashMap, HashSet};

/// Lowercased, punctuation-stripped word set; tokens shorter than 2 chars
/// are noise and dropped.
pub fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 2)
        .map(|w| w.to_string())
        .collect()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Mark exact and near duplicates in place. Every chunk marked duplicate
/// points at an earlier chunk that itself stays canonical.
pub fn dedup_chunks(chunks: &mut [Chunk], threshold: f64) -> DedupStats {
    let mut stats = DedupStats {
        total: chunks.len(),
        ..Default::default()
    };

    // Pass 1 — exact: first occurrence of a content hash wins.
    let mut first_by_hash: HashMap<String, String> = HashMap::new();
    for chunk in chunks.iter_mut() {
        match first_by_hash.get(&chunk.content_hash) {
            Some(original_id) => {
                chunk.is_duplicate = true;
                chunk.duplicate_of = Some(original_id.clone());
                stats.exact_duplicates += 1;
            }
            None => {
                chunk.is_duplicate = false;
                chunk.duplicate_of = None;
                first_by_hash.insert(chunk.content_hash.clone(), chunk.chunk_id.clone());
            }
        }
    }

    // Pass 2 — near: compare each surviving chunk against earlier canonical
    // chunks. The size-ratio check skips pairs the threshold already rules
    // out, since J(A,B) ≤ min(|A|,|B|) / max(|A|,|B|).
    let word_sets: Vec<HashSet<String>> = chunks.iter().map(|c| word_set(&c.text)).collect();
    let mut canonical: Vec<usize> = Vec::new();

    for i in 0..chunks.len() {
        if chunks[i].is_duplicate {
            continue;
        }
        let mut matched: Option<usize> = None;
        for &j in &canonical {
            let (a, b) = (&word_sets[i], &word_sets[j]);
            let (small, large) = if a.len() <= b.len() {
                (a.len(), b.len())
            } else {
                (b.len(), a.len())
            };
            if large == 0 || (small as f64 / large as f64) < threshold {
                continue;
            }
            if jaccard(a, b) >= threshold {
                matched = Some(j);
                break;
            }
        }
        match matched {
            Some(j) => {
                let original_id = chunks[j].chunk_id.clone();
                chunks[i].is_duplicate = true;
                chunks[i].duplicate_of = Some(original_id);
                stats.near_duplicates += 1;
            }
            None => canonical.push(i),
        }
    }

    stats.unique_chunks = canonical.len();
    stats
}
