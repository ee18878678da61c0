//! Per-chunk quality scoring: cheap counts plus a warning ladder.

use crate::core::model::{ChunkQuality, QualityGrade};
use crate::core::settings::QualityCheckSettings;
use regex::Regex;
use std::sync::OnceLock;

fn sentence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+").expect("static regex"))
}

pub fn push_warning_unique(warnings: &mut Vec<String>, warning: &str) {
    if !warnings.iter().any(|w| w == warning) {
        warnings.push(warning.to_string());
    }
}

/// Score one chunk. `token_count` comes from the chunker's estimate so the
/// scorer never re-tokenizes.
pub fn score_chunk(
    text: &str,
    token_count: usize,
    target_tokens: usize,
    checks: &QualityCheckSettings,
) -> ChunkQuality {
    let word_count = text.split_whitespace().count();
    let sentence_count = sentence_re()
        .split(text)
        .filter(|s| !s.trim().is_empty())
        .count();
    let has_content = text.chars().any(|c| c.is_alphanumeric());

    let mut warnings = Vec::new();
    let mut no_content = false;

    if checks.warn_on_short_chunks && word_count < checks.min_word_count {
        push_warning_unique(&mut warnings, "too short");
    }
    if checks.warn_on_no_content && !has_content {
        push_warning_unique(&mut warnings, "no meaningful content");
        no_content = true;
    }
    if token_count > target_tokens + target_tokens / 2 {
        push_warning_unique(&mut warnings, "exceeds target size");
    }

    let grade = if no_content || warnings.len() >= 2 {
        QualityGrade::Poor
    } else if warnings.len() == 1 {
        QualityGrade::Warning
    } else {
        QualityGrade::Good
    };

    ChunkQuality {
        token_count,
        word_count,
        sentence_count,
        has_content,
        grade,
        warnings,
    }
}
