//! Token-target chunker. Text sections pack into chunks up to the target
//! token budget with sentence-tail overlap between consecutive chunks;
//! preserved table/code sections pass through as single chunks untouched.

use crate::core::model::{CodeBlockData, Section, SectionKind, TableData};
use crate::pipeline::tokenizer;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub target_tokens: usize,
    pub overlap_tokens: usize,
    pub min_chunk_tokens: usize,
    pub multi_language: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_tokens: 350,
            overlap_tokens: 55,
            min_chunk_tokens: 50,
            multi_language: true,
        }
    }
}

/// A chunk before identity/quality assignment: text plus its structural
/// anchors, ready for the orchestrator to stamp ids and hashes onto.
#[derive(Debug, Clone)]
pub struct ChunkSeed {
    pub text: String,
    pub kind: SectionKind,
    pub heading: Option<String>,
    pub heading_path: Vec<String>,
    pub table_data: Option<TableData>,
    pub code_block: Option<CodeBlockData>,
    pub tokens_estimate: usize,
}

struct Current {
    text: String,
    heading: Option<String>,
    heading_path: Vec<String>,
    tokens: usize,
}

/// Text for a chunk that begins at a section boundary: the section heading is
/// prefixed for retrieval context, on top of the heading line the section
/// text already opens with.
fn section_start_text(heading: &Option<String>, body: &str) -> String {
    match heading {
        Some(h) if !h.trim().is_empty() => format!("{}\n\n{}", h.trim(), body),
        _ => body.to_string(),
    }
}

impl Current {
    fn from_text(text: String, heading: Option<String>, heading_path: Vec<String>, cfg: &ChunkerConfig) -> Self {
        let tokens = tokenizer::count(&text, cfg.multi_language);
        Self {
            text,
            heading,
            heading_path,
            tokens,
        }
    }

    fn append(&mut self, text: &str, cfg: &ChunkerConfig) {
        self.append_sep(text, "\n\n", cfg);
    }

    fn append_sep(&mut self, text: &str, sep: &str, cfg: &ChunkerConfig) {
        if !self.text.is_empty() {
            self.text.push_str(sep);
        }
        self.text.push_str(text);
        self.tokens = tokenizer::count(&self.text, cfg.multi_language);
    }

    fn into_seed(self) -> ChunkSeed {
        ChunkSeed {
            text: self.text,
            kind: SectionKind::Text,
            heading: self.heading,
            heading_path: self.heading_path,
            table_data: None,
            code_block: None,
            tokens_estimate: self.tokens,
        }
    }
}

/// Emit a finished text chunk, honoring the minimum-size rule: a sub-minimum
/// residue merges into the preceding text chunk when one exists, otherwise it
/// stands alone so every non-empty document yields at least one chunk.
fn push_text_chunk(out: &mut Vec<ChunkSeed>, cur: Current, cfg: &ChunkerConfig) {
    if cur.text.trim().is_empty() {
        return;
    }
    if cur.tokens >= cfg.min_chunk_tokens {
        out.push(cur.into_seed());
        return;
    }
    if let Some(prev) = out.last_mut() {
        if prev.kind == SectionKind::Text {
            prev.text.push_str("\n\n");
            prev.text.push_str(&cur.text);
            prev.tokens_estimate = tokenizer::count(&prev.text, cfg.multi_language);
            return;
        }
    }
    out.push(cur.into_seed());
}

fn paragraph_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\n+").expect("static regex"))
}

/// Sentence boundaries: Latin terminators need trailing whitespace; CJK
/// full-width terminators split unconditionally.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut prev_terminator = false;

    for (idx, ch) in text.char_indices() {
        if prev_terminator && ch.is_whitespace() {
            let sentence = text[start..idx].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = idx;
            prev_terminator = false;
            continue;
        }
        match ch {
            '.' | '!' | '?' => prev_terminator = true,
            '。' | '！' | '？' => {
                let end = idx + ch.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                start = end;
                prev_terminator = false;
            }
            _ => prev_terminator = false,
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Trailing sentences of `text` totaling up to `overlap` tokens, with 1.5×
/// slack allowed on the earliest sentence taken.
pub fn overlap_text(text: &str, cfg: &ChunkerConfig) -> String {
    if cfg.overlap_tokens == 0 {
        return String::new();
    }
    let sentences = split_sentences(text);
    let slack = (cfg.overlap_tokens as f64 * 1.5).floor() as usize;

    let mut taken: Vec<&str> = Vec::new();
    let mut acc = 0usize;
    for sentence in sentences.iter().rev() {
        if acc >= cfg.overlap_tokens {
            break;
        }
        let t = tokenizer::count(sentence, cfg.multi_language);
        if acc + t > slack {
            break;
        }
        taken.push(sentence);
        acc += t;
    }
    taken.reverse();
    taken.join(" ")
}

/// Chunk a document's sections in order.
pub fn chunk_sections(sections: &[Section], cfg: &ChunkerConfig) -> Vec<ChunkSeed> {
    let mut out: Vec<ChunkSeed> = Vec::new();
    let mut cur: Option<Current> = None;

    for section in sections {
        match section.kind {
            // Preserved tables and code are single chunks, never split or
            // merged with surrounding text.
            SectionKind::Table | SectionKind::Code => {
                if let Some(c) = cur.take() {
                    push_text_chunk(&mut out, c, cfg);
                }
                out.push(ChunkSeed {
                    text: section.text.clone(),
                    kind: section.kind,
                    heading: section.heading.clone(),
                    heading_path: section.heading_path.clone(),
                    table_data: section.table_data.clone(),
                    code_block: section.code_block.clone(),
                    tokens_estimate: tokenizer::count(&section.text, cfg.multi_language),
                });
            }
            SectionKind::Text => {
                let section_tokens = tokenizer::count(&section.text, cfg.multi_language);

                if section_tokens > cfg.target_tokens {
                    // Oversized section: pack paragraph by paragraph, and
                    // sentence by sentence inside paragraphs that are
                    // themselves over the target.
                    let mut units: Vec<(String, &'static str)> = Vec::new();
                    for para in paragraph_re().split(&section.text) {
                        let para = para.trim();
                        if para.is_empty() {
                            continue;
                        }
                        if tokenizer::count(para, cfg.multi_language) > cfg.target_tokens {
                            for sentence in split_sentences(para) {
                                units.push((sentence, " "));
                            }
                        } else {
                            units.push((para.to_string(), "\n\n"));
                        }
                    }

                    for (unit, sep) in units {
                        let unit_tokens = tokenizer::count(&unit, cfg.multi_language);
                        match cur.as_mut() {
                            Some(c) if c.tokens + unit_tokens > cfg.target_tokens
                                && !c.text.is_empty() =>
                            {
                                let tail = overlap_text(&c.text, cfg);
                                let heading = c.heading.clone();
                                let heading_path = c.heading_path.clone();
                                push_text_chunk(&mut out, cur.take().expect("current set"), cfg);
                                let mut next = Current::from_text(
                                    tail,
                                    section.heading.clone().or(heading),
                                    if section.heading_path.is_empty() {
                                        heading_path
                                    } else {
                                        section.heading_path.clone()
                                    },
                                    cfg,
                                );
                                if next.text.is_empty() {
                                    next = Current::from_text(
                                        unit,
                                        next.heading,
                                        next.heading_path,
                                        cfg,
                                    );
                                } else {
                                    next.append_sep(&unit, sep, cfg);
                                }
                                cur = Some(next);
                            }
                            Some(c) => c.append_sep(&unit, sep, cfg),
                            None => {
                                cur = Some(Current::from_text(
                                    section_start_text(&section.heading, &unit),
                                    section.heading.clone(),
                                    section.heading_path.clone(),
                                    cfg,
                                ));
                            }
                        }
                    }
                } else if let Some(c) = cur.as_mut() {
                    if c.tokens + section_tokens > cfg.target_tokens {
                        let tail = overlap_text(&c.text, cfg);
                        push_text_chunk(&mut out, cur.take().expect("current set"), cfg);
                        let mut next = Current::from_text(
                            tail,
                            section.heading.clone(),
                            section.heading_path.clone(),
                            cfg,
                        );
                        if next.text.is_empty() {
                            next = Current::from_text(
                                section_start_text(&section.heading, &section.text),
                                section.heading.clone(),
                                section.heading_path.clone(),
                                cfg,
                            );
                        } else {
                            next.append(&section.text, cfg);
                        }
                        cur = Some(next);
                    } else {
                        c.append(&section.text, cfg);
                    }
                } else {
                    cur = Some(Current::from_text(
                        section_start_text(&section.heading, &section.text),
                        section.heading.clone(),
                        section.heading_path.clone(),
                        cfg,
                    ));
                }
            }
        }
    }

    if let Some(c) = cur.take() {
        push_text_chunk(&mut out, c, cfg);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_section(text: &str, heading: Option<&str>) -> Section {
        Section {
            text: text.to_string(),
            kind: SectionKind::Text,
            heading: heading.map(|h| h.to_string()),
            heading_path: heading.map(|h| vec![h.to_string()]).unwrap_or_default(),
            table_data: None,
            code_block: None,
        }
    }

    fn cfg(target: usize, overlap: usize, min: usize) -> ChunkerConfig {
        ChunkerConfig {
            target_tokens: target,
            overlap_tokens: overlap,
            min_chunk_tokens: min,
            multi_language: true,
        }
    }

    #[test]
    fn single_small_section_is_one_chunk() {
        let chunks = chunk_sections(
            &[text_section("Title\n\nAAA BBB.", Some("Title"))],
            &cfg(50, 0, 5),
        );
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, SectionKind::Text);
        assert_eq!(chunks[0].heading.as_deref(), Some("Title"));
        // Heading appears both as the chunk prefix and as the section's own
        // first line.
        assert!(chunks[0].text.starts_with("Title\n\nTitle\n\nAAA BBB."));
    }

    #[test]
    fn oversized_section_splits_with_overlap() {
        // ~900 tokens of distinct sentences across paragraphs.
        let para = |i: usize| {
            (0..15)
                .map(|j| format!("Sentence number {i} dash {j} carries some filler words here."))
                .collect::<Vec<_>>()
                .join(" ")
        };
        let body = (0..6).map(para).collect::<Vec<_>>().join("\n\n");
        let c = cfg(300, 30, 50);
        let chunks = chunk_sections(&[text_section(&body, None)], &c);

        assert!(
            (2..=7).contains(&chunks.len()),
            "expected a handful of chunks, got {}",
            chunks.len()
        );
        for chunk in &chunks {
            assert!(
                chunk.tokens_estimate <= 300 + 300 / 2 + 30,
                "chunk too large: {}",
                chunk.tokens_estimate
            );
        }
        // Consecutive chunks share sentence text.
        for pair in chunks.windows(2) {
            let tail_sentence = split_sentences(&pair[0].text)
                .last()
                .cloned()
                .unwrap_or_default();
            assert!(
                pair[1].text.contains(&tail_sentence),
                "no overlap between consecutive chunks"
            );
        }
    }

    #[test]
    fn table_section_is_never_split_or_merged() {
        let table = Section {
            text: "| A | B |\n| --- | --- |\n| 1 | 2 |".into(),
            kind: SectionKind::Table,
            heading: None,
            heading_path: vec![],
            table_data: Some(TableData {
                headers: Some(vec!["A".into(), "B".into()]),
                rows: vec![vec!["1".into(), "2".into()]],
                caption: None,
                cell_images: vec![],
            }),
            code_block: None,
        };
        let chunks = chunk_sections(
            &[
                text_section("Some text before the data.", None),
                table,
                text_section("Some text after the data.", None),
            ],
            &cfg(350, 55, 1),
        );
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].kind, SectionKind::Table);
        assert!(chunks[1].table_data.is_some());
    }

    #[test]
    fn residue_merges_into_previous_text_chunk() {
        let big = (0..40)
            .map(|i| format!("Filler sentence number {i} with several words in it."))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_sections(
            &[text_section(&big, None), text_section("Tiny tail.", None)],
            &cfg(500, 0, 50),
        );
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.ends_with("Tiny tail."));
    }

    #[test]
    fn sub_minimum_lone_document_still_emits() {
        let chunks = chunk_sections(&[text_section("Just a word.", None)], &cfg(350, 55, 50));
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn overlap_respects_budget_with_slack() {
        let text = (0..30)
            .map(|i| format!("Sentence {i} has roughly ten tokens of content in it."))
            .collect::<Vec<_>>()
            .join(" ");
        let c = cfg(300, 30, 10);
        let tail = overlap_text(&text, &c);
        assert!(!tail.is_empty());
        let tail_tokens = tokenizer::count(&tail, true);
        assert!(tail_tokens <= 45, "overlap too large: {tail_tokens}");
    }

    #[test]
    fn zero_overlap_yields_empty_tail() {
        assert_eq!(overlap_text("One. Two. Three.", &cfg(300, 0, 10)), "");
    }

    #[test]
    fn sentence_splitter_handles_cjk_terminators() {
        let s = split_sentences("これは文です。Second sentence here. 最後です。");
        assert_eq!(s.len(), 3);
        assert_eq!(s[0], "これは文です。");
    }
}
