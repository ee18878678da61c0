//! End-to-end pipeline scenarios: HTML in, chunks out, without the HTTP
//! layer.

use sitepack::chunker::{chunk_sections, split_sentences, ChunkerConfig};
use sitepack::extractor::{extract, ExtractOptions};
use sitepack::model::{ChunkType, Element, QualityGrade, SectionKind};
use sitepack::quality::score_chunk;
use sitepack::sections::{sectionize, SectionOptions};
use sitepack::settings::QualityCheckSettings;
use sitepack::tokenizer;

fn chunk_html(html: &str, url: &str, cfg: &ChunkerConfig) -> Vec<sitepack::chunker::ChunkSeed> {
    let page = extract(html, url, &ExtractOptions::default());
    let sections = sectionize(&page.elements, &SectionOptions::default());
    chunk_sections(&sections, cfg)
}

#[test]
fn trivial_single_page_yields_one_good_chunk() {
    let html = r#"<html><head><title>Page</title></head><body><article>
        <h1>Title</h1>
        <p>AAA BBB. This page needs enough text for the main-content probe to accept the article.</p>
    </article></body></html>"#;

    let seeds = chunk_html(
        html,
        "https://example.com/trivial",
        &ChunkerConfig {
            target_tokens: 50,
            overlap_tokens: 0,
            min_chunk_tokens: 5,
            multi_language: true,
        },
    );

    assert_eq!(seeds.len(), 1);
    let chunk = &seeds[0];
    assert_eq!(chunk.kind, SectionKind::Text);
    // Heading doubles as both chunk prefix and section first line.
    assert!(
        chunk.text.starts_with("Title\n\nTitle\n\nAAA BBB."),
        "unexpected chunk text start: {:?}",
        &chunk.text[..chunk.text.len().min(40)]
    );

    let quality = score_chunk(
        &chunk.text,
        chunk.tokens_estimate,
        50,
        &QualityCheckSettings::default(),
    );
    assert_eq!(quality.grade, QualityGrade::Good);
}

#[test]
fn oversized_paragraph_splits_with_bounded_overlap() {
    // One ~900-token paragraph.
    let sentences: Vec<String> = (0..90)
        .map(|i| format!("Sentence number {i} contains roughly ten tokens of filler content."))
        .collect();
    let body = sentences.join(" ");
    let html = format!(
        r#"<html><body><article><p>{body}</p></article></body></html>"#
    );

    let cfg = ChunkerConfig {
        target_tokens: 300,
        overlap_tokens: 30,
        min_chunk_tokens: 50,
        multi_language: true,
    };
    let seeds = chunk_html(&html, "https://example.com/long", &cfg);

    assert!(
        (3..=5).contains(&seeds.len()),
        "expected a few bounded chunks, got {}",
        seeds.len()
    );
    for seed in &seeds {
        assert!(
            seed.tokens_estimate <= 450,
            "chunk exceeds 1.5x target: {}",
            seed.tokens_estimate
        );
    }
    // Consecutive chunks share trailing sentence text within the overlap
    // budget (≤ 1.5 × overlap tokens).
    for pair in seeds.windows(2) {
        let prev_sentences = split_sentences(&pair[0].text);
        let shared: Vec<&String> = prev_sentences
            .iter()
            .rev()
            .take_while(|s| pair[1].text.contains(s.as_str()))
            .collect();
        assert!(!shared.is_empty(), "no shared overlap sentences");
        let shared_tokens: usize = shared
            .iter()
            .map(|s| tokenizer::count(s, true))
            .sum();
        assert!(shared_tokens <= 45, "overlap too large: {shared_tokens}");
    }
}

#[test]
fn table_page_becomes_table_and_text_chunks() {
    let html = r#"<html><body><article>
        <p>This paragraph describes the data table below in sufficient detail to be kept.</p>
        <table>
            <tr><th>Name</th><th>Value</th></tr>
            <tr><td>alpha</td><td>1</td></tr>
            <tr><td>beta</td><td>2</td></tr>
            <tr><td>gamma</td><td>3</td></tr>
        </table>
    </article></body></html>"#;

    let seeds = chunk_html(
        html,
        "https://example.com/table",
        &ChunkerConfig::default(),
    );

    assert_eq!(seeds.len(), 2, "expected text + table chunks");
    let text_chunk = seeds.iter().find(|s| s.kind == SectionKind::Text).unwrap();
    let table_chunk = seeds.iter().find(|s| s.kind == SectionKind::Table).unwrap();

    assert!(text_chunk.text.contains("describes the data table"));
    assert!(table_chunk.text.contains("| Name | Value |"));
    assert!(table_chunk.text.contains("| --- | --- |"));
    let data = table_chunk.table_data.as_ref().unwrap();
    assert_eq!(data.rows.len(), 3);

    // Chunk-type mapping used by the orchestrator.
    let mapped = match table_chunk.kind {
        SectionKind::Table => ChunkType::Table,
        _ => ChunkType::Text,
    };
    assert_eq!(mapped, ChunkType::Table);
}

#[test]
fn code_blocks_survive_whole() {
    let body: String = (0..60)
        .map(|i| format!("let variable_{i} = compute_something({i});\n"))
        .collect();
    let html = format!(
        r#"<html><body><article>
            <p>Here is a long code listing that would normally overflow the token target.</p>
            <pre><code class="language-rust">{body}</code></pre>
        </article></body></html>"#
    );

    let seeds = chunk_html(
        &html,
        "https://example.com/code",
        &ChunkerConfig {
            target_tokens: 100,
            overlap_tokens: 10,
            min_chunk_tokens: 10,
            multi_language: true,
        },
    );

    let code_chunks: Vec<_> = seeds.iter().filter(|s| s.kind == SectionKind::Code).collect();
    assert_eq!(code_chunks.len(), 1, "code must stay a single chunk");
    let code = code_chunks[0].code_block.as_ref().unwrap();
    assert_eq!(code.language.as_deref(), Some("rust"));
    assert!(code_chunks[0].text.starts_with("Code (rust):"));
    // Preserved even though it blows past the target.
    assert!(code_chunks[0].tokens_estimate > 150);
}

#[test]
fn heading_hierarchy_anchors_chunks() {
    let html = r#"<html><body><article>
        <h1>Manual</h1>
        <p>Introductory words about this manual, detailed enough to retain here.</p>
        <h2>Install</h2>
        <p>Installation instructions live here and carry enough words to be kept.</p>
        <h3>Linux</h3>
        <p>Linux specifics are described here with a reasonable amount of words.</p>
        <h2>Usage</h2>
        <p>Usage notes, also written with enough text to clear the length filters.</p>
    </article></body></html>"#;

    let page = extract(html, "https://example.com/manual", &ExtractOptions::default());
    let sections = sectionize(&page.elements, &SectionOptions::default());

    let linux = sections
        .iter()
        .find(|s| s.heading.as_deref() == Some("Linux"))
        .unwrap();
    assert_eq!(linux.heading_path, vec!["Manual", "Install", "Linux"]);

    let usage = sections
        .iter()
        .find(|s| s.heading.as_deref() == Some("Usage"))
        .unwrap();
    assert_eq!(usage.heading_path, vec!["Manual", "Usage"]);
}

#[test]
fn whole_pipeline_is_deterministic() {
    let html = r#"<html><body><article>
        <h1>Stable</h1>
        <p>Deterministic content that must chunk identically on every single run of the pipeline.</p>
    </article></body></html>"#;

    let run = || {
        let page = extract(html, "https://example.com/stable", &ExtractOptions::default());
        let sections = sectionize(&page.elements, &SectionOptions::default());
        chunk_sections(&sections, &ChunkerConfig::default())
            .into_iter()
            .map(|s| (s.text, s.tokens_estimate))
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn element_stream_preserves_document_order() {
    let html = r#"<html><body><article>
        <h1>Order</h1>
        <p>First paragraph with plenty of words to clear the minimum length.</p>
        <h2>Second</h2>
        <p>Second paragraph with plenty of words to clear the minimum length.</p>
    </article></body></html>"#;
    let page = extract(html, "https://example.com/order", &ExtractOptions::default());
    let kinds: Vec<&str> = page
        .elements
        .iter()
        .map(|e| match e {
            Element::Heading { .. } => "h",
            Element::Paragraph { .. } => "p",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["h", "p", "h", "p"]);
}
