//! Recursive element emission: walks the main-content subtree in preorder
//! and turns known tags into stream elements, recursing through everything
//! else.

use crate::core::model::{CellImage, Element, MediaKind, TableData};
use crate::scraping::extractor::noise;
use scraper::{ElementRef, Selector};
use url::Url;

/// Language names accepted as bare code-fence classes.
const KNOWN_LANGUAGES: &[&str] = &[
    "rust", "python", "javascript", "typescript", "go", "java", "kotlin", "csharp", "cpp", "c",
    "ruby", "php", "swift", "scala", "bash", "shell", "sql", "html", "css", "json", "yaml", "toml",
    "xml", "markdown",
];

/// Lazy-load attributes probed when `src` is missing or a placeholder.
const LAZY_SRC_ATTRS: &[&str] = &[
    "data-src",
    "data-lazy-src",
    "data-original",
    "data-lazy",
    "data-image",
];

pub struct WalkContext<'a> {
    pub base_url: &'a Url,
    /// Caller-supplied exclude selectors; matching subtrees are dropped.
    pub exclude_selectors: Vec<Selector>,
}

impl WalkContext<'_> {
    fn is_excluded(&self, el: &ElementRef) -> bool {
        self.exclude_selectors.iter().any(|s| s.matches(el))
    }
}

/// Collapse runs of whitespace; block text keeps its words only.
fn squashed_text(el: &ElementRef) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn language_from_classes(class_attr: Option<&str>) -> Option<String> {
    let classes = class_attr?;
    for class in classes.split_whitespace() {
        for prefix in ["language-", "lang-", "hljs-", "prism-"] {
            if let Some(lang) = class.strip_prefix(prefix) {
                if !lang.is_empty() {
                    return Some(lang.to_ascii_lowercase());
                }
            }
        }
        let lower = class.to_ascii_lowercase();
        if KNOWN_LANGUAGES.contains(&lower.as_str()) {
            return Some(lower);
        }
    }
    None
}

fn code_language(el: &ElementRef) -> Option<String> {
    if let Some(lang) = language_from_classes(el.value().attr("class")) {
        return Some(lang);
    }
    // mdBook and highlighters often put the class on an inner <code>.
    let code_sel = Selector::parse("code").ok()?;
    el.select(&code_sel)
        .find_map(|c| language_from_classes(c.value().attr("class")))
}

fn is_placeholder_src(src: &str) -> bool {
    let lower = src.to_ascii_lowercase();
    lower.starts_with("data:")
        || lower.contains("placeholder")
        || lower.contains("spacer")
        || lower.contains("blank.")
        || lower.contains("1x1")
}

/// Resolve an image source against the page URL, preferring lazy-load
/// attributes over a placeholder `src`.
pub fn resolve_image_src(el: &ElementRef, base_url: &Url) -> Option<String> {
    let mut candidate = el
        .value()
        .attr("src")
        .map(str::trim)
        .filter(|s| !s.is_empty() && !is_placeholder_src(s))
        .map(str::to_string);

    if candidate.is_none() {
        for attr in LAZY_SRC_ATTRS {
            if let Some(v) = el.value().attr(attr).map(str::trim) {
                if !v.is_empty() && !is_placeholder_src(v) {
                    candidate = Some(v.to_string());
                    break;
                }
            }
        }
    }

    if candidate.is_none() {
        if let Some(srcset) = el.value().attr("srcset") {
            let first = srcset
                .split(',')
                .next()
                .and_then(|entry| entry.split_whitespace().next())
                .map(str::to_string);
            if let Some(f) = first {
                if !is_placeholder_src(&f) {
                    candidate = Some(f);
                }
            }
        }
    }

    let raw = candidate?;
    if raw.starts_with("data:") {
        return None;
    }
    match base_url.join(&raw) {
        Ok(resolved) => Some(resolved.to_string()),
        Err(_) => Some(raw),
    }
}

fn video_src(el: &ElementRef, base_url: &Url) -> Option<String> {
    let raw = el
        .value()
        .attr("src")
        .map(str::to_string)
        .or_else(|| {
            let source_sel = Selector::parse("source").ok()?;
            el.select(&source_sel)
                .find_map(|s| s.value().attr("src").map(str::to_string))
        })?;
    match base_url.join(&raw) {
        Ok(resolved) => Some(resolved.to_string()),
        Err(_) => Some(raw),
    }
}

fn extract_list(el: &ElementRef, ordered: bool, out: &mut Vec<Element>) {
    // Direct-child <li> only; nested lists flatten into their parent item.
    let items: Vec<String> = el
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|c| c.value().name() == "li")
        .map(|li| squashed_text(&li))
        .filter(|t| !t.is_empty())
        .collect();
    if !items.is_empty() {
        out.push(Element::List { ordered, items });
    }
}

fn extract_table(el: &ElementRef, ctx: &WalkContext, out: &mut Vec<Element>) {
    let tr_sel = Selector::parse("tr").expect("static selector");
    let cell_sel = Selector::parse("th, td").expect("static selector");
    let img_sel = Selector::parse("img").expect("static selector");
    let caption_sel = Selector::parse("caption").expect("static selector");

    let caption = el
        .select(&caption_sel)
        .next()
        .map(|c| squashed_text(&c))
        .filter(|c| !c.is_empty());

    let all_rows: Vec<ElementRef> = el.select(&tr_sel).collect();
    if all_rows.is_empty() {
        return;
    }

    // Header row: every cell is a <th>.
    let is_header_row = |row: &ElementRef| {
        let cells: Vec<ElementRef> = row.select(&cell_sel).collect();
        !cells.is_empty() && cells.iter().all(|c| c.value().name() == "th")
    };

    let mut headers: Option<Vec<String>> = None;
    let mut data_rows = &all_rows[..];
    if is_header_row(&all_rows[0]) {
        headers = Some(
            all_rows[0]
                .select(&cell_sel)
                .map(|c| squashed_text(&c))
                .collect(),
        );
        data_rows = &all_rows[1..];
    }

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut cell_images: Vec<CellImage> = Vec::new();

    for (row_idx, row) in data_rows.iter().enumerate() {
        let mut cells: Vec<String> = Vec::new();
        for (col_idx, cell) in row.select(&cell_sel).enumerate() {
            let mut text = squashed_text(&cell);
            for img in cell.select(&img_sel) {
                let Some(src) = resolve_image_src(&img, ctx.base_url) else {
                    continue;
                };
                let alt = img.value().attr("alt").unwrap_or("").trim().to_string();
                let label = if alt.is_empty() { "[Image]".to_string() } else { alt.clone() };
                if text.is_empty() {
                    text = label;
                } else {
                    text = format!("{text} {label}");
                }
                cell_images.push(CellImage {
                    src,
                    alt,
                    row: row_idx,
                    col: col_idx,
                });
            }
            cells.push(text);
        }
        if !cells.is_empty() {
            rows.push(cells);
        }
    }

    if rows.is_empty() && headers.is_none() {
        return;
    }

    let data = TableData {
        headers,
        rows,
        caption,
        cell_images: cell_images.clone(),
    };
    out.push(Element::Table { data });

    // Cell images additionally surface as media elements so downstream
    // consumers see them without digging through table data.
    for ci in cell_images {
        out.push(Element::Media {
            kind: MediaKind::Image,
            src: ci.src,
            alt: (!ci.alt.is_empty()).then_some(ci.alt),
            context: Some("table".to_string()),
        });
    }
}

/// Preorder walk over `el`'s children, emitting elements in document order.
pub fn walk_children(el: &ElementRef, ctx: &WalkContext, out: &mut Vec<Element>) {
    for child in el.children() {
        let Some(child_el) = ElementRef::wrap(child) else {
            continue;
        };
        emit_element(&child_el, ctx, out);
    }
}

fn emit_element(el: &ElementRef, ctx: &WalkContext, out: &mut Vec<Element>) {
    if ctx.is_excluded(el) || noise::is_noise_element(el) {
        return;
    }

    let tag = el.value().name();
    match tag {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let text = squashed_text(el);
            if text.chars().count() > 1 {
                let level = tag.as_bytes()[1] - b'0';
                out.push(Element::Heading { level, text });
            }
        }
        "p" => {
            let text = squashed_text(el);
            if text.chars().count() > 10 {
                out.push(Element::Paragraph { text });
            }
        }
        "ul" => extract_list(el, false, out),
        "ol" => extract_list(el, true, out),
        "blockquote" | "quote" => {
            let text = squashed_text(el);
            if !text.is_empty() {
                out.push(Element::Blockquote { text });
            }
        }
        "pre" | "code" => {
            // Whitespace is load-bearing here; only trim the outer edges.
            let text = el.text().collect::<String>().trim_matches('\n').to_string();
            if !text.trim().is_empty() {
                let line_count = text.matches('\n').count();
                out.push(Element::Code {
                    language: code_language(el),
                    text,
                    line_count,
                });
            }
        }
        "table" => extract_table(el, ctx, out),
        "img" => {
            if let Some(src) = resolve_image_src(el, ctx.base_url) {
                let alt = el
                    .value()
                    .attr("alt")
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string);
                out.push(Element::Media {
                    kind: MediaKind::Image,
                    src,
                    alt,
                    context: None,
                });
            }
        }
        "video" => {
            if let Some(src) = video_src(el, ctx.base_url) {
                out.push(Element::Media {
                    kind: MediaKind::Video,
                    src,
                    alt: None,
                    context: None,
                });
            }
        }
        _ => walk_children(el, ctx, out),
    }
}
