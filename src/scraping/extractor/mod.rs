//! DOM → ordered element stream. Probes for the main-content subtree, prunes
//! noise, and emits the tagged elements the section builder consumes.

mod elements;
mod noise;
mod structured;

pub use noise::{is_noise_identifier, is_noise_tag};

use crate::core::model::{Element, ScrapedPage};
use chrono::Utc;
use elements::WalkContext;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;
use whatlang::Lang;

/// Built-in main-content probe order, tried after any caller-supplied
/// selectors. First subtree with more than 100 chars of text wins.
const DEFAULT_CONTENT_SELECTORS: &[&str] = &[
    "main article",
    "article",
    "main",
    "[role=main]",
    "#content",
    ".content",
    "#main",
    ".main-content",
    ".post-content",
    ".entry-content",
];

const MIN_MAIN_CONTENT_CHARS: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Site-specific selectors probed before the built-in list.
    pub content_selectors: Vec<String>,
    /// Subtrees to exclude on top of the built-in noise filter.
    pub exclude_selectors: Vec<String>,
    pub structured_data: bool,
}

fn text_len(el: &ElementRef) -> usize {
    el.text().map(|t| t.trim().len()).sum()
}

fn select_main_content<'a>(document: &'a Html, opts: &ExtractOptions) -> Option<ElementRef<'a>> {
    let probes = opts
        .content_selectors
        .iter()
        .map(String::as_str)
        .chain(DEFAULT_CONTENT_SELECTORS.iter().copied());

    for probe in probes {
        let Ok(selector) = Selector::parse(probe) else {
            debug!("skipping unparsable content selector: {probe}");
            continue;
        };
        if let Some(el) = document.select(&selector).next() {
            if text_len(&el) > MIN_MAIN_CONTENT_CHARS {
                debug!("main content matched selector: {probe}");
                return Some(el);
            }
        }
    }
    None
}

fn extract_title(document: &Html) -> String {
    let title_sel = Selector::parse("title").expect("static selector");
    if let Some(t) = document.select(&title_sel).next() {
        let text = t.text().collect::<String>().trim().to_string();
        if !text.is_empty() {
            return text;
        }
    }
    let h1_sel = Selector::parse("h1").expect("static selector");
    document
        .select(&h1_sel)
        .next()
        .map(|h| h.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Page language: `<html lang>` → `content-language` meta → whatlang over
/// the extracted text. Defaults to `"en"`.
fn detect_language(document: &Html, text: &str) -> String {
    let html_sel = Selector::parse("html").expect("static selector");
    if let Some(html_el) = document.select(&html_sel).next() {
        if let Some(lang) = html_el.value().attr("lang") {
            let lang = lang.trim();
            if !lang.is_empty() {
                return lang.split('-').next().unwrap_or(lang).to_lowercase();
            }
        }
    }

    let meta_sel =
        Selector::parse(r#"meta[http-equiv="content-language"]"#).expect("static selector");
    if let Some(meta) = document.select(&meta_sel).next() {
        if let Some(content) = meta.value().attr("content") {
            let content = content.trim();
            if !content.is_empty() {
                return content.split('-').next().unwrap_or(content).to_lowercase();
            }
        }
    }

    match whatlang::detect(text).map(|info| info.lang()) {
        Some(Lang::Eng) | None => "en".to_string(),
        Some(Lang::Spa) => "es".to_string(),
        Some(Lang::Fra) => "fr".to_string(),
        Some(Lang::Deu) => "de".to_string(),
        Some(Lang::Ita) => "it".to_string(),
        Some(Lang::Por) => "pt".to_string(),
        Some(Lang::Rus) => "ru".to_string(),
        Some(Lang::Jpn) => "ja".to_string(),
        Some(Lang::Kor) => "ko".to_string(),
        Some(Lang::Cmn) => "zh".to_string(),
        Some(Lang::Nld) => "nl".to_string(),
        Some(other) => other.code().to_string(),
    }
}

/// Last-resort sweep when the main walk produced nothing: every heading and
/// paragraph in the whole document with at least 3 chars of text.
fn fallback_sweep(document: &Html) -> Vec<Element> {
    let selector = Selector::parse("h1, h2, h3, h4, h5, h6, p").expect("static selector");
    let mut out = Vec::new();
    for el in document.select(&selector) {
        let text = el
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if text.chars().count() < 3 {
            continue;
        }
        let tag = el.value().name();
        if let Some(level) = tag.strip_prefix('h').and_then(|d| d.parse::<u8>().ok()) {
            out.push(Element::Heading { level, text });
        } else {
            out.push(Element::Paragraph { text });
        }
    }
    out
}

/// Extract a page into its element stream.
pub fn extract(html: &str, url: &str, opts: &ExtractOptions) -> ScrapedPage {
    let document = Html::parse_document(html);
    let base_url = Url::parse(url).unwrap_or_else(|_| {
        Url::parse("https://invalid.local/").expect("static fallback url")
    });

    let exclude_selectors = opts
        .exclude_selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect();
    let ctx = WalkContext {
        base_url: &base_url,
        exclude_selectors,
    };

    let mut out: Vec<Element> = Vec::new();
    match select_main_content(&document, opts) {
        Some(main) => elements::walk_children(&main, &ctx, &mut out),
        None => {
            let body_sel = Selector::parse("body").expect("static selector");
            if let Some(body) = document.select(&body_sel).next() {
                elements::walk_children(&body, &ctx, &mut out);
            }
        }
    }

    if out.is_empty() {
        out = fallback_sweep(&document);
    }

    let all_text = out
        .iter()
        .map(|e| e.text_content())
        .collect::<Vec<_>>()
        .join("\n");
    let word_count = all_text.split_whitespace().count();
    let language = detect_language(&document, &all_text);

    let structured_data = if opts.structured_data {
        let data = structured::extract_structured_data(&document);
        (!data.is_empty()).then_some(data)
    } else {
        None
    };

    ScrapedPage {
        url: url.to_string(),
        title: extract_title(&document),
        timestamp: Utc::now().to_rfc3339(),
        word_count,
        language,
        elements: out,
        structured_data,
    }
}
