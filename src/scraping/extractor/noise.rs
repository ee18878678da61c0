//! Noise filtering for the element walk: chrome tags, boilerplate class/id
//! substrings and navigation roles are pruned wholesale.

use aho_corasick::AhoCorasick;
use scraper::ElementRef;
use std::sync::OnceLock;

/// Tags that never carry readable prose.
pub const NOISE_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "iframe", "svg", "form",
];

/// Class/id substrings that mark boilerplate subtrees.
const NOISE_IDENTIFIERS: &[&str] = &[
    "navigation",
    "menu",
    "sidebar",
    "breadcrumb",
    "toc",
    "footer",
    "header",
    "banner",
    "ad",
    "ads",
    "social-share",
    "related-posts",
    "comments",
    "cookie-banner",
    "popup",
    "modal",
];

fn noise_matcher() -> &'static AhoCorasick {
    static MATCHER: OnceLock<AhoCorasick> = OnceLock::new();
    MATCHER.get_or_init(|| {
        AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(NOISE_IDENTIFIERS)
            .expect("static pattern set")
    })
}

pub fn is_noise_tag(tag: &str) -> bool {
    NOISE_TAGS.contains(&tag)
}

/// Substring match over a class or id attribute value.
pub fn is_noise_identifier(ident: &str) -> bool {
    noise_matcher().is_match(ident)
}

/// Whole-element noise check: tag, class/id substrings, navigation role.
pub fn is_noise_element(el: &ElementRef) -> bool {
    let value = el.value();
    if is_noise_tag(value.name()) {
        return true;
    }
    if let Some(class) = value.attr("class") {
        if is_noise_identifier(class) {
            return true;
        }
    }
    if let Some(id) = value.attr("id") {
        if is_noise_identifier(id) {
            return true;
        }
    }
    value.attr("role") == Some("navigation")
}
