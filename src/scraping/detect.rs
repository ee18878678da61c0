//! CMS label detection. Deliberately shallow: the pipeline is selector
//! driven, so the detector only reports a label for the discovery response.

use scraper::{Html, Selector};

/// Wiki.js sites announce themselves through the generator meta tag or the
/// hydration globals in the page shell.
pub fn is_wiki_js(homepage_html: &str) -> bool {
    let document = Html::parse_document(homepage_html);
    let meta_sel = Selector::parse(r#"meta[name="generator"]"#).expect("static selector");
    if let Some(meta) = document.select(&meta_sel).next() {
        if let Some(content) = meta.value().attr("content") {
            if content.to_ascii_lowercase().contains("wiki.js") {
                return true;
            }
        }
    }
    homepage_html.contains("window.siteConfig") && homepage_html.contains("wiki")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_meta_is_detected() {
        let html = r#"<html><head><meta name="generator" content="Wiki.js 2.5"></head><body></body></html>"#;
        assert!(is_wiki_js(html));
    }

    #[test]
    fn plain_pages_are_not_wiki_js() {
        let html = r#"<html><head><meta name="generator" content="WordPress 6.4"></head><body></body></html>"#;
        assert!(!is_wiki_js(html));
        assert!(!is_wiki_js("<html><body>hello</body></html>"));
    }
}
