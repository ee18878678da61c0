//! Structured-data harvesting: JSON-LD blobs, Schema.org microdata,
//! OpenGraph and Twitter-card meta tags.

use crate::core::model::{SchemaOrgItem, StructuredData};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;

fn sel(s: &str) -> Selector {
    Selector::parse(s).expect("static selector")
}

/// Parse every `<script type="application/ld+json">` body; invalid JSON is
/// dropped silently.
fn extract_json_ld(document: &Html) -> Vec<serde_json::Value> {
    let selector = sel(r#"script[type="application/ld+json"]"#);
    document
        .select(&selector)
        .filter_map(|script| {
            let body = script.inner_html();
            if body.trim().is_empty() {
                return None;
            }
            serde_json::from_str::<serde_json::Value>(&body).ok()
        })
        .collect()
}

/// Microdata property value, depending on the carrying tag.
fn itemprop_value(el: &ElementRef) -> String {
    let v = el.value();
    match v.name() {
        "meta" => v.attr("content").unwrap_or("").to_string(),
        "link" | "a" => v.attr("href").unwrap_or("").to_string(),
        "img" | "video" | "audio" | "source" => v.attr("src").unwrap_or("").to_string(),
        "time" => v
            .attr("datetime")
            .map(str::to_string)
            .unwrap_or_else(|| el.text().collect::<String>().trim().to_string()),
        "data" => v.attr("value").unwrap_or("").to_string(),
        _ => el
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// Short type label from an `itemtype` URL (last path/fragment segment).
fn type_label(itemtype: &str) -> Option<String> {
    let trimmed = itemtype.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let label = trimmed
        .rsplit(['/', '#'])
        .next()
        .unwrap_or(trimmed)
        .to_string();
    (!label.is_empty()).then_some(label)
}

/// Walk one itemscope's subtree collecting itemprops, stopping at nested
/// itemscopes — those are harvested as independent entries.
fn collect_scope_properties(scope: &ElementRef, properties: &mut HashMap<String, String>) {
    for child in scope.children() {
        let Some(el) = ElementRef::wrap(child) else {
            continue;
        };
        if el.value().attr("itemscope").is_some() {
            continue;
        }
        if let Some(name) = el.value().attr("itemprop") {
            let name = name.trim();
            if !name.is_empty() {
                properties
                    .entry(name.to_string())
                    .or_insert_with(|| itemprop_value(&el));
            }
        }
        collect_scope_properties(&el, properties);
    }
}

fn extract_schema_org(document: &Html) -> Vec<SchemaOrgItem> {
    let selector = sel("[itemscope]");
    document
        .select(&selector)
        .filter_map(|scope| {
            let mut properties = HashMap::new();
            collect_scope_properties(&scope, &mut properties);
            let item_type = scope.value().attr("itemtype").and_then(type_label);
            if properties.is_empty() && item_type.is_none() {
                return None;
            }
            Some(SchemaOrgItem {
                item_type,
                properties,
            })
        })
        .collect()
}

/// `<meta property="og:*">` map, prefix stripped.
fn extract_prefixed_meta(document: &Html, attrs: &[&str], prefix: &str) -> HashMap<String, String> {
    let selector = sel("meta");
    let mut map = HashMap::new();
    for meta in document.select(&selector) {
        let key = attrs
            .iter()
            .find_map(|a| meta.value().attr(a))
            .unwrap_or("");
        let Some(stripped) = key.strip_prefix(prefix) else {
            continue;
        };
        let Some(content) = meta.value().attr("content") else {
            continue;
        };
        if !stripped.is_empty() && !content.trim().is_empty() {
            map.entry(stripped.to_string())
                .or_insert_with(|| content.trim().to_string());
        }
    }
    map
}

pub fn extract_structured_data(document: &Html) -> StructuredData {
    StructuredData {
        json_ld: extract_json_ld(document),
        schema_org: extract_schema_org(document),
        open_graph: extract_prefixed_meta(document, &["property"], "og:"),
        twitter_card: extract_prefixed_meta(document, &["name", "property"], "twitter:"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_ld_keeps_valid_and_drops_invalid() {
        let doc = Html::parse_document(
            r#"<html><head>
              <script type="application/ld+json">{"@type":"Article","headline":"Hi"}</script>
              <script type="application/ld+json">{not json</script>
            </head><body></body></html>"#,
        );
        let data = extract_structured_data(&doc);
        assert_eq!(data.json_ld.len(), 1);
        assert_eq!(data.json_ld[0]["@type"], "Article");
    }

    #[test]
    fn microdata_scopes_are_independent() {
        let doc = Html::parse_document(
            r#"<body>
              <div itemscope itemtype="https://schema.org/Person">
                <span itemprop="name">Ada Lovelace</span>
                <div itemscope itemtype="https://schema.org/Organization">
                  <span itemprop="name">Analytical Engines Ltd</span>
                </div>
              </div>
            </body>"#,
        );
        let data = extract_structured_data(&doc);
        assert_eq!(data.schema_org.len(), 2);
        let person = data
            .schema_org
            .iter()
            .find(|i| i.item_type.as_deref() == Some("Person"))
            .unwrap();
        assert_eq!(person.properties["name"], "Ada Lovelace");
        let org = data
            .schema_org
            .iter()
            .find(|i| i.item_type.as_deref() == Some("Organization"))
            .unwrap();
        assert_eq!(org.properties["name"], "Analytical Engines Ltd");
    }

    #[test]
    fn microdata_values_follow_tag_semantics() {
        let doc = Html::parse_document(
            r#"<body><div itemscope itemtype="https://schema.org/Article">
                <meta itemprop="datePublished" content="2026-02-01">
                <img itemprop="image" src="/hero.png">
                <time itemprop="dateModified" datetime="2026-03-01">March</time>
              </div></body>"#,
        );
        let data = extract_structured_data(&doc);
        let article = &data.schema_org[0];
        assert_eq!(article.properties["datePublished"], "2026-02-01");
        assert_eq!(article.properties["image"], "/hero.png");
        assert_eq!(article.properties["dateModified"], "2026-03-01");
    }

    #[test]
    fn og_and_twitter_prefixes_are_stripped() {
        let doc = Html::parse_document(
            r#"<head>
              <meta property="og:title" content="Page Title">
              <meta property="og:image" content="https://example.com/x.png">
              <meta name="twitter:card" content="summary">
              <meta property="twitter:site" content="@example">
            </head>"#,
        );
        let data = extract_structured_data(&doc);
        assert_eq!(data.open_graph["title"], "Page Title");
        assert_eq!(data.open_graph["image"], "https://example.com/x.png");
        assert_eq!(data.twitter_card["card"], "summary");
        assert_eq!(data.twitter_card["site"], "@example");
    }
}
