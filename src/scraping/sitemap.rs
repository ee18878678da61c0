//! Sitemap discovery and parsing. Discovery is best-effort: every probe
//! failure is swallowed, and anything that looks like a urlset or a sitemap
//! index counts.

use crate::core::types::{SitemapEntry, SitemapImage, SitemapVideo};
use futures::future::join_all;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const PROBE_PATHS: &[&str] = &[
    "/robots.txt",
    "/sitemap.xml",
    "/sitemap_index.xml",
    "/sitemap-index.xml",
    "/sitemap1.xml",
];

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default, PartialEq)]
pub struct SitemapParse {
    pub urls: Vec<SitemapEntry>,
    pub sub_sitemaps: Vec<String>,
}

/// Normalize a user-supplied domain down to a bare host: scheme, path and a
/// leading `www.` are stripped.
pub fn normalize_domain(domain: &str) -> String {
    let trimmed = domain.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let host = without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .trim_end_matches('.');
    host.strip_prefix("www.").unwrap_or(host).to_lowercase()
}

/// Same-registrable-domain filter: host equals the target or is one of its
/// subdomains, after `www.` stripping on both sides.
pub fn same_domain(url: &str, target: &str) -> bool {
    let target = normalize_domain(target);
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.strip_prefix("www.").unwrap_or(host).to_lowercase();
    host == target || host.ends_with(&format!(".{target}"))
}

fn looks_like_sitemap(body: &str) -> bool {
    body.contains("<urlset") || body.contains("<sitemapindex")
}

/// Probe the well-known sitemap locations plus robots.txt in parallel and
/// return every discovered sitemap URL on the target domain.
pub async fn discover(client: &Client, domain: &str) -> Vec<String> {
    let host = normalize_domain(domain);
    let base = format!("https://{host}");

    let probes = PROBE_PATHS.iter().map(|path| {
        let url = format!("{base}{path}");
        let client = client.clone();
        async move {
            let response = client
                .get(&url)
                .timeout(PROBE_TIMEOUT)
                .send()
                .await
                .ok()?;
            if !response.status().is_success() {
                return None;
            }
            let body = response.text().await.ok()?;
            Some((url, body))
        }
    });

    let mut found: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for result in join_all(probes).await.into_iter().flatten() {
        let (url, body) = result;
        if url.ends_with("/robots.txt") {
            for directive in robots_sitemaps(&body) {
                if same_domain(&directive, &host) && seen.insert(directive.clone()) {
                    found.push(directive);
                }
            }
        } else if looks_like_sitemap(&body) && seen.insert(url.clone()) {
            found.push(url);
        }
    }

    info!("discovered {} sitemap(s) for {}", found.len(), host);
    found
}

/// Every `Sitemap:` directive in a robots.txt body.
pub fn robots_sitemaps(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| {
            let line = line.trim();
            let rest = line
                .strip_prefix("Sitemap:")
                .or_else(|| line.strip_prefix("sitemap:"))?;
            let url = rest.trim();
            (!url.is_empty()).then(|| url.to_string())
        })
        .collect()
}

fn child_text(node: &roxmltree::Node, name: &str) -> Option<String> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
        .and_then(|c| c.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Parse a urlset or sitemapindex document. Malformed XML yields the empty
/// result; all emitted URLs are filtered to the target domain.
pub fn parse_sitemap(xml: &str, domain: &str) -> SitemapParse {
    let doc = match roxmltree::Document::parse(xml) {
        Ok(doc) => doc,
        Err(e) => {
            debug!("sitemap parse error: {e}");
            return SitemapParse::default();
        }
    };

    let root = doc.root_element();
    let mut parse = SitemapParse::default();

    match root.tag_name().name() {
        "sitemapindex" => {
            for sm in root
                .children()
                .filter(|c| c.is_element() && c.tag_name().name() == "sitemap")
            {
                if let Some(loc) = child_text(&sm, "loc") {
                    if same_domain(&loc, domain) {
                        parse.sub_sitemaps.push(loc);
                    }
                }
            }
        }
        "urlset" => {
            for url_node in root
                .children()
                .filter(|c| c.is_element() && c.tag_name().name() == "url")
            {
                let Some(loc) = child_text(&url_node, "loc") else {
                    continue;
                };
                if !same_domain(&loc, domain) {
                    continue;
                }

                let mut entry = SitemapEntry {
                    loc,
                    lastmod: child_text(&url_node, "lastmod"),
                    changefreq: child_text(&url_node, "changefreq"),
                    priority: child_text(&url_node, "priority")
                        .and_then(|p| p.parse::<f64>().ok()),
                    ..Default::default()
                };

                for child in url_node.children().filter(|c| c.is_element()) {
                    match child.tag_name().name() {
                        "image" => {
                            if let Some(loc) = child_text(&child, "loc") {
                                entry.images.push(SitemapImage {
                                    loc,
                                    title: child_text(&child, "title"),
                                });
                            }
                        }
                        "video" => {
                            entry.videos.push(SitemapVideo {
                                title: child_text(&child, "title"),
                                thumbnail_loc: child_text(&child, "thumbnail_loc"),
                            });
                        }
                        _ => {}
                    }
                }

                parse.urls.push(entry);
            }
        }
        _ => {}
    }

    parse
}
