//! Scraping endpoints: discovery, sitemap parsing, content extraction and
//! link crawling.

use crate::api::projects::{internal_error, not_found};
use crate::core::model::{Element, MediaKind, PageResult};
use crate::core::settings::ScrapingSettings;
use crate::core::types::*;
use crate::core::AppState;
use crate::scraping::extractor::{self, ExtractOptions};
use crate::scraping::{detect, sitemap};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use futures::stream::{self, StreamExt};
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

type ApiError = (StatusCode, Json<ErrorBody>);

/// Hard cap on URLs per content-scrape call.
const MAX_CONTENT_URLS: usize = 10;

fn extract_options(settings: &ScrapingSettings) -> ExtractOptions {
    ExtractOptions {
        content_selectors: settings.content_selectors.clone(),
        exclude_selectors: settings.exclude_selectors.clone(),
        structured_data: settings.extract_structured_data,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// POST /api/scrape/discover
// ─────────────────────────────────────────────────────────────────────────────

pub async fn discover(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DiscoverRequest>,
) -> Result<Json<DiscoverResponse>, ApiError> {
    let domain = sitemap::normalize_domain(&request.domain);
    if domain.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::for_field("domain is required", "domain")),
        ));
    }

    if let Some(cached) = state.discovery_cache.get(&domain).await {
        return Ok(Json(cached));
    }

    let sitemaps = sitemap::discover(&state.http_client, &domain).await;

    // CMS label probe only; the pipeline stays selector-driven.
    let homepage = state
        .http_client
        .get(format!("https://{domain}/"))
        .send()
        .await
        .ok();
    let is_wiki_js = match homepage {
        Some(response) => response
            .text()
            .await
            .map(|body| detect::is_wiki_js(&body))
            .unwrap_or(false),
        None => false,
    };

    let wiki_js_pages = if is_wiki_js {
        match sitemaps.first() {
            Some(first) => fetch_sitemap_locs(&state, first, &domain).await,
            None => None,
        }
    } else {
        None
    };

    let response = DiscoverResponse {
        sitemaps,
        is_wiki_js,
        wiki_js_pages,
    };
    state
        .discovery_cache
        .insert(domain, response.clone())
        .await;
    Ok(Json(response))
}

async fn fetch_sitemap_locs(
    state: &AppState,
    sitemap_url: &str,
    domain: &str,
) -> Option<Vec<String>> {
    let body = state
        .http_client
        .get(sitemap_url)
        .send()
        .await
        .ok()?
        .text()
        .await
        .ok()?;
    let parse = sitemap::parse_sitemap(&body, domain);
    (!parse.urls.is_empty()).then(|| parse.urls.into_iter().map(|u| u.loc).collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// POST /api/scrape/sitemap
// ─────────────────────────────────────────────────────────────────────────────

pub async fn parse_sitemap_url(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SitemapRequest>,
) -> Result<Json<SitemapResponse>, ApiError> {
    let domain = Url::parse(&request.url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::for_field("invalid sitemap url", "url")),
            )
        })?;

    let body = match state.http_client.get(&request.url).send().await {
        Ok(response) => response.text().await.unwrap_or_default(),
        Err(e) => {
            warn!("sitemap fetch failed for {}: {e}", request.url);
            String::new()
        }
    };

    let parse = sitemap::parse_sitemap(&body, &domain);
    Ok(Json(SitemapResponse {
        urls: parse.urls,
        sub_sitemaps: parse.sub_sitemaps,
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// POST /api/scrape/content
// ─────────────────────────────────────────────────────────────────────────────

pub async fn scrape_content(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ContentScrapeRequest>,
) -> Result<Json<ContentScrapeResponse>, ApiError> {
    if request.urls.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::for_field("urls must not be empty", "urls")),
        ));
    }
    let urls: Vec<String> = request.urls.into_iter().take(MAX_CONTENT_URLS).collect();

    let settings = match request.project_id {
        Some(id) => state
            .repo
            .get(id)
            .await
            .map_err(internal_error)?
            .ok_or_else(|| not_found("project"))?
            .settings
            .scraping,
        None => ScrapingSettings::default(),
    };

    let fetcher = state.fetcher_for(request.project_id, &settings);
    let opts = Arc::new(extract_options(&settings));

    let mut indexed: Vec<(usize, ContentScrapeResult)> = stream::iter(urls.into_iter().enumerate())
        .map(|(index, url)| {
            let fetcher = Arc::clone(&fetcher);
            let opts = Arc::clone(&opts);
            async move {
                let result = match fetcher.fetch(&url).await {
                    Ok(outcome) => {
                        let page = extractor::extract(&outcome.body, &url, &opts);
                        info!(
                            "scraped {} ({} elements, {} words)",
                            url,
                            page.elements.len(),
                            page.word_count
                        );
                        ContentScrapeResult {
                            url,
                            data: Some(page),
                            error: None,
                            used_proxy: outcome.used_proxy,
                        }
                    }
                    Err(e) => {
                        warn!("scrape failed for {url}: {e}");
                        ContentScrapeResult {
                            url,
                            data: None,
                            error: Some(e.to_string()),
                            used_proxy: None,
                        }
                    }
                };
                (index, result)
            }
        })
        .buffer_unordered(settings.parallel_requests.max(1))
        .collect()
        .await;

    // buffer_unordered completes out of order; restore request order so the
    // project's insertion order (and chunk ids) stays deterministic.
    indexed.sort_by_key(|(index, _)| *index);
    let ordered: Vec<ContentScrapeResult> = indexed.into_iter().map(|(_, r)| r).collect();

    if let Some(project_id) = request.project_id {
        let page_results: Vec<PageResult> = ordered
            .iter()
            .map(|r| PageResult {
                url: r.url.clone(),
                success: r.data.is_some(),
                data: r.data.clone(),
                error: r.error.clone(),
                used_proxy: r.used_proxy.clone(),
            })
            .collect();
        state
            .repo
            .append_results(project_id, page_results)
            .await
            .map_err(internal_error)?;
    }

    let rate_limit_state = Some(fetcher.limiter().snapshot().await);
    let proxy_info = match fetcher.rotator() {
        Some(rotator) => Some(rotator.info().await),
        None => None,
    };

    Ok(Json(ContentScrapeResponse {
        results: ordered,
        rate_limit_state,
        proxy_info,
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// POST /api/scrape/crawl
// ─────────────────────────────────────────────────────────────────────────────

/// Skip anchors, scripts and non-web schemes when resolving candidate links.
fn resolve_link(base: &Url, href: &str) -> Option<String> {
    if href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }
    let mut resolved = base.join(href).ok()?;
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }
    resolved.set_fragment(None);
    Some(resolved.to_string())
}

fn page_links(html: &str, page_url: &Url, domain: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("static selector");
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(resolved) = resolve_link(page_url, href) else {
            continue;
        };
        if sitemap::same_domain(&resolved, domain) && seen.insert(resolved.clone()) {
            links.push(resolved);
        }
    }
    links
}

pub async fn crawl(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CrawlRequest>,
) -> Result<Json<CrawlResponse>, ApiError> {
    if request.urls.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::for_field("urls must not be empty", "urls")),
        ));
    }

    let settings = ScrapingSettings::default();
    let fetcher = state.fetcher_for(None, &settings);
    let opts = Arc::new(extract_options(&settings));
    let domain = request.domain.clone();

    let results: Vec<CrawlLinkResult> = stream::iter(request.urls)
        .map(|url| {
            let fetcher = Arc::clone(&fetcher);
            let opts = Arc::clone(&opts);
            let domain = domain.clone();
            async move {
                let parsed = match Url::parse(&url) {
                    Ok(u) => u,
                    Err(e) => {
                        return CrawlLinkResult {
                            url,
                            links: vec![],
                            data: None,
                            error: Some(format!("invalid url: {e}")),
                        }
                    }
                };
                match fetcher.fetch(&url).await {
                    Ok(outcome) => {
                        let links = page_links(&outcome.body, &parsed, &domain);
                        let page = extractor::extract(&outcome.body, &url, &opts);
                        let mut images = Vec::new();
                        let mut videos = Vec::new();
                        for element in &page.elements {
                            if let Element::Media { kind, src, .. } = element {
                                match kind {
                                    MediaKind::Image => images.push(src.clone()),
                                    MediaKind::Video => videos.push(src.clone()),
                                }
                            }
                        }
                        CrawlLinkResult {
                            url,
                            links,
                            data: Some(CrawlPageMeta {
                                title: page.title,
                                images,
                                videos,
                            }),
                            error: None,
                        }
                    }
                    Err(e) => CrawlLinkResult {
                        url,
                        links: vec![],
                        data: None,
                        error: Some(e.to_string()),
                    },
                }
            }
        })
        .buffer_unordered(settings.parallel_requests.max(1))
        .collect()
        .await;

    Ok(Json(CrawlResponse { results }))
}
