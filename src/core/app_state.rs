use crate::core::config::FileConfig;
use crate::core::types::DiscoverResponse;
use crate::pipeline::orchestrator::{JobContext, JobRegistry};
use crate::scraping::fetcher::Fetcher;
use crate::storage::ProjectRepository;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub http_client: reqwest::Client,
    pub repo: Arc<dyn ProjectRepository>,
    /// Live chunking jobs, one per project at most.
    pub jobs: Arc<JobRegistry>,
    /// Per-project fetchers so rate-limiter and proxy state survive across
    /// scrape calls.
    pub fetchers: Arc<DashMap<i64, Arc<Fetcher>>>,
    /// Sitemap discovery is slow (five parallel probes); cache per domain.
    pub discovery_cache: moka::future::Cache<String, DiscoverResponse>,
    /// File-based config loaded from `sitepack.json` (env-var fallback for
    /// all fields).
    pub file_config: Arc<FileConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("live_jobs", &"<registry>")
            .finish()
    }
}

impl AppState {
    pub fn new(http_client: reqwest::Client, repo: Arc<dyn ProjectRepository>) -> Self {
        Self {
            http_client,
            repo,
            jobs: Arc::new(JobRegistry::new()),
            fetchers: Arc::new(DashMap::new()),
            discovery_cache: moka::future::Cache::builder()
                .max_capacity(1_000)
                .time_to_live(std::time::Duration::from_secs(60 * 10))
                .build(),
            file_config: Arc::new(crate::core::config::load_file_config()),
        }
    }

    pub fn with_file_config(mut self, config: FileConfig) -> Self {
        self.file_config = Arc::new(config);
        self
    }

    /// Per-project fetcher, created on first use so adaptive-delay and proxy
    /// state persist across scrape calls. Project-less calls get a transient
    /// fetcher.
    pub fn fetcher_for(
        &self,
        project_id: Option<i64>,
        settings: &crate::core::settings::ScrapingSettings,
    ) -> Arc<Fetcher> {
        match project_id {
            Some(id) => Arc::clone(
                &self
                    .fetchers
                    .entry(id)
                    .or_insert_with(|| {
                        Arc::new(Fetcher::new(self.http_client.clone(), settings))
                    }),
            ),
            None => Arc::new(Fetcher::new(self.http_client.clone(), settings)),
        }
    }

    pub fn job_context(&self) -> JobContext {
        JobContext {
            repo: Arc::clone(&self.repo),
            http_client: self.http_client.clone(),
            file_config: Arc::clone(&self.file_config),
        }
    }
}
