//! Classified error kinds shared across the fetch, pipeline and storage
//! layers. Handlers map these onto HTTP status codes; the orchestrator maps
//! them onto per-URL project errors versus fatal aborts.

use thiserror::Error;

/// Errors from a single page fetch. Rate-limit and auth responses are
/// distinct variants so callers can back off or bail instead of retrying
/// blindly.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("rate limited (HTTP 429)")]
    RateLimited { retry_after: Option<u64> },

    #[error("blocked by authentication (HTTP {0})")]
    AuthBlocked(u16),

    #[error("network error: {0}")]
    Network(String),
}

impl FetchError {
    pub fn from_reqwest(err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(timeout_ms)
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("project {0} not found")]
    ProjectNotFound(i64),

    #[error("a chunking job is already running for project {0}")]
    JobAlreadyRunning(i64),

    #[error("no scraped content available — run content scraping first")]
    NoScrapedContent,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the remote embeddings/chat provider.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("invalid API key (HTTP 401)")]
    Auth,

    #[error("provider rate limited")]
    RateLimited { retry_after: Option<u64> },

    #[error("provider error: {0}")]
    Transient(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}
