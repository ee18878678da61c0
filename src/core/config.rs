use std::path::PathBuf;

// ---------------------------------------------------------------------------
// FileConfig — file-based config loader (sitepack.json) with env-var fallback
// ---------------------------------------------------------------------------

/// AI provider sub-config (mirrors the `ai_provider` key in sitepack.json).
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct AiProviderConfig {
    /// Provider endpoint — e.g. `https://api.openai.com/v1` or
    /// `http://localhost:11434/v1` (Ollama).
    pub base_url: Option<String>,
    /// API key. Never logged. Leave blank for key-less local endpoints.
    pub api_key: Option<String>,
}

impl AiProviderConfig {
    /// API key: JSON field → `OPENAI_API_KEY` env var → `None`.
    ///
    /// An explicit empty string in the config file means "no key required"
    /// (local endpoint). `None` means AI phases are disabled for the job.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(k) = &self.api_key {
            return Some(k.trim().to_string());
        }
        std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
    }

    /// Base URL: JSON field → `OPENAI_BASE_URL` env var → the public default.
    pub fn resolve_base_url(&self) -> String {
        if let Some(u) = &self.base_url {
            if !u.trim().is_empty() {
                return u.trim_end_matches('/').to_string();
            }
        }
        std::env::var("OPENAI_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
    }
}

/// Top-level config loaded from `sitepack.json`.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct FileConfig {
    #[serde(default)]
    pub ai_provider: AiProviderConfig,
}

/// Load `sitepack.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `SITEPACK_CONFIG` env var path
/// 2. `./sitepack.json`
/// 3. `../sitepack.json`
///
/// Missing file → defaults (env-var fallbacks apply). Parse error → warn and
/// return defaults.
pub fn load_file_config() -> FileConfig {
    let candidates: Vec<PathBuf> = {
        let mut v = vec![
            PathBuf::from("sitepack.json"),
            PathBuf::from("../sitepack.json"),
        ];
        if let Ok(env_path) = std::env::var("SITEPACK_CONFIG") {
            v.insert(0, PathBuf::from(env_path));
        }
        v
    };

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<FileConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("sitepack.json loaded from {}", path.display());
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        "sitepack.json parse error at {}: {} — using defaults",
                        path.display(),
                        e
                    );
                    return FileConfig::default();
                }
            },
            Err(_) => continue,
        }
    }

    FileConfig::default()
}

// ---------------------------------------------------------------------------

pub const ENV_DATA_DIR: &str = "SITEPACK_DATA_DIR";

/// Directory for persisted projects and settings.
///
/// `SITEPACK_DATA_DIR` env override → `~/.sitepack`.
pub fn data_dir() -> Option<PathBuf> {
    if let Ok(v) = std::env::var(ENV_DATA_DIR) {
        let v = v.trim();
        if !v.is_empty() {
            return Some(PathBuf::from(v));
        }
    }
    let home = dirs::home_dir()?;
    Some(home.join(".sitepack"))
}

/// Generator label written into pack manifests.
pub fn generator_name() -> String {
    format!("sitepack/{}", env!("CARGO_PKG_VERSION"))
}
