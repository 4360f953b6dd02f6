use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::categories::{TopicCategory, default_categories};
use crate::{SecretValue, WebResearchError, optional_env, require_env};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const CONFIG_PATH_ENV: &str = "WEBRESEARCH_CONFIG";

/// Top-level configuration structure. Every section has defaults, so an empty
/// file (or no file at all) yields a working setup once the LLM key is set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Resolve the configured LLM secret value (from environment only).
    pub fn llm_api_key(&self) -> Result<SecretValue, WebResearchError> {
        require_env(&self.llm.api_key_env)
    }

    /// The search key is optional; without it the client serves fallback data.
    pub fn search_api_key(&self) -> Option<SecretValue> {
        optional_env(&self.search.api_key_env)
    }
}

/// Helper to load configuration with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `WEBRESEARCH_CONFIG` environment variable.
    /// 3. `config.toml` in the current working directory, if present.
    ///
    /// Explicit paths must exist; a missing default file falls back to
    /// built-in defaults.
    pub fn load(path: Option<PathBuf>) -> Result<Config, WebResearchError> {
        let config = match resolve_path(path) {
            Resolved::Explicit(candidate) => Self::read(&candidate)?,
            Resolved::Default(candidate) if candidate.exists() => Self::read(&candidate)?,
            Resolved::Default(_) => Config::default(),
        };

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Config, WebResearchError> {
        toml::from_str(raw).map_err(|err| WebResearchError::InvalidConfiguration(err.to_string()))
    }

    fn read(path: &Path) -> Result<Config, WebResearchError> {
        let raw = fs::read_to_string(path)
            .map_err(|err| WebResearchError::config_io(path.to_path_buf(), err))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(config: &Config) -> Result<(), WebResearchError> {
        if config.llm.api_key_env.trim().is_empty() {
            return Err(WebResearchError::InvalidConfiguration(
                "llm.api_key_env must reference an environment variable".into(),
            ));
        }
        if config.search.max_results == 0 {
            return Err(WebResearchError::InvalidConfiguration(
                "search.max_results must be greater than zero".into(),
            ));
        }
        if config.search.results_per_query == 0 {
            return Err(WebResearchError::InvalidConfiguration(
                "search.results_per_query must be greater than zero".into(),
            ));
        }
        if config.search.jitter_min_ms > config.search.jitter_max_ms {
            return Err(WebResearchError::InvalidConfiguration(
                "search.jitter_min_ms must not exceed search.jitter_max_ms".into(),
            ));
        }

        // The LLM key is required up front; running without it is a fatal error.
        require_env(&config.llm.api_key_env)?;
        Ok(())
    }
}

enum Resolved {
    Explicit(PathBuf),
    Default(PathBuf),
}

fn resolve_path(path: Option<PathBuf>) -> Resolved {
    if let Some(path) = path {
        return Resolved::Explicit(path);
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return Resolved::Explicit(PathBuf::from(from_env));
        }
    }

    Resolved::Default(Path::new(DEFAULT_CONFIG_PATH).to_path_buf())
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "LlmConfig::default_provider")]
    pub provider: String,
    #[serde(default = "LlmConfig::default_model")]
    pub model: String,
    #[serde(default = "LlmConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "LlmConfig::default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "LlmConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl LlmConfig {
    fn default_provider() -> String {
        "groq".to_string()
    }

    fn default_model() -> String {
        "llama3-70b-8192".to_string()
    }

    fn default_base_url() -> String {
        "https://api.groq.com/openai/v1".to_string()
    }

    fn default_api_key_env() -> String {
        "GROQ_API_KEY".to_string()
    }

    const fn default_timeout_secs() -> u64 {
        60
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Self::default_provider(),
            model: Self::default_model(),
            base_url: Self::default_base_url(),
            api_key_env: Self::default_api_key_env(),
            timeout_secs: Self::default_timeout_secs(),
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "SearchConfig::default_endpoint")]
    pub endpoint: String,
    #[serde(default = "SearchConfig::default_api_key_env")]
    pub api_key_env: String,
    /// `num` sent to the provider for each query variant.
    #[serde(default = "SearchConfig::default_results_per_query")]
    pub results_per_query: usize,
    /// Cap applied after deduplication and ranking.
    #[serde(default = "SearchConfig::default_max_results")]
    pub max_results: usize,
    #[serde(default = "SearchConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "SearchConfig::default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "SearchConfig::default_jitter_min_ms")]
    pub jitter_min_ms: u64,
    #[serde(default = "SearchConfig::default_jitter_max_ms")]
    pub jitter_max_ms: u64,
    #[serde(default = "SearchConfig::default_variant_suffixes")]
    pub variant_suffixes: Vec<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub time_filter: Option<String>,
    #[serde(default = "default_categories")]
    pub categories: Vec<TopicCategory>,
}

impl SearchConfig {
    fn default_endpoint() -> String {
        "https://google.serper.dev/search".to_string()
    }

    fn default_api_key_env() -> String {
        "SERPER_API_KEY".to_string()
    }

    const fn default_results_per_query() -> usize {
        3
    }

    const fn default_max_results() -> usize {
        5
    }

    const fn default_timeout_secs() -> u64 {
        10
    }

    const fn default_min_delay_ms() -> u64 {
        1_000
    }

    const fn default_jitter_min_ms() -> u64 {
        200
    }

    const fn default_jitter_max_ms() -> u64 {
        800
    }

    fn default_variant_suffixes() -> Vec<String> {
        vec!["definition".to_string(), "explained".to_string()]
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            api_key_env: Self::default_api_key_env(),
            results_per_query: Self::default_results_per_query(),
            max_results: Self::default_max_results(),
            timeout_secs: Self::default_timeout_secs(),
            min_delay_ms: Self::default_min_delay_ms(),
            jitter_min_ms: Self::default_jitter_min_ms(),
            jitter_max_ms: Self::default_jitter_max_ms(),
            variant_suffixes: Self::default_variant_suffixes(),
            region: None,
            time_filter: None,
            categories: default_categories(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "CacheConfig::default_dir")]
    pub dir: PathBuf,
    #[serde(default = "CacheConfig::default_ttl_hours")]
    pub default_ttl_hours: u64,
    #[serde(default = "CacheConfig::default_news_ttl_hours")]
    pub news_ttl_hours: u64,
}

impl CacheConfig {
    const fn default_enabled() -> bool {
        true
    }

    fn default_dir() -> PathBuf {
        PathBuf::from("cache")
    }

    const fn default_ttl_hours() -> u64 {
        24
    }

    const fn default_news_ttl_hours() -> u64 {
        1
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            dir: Self::default_dir(),
            default_ttl_hours: Self::default_ttl_hours(),
            news_ttl_hours: Self::default_news_ttl_hours(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "ContentConfig::default_char_limit")]
    pub char_limit: usize,
}

impl ContentConfig {
    const fn default_char_limit() -> usize {
        1_500
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            char_limit: Self::default_char_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    /// Directory for the JSONL run log; disabled when unset.
    #[serde(default)]
    pub run_log_dir: Option<PathBuf>,
    #[serde(default = "LoggingConfig::default_retention_days")]
    pub retention_days: u64,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }

    const fn default_retention_days() -> u64 {
        90
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            run_log_dir: None,
            retention_days: Self::default_retention_days(),
        }
    }
}
