use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub listen_addr: String,
    pub max_concurrency: usize,
    pub assets_dir: PathBuf,
    pub auth_token: Option<String>,
    pub otel_endpoint: Option<String>,
    /// Research pipeline config file; `None` defers to the core resolution order.
    pub research_config: Option<PathBuf>,
}

impl AppConfig {
    const DEFAULT_LISTEN_ADDR: &'static str = "0.0.0.0:8080";
    const DEFAULT_ASSETS_DIR: &'static str = "crates/webresearch-gui/web/dist";

    pub fn from_env() -> Result<Self> {
        let listen_addr =
            env::var("GUI_LISTEN_ADDR").unwrap_or_else(|_| Self::DEFAULT_LISTEN_ADDR.to_string());

        let max_concurrency = match non_empty_var("GUI_MAX_CONCURRENCY") {
            Some(value) => value
                .parse::<usize>()
                .ok()
                .filter(|value| *value > 0)
                .with_context(|| {
                    format!("GUI_MAX_CONCURRENCY must be a positive integer, got {value:?}")
                })?,
            None => std::thread::available_parallelism()
                .map(|nz| nz.get())
                .unwrap_or(4),
        };

        let assets_dir = env::var("GUI_ASSETS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(Self::DEFAULT_ASSETS_DIR));
        let assets_dir = if assets_dir.is_relative() {
            env::current_dir()
                .map(|cwd| cwd.join(&assets_dir))
                .unwrap_or(assets_dir)
        } else {
            assets_dir
        };

        Ok(Self {
            listen_addr,
            max_concurrency,
            assets_dir,
            auth_token: non_empty_var("GUI_AUTH_TOKEN"),
            otel_endpoint: non_empty_var("GUI_OTEL_ENDPOINT"),
            research_config: non_empty_var("WEBRESEARCH_CONFIG").map(PathBuf::from),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
