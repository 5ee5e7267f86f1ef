use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_dir: PathBuf,
    pub sd_api_url: Url,
    pub sd_timeout_secs: u64,
    pub style_catalog_path: Option<PathBuf>,
    pub output_dir: PathBuf,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_path(name: &str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Base URLs must end in `/` so endpoint paths join beneath them.
fn normalize_base_url(value: &str) -> Result<Url> {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(anyhow!("SD_API_URL must not be empty"));
    }
    Url::parse(&format!("{trimmed}/")).map_err(|err| anyhow!("Invalid SD_API_URL '{value}': {err}"))
}

impl Config {
    pub fn load() -> Result<Self> {
        let sd_api_url = normalize_base_url(&env_string("SD_API_URL", "http://localhost:7860"))?;

        let style_catalog_path = env_path("STYLE_CATALOG_PATH");
        if let Some(path) = style_catalog_path.as_ref() {
            if !path.exists() {
                return Err(anyhow!(
                    "STYLE_CATALOG_PATH points to a missing file: {}",
                    path.display()
                ));
            }
        }

        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            log_dir: env_path("LOG_DIR").unwrap_or_else(|| PathBuf::from("logs")),
            sd_api_url,
            sd_timeout_secs: env_u64("SD_TIMEOUT_SECS", 600),
            style_catalog_path,
            output_dir: env_path("OUTPUT_DIR").unwrap_or_else(|| PathBuf::from("outputs")),
        })
    }

    /// `None` when `SD_TIMEOUT_SECS=0`.
    pub fn sd_timeout(&self) -> Option<Duration> {
        (self.sd_timeout_secs > 0).then(|| Duration::from_secs(self.sd_timeout_secs))
    }
}
