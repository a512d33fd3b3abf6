//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The access token comes from the API_ACCESS_TOKEN env var only and is
//! never stored in the TOML file.

use api_client::ClientConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub client: ClientConfig,
}

impl Config {
    /// Load configuration from a TOML file, overlay environment variables,
    /// then validate.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(url) = std::env::var("API_BASE_URL") {
            let url = url.trim();
            if !url.is_empty() {
                config.client.base_url = url.to_owned();
            }
        }

        config.client.validate()?;
        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("jobportal-api.toml")
    }
}

/// Initial access token from API_ACCESS_TOKEN. Blank values count as absent.
pub fn access_token_from_env() -> Option<String> {
    std::env::var("API_ACCESS_TOKEN")
        .ok()
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
}
