//! Application configuration

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

pub const DEFAULT_STORE: &str = "worldstore.db";

/// Which stores to read from and write to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Read in priority order
    pub read_urls: Vec<String>,
    /// Every write goes to all of these; the first is the primary
    pub write_urls: Vec<String>,
}

/// Application configuration, layered from defaults, an optional
/// `worldstore.toml` and `WORLDSTORE__*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP server port
    pub server_port: u16,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from the environment and an optional `worldstore`
    /// file in the working directory
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load configuration, reading `file` instead of the default config file
    /// when given. An explicit file must exist.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name("worldstore").required(false),
        };

        let settings = Config::builder()
            .set_default("server_port", 3000)?
            .set_default("storage.read_urls", vec![DEFAULT_STORE])?
            .set_default("storage.write_urls", vec![DEFAULT_STORE])?
            .add_source(source)
            .add_source(
                Environment::with_prefix("WORLDSTORE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("storage.read_urls")
                    .with_list_parse_key("storage.write_urls")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration sources")?;

        settings
            .try_deserialize()
            .context("Invalid worldstore configuration")
    }
}
