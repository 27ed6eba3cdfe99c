use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config as HierarchicalConfig, Environment};
use serde::Deserialize;
use tracing::debug;
use xdg::BaseDirectories;

/// Name of the directory holding our config files
const APP_DIR_NAME: &str = "nuget-feeds";
pub const CONFIG_FILE: &str = "nuget-feeds.toml";
const ENV_PREFIX: &str = "NUGET_FEEDS_";

/// Source settings in env vars are separated by this, as the JSON itself contains commas
const SOURCES_SEPARATOR: &str = ";";

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Additional sources as JSON strings,
    /// e.g. `{"name": "Private", "passwordScriptPath": "/opt/decrypt.sh"}`
    #[serde(default)]
    pub sources: Vec<String>,

    /// Proxy for all registry requests, overrides `HTTPS_PROXY` and friends
    pub proxy: Option<String>,

    /// Workspace to look for `nuget.config` in (default: current directory)
    pub workspace: Option<PathBuf>,

    /// How many results `search` requests per source by default
    pub search_take: u32,

    /// How long package lookups are cached
    pub package_cache_ttl_secs: u64,

    /// Override the user agent sent to registries
    pub user_agent: Option<String>,
}

impl Config {
    /// Read the config from `/etc`, the XDG config dirs and `NUGET_FEEDS_*` variables.
    pub fn parse() -> Result<Config> {
        let mut files = vec![PathBuf::from("/etc").join(APP_DIR_NAME).join(CONFIG_FILE)];
        // XDG_CONFIG_DIRS first, XDG_CONFIG_HOME last so it wins
        let mut xdg_files = BaseDirectories::with_prefix(APP_DIR_NAME)
            .find_config_files(CONFIG_FILE)
            .collect::<Vec<_>>();
        xdg_files.reverse();
        files.extend(xdg_files);

        let envs = env::vars()
            .filter_map(|(k, v)| k.strip_prefix(ENV_PREFIX).map(|k| (k.to_lowercase(), v)))
            .collect::<HashMap<_, _>>();

        Self::parse_from(&files, envs)
    }

    /// Layer `files` (later wins) and then `envs` over the defaults.
    fn parse_from(files: &[PathBuf], envs: HashMap<String, String>) -> Result<Config> {
        let mut builder = HierarchicalConfig::builder()
            .set_default("sources", Vec::<String>::new())?
            .set_default("search_take", 20)?
            .set_default("package_cache_ttl_secs", 300)?;

        for file in files {
            debug!(file = %file.display(), "adding config file");
            builder = builder.add_source(
                config::File::from(file.clone())
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }

        let builder = builder.add_source(
            Environment::default()
                .source(Some(envs))
                .try_parsing(true)
                .list_separator(SOURCES_SEPARATOR)
                .with_list_parse_key("sources"),
        );

        builder
            .build()?
            .try_deserialize()
            .context("Could not parse config")
    }
}
