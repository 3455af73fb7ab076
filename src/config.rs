use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{fivem, minecraft};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// JSON document holding `servers.minecraft.*` and `servers.fivem.*`.
    /// Without it every request uses the fallback targets.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_protocol_version")]
    pub minecraft_protocol_version: u32,
    #[serde(default = "default_max_players")]
    pub fivem_default_max_players: u32,
    #[serde(default = "default_directory_url")]
    pub fivem_directory_url: String,
}

/// Targets used when the content store cannot supply one.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FallbackConfig {
    #[serde(default = "default_minecraft_host")]
    pub minecraft_host: String,
    #[serde(default = "default_minecraft_port")]
    pub minecraft_port: u16,
    #[serde(default = "default_fivem_address")]
    pub fivem_address: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_protocol_version() -> u32 {
    minecraft::DEFAULT_PROTOCOL_VERSION
}

fn default_max_players() -> u32 {
    fivem::DEFAULT_MAX_PLAYERS
}

fn default_directory_url() -> String {
    fivem::DEFAULT_DIRECTORY_URL.to_string()
}

fn default_minecraft_host() -> String {
    "localhost".to_string()
}

fn default_minecraft_port() -> u16 {
    minecraft::DEFAULT_PORT
}

fn default_fivem_address() -> String {
    format!("localhost:{}", fivem::DEFAULT_PORT)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            store_path: None,
            probe: ProbeConfig::default(),
            fallback: FallbackConfig::default(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            minecraft_protocol_version: default_protocol_version(),
            fivem_default_max_players: default_max_players(),
            fivem_directory_url: default_directory_url(),
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            minecraft_host: default_minecraft_host(),
            minecraft_port: default_minecraft_port(),
            fivem_address: default_fivem_address(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}
