//! Read-only access to the site's content store, where admins configure
//! which game servers the status endpoints report on.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Object holding both Minecraft fields, fetched in one lookup.
pub const MINECRAFT_KEY: &str = "servers.minecraft";
pub const MINECRAFT_HOST_FIELD: &str = "serverIP";
pub const MINECRAFT_PORT_FIELD: &str = "port";
pub const FIVEM_ADDRESS_KEY: &str = "servers.fivem.serverIP";

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Look up a dotted key. `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Value>>;
}

/// JSON document on disk, re-read on every lookup so edits show up without
/// a restart.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ContentStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let raw = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read content store: {}", self.path.display()))?;
        let doc: Value = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse content store: {}", self.path.display()))?;
        Ok(lookup(&doc, key).cloned())
    }
}

/// Fixed in-memory document.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    doc: Value,
}

impl MemoryStore {
    pub fn new(doc: Value) -> Self {
        Self { doc }
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(lookup(&self.doc, key).cloned())
    }
}

/// Walk `doc` along a dotted path.
pub fn lookup<'a>(doc: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.')
        .try_fold(doc, |node, segment| node.as_object()?.get(segment))
        .filter(|v| !v.is_null())
}

/// Non-empty string field.
pub fn as_text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Port stored either as a number or a numeric string.
pub fn as_port(value: &Value) -> Option<u16> {
    let port = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    port.filter(|&port| port != 0)
}
