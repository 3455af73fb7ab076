//! FiveM status over HTTP: either a `cfx.re/join/<code>` lookup through the
//! public server directory, or the server's own `info.json`,
//! `players.json` and `dynamic.json` endpoints queried side by side.

use reqwest::header::ACCEPT;
use serde_json::{Map, Value};
use tokio::time;
use tracing::debug;

use crate::error::ProbeError;
use crate::types::{FivemQuery, OnlineStatus, Players, ServerStatus};

pub const DEFAULT_PORT: u16 = 30120;
/// Reported as `players.max` when no source carries a slot count.
pub const DEFAULT_MAX_PLAYERS: u32 = 32;
pub const DEFAULT_DIRECTORY_URL: &str = "https://servers-frontend.fivem.net/api/servers/single/";

const JOIN_MARKER: &str = "cfx.re/join/";
const CLIENT_AGENT: &str = concat!("gamestatus-rs/", env!("CARGO_PKG_VERSION"));

/// Where a FiveM server can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FivemAddress {
    JoinCode(String),
    Direct { host: String, port: u16 },
}

impl FivemAddress {
    /// Classify a user supplied connect string such as
    /// `connect cfx.re/join/abc123`, `https://cfx.re/join/abc123/` or
    /// `play.example.com:30120`.
    pub fn parse(address: &str) -> Result<Self, ProbeError> {
        let trimmed = address.trim();

        if let Some(idx) = trimmed.to_ascii_lowercase().find(JOIN_MARKER) {
            let code: String = trimmed[idx + JOIN_MARKER.len()..]
                .chars()
                .take_while(char::is_ascii_alphanumeric)
                .collect();
            if code.is_empty() {
                return Err(ProbeError::InvalidAddress);
            }
            return Ok(FivemAddress::JoinCode(code));
        }

        let mut rest = trimmed;
        if rest
            .get(..8)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("connect "))
        {
            rest = rest[8..].trim_start();
        }
        for scheme in ["http://", "https://"] {
            if let Some(stripped) = rest.strip_prefix(scheme) {
                rest = stripped;
            }
        }
        let rest = rest.trim_end_matches('/');

        let (host, port) = match rest.split_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>()
                    .map_err(|_| ProbeError::InvalidAddress)?,
            ),
            None => (rest, DEFAULT_PORT),
        };
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(ProbeError::InvalidAddress);
        }
        Ok(FivemAddress::Direct {
            host: host.to_string(),
            port,
        })
    }
}

/// FiveM prober settings. Each `probe` builds its own non-pooling HTTP
/// client, so no connection outlives the call that opened it.
#[derive(Debug, Clone)]
pub struct FivemProber {
    directory_url: String,
    default_max_players: u32,
}

impl Default for FivemProber {
    fn default() -> Self {
        Self::new()
    }
}

impl FivemProber {
    pub fn new() -> Self {
        Self {
            directory_url: DEFAULT_DIRECTORY_URL.to_string(),
            default_max_players: DEFAULT_MAX_PLAYERS,
        }
    }

    /// Base URL the join code is appended to.
    pub fn with_directory_url(mut self, url: impl Into<String>) -> Self {
        let mut url = url.into();
        if !url.ends_with('/') {
            url.push('/');
        }
        self.directory_url = url;
        self
    }

    pub fn with_default_max_players(mut self, max: u32) -> Self {
        self.default_max_players = max;
        self
    }

    /// Probe one server. A single timeout bounds the whole operation; on
    /// expiry every in-flight request is dropped.
    pub async fn probe(&self, query: &FivemQuery) -> ServerStatus {
        match time::timeout(query.timeout, self.query(&query.address)).await {
            Ok(Ok(status)) => ServerStatus::Online(status),
            Ok(Err(err)) => {
                debug!(address = %query.address, error = %err, "fivem probe failed");
                ServerStatus::offline(err.to_string())
            }
            Err(_) => {
                debug!(address = %query.address, "fivem probe timed out");
                ServerStatus::offline(ProbeError::Timeout.to_string())
            }
        }
    }

    async fn query(&self, address: &str) -> Result<OnlineStatus, ProbeError> {
        let address = FivemAddress::parse(address)?;
        // dropped with this future, closing whatever it still holds
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .user_agent(CLIENT_AGENT)
            .build()?;
        match address {
            FivemAddress::JoinCode(code) => self.lookup_join_code(&client, &code).await,
            FivemAddress::Direct { host, port } => self.query_direct(&client, &host, port).await,
        }
    }

    async fn lookup_join_code(
        &self,
        client: &reqwest::Client,
        code: &str,
    ) -> Result<OnlineStatus, ProbeError> {
        let url = format!("{}{}", self.directory_url, code);
        debug!(%url, "resolving join code through directory");
        let payload = get_json(client, &url).await?;
        Ok(merge_directory(&payload, self.default_max_players))
    }

    async fn query_direct(
        &self,
        client: &reqwest::Client,
        host: &str,
        port: u16,
    ) -> Result<OnlineStatus, ProbeError> {
        let base = format!("http://{host}:{port}");
        let info_url = format!("{base}/info.json");
        let players_url = format!("{base}/players.json");
        let dynamic_url = format!("{base}/dynamic.json");

        // every request settles before the merge decides
        let (info, players, dynamic) = tokio::join!(
            get_json(client, &info_url),
            get_json(client, &players_url),
            get_json(client, &dynamic_url),
        );

        merge_direct(
            settled(&info_url, info),
            settled(&players_url, players),
            settled(&dynamic_url, dynamic),
            self.default_max_players,
        )
    }
}

async fn get_json(client: &reqwest::Client, url: &str) -> Result<Value, ProbeError> {
    let res = client
        .get(url)
        .header(ACCEPT, "application/json")
        .send()
        .await?
        .error_for_status()?;
    Ok(res.json::<Value>().await?)
}

fn settled(url: &str, result: Result<Value, ProbeError>) -> Option<Value> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(%url, error = %err, "endpoint failed");
            None
        }
    }
}

/// Build a status from a directory API payload (`{"Data": {...}}`, or the
/// bare server object).
pub fn merge_directory(payload: &Value, default_max_players: u32) -> OnlineStatus {
    let data = payload.get("Data").unwrap_or(payload);
    let vars = data.get("vars");

    let hostname = str_field(data.get("hostname"))
        .or_else(|| str_field(vars.and_then(|v| v.get("sv_projectName"))));
    let online = count(data.get("clients"))
        .or_else(|| array_len(data.get("players")))
        .unwrap_or(0);
    let max = count(data.get("svMaxclients"))
        .or_else(|| count(vars.and_then(|v| v.get("sv_maxClients"))))
        .unwrap_or(default_max_players);

    let mut extra = Map::new();
    copy_str(&mut extra, "gametype", data.get("gametype"));
    copy_str(&mut extra, "mapname", data.get("mapname"));
    if let Some(n) = array_len(data.get("resources")) {
        extra.insert("resources".into(), Value::from(n));
    }
    if let Some(endpoints) = data.get("connectEndPoints").filter(|v| v.is_array()) {
        extra.insert("connectEndPoints".into(), endpoints.clone());
    }

    OnlineStatus {
        players: Players { online, max },
        version: str_field(data.get("server")),
        description: None,
        latency_ms: None,
        hostname,
        extra,
    }
}

/// Combine whichever direct endpoints answered. Fails only when none did.
pub fn merge_direct(
    info: Option<Value>,
    players: Option<Value>,
    dynamic: Option<Value>,
    default_max_players: u32,
) -> Result<OnlineStatus, ProbeError> {
    if info.is_none() && players.is_none() && dynamic.is_none() {
        return Err(ProbeError::NoEndpointResponse);
    }
    let info = info.as_ref();
    let dynamic = dynamic.as_ref();
    let vars = info.and_then(|i| i.get("vars"));

    let hostname = str_field(vars.and_then(|v| v.get("sv_projectName")))
        .or_else(|| str_field(dynamic.and_then(|d| d.get("hostname"))));
    let online = count(dynamic.and_then(|d| d.get("clients")))
        .or_else(|| array_len(players.as_ref()))
        .unwrap_or(0);
    let max = count(vars.and_then(|v| v.get("sv_maxClients")))
        .or_else(|| count(dynamic.and_then(|d| d.get("sv_maxclients"))))
        .unwrap_or(default_max_players);

    let mut extra = Map::new();
    for key in ["mapname", "gametype"] {
        let value = info
            .and_then(|i| i.get(key))
            .or_else(|| dynamic.and_then(|d| d.get(key)));
        copy_str(&mut extra, key, value);
    }
    if let Some(n) = array_len(info.and_then(|i| i.get("resources"))) {
        extra.insert("resources".into(), Value::from(n));
    }

    Ok(OnlineStatus {
        players: Players { online, max },
        version: str_field(info.and_then(|i| i.get("server"))),
        description: None,
        latency_ms: None,
        hostname,
        extra,
    })
}

fn str_field(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn copy_str(extra: &mut Map<String, Value>, key: &str, v: Option<&Value>) {
    if let Some(s) = str_field(v) {
        extra.insert(key.to_string(), Value::String(s));
    }
}

// FXServer reports convars as strings, the directory as numbers.
fn count(v: Option<&Value>) -> Option<u32> {
    match v? {
        Value::Number(n) => n.as_u64().map(|n| n.min(u32::MAX as u64) as u32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn array_len(v: Option<&Value>) -> Option<u32> {
    v.and_then(Value::as_array).map(|a| a.len() as u32)
}
