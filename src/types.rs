use std::time::Duration;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Timeout applied to every probe unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Player counts reported by a server.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Players {
    pub online: u32,
    pub max: u32,
}

/// Live data from a server that answered.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OnlineStatus {
    pub players: Players,
    pub version: Option<String>,
    pub description: Option<String>,
    pub latency_ms: Option<u64>,
    pub hostname: Option<String>,
    /// Game specific fields, serialized at the top level next to the common ones.
    pub extra: Map<String, Value>,
}

/// Result of a single probe. Exactly one of these is produced per call.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerStatus {
    Offline { reason: String },
    Online(OnlineStatus),
}

impl ServerStatus {
    pub fn offline(reason: impl Into<String>) -> Self {
        ServerStatus::Offline {
            reason: reason.into(),
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, ServerStatus::Online(_))
    }

    pub fn as_online(&self) -> Option<&OnlineStatus> {
        match self {
            ServerStatus::Online(status) => Some(status),
            ServerStatus::Offline { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ServerStatus::Offline { reason } => Some(reason),
            ServerStatus::Online(_) => None,
        }
    }
}

// Flat wire shape: `online` is the discriminant, the rest are optional fields.
#[derive(Serialize)]
struct StatusBody<'a> {
    online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    hostname: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    players: Option<Players>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency: Option<u64>,
    #[serde(flatten)]
    extra: Option<&'a Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl Serialize for ServerStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let body = match self {
            ServerStatus::Offline { reason } => StatusBody {
                online: false,
                hostname: None,
                version: None,
                players: None,
                description: None,
                latency: None,
                extra: None,
                error: Some(reason),
            },
            ServerStatus::Online(s) => StatusBody {
                online: true,
                hostname: s.hostname.as_deref(),
                version: s.version.as_deref(),
                players: Some(s.players),
                description: s.description.as_deref(),
                latency: s.latency_ms,
                extra: Some(&s.extra),
                error: None,
            },
        };
        body.serialize(serializer)
    }
}

/// Input for a Minecraft Server List Ping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinecraftQuery {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub protocol_version: u32,
}

impl MinecraftQuery {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
            protocol_version: crate::minecraft::DEFAULT_PROTOCOL_VERSION,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_protocol_version(mut self, protocol_version: u32) -> Self {
        self.protocol_version = protocol_version;
        self
    }
}

/// Input for a FiveM probe. `address` is either a `cfx.re/join/<code>` link
/// or a plain `host[:port]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FivemQuery {
    pub address: String,
    pub timeout: Duration,
}

impl FivemQuery {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// JSON body returned by the status endpoints.
#[derive(Serialize, Debug, Clone)]
pub struct StatusEnvelope<S: Serialize> {
    pub timestamp: String,
    pub server: S,
    #[serde(flatten)]
    pub status: ServerStatus,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct MinecraftTarget {
    pub host: String,
    pub port: u16,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FivemTarget {
    pub address: String,
}
