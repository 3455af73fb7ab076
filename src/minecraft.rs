//! Minecraft "Server List Ping": handshake + status request over raw TCP,
//! answered by one length-prefixed packet carrying a JSON document.

use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::debug;

use crate::error::ProbeError;
use crate::types::{MinecraftQuery, OnlineStatus, Players, ServerStatus};
use crate::varint::{self, VarIntError};

/// Protocol version announced in the handshake when none is configured (1.18).
pub const DEFAULT_PROTOCOL_VERSION: u32 = 757;
pub const DEFAULT_PORT: u16 = 25565;

/// Largest packet a vanilla server will send (3-byte VarInt length).
pub const MAX_PACKET_LEN: u32 = 2_097_151;

const HANDSHAKE_PACKET_ID: u8 = 0x00;
const STATUS_RESPONSE_PACKET_ID: u32 = 0x00;
const NEXT_STATE_STATUS: u32 = 1;
const STATUS_REQUEST: [u8; 2] = [0x01, 0x00];

/// Ping a Minecraft server and report its status.
///
/// The timeout covers connect, request and response together. Whatever
/// happens, exactly one `ServerStatus` comes back and the socket is closed:
/// on expiry the in-flight future is dropped along with its `TcpStream`.
pub async fn probe(query: &MinecraftQuery) -> ServerStatus {
    match time::timeout(query.timeout, ping(query)).await {
        Ok(Ok(status)) => ServerStatus::Online(status),
        Ok(Err(err)) => {
            debug!(host = %query.host, port = query.port, error = %err, "minecraft probe failed");
            ServerStatus::offline(err.to_string())
        }
        Err(_) => {
            debug!(host = %query.host, port = query.port, "minecraft probe timed out");
            ServerStatus::offline(ProbeError::Timeout.to_string())
        }
    }
}

async fn ping(query: &MinecraftQuery) -> Result<OnlineStatus, ProbeError> {
    // a SYN that is never answered stalls here, under the same deadline as the reads
    let mut stream = TcpStream::connect((query.host.as_str(), query.port)).await?;
    // latency is the status round trip only, TCP setup excluded
    let opened = Instant::now();
    debug!(host = %query.host, port = query.port, "connected, sending handshake");

    stream
        .write_all(&build_request(&query.host, query.port, query.protocol_version))
        .await?;

    let mut parser = ResponseParser::new();
    let mut chunk = vec![0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(ProbeError::Closed);
        }
        if let Some(json) = parser.feed(&chunk[..n])? {
            let latency_ms = opened.elapsed().as_millis() as u64;
            return parse_status_json(&json, latency_ms);
        }
    }
}

/// Handshake (next state = status) immediately followed by the empty status
/// request, ready to be written in one go.
pub fn build_request(host: &str, port: u16, protocol_version: u32) -> Vec<u8> {
    let mut body = vec![HANDSHAKE_PACKET_ID];
    varint::write(&mut body, protocol_version);
    varint::write(&mut body, host.len() as u32);
    body.extend_from_slice(host.as_bytes());
    body.extend_from_slice(&port.to_be_bytes());
    varint::write(&mut body, NEXT_STATE_STATUS);

    let mut out = Vec::with_capacity(body.len() + varint::MAX_VARINT_LEN + STATUS_REQUEST.len());
    varint::write(&mut out, body.len() as u32);
    out.extend_from_slice(&body);
    out.extend_from_slice(&STATUS_REQUEST);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    AwaitingLength,
    AwaitingPacketId { packet_end: usize },
    AwaitingJsonLength { packet_end: usize },
    AwaitingJsonBody { start: usize, end: usize },
    Done,
}

/// Incremental decoder for the status response packet. Feed it whatever
/// the socket returns; it yields the JSON text once the packet is whole.
#[derive(Debug)]
pub struct ResponseParser {
    buf: Vec<u8>,
    pos: usize,
    state: ParseState,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            state: ParseState::AwaitingLength,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Append `data` and advance as far as the buffered bytes allow.
    /// `Ok(None)` means more data is needed.
    pub fn feed(&mut self, data: &[u8]) -> Result<Option<String>, ProbeError> {
        if self.state == ParseState::Done {
            return Ok(None);
        }
        self.buf.extend_from_slice(data);

        loop {
            match self.state {
                ParseState::AwaitingLength => match varint::decode(&self.buf, 0) {
                    Ok((len, _)) if len > MAX_PACKET_LEN => {
                        return Err(ProbeError::Malformed(format!(
                            "packet length {len} exceeds {MAX_PACKET_LEN}"
                        )));
                    }
                    Ok((len, n)) => {
                        self.pos = n;
                        self.state = ParseState::AwaitingPacketId {
                            packet_end: n + len as usize,
                        };
                    }
                    Err(VarIntError::Incomplete) => return Ok(None),
                    Err(err) => return Err(err.into()),
                },
                ParseState::AwaitingPacketId { packet_end } => {
                    if self.buf.len() < packet_end {
                        return Ok(None);
                    }
                    let id = self.packet_varint(packet_end)?;
                    if id != STATUS_RESPONSE_PACKET_ID {
                        return Err(ProbeError::UnexpectedPacketId(id));
                    }
                    self.state = ParseState::AwaitingJsonLength { packet_end };
                }
                ParseState::AwaitingJsonLength { packet_end } => {
                    let len = self.packet_varint(packet_end)? as usize;
                    let start = self.pos;
                    let end = start
                        .checked_add(len)
                        .filter(|&end| end <= packet_end)
                        .ok_or_else(|| {
                            ProbeError::Malformed("status string overruns packet".into())
                        })?;
                    self.state = ParseState::AwaitingJsonBody { start, end };
                }
                ParseState::AwaitingJsonBody { start, end } => {
                    let json = String::from_utf8(self.buf[start..end].to_vec())
                        .map_err(|err| ProbeError::Malformed(err.to_string()))?;
                    self.state = ParseState::Done;
                    self.buf = Vec::new();
                    return Ok(Some(json));
                }
                ParseState::Done => return Ok(None),
            }
        }
    }

    // Only called once the whole packet is buffered, so running out of bytes
    // means the fields do not fit the declared length.
    fn packet_varint(&mut self, packet_end: usize) -> Result<u32, ProbeError> {
        match varint::decode(&self.buf[..packet_end], self.pos) {
            Ok((value, n)) => {
                self.pos += n;
                Ok(value)
            }
            Err(VarIntError::Incomplete) => {
                Err(ProbeError::Malformed("packet shorter than its fields".into()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Deserialize)]
struct RawStatus {
    version: Option<RawVersion>,
    players: Option<RawPlayers>,
    description: Option<Value>,
    favicon: Option<String>,
}

#[derive(Deserialize)]
struct RawVersion {
    name: Option<String>,
    protocol: Option<i64>,
}

#[derive(Deserialize)]
struct RawPlayers {
    online: Option<i64>,
    max: Option<i64>,
    sample: Option<Vec<RawSamplePlayer>>,
}

#[derive(Deserialize)]
struct RawSamplePlayer {
    name: Option<String>,
}

/// Map the status JSON document onto an `OnlineStatus`.
pub fn parse_status_json(json: &str, latency_ms: u64) -> Result<OnlineStatus, ProbeError> {
    let raw: RawStatus = serde_json::from_str(json)?;

    let (version, protocol) = match raw.version {
        Some(v) => (v.name, v.protocol),
        None => (None, None),
    };

    let mut players = Players::default();
    let mut extra = Map::new();
    if let Some(p) = raw.players {
        players.online = clamp_count(p.online);
        players.max = clamp_count(p.max);
        if let Some(sample) = p.sample {
            let names = sample
                .into_iter()
                .filter_map(|s| s.name)
                .map(Value::String)
                .collect();
            extra.insert("sample".into(), Value::Array(names));
        }
    }

    extra.insert(
        "protocol".into(),
        protocol.map(Value::from).unwrap_or(Value::Null),
    );
    extra.insert(
        "favicon".into(),
        raw.favicon.map(Value::String).unwrap_or(Value::Null),
    );

    Ok(OnlineStatus {
        players,
        version,
        description: raw.description.as_ref().map(flatten_description),
        latency_ms: Some(latency_ms),
        hostname: None,
        extra,
    })
}

fn clamp_count(v: Option<i64>) -> u32 {
    v.map(|n| n.clamp(0, u32::MAX as i64) as u32).unwrap_or(0)
}

/// Collapse a chat component (plain string, `{text, extra}` object or an
/// array of either) into plain text.
pub fn flatten_description(value: &Value) -> String {
    let mut out = String::new();
    push_text(value, &mut out);
    out
}

fn push_text(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => out.push_str(s),
        Value::Array(items) => items.iter().for_each(|item| push_text(item, out)),
        Value::Object(map) => {
            if let Some(text) = map.get("text") {
                push_text(text, out);
            }
            if let Some(Value::Array(extra)) = map.get("extra") {
                extra.iter().for_each(|item| push_text(item, out));
            }
        }
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null => {}
    }
}
