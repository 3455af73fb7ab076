#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use gamestatus_rs::{minecraft, varint};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const STATUS_JSON: &str = r#"{"version":{"name":"1.20.4","protocol":765},"players":{"online":5,"max":20},"description":"A Server"}"#;

/// How the fake Minecraft server answers once it has read the request.
pub enum Reply {
    /// Write each chunk, pausing `gap` between them.
    Chunks(Vec<Vec<u8>>, Duration),
    /// Wait, then write the whole packet.
    Delayed(Duration, Vec<u8>),
    /// Never answer.
    Silent,
    /// Close the connection straight away.
    Close,
}

pub struct MockMinecraft {
    pub addr: SocketAddr,
    /// Resolves with the request bytes once the client has closed its socket.
    pub done: JoinHandle<Vec<u8>>,
}

/// Status response packet wrapping `json`.
pub fn status_packet(json: &str) -> Vec<u8> {
    let mut body = vec![0x00];
    varint::write(&mut body, json.len() as u32);
    body.extend_from_slice(json.as_bytes());
    let mut packet = varint::encode(body.len() as u32);
    packet.extend_from_slice(&body);
    packet
}

/// Split `bytes` into `parts` roughly equal chunks.
pub fn split(bytes: &[u8], parts: usize) -> Vec<Vec<u8>> {
    let size = bytes.len().div_ceil(parts);
    bytes.chunks(size).map(<[u8]>::to_vec).collect()
}

pub async fn spawn_minecraft(reply: Reply) -> MockMinecraft {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let expected_len = minecraft::build_request(
        "127.0.0.1",
        addr.port(),
        minecraft::DEFAULT_PROTOCOL_VERSION,
    )
    .len();

    let done = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = vec![0u8; expected_len];
        stream.read_exact(&mut request).await.unwrap();

        match reply {
            Reply::Chunks(chunks, gap) => {
                for chunk in chunks {
                    if stream.write_all(&chunk).await.is_err() {
                        break;
                    }
                    let _ = stream.flush().await;
                    tokio::time::sleep(gap).await;
                }
            }
            Reply::Delayed(delay, packet) => {
                tokio::time::sleep(delay).await;
                let _ = stream.write_all(&packet).await;
            }
            Reply::Silent => {}
            Reply::Close => return request,
        }

        // wait for the prober to release its end
        let mut sink = [0u8; 256];
        loop {
            match stream.read(&mut sink).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        request
    });

    MockMinecraft { addr, done }
}

/// Serve `app` on an ephemeral loopback port.
pub async fn spawn_http(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A loopback port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
