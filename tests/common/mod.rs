//! Shared utilities for integration tests.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use url::Url;

use play_trigger::config::ServerConfig;
use play_trigger::playback::ChannelSink;
use play_trigger::TriggerServer;

pub const STREAM_PATTERN: &str = r"(https?|rtsp)://[\w.-]+/stream";

/// A port nobody listens on right now.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub fn loopback(port: u16) -> ServerConfig {
    ServerConfig::new(port, STREAM_PATTERN).with_bind_ip(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

pub fn addr(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// A started server plus the URLs its sink received.
pub async fn start_server(port: u16) -> (Arc<TriggerServer>, mpsc::UnboundedReceiver<Url>) {
    let (sink, urls) = ChannelSink::new();
    let server = Arc::new(TriggerServer::new(Arc::new(sink)));
    server.start(loopback(port)).await.unwrap();
    (server, urls)
}

pub fn post_play(body: &str) -> String {
    request("POST", "/play", body)
}

pub fn request(method: &str, path: &str, body: &str) -> String {
    format!(
        "{} {} HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n{}",
        method,
        path,
        body.len(),
        body
    )
}

/// Send raw bytes and read until the server closes.
pub async fn send_raw(port: u16, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr(port)).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .expect("server did not close the connection")
        .unwrap();
    response
}

/// Status code from the first response line.
pub fn status_code(response: &str) -> u16 {
    response
        .split(' ')
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or_else(|| panic!("not an HTTP response: {:?}", response))
}

pub fn body(response: &str) -> &str {
    response.split_once("\r\n\r\n").map_or("", |(_, body)| body)
}

/// Poll `server` until it tracks `expected` sessions.
pub async fn wait_for_connections(server: &TriggerServer, expected: usize) {
    for _ in 0..200 {
        if server.active_connections().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {} tracked connections, found {}",
        expected,
        server.active_connections().await
    );
}
