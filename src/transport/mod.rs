//! Device transport abstraction
//!
//! A `Connector` opens one connection to one device and hands back the
//! `Transport` used for control and outbound audio, plus a channel of
//! `TransportEvent`s fed by the connection's read loop.

mod tcp;

pub use tcp::{TcpConnector, TcpTransport, TransportConfig};

use crate::error::RelayResult;
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// Notification from a transport's read loop, delivered in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection established (always the first event)
    Connected,
    /// One inbound audio frame payload
    Audio(Bytes),
    /// Peer closed the connection or the socket failed. Sent at most once.
    Disconnected,
}

/// Receiving side of a transport's event channel
pub type TransportEvents = mpsc::Receiver<TransportEvent>;

/// Connected link to one device
///
/// Implementations:
/// - `TcpTransport`: framed TCP connection to the device firmware
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Ask the device to begin streaming and wait for its acknowledgment
    async fn start_stream(&mut self) -> RelayResult<()>;

    /// Ask the device to stop streaming. Best-effort, never fails.
    async fn stop_stream(&mut self);

    /// Write one framed audio packet
    async fn send_audio(&mut self, audio: Bytes) -> RelayResult<()>;

    /// Close the connection. Idempotent.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
}

/// Opens transports to devices
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> RelayResult<(Box<dyn Transport>, TransportEvents)>;
}

/// Split a `host` or `host:port` string into host and port
///
/// Bare hosts (including bare IPv6 literals) use `default_port`.
pub fn split_endpoint(endpoint: &str, default_port: u16) -> (String, u16) {
    let endpoint = endpoint.trim();

    if let Ok(addr) = endpoint.parse::<SocketAddr>() {
        return (addr.ip().to_string(), addr.port());
    }

    if let Some((host, port)) = endpoint.rsplit_once(':') {
        if !host.contains(':') {
            if let Ok(port) = port.parse::<u16>() {
                return (host.to_string(), port);
            }
        }
    }

    let host = endpoint.trim_start_matches('[').trim_end_matches(']');
    (host.to_string(), default_port)
}
