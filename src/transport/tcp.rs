use super::{Connector, Transport, TransportEvent, TransportEvents};
use crate::error::{RelayError, RelayResult};
use crate::protocol::{Frame, FrameCodec, FrameType, DEFAULT_MAX_PAYLOAD};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, trace, warn};

type FrameWriter = Arc<Mutex<FramedWrite<OwnedWriteHalf, FrameCodec>>>;

/// Timeouts and limits for device connections
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bound on TCP connect (including DNS resolution)
    pub connect_timeout: Duration,
    /// Bound on waiting for the `StartAck` frame
    pub handshake_timeout: Duration,
    /// Bound on each frame write, including closing the writer
    pub write_timeout: Duration,
    /// Largest accepted audio payload in bytes
    pub max_payload: usize,
    /// Capacity of the inbound event channel
    pub event_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(2),
            max_payload: DEFAULT_MAX_PAYLOAD,
            event_buffer: 256,
        }
    }
}

/// Reply to a pending `Start` request
#[derive(Debug)]
enum HandshakeReply {
    Ack,
    Rejected(String),
}

/// `Connector` producing `TcpTransport`s
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    config: TransportConfig,
}

impl TcpConnector {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> RelayResult<(Box<dyn Transport>, TransportEvents)> {
        let (transport, events) = TcpTransport::connect(host, port, self.config.clone()).await?;
        Ok((Box::new(transport), events))
    }
}

/// Framed TCP connection to one device
pub struct TcpTransport {
    addr: String,
    config: TransportConfig,
    writer: FrameWriter,
    replies: mpsc::Receiver<HandshakeReply>,
    reader: Option<JoinHandle<()>>,
    connected: Arc<AtomicBool>,
}

impl TcpTransport {
    /// Connect and spawn the read loop
    pub async fn connect(
        host: &str,
        port: u16,
        config: TransportConfig,
    ) -> RelayResult<(Self, TransportEvents)> {
        let addr = format!("{}:{}", host, port);
        debug!(%addr, "connecting to device");

        let stream = match timeout(config.connect_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(RelayError::Connect { addr, source }),
            Err(_) => {
                return Err(RelayError::ConnectTimeout {
                    addr,
                    timeout: config.connect_timeout,
                })
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!(%addr, "failed to set TCP_NODELAY: {}", e);
        }

        let (read_half, write_half) = stream.into_split();
        let codec = FrameCodec::with_max_payload(config.max_payload);

        let (events_tx, events_rx) = mpsc::channel(config.event_buffer.max(1));
        let (replies_tx, replies_rx) = mpsc::channel(4);
        let writer = Arc::new(Mutex::new(FramedWrite::new(write_half, codec.clone())));
        let connected = Arc::new(AtomicBool::new(true));

        // Fresh channel with capacity >= 1, cannot be full
        let _ = events_tx.try_send(TransportEvent::Connected);

        let reader = tokio::spawn(read_loop(
            addr.clone(),
            FramedRead::new(read_half, codec),
            events_tx,
            replies_tx,
            Arc::clone(&writer),
            Arc::clone(&connected),
            config.write_timeout,
        ));

        info!(%addr, "connected to device");

        Ok((
            Self {
                addr,
                config,
                writer,
                replies: replies_rx,
                reader: Some(reader),
                connected,
            },
            events_rx,
        ))
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn send_frame(&self, frame: Frame) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.send(frame).await
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn start_stream(&mut self) -> RelayResult<()> {
        if !self.is_connected() {
            return Err(RelayError::Disconnected);
        }

        // Drop replies left over from an earlier request
        while self.replies.try_recv().is_ok() {}

        self.send_frame(Frame::control(FrameType::Start))
            .await
            .map_err(|e| RelayError::Handshake(format!("failed to send start request: {}", e)))?;

        match timeout(self.config.handshake_timeout, self.replies.recv()).await {
            Ok(Some(HandshakeReply::Ack)) => {
                debug!(addr = %self.addr, "device acknowledged start_stream");
                Ok(())
            }
            Ok(Some(HandshakeReply::Rejected(reason))) => Err(RelayError::Handshake(reason)),
            Ok(None) => Err(RelayError::Handshake(
                "connection closed before acknowledgment".to_string(),
            )),
            Err(_) => Err(RelayError::HandshakeTimeout(self.config.handshake_timeout)),
        }
    }

    async fn stop_stream(&mut self) {
        if !self.is_connected() {
            return;
        }

        let stop = self.send_frame(Frame::control(FrameType::Stop));
        match timeout(self.config.handshake_timeout, stop).await {
            Ok(Ok(())) => debug!(addr = %self.addr, "sent stop_stream"),
            Ok(Err(e)) => debug!(addr = %self.addr, "stop_stream not delivered: {}", e),
            Err(_) => debug!(addr = %self.addr, "stop_stream timed out"),
        }
    }

    async fn send_audio(&mut self, audio: Bytes) -> RelayResult<()> {
        if !self.is_connected() {
            return Err(RelayError::Write(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport is closed",
            )));
        }

        match timeout(self.config.write_timeout, self.send_frame(Frame::audio(audio))).await {
            Ok(result) => result.map_err(RelayError::Write),
            Err(_) => {
                trace!(addr = %self.addr, "audio write timed out");
                Err(RelayError::Write(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("device did not accept audio within {:?}", self.config.write_timeout),
                )))
            }
        }
    }

    async fn disconnect(&mut self) {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);

        if let Some(reader) = self.reader.take() {
            reader.abort();
        }

        // A device that stopped reading must not hold up teardown
        let close = async {
            let mut writer = self.writer.lock().await;
            writer.close().await
        };
        match timeout(self.config.write_timeout, close).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => trace!(addr = %self.addr, "error closing writer: {}", e),
            Err(_) => debug!(addr = %self.addr, "closing writer timed out"),
        }

        if was_connected {
            info!(addr = %self.addr, "disconnected from device");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Read frames until the peer goes away, routing audio to the event channel
/// and handshake replies to the pending `start_stream`.
async fn read_loop(
    addr: String,
    mut frames: FramedRead<OwnedReadHalf, FrameCodec>,
    events: mpsc::Sender<TransportEvent>,
    replies: mpsc::Sender<HandshakeReply>,
    writer: FrameWriter,
    connected: Arc<AtomicBool>,
    write_timeout: Duration,
) {
    let reason = loop {
        let frame = match frames.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => break format!("read error: {}", e),
            None => break "peer closed connection".to_string(),
        };

        match frame.frame_type {
            FrameType::Audio => {
                if events.send(TransportEvent::Audio(frame.payload)).await.is_err() {
                    // Owner dropped the event channel
                    return;
                }
            }
            FrameType::StartAck => {
                let _ = replies.try_send(HandshakeReply::Ack);
            }
            FrameType::Error => {
                let reason = frame.text();
                warn!(%addr, %reason, "device reported error");
                let _ = replies.try_send(HandshakeReply::Rejected(reason));
            }
            FrameType::Ping => {
                let pong = async {
                    let mut writer = writer.lock().await;
                    writer.send(Frame::control(FrameType::Pong)).await
                };
                match timeout(write_timeout, pong).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => break format!("failed to answer ping: {}", e),
                    Err(_) => break "timed out answering ping".to_string(),
                }
            }
            FrameType::Pong => trace!(%addr, "pong"),
            FrameType::Start | FrameType::Stop => {
                debug!(%addr, frame_type = ?frame.frame_type, "ignoring unexpected frame from device");
            }
        }
    };

    if connected.swap(false, Ordering::SeqCst) {
        info!(%addr, %reason, "device connection lost");
        let _ = events.send(TransportEvent::Disconnected).await;
    }
}
