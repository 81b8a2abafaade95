// Shared test doubles: a fake device speaking the wire protocol over
// loopback TCP, a scripted in-memory connector and a recording publisher.

#![allow(dead_code)]

use anyhow::Result;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use intercom_relay::{
    AudioPublisher, Connector, Frame, FrameCodec, FrameType, RelayError, RelayResult, Transport,
    TransportEvent, TransportEvents,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio_util::codec::{FramedRead, FramedWrite};

pub const WAIT: Duration = Duration::from_secs(3);

/// Poll `cond` until it holds or `WAIT` elapses
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

// ============================================================================
// Fake device
// ============================================================================

/// How the fake device answers a `Start` request
#[derive(Debug, Clone, Copy)]
pub enum Handshake {
    Ack,
    Reject(&'static str),
    Ignore,
    /// Acknowledge, then never read from the socket again
    AckThenStall,
}

enum Action {
    Send(Frame),
    Close,
}

/// Device firmware stand-in listening on 127.0.0.1
pub struct FakeDevice {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    received: mpsc::UnboundedReceiver<Frame>,
    connections: Arc<Mutex<Vec<mpsc::UnboundedSender<Action>>>>,
}

impl FakeDevice {
    pub async fn spawn(handshake: Handshake) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accepted = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let connections = Arc::new(Mutex::new(Vec::new()));
        let (received_tx, received) = mpsc::unbounded_channel();

        {
            let accepted = Arc::clone(&accepted);
            let closed = Arc::clone(&closed);
            let connections = Arc::clone(&connections);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let (actions_tx, actions_rx) = mpsc::unbounded_channel();
                    connections.lock().unwrap().push(actions_tx);
                    accepted.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(
                        stream,
                        handshake,
                        received_tx.clone(),
                        actions_rx,
                        Arc::clone(&closed),
                    ));
                }
            });
        }

        Self {
            addr,
            accepted,
            closed,
            received,
            connections,
        }
    }

    /// `host:port` string for start requests
    pub fn endpoint(&self) -> String {
        self.addr.to_string()
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Connections that have ended on the device side
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a frame on the most recent connection
    pub fn send(&self, frame: Frame) {
        let connections = self.connections.lock().unwrap();
        let latest = connections.last().expect("no connection to the fake device");
        let _ = latest.send(Action::Send(frame));
    }

    pub fn send_audio(&self, audio: &[u8]) {
        self.send(Frame::audio(Bytes::copy_from_slice(audio)));
    }

    /// Drop the most recent connection
    pub fn close(&self) {
        let connections = self.connections.lock().unwrap();
        if let Some(latest) = connections.last() {
            let _ = latest.send(Action::Close);
        }
    }

    /// Next frame the relay wrote to the device
    pub async fn next_frame(&mut self) -> Frame {
        tokio::time::timeout(WAIT, self.received.recv())
            .await
            .expect("timed out waiting for a frame from the relay")
            .expect("fake device stopped")
    }

    /// Next frame of the given type, skipping others
    pub async fn next_of(&mut self, frame_type: FrameType) -> Frame {
        loop {
            let frame = self.next_frame().await;
            if frame.frame_type == frame_type {
                return frame;
            }
        }
    }

    /// Frames received so far, without waiting
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.received.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

async fn serve(
    stream: TcpStream,
    handshake: Handshake,
    received: mpsc::UnboundedSender<Frame>,
    mut actions: mpsc::UnboundedReceiver<Action>,
    closed: Arc<AtomicUsize>,
) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, FrameCodec::new());
    let mut writer = FramedWrite::new(write_half, FrameCodec::new());

    loop {
        tokio::select! {
            frame = reader.next() => match frame {
                Some(Ok(frame)) => {
                    if frame.frame_type == FrameType::Start {
                        let reply = match handshake {
                            Handshake::Ack | Handshake::AckThenStall => {
                                Some(Frame::control(FrameType::StartAck))
                            }
                            Handshake::Reject(reason) => Some(Frame::error(reason)),
                            Handshake::Ignore => None,
                        };
                        if let Some(reply) = reply {
                            if writer.send(reply).await.is_err() {
                                break;
                            }
                        }
                        if matches!(handshake, Handshake::AckThenStall) {
                            let _ = received.send(frame.clone());
                            // Keep the socket open without ever reading it
                            std::future::pending::<()>().await;
                        }
                    }
                    let _ = received.send(frame);
                }
                _ => break,
            },
            action = actions.recv() => match action {
                Some(Action::Send(frame)) => {
                    if writer.send(frame).await.is_err() {
                        break;
                    }
                }
                Some(Action::Close) | None => break,
            },
        }
    }

    closed.fetch_add(1, Ordering::SeqCst);
}

/// An address nothing is listening on
pub async fn unreachable_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

// ============================================================================
// Recording publisher
// ============================================================================

#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, Bytes)>>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn published(&self) -> Vec<(String, Bytes)> {
        self.published.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl AudioPublisher for RecordingPublisher {
    async fn publish(&self, device_id: &str, audio: Bytes) -> Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((device_id.to_string(), audio));
        Ok(())
    }
}

// ============================================================================
// Scripted connector
// ============================================================================

/// Test-side handle on one scripted connection
#[derive(Clone)]
pub struct ScriptedLink {
    pub host: String,
    pub port: u16,
    pub events: mpsc::Sender<TransportEvent>,
    pub writes: Arc<Mutex<Vec<Bytes>>>,
    pub stop_sent: Arc<AtomicBool>,
    pub disconnected: Arc<AtomicBool>,
    /// Writes parked forever because the connector stalls writes
    pub stalled_writes: Arc<AtomicUsize>,
}

impl ScriptedLink {
    pub fn writes(&self) -> Vec<Bytes> {
        self.writes.lock().unwrap().clone()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub async fn emit(&self, event: TransportEvent) {
        self.events.send(event).await.unwrap();
    }
}

struct ScriptedTransport {
    link: ScriptedLink,
    reject_handshake: bool,
    stall_writes: bool,
    handshake_gate: Option<Arc<Notify>>,
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn start_stream(&mut self) -> RelayResult<()> {
        if let Some(gate) = &self.handshake_gate {
            gate.notified().await;
        }
        if self.reject_handshake {
            return Err(RelayError::Handshake("rejected by script".to_string()));
        }
        Ok(())
    }

    async fn stop_stream(&mut self) {
        self.link.stop_sent.store(true, Ordering::SeqCst);
    }

    async fn send_audio(&mut self, audio: Bytes) -> RelayResult<()> {
        if self.link.is_disconnected() {
            return Err(RelayError::Write(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "scripted link closed",
            )));
        }
        if self.stall_writes {
            self.link.stalled_writes.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }
        self.link.writes.lock().unwrap().push(audio);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.link.disconnected.store(true, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        !self.link.is_disconnected()
    }
}

/// In-memory `Connector` whose links are observable from the test
#[derive(Default)]
pub struct ScriptedConnector {
    pub fail_connect: AtomicBool,
    pub reject_handshake: AtomicBool,
    pub stall_writes: AtomicBool,
    pub connect_delay: Mutex<Option<Duration>>,
    pub handshake_gate: Mutex<Option<Arc<Notify>>>,
    links: Mutex<Vec<ScriptedLink>>,
    /// Connects made while an earlier link was still open
    overlapping_connects: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn links(&self) -> Vec<ScriptedLink> {
        self.links.lock().unwrap().clone()
    }

    pub fn link(&self, index: usize) -> ScriptedLink {
        self.links()[index].clone()
    }

    pub fn connects(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    pub fn open_links(&self) -> usize {
        self.links()
            .iter()
            .filter(|link| !link.is_disconnected())
            .count()
    }

    pub fn overlapping_connects(&self) -> usize {
        self.overlapping_connects.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> RelayResult<(Box<dyn Transport>, TransportEvents)> {
        let delay = *self.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(RelayError::Connect {
                addr: format!("{}:{}", host, port),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }

        let (events_tx, events_rx) = mpsc::channel(64);
        let link = ScriptedLink {
            host: host.to_string(),
            port,
            events: events_tx,
            writes: Arc::new(Mutex::new(Vec::new())),
            stop_sent: Arc::new(AtomicBool::new(false)),
            disconnected: Arc::new(AtomicBool::new(false)),
            stalled_writes: Arc::new(AtomicUsize::new(0)),
        };

        {
            let mut links = self.links.lock().unwrap();
            if links.iter().any(|existing| !existing.is_disconnected()) {
                self.overlapping_connects.fetch_add(1, Ordering::SeqCst);
            }
            links.push(link.clone());
        }

        let _ = link.events.try_send(TransportEvent::Connected);

        let transport = ScriptedTransport {
            link,
            reject_handshake: self.reject_handshake.load(Ordering::SeqCst),
            stall_writes: self.stall_writes.load(Ordering::SeqCst),
            handshake_gate: self.handshake_gate.lock().unwrap().clone(),
        };

        Ok((Box::new(transport), events_rx))
    }
}
