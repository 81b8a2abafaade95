use super::config::SessionConfig;
use super::state::SessionState;
use super::stats::{SessionCounters, SessionStats};
use crate::error::{RelayError, RelayResult};
use crate::publisher::AudioPublisher;
use crate::transport::{Connector, Transport, TransportEvent, TransportEvents};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

type SharedTransport = Arc<Mutex<Option<Box<dyn Transport>>>>;

const LIVE_STATES: [SessionState; 4] = [
    SessionState::Idle,
    SessionState::Connecting,
    SessionState::Active,
    SessionState::Closing,
];

/// A relay session between a client and one device
///
/// Owns at most one transport. Outbound audio is written in submission order
/// by a single writer task; inbound audio is published only while active.
pub struct RelaySession {
    device_id: String,
    host: String,
    port: u16,
    session_id: Uuid,
    started_at: DateTime<Utc>,
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    publisher: Arc<dyn AudioPublisher>,

    /// Current state; every transition goes through `transition`
    state: Arc<watch::Sender<SessionState>>,

    /// Present while the stream is up
    transport: SharedTransport,

    /// Feeds the outbound writer task while active
    outbound: StdMutex<Option<mpsc::Sender<Bytes>>>,

    counters: Arc<SessionCounters>,

    /// Cancelled by `stop()`; aborts an in-flight start and the delivery task
    cancel: CancellationToken,

    tasks: StdMutex<Vec<JoinHandle<()>>>,

    /// Outbound writer, aborted before teardown touches the transport
    writer: StdMutex<Option<JoinHandle<()>>>,
}

impl RelaySession {
    pub fn new(
        device_id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        publisher: Arc<dyn AudioPublisher>,
    ) -> Self {
        let device_id = device_id.into();
        let host = host.into();
        let (state, _) = watch::channel(SessionState::Idle);

        debug!(%device_id, %host, port, "created relay session");

        Self {
            device_id,
            host,
            port,
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            config,
            connector,
            publisher,
            state: Arc::new(state),
            transport: Arc::new(Mutex::new(None)),
            outbound: StdMutex::new(None),
            counters: Arc::new(SessionCounters::default()),
            cancel: CancellationToken::new(),
            tasks: StdMutex::new(Vec::new()),
            writer: StdMutex::new(None),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Connect, perform the start handshake and begin relaying
    ///
    /// Calling this on an active session is a no-op that succeeds.
    pub async fn start(&self) -> RelayResult<()> {
        if !self.transition(&[SessionState::Idle], SessionState::Connecting) {
            return match self.state() {
                SessionState::Active => {
                    warn!(device_id = %self.device_id, "session already active");
                    Ok(())
                }
                SessionState::Closed if self.cancel.is_cancelled() => Err(RelayError::Cancelled),
                other => Err(RelayError::InvalidState(other)),
            };
        }

        info!(device_id = %self.device_id, host = %self.host, port = self.port, "starting relay session");

        let connected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RelayError::Cancelled),
            result = self.connector.connect(&self.host, self.port) => result,
        };

        let (mut transport, events) = match connected {
            Ok(link) => link,
            Err(e) => {
                error!(device_id = %self.device_id, host = %self.host, "failed to connect: {}", e);
                self.close();
                return Err(e);
            }
        };

        self.spawn_inbound(events);

        let handshake = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RelayError::Cancelled),
            result = transport.start_stream() => result,
        };

        if let Err(e) = handshake {
            error!(device_id = %self.device_id, "failed to start stream: {}", e);
            transport.disconnect().await;
            self.close();
            return Err(e);
        }

        *self.transport.lock().await = Some(transport);
        self.spawn_outbound();

        if !self.transition(&[SessionState::Connecting], SessionState::Active) {
            // stop() or a peer disconnect won the race against the handshake
            self.abort_writer();
            let transport = self.transport.lock().await.take();
            if let Some(mut transport) = transport {
                transport.stop_stream().await;
                transport.disconnect().await;
            }
            self.close();

            return Err(if self.cancel.is_cancelled() {
                RelayError::Cancelled
            } else {
                RelayError::Disconnected
            });
        }

        info!(device_id = %self.device_id, session_id = %self.session_id, "relay session active");
        Ok(())
    }

    /// Tear the session down: stop streaming, disconnect, release the transport
    ///
    /// Interrupts an in-flight `start()`. Safe to call more than once.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.transition(
            &[SessionState::Idle, SessionState::Connecting, SessionState::Active],
            SessionState::Closing,
        );

        self.outbound_slot().take();

        // The writer may be parked on a device that stopped reading; it holds
        // the transport lock until it is gone
        self.abort_writer();

        let transport = self.transport.lock().await.take();
        if let Some(mut transport) = transport {
            transport.stop_stream().await;
            transport.disconnect().await;
        }

        self.abort_tasks();
        self.transition(&LIVE_STATES, SessionState::Closed);

        info!(
            device_id = %self.device_id,
            sent = self.counters.audio_sent.load(Ordering::Relaxed),
            received = self.counters.audio_received.load(Ordering::Relaxed),
            "relay session stopped"
        );
    }

    /// Queue one client audio packet for the device
    ///
    /// Never touches the network on a session that is not active.
    pub fn submit_audio(&self, audio: Bytes) -> RelayResult<()> {
        let count = SessionCounters::bump(&self.counters.audio_sent);
        trace!(device_id = %self.device_id, count, bytes = audio.len(), "client audio");

        if !self.is_active() {
            SessionCounters::bump(&self.counters.outbound_dropped);
            return Err(RelayError::NotActive);
        }

        let outbound = self.outbound_slot();
        let Some(queue) = outbound.as_ref() else {
            SessionCounters::bump(&self.counters.outbound_dropped);
            return Err(RelayError::NotActive);
        };

        match queue.try_send(audio) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                SessionCounters::bump(&self.counters.outbound_dropped);
                Err(RelayError::Backpressure)
            }
            Err(TrySendError::Closed(_)) => {
                SessionCounters::bump(&self.counters.outbound_dropped);
                Err(RelayError::NotActive)
            }
        }
    }

    pub fn stats(&self) -> SessionStats {
        let load = |counter: &std::sync::atomic::AtomicU64| counter.load(Ordering::Relaxed);

        SessionStats {
            device_id: self.device_id.clone(),
            session_id: self.session_id,
            host: self.host.clone(),
            port: self.port,
            state: self.state(),
            started_at: self.started_at,
            audio_sent: load(&self.counters.audio_sent),
            audio_received: load(&self.counters.audio_received),
            audio_published: load(&self.counters.audio_published),
            inbound_dropped: load(&self.counters.inbound_dropped),
            outbound_dropped: load(&self.counters.outbound_dropped),
            write_errors: load(&self.counters.write_errors),
            publish_errors: load(&self.counters.publish_errors),
        }
    }

    /// Abort an in-flight `start()` without tearing anything else down
    pub(crate) fn cancel_start(&self) {
        if self.state() == SessionState::Connecting {
            self.cancel.cancel();
        }
    }

    fn transition(&self, from: &[SessionState], to: SessionState) -> bool {
        transition(&self.state, &self.device_id, from, to)
    }

    /// Final transition for a start that never became active
    fn close(&self) {
        self.outbound_slot().take();
        self.abort_tasks();
        self.transition(&LIVE_STATES, SessionState::Closed);
    }

    fn outbound_slot(&self) -> MutexGuard<'_, Option<mpsc::Sender<Bytes>>> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(&self, task: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }

    fn abort_writer(&self) {
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(writer) = writer {
            writer.abort();
        }
    }

    fn abort_tasks(&self) {
        self.abort_writer();
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            task.abort();
        }
    }

    fn spawn_inbound(&self, events: TransportEvents) {
        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.inbound_queue_depth.max(1));

        let event_task = tokio::spawn(run_events(
            self.device_id.clone(),
            events,
            inbound_tx,
            Arc::clone(&self.state),
            Arc::clone(&self.transport),
            Arc::clone(&self.counters),
        ));

        let delivery_task = tokio::spawn(run_delivery(
            self.device_id.clone(),
            inbound_rx,
            Arc::clone(&self.publisher),
            self.cancel.clone(),
            Arc::clone(&self.counters),
        ));

        self.track(event_task);
        self.track(delivery_task);
    }

    fn spawn_outbound(&self) {
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_queue_depth.max(1));

        let writer_task = tokio::spawn(run_outbound(
            self.device_id.clone(),
            outbound_rx,
            Arc::clone(&self.transport),
            Arc::clone(&self.counters),
        ));

        *self.outbound_slot() = Some(outbound_tx);
        *self.writer.lock().unwrap_or_else(PoisonError::into_inner) = Some(writer_task);
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.abort_tasks();
    }
}

fn transition(
    state: &watch::Sender<SessionState>,
    device_id: &str,
    from: &[SessionState],
    to: SessionState,
) -> bool {
    let mut previous = None;
    state.send_if_modified(|current| {
        if from.contains(current) {
            previous = Some(*current);
            *current = to;
            true
        } else {
            false
        }
    });

    match previous {
        Some(previous) => {
            debug!(%device_id, from = %previous, %to, "session state changed");
            true
        }
        None => false,
    }
}

/// Consume transport events: gate inbound audio on the active state and
/// close the session when the device goes away.
async fn run_events(
    device_id: String,
    mut events: TransportEvents,
    inbound: mpsc::Sender<Bytes>,
    state: Arc<watch::Sender<SessionState>>,
    transport: SharedTransport,
    counters: Arc<SessionCounters>,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Connected => debug!(%device_id, "transport connected"),
            TransportEvent::Audio(audio) => {
                let count = SessionCounters::bump(&counters.audio_received);
                trace!(%device_id, count, bytes = audio.len(), "device audio");

                if *state.borrow() != SessionState::Active {
                    SessionCounters::bump(&counters.inbound_dropped);
                    debug!(%device_id, count, "dropping device audio, session not active");
                    continue;
                }

                if let Err(e) = inbound.try_send(audio) {
                    let dropped = SessionCounters::bump(&counters.inbound_dropped);
                    if matches!(e, TrySendError::Full(_)) {
                        warn!(%device_id, dropped, "publish queue full, dropping device audio");
                    }
                }
            }
            TransportEvent::Disconnected => {
                let closed = transition(
                    &state,
                    &device_id,
                    &[SessionState::Connecting, SessionState::Active],
                    SessionState::Closed,
                );
                if closed {
                    info!(%device_id, "device disconnected, session closed");
                    let link = transport.lock().await.take();
                    if let Some(mut link) = link {
                        link.disconnect().await;
                    }
                }
                break;
            }
        }
    }
}

/// Hand queued device audio to the publisher in arrival order
async fn run_delivery(
    device_id: String,
    mut inbound: mpsc::Receiver<Bytes>,
    publisher: Arc<dyn AudioPublisher>,
    cancel: CancellationToken,
    counters: Arc<SessionCounters>,
) {
    loop {
        let audio = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = inbound.recv() => match next {
                Some(audio) => audio,
                None => break,
            },
        };

        match publisher.publish(&device_id, audio).await {
            Ok(()) => {
                SessionCounters::bump(&counters.audio_published);
            }
            Err(e) => {
                let errors = SessionCounters::bump(&counters.publish_errors);
                warn!(%device_id, errors, "failed to publish device audio: {:#}", e);
            }
        }
    }
}

/// Write queued client audio to the device, one packet at a time
async fn run_outbound(
    device_id: String,
    mut outbound: mpsc::Receiver<Bytes>,
    transport: SharedTransport,
    counters: Arc<SessionCounters>,
) {
    while let Some(audio) = outbound.recv().await {
        let mut guard = transport.lock().await;
        let Some(link) = guard.as_mut() else {
            SessionCounters::bump(&counters.outbound_dropped);
            continue;
        };

        if let Err(e) = link.send_audio(audio).await {
            let errors = SessionCounters::bump(&counters.write_errors);
            warn!(%device_id, errors, "failed to write client audio: {}", e);
        }
    }
}
