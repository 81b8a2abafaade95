use crate::error::{RelayError, RelayResult};
use crate::publisher::AudioPublisher;
use crate::session::{RelaySession, SessionConfig, SessionState, SessionStats};
use crate::transport::{split_endpoint, Connector};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

type SessionMap = Arc<RwLock<HashMap<String, Arc<RelaySession>>>>;
type LockTable = StdMutex<HashMap<String, Arc<Mutex<()>>>>;

/// Device id -> live relay session
///
/// Holds at most one session per device. Start and stop for the same device
/// are serialized through a per-device lock; different devices never contend.
pub struct SessionRegistry {
    connector: Arc<dyn Connector>,
    publisher: Arc<dyn AudioPublisher>,
    config: SessionConfig,
    sessions: SessionMap,
    locks: LockTable,
}

impl SessionRegistry {
    pub fn new(
        connector: Arc<dyn Connector>,
        publisher: Arc<dyn AudioPublisher>,
        config: SessionConfig,
    ) -> Self {
        Self {
            connector,
            publisher,
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Start relaying for `device_id`, replacing any existing session
    ///
    /// `host` may carry an explicit `:port`. An already active session to the
    /// same endpoint is kept as is.
    pub async fn start_session(&self, device_id: &str, host: &str) -> RelayResult<()> {
        let (host, port) = split_endpoint(host, self.config.device_port);

        let key_lock = self.key_lock(device_id);
        let _guard = key_lock.lock.lock().await;

        if let Some(existing) = self.live_session(device_id).await {
            if existing.is_active() && existing.host() == host && existing.port() == port {
                debug!(%device_id, %host, port, "session already active for endpoint");
                return Ok(());
            }

            info!(%device_id, old_host = %existing.host(), "stopping existing session");
            self.remove_if_current(device_id, &existing).await;
            existing.stop().await;
        }

        let session = Arc::new(RelaySession::new(
            device_id,
            host,
            port,
            self.config.clone(),
            Arc::clone(&self.connector),
            Arc::clone(&self.publisher),
        ));

        self.sessions
            .write()
            .await
            .insert(device_id.to_string(), Arc::clone(&session));
        self.spawn_reaper(device_id, &session);

        match session.start().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.remove_if_current(device_id, &session).await;
                Err(e)
            }
        }
    }

    /// Stop and forget the session for `device_id`; no-op when there is none
    pub async fn stop_session(&self, device_id: &str) {
        // Interrupt a pending start so we don't wait out its timeouts
        let pending = self.sessions.read().await.get(device_id).cloned();
        if let Some(pending) = pending {
            pending.cancel_start();
        }

        let key_lock = self.key_lock(device_id);
        let _guard = key_lock.lock.lock().await;

        let removed = self.sessions.write().await.remove(device_id);
        match removed {
            Some(session) => {
                session.stop().await;
                info!(%device_id, "session stopped");
            }
            None => debug!(%device_id, "no session to stop"),
        }
    }

    /// Forward client audio to the device's session
    pub async fn submit_client_audio(&self, device_id: &str, audio: Bytes) -> RelayResult<()> {
        let session = self.sessions.read().await.get(device_id).cloned();
        match session {
            Some(session) => session.submit_audio(audio),
            None => Err(RelayError::UnknownDevice(device_id.to_string())),
        }
    }

    pub async fn session(&self, device_id: &str) -> Option<Arc<RelaySession>> {
        self.sessions
            .read()
            .await
            .get(device_id)
            .filter(|session| session.state().is_live())
            .cloned()
    }

    pub async fn stats(&self, device_id: &str) -> Option<SessionStats> {
        self.session(device_id).await.map(|session| session.stats())
    }

    /// Device ids with a live session, sorted
    pub async fn active_devices(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        let mut devices: Vec<String> = sessions
            .iter()
            .filter(|(_, session)| session.state().is_live())
            .map(|(device_id, _)| device_id.clone())
            .collect();
        devices.sort();
        devices
    }

    /// Stop every session (used on shutdown)
    pub async fn stop_all(&self) {
        let devices: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        for device_id in devices {
            self.stop_session(&device_id).await;
        }
    }

    /// Per-device lock entries currently held or awaited
    pub fn held_locks(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn key_lock(&self, device_id: &str) -> KeyLock<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = Arc::clone(locks.entry(device_id.to_string()).or_default());
        KeyLock {
            table: &self.locks,
            device_id: device_id.to_string(),
            lock,
        }
    }

    /// Current live session, pruning a closed leftover
    async fn live_session(&self, device_id: &str) -> Option<Arc<RelaySession>> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(device_id) {
            Some(session) if session.state().is_live() => Some(Arc::clone(session)),
            Some(_) => {
                sessions.remove(device_id);
                None
            }
            None => None,
        }
    }

    async fn remove_if_current(&self, device_id: &str, session: &Arc<RelaySession>) {
        remove_if_current(&self.sessions, device_id, &Arc::downgrade(session)).await;
    }

    /// Drop the map entry once the session closes on its own (peer disconnect)
    fn spawn_reaper(&self, device_id: &str, session: &Arc<RelaySession>) {
        let sessions = Arc::clone(&self.sessions);
        let device_id = device_id.to_string();
        let target = Arc::downgrade(session);
        let mut state = session.subscribe_state();

        tokio::spawn(async move {
            let closed = state
                .wait_for(|state| *state == SessionState::Closed)
                .await
                .is_ok();
            if closed && remove_if_current(&sessions, &device_id, &target).await {
                debug!(%device_id, "reaped closed session");
            }
        });
    }
}

/// Handle on one device's lock; the table entry goes away with the last handle
struct KeyLock<'a> {
    table: &'a LockTable,
    device_id: String,
    lock: Arc<Mutex<()>>,
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the table, one here
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.device_id);
        }
    }
}

async fn remove_if_current(
    sessions: &SessionMap,
    device_id: &str,
    target: &Weak<RelaySession>,
) -> bool {
    let mut sessions = sessions.write().await;
    let is_current = sessions
        .get(device_id)
        .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), target.as_ptr()));
    if is_current {
        sessions.remove(device_id);
    }
    is_current
}
