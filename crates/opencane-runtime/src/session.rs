//! Session Manager (C4, spec §4.4): the four operations over [`Session`],
//! backed by `opencane-db`'s `Store` for the durable half of seq tracking.
//!
//! Concurrency: one `tokio::sync::Mutex<Session>` per `(device_id,
//! session_id)`, never a global lock (spec §4.4, §5 "per-session mutex").
//! The registry itself is an `Arc<RwLock<HashMap<..>>>`, the same shape the
//! teacher's `McpManager` uses for its per-server registry.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use opencane_core::domain::{Session, SessionState};
use opencane_core::envelope::Envelope;
use opencane_core::ports::{SessionSnapshot, Store, StoreError};
use tokio::sync::{Mutex, RwLock};

/// Outcome of [`SessionManager::check_and_commit_seq`] (spec §4.4). Gaps
/// are `New`, not a distinct case — the device retransmits if it must,
/// the runtime never re-requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqDecision {
    New,
    Duplicate,
}

type SessionKey = (String, String);

pub struct SessionManager {
    store: Arc<dyn Store>,
    sessions: RwLock<HashMap<SessionKey, Arc<Mutex<Session>>>>,
    replay_window_capacity: usize,
    pending_commands_capacity: usize,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, replay_window_capacity: usize, pending_commands_capacity: usize) -> Self {
        Self {
            store,
            sessions: RwLock::new(HashMap::new()),
            replay_window_capacity,
            pending_commands_capacity,
        }
    }

    /// `get_or_create(device_id, session_id?)` (spec §4.4): reuses the
    /// device's current session when `session_id` is absent, never minting
    /// a random one — falls back to `{device_id}-default`.
    pub async fn get_or_create(&self, device_id: &str, session_id: Option<&str>) -> Arc<Mutex<Session>> {
        let session_id = session_id.map_or_else(|| format!("{device_id}-default"), ToString::to_string);
        let key = (device_id.to_string(), session_id.clone());

        if let Some(existing) = self.sessions.read().await.get(&key) {
            return Arc::clone(existing);
        }

        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&key) {
            return Arc::clone(existing);
        }

        let session = match self.store.load_session_snapshot(device_id, &session_id).await {
            Ok(Some(snapshot)) => restore_from_snapshot(snapshot, device_id, &session_id),
            _ => Session::new(device_id.to_string(), session_id.clone(), Utc::now()),
        }
        .with_replay_window_capacity(self.replay_window_capacity)
        .with_pending_commands_capacity(self.pending_commands_capacity);

        let handle = Arc::new(Mutex::new(session));
        sessions.insert(key, Arc::clone(&handle));
        handle
    }

    /// `check_and_commit_seq(session, inbound_seq)` (spec §4.4): any
    /// `inbound_seq > last_recv_seq` is `New` and advances the watermark;
    /// anything `<= last_recv_seq` is a `Duplicate`. Gaps are still `New` —
    /// no re-request, the device retransmits if it must. The decision
    /// persists immediately.
    pub async fn check_and_commit_seq(&self, session: &Arc<Mutex<Session>>, inbound_seq: u64) -> Result<SeqDecision, StoreError> {
        let mut guard = session.lock().await;
        let decision = if inbound_seq > guard.last_recv_seq {
            guard.last_recv_seq = inbound_seq;
            SeqDecision::New
        } else {
            SeqDecision::Duplicate
        };
        guard.last_seen_at = Utc::now();
        self.persist_snapshot(&guard).await?;
        Ok(decision)
    }

    /// `next_outbound_seq(session)` (spec §4.4): monotonically increasing,
    /// never reused, persisted on every allocation.
    pub async fn next_outbound_seq(&self, session: &Arc<Mutex<Session>>) -> Result<u64, StoreError> {
        let mut guard = session.lock().await;
        let allocated = guard.next_outbound_seq;
        guard.next_outbound_seq += 1;
        self.persist_snapshot(&guard).await?;
        Ok(allocated)
    }

    /// `record_command(session, envelope)` (spec §4.4): adds to the in-memory
    /// replay window, FIFO-evicting when full.
    pub async fn record_command(&self, session: &Arc<Mutex<Session>>, outbound_seq: u64, envelope: Envelope) {
        session.lock().await.record_command(outbound_seq, envelope);
    }

    /// `update_telemetry(session, kv)` (spec §4.4): shallow merge.
    pub async fn update_telemetry(&self, session: &Arc<Mutex<Session>>, kv: impl IntoIterator<Item = (String, String)>) {
        session.lock().await.update_telemetry(kv);
    }

    /// Number of sessions currently held in memory (spec §6.2
    /// `GET /v1/runtime/status`).
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn persist_snapshot(&self, session: &Session) -> Result<(), StoreError> {
        self.store
            .upsert_session_snapshot(SessionSnapshot {
                device_id: session.device_id.clone(),
                session_id: session.session_id.clone(),
                state: format!("{:?}", session.state).to_lowercase(),
                last_recv_seq: session.last_recv_seq,
                next_outbound_seq: session.next_outbound_seq,
                last_seen_at: session.last_seen_at,
            })
            .await
    }
}

fn restore_from_snapshot(snapshot: SessionSnapshot, device_id: &str, session_id: &str) -> Session {
    let mut session = Session::new(device_id.to_string(), session_id.to_string(), snapshot.last_seen_at);
    session.last_recv_seq = snapshot.last_recv_seq;
    session.next_outbound_seq = snapshot.next_outbound_seq;
    session.last_seen_at = snapshot.last_seen_at;
    session.state = state_from_str(&snapshot.state);
    session
}

fn state_from_str(raw: &str) -> SessionState {
    match raw {
        "ready" => SessionState::Ready,
        "listening" => SessionState::Listening,
        "thinking" => SessionState::Thinking,
        "speaking" => SessionState::Speaking,
        "interrupted" => SessionState::Interrupted,
        "closing" => SessionState::Closing,
        _ => SessionState::Authed,
    }
}
