//! [`Session`]: the per-`(device_id, session_id)` state the Connection
//! Runtime and Session Manager own (spec §3, §4.4).

use std::collections::BTreeMap;
use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;

/// Invariant: exactly one of `Listening`, `Thinking`, `Speaking` is active at
/// once; `Interrupted` is transient and always yields back to `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Authed,
    Ready,
    Listening,
    Thinking,
    Speaking,
    Interrupted,
    Closing,
}

/// A command recorded in the replay window, keyed by the `outbound_seq` it
/// was sent under.
#[derive(Debug, Clone)]
pub struct ReplayEntry {
    pub outbound_seq: u64,
    pub envelope: Envelope,
}

/// Default replay window size (spec §3: "ring buffer of the last N sent
/// commands, default N=64").
pub const DEFAULT_REPLAY_WINDOW: usize = 64;

/// Default bound on `pending_commands` before oldest-drop (spec §4.6:
/// "bounded; oldest-drop on overflow"). Not named in §3's data model; chosen
/// generously relative to the replay window since it covers the same
/// at-least-once delivery need while the device is offline.
pub const DEFAULT_PENDING_COMMANDS_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct Session {
    pub device_id: String,
    pub session_id: String,
    pub state: SessionState,

    /// Highest contiguous inbound seq acknowledged to the device.
    pub last_recv_seq: u64,

    /// Next server→device seq this session will allocate.
    pub next_outbound_seq: u64,

    pub telemetry: BTreeMap<String, String>,

    /// Outbound commands awaiting delivery while the device is offline,
    /// bounded, oldest-drop on overflow.
    pending_commands: VecDeque<Envelope>,
    pending_commands_capacity: usize,

    /// Ring buffer of the last `replay_window_capacity` sent commands keyed
    /// by `outbound_seq`, for post-reconnect replay.
    replay_window: VecDeque<ReplayEntry>,
    replay_window_capacity: usize,

    pub active_turn_id: Option<String>,
    pub active_task_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn new(device_id: String, session_id: String, now: DateTime<Utc>) -> Self {
        Self {
            device_id,
            session_id,
            state: SessionState::Authed,
            last_recv_seq: 0,
            next_outbound_seq: 1,
            telemetry: BTreeMap::new(),
            pending_commands: VecDeque::new(),
            pending_commands_capacity: DEFAULT_PENDING_COMMANDS_CAPACITY,
            replay_window: VecDeque::new(),
            replay_window_capacity: DEFAULT_REPLAY_WINDOW,
            active_turn_id: None,
            active_task_id: None,
            created_at: now,
            last_seen_at: now,
        }
    }

    #[must_use]
    pub fn with_replay_window_capacity(mut self, capacity: usize) -> Self {
        self.replay_window_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_pending_commands_capacity(mut self, capacity: usize) -> Self {
        self.pending_commands_capacity = capacity.max(1);
        self
    }

    /// Record a sent command in the replay window, evicting the oldest entry
    /// in FIFO order when full (spec §4.4 `record_command`).
    pub fn record_command(&mut self, outbound_seq: u64, envelope: Envelope) {
        if self.replay_window.len() >= self.replay_window_capacity {
            self.replay_window.pop_front();
        }
        self.replay_window.push_back(ReplayEntry {
            outbound_seq,
            envelope,
        });
    }

    /// Append to `pending_commands`, dropping the oldest entry on overflow
    /// (spec §4.6 offline buffering).
    pub fn push_pending(&mut self, envelope: Envelope) {
        if self.pending_commands.len() >= self.pending_commands_capacity {
            self.pending_commands.pop_front();
        }
        self.pending_commands.push_back(envelope);
    }

    /// Drain `pending_commands` in FIFO order (spec §4.6: "flush
    /// `pending_commands` regardless of replay configuration").
    pub fn drain_pending(&mut self) -> Vec<Envelope> {
        self.pending_commands.drain(..).collect()
    }

    /// Entries in the replay window with `outbound_seq > last_recv_seq`, in
    /// original order (spec §4.6 reconnect replay).
    #[must_use]
    pub fn replay_after(&self, last_recv_seq: u64) -> Vec<Envelope> {
        self.replay_window
            .iter()
            .filter(|entry| entry.outbound_seq > last_recv_seq)
            .map(|entry| entry.envelope.clone())
            .collect()
    }

    /// Merge `kv` shallowly into `telemetry` (spec §4.4 `update_telemetry`).
    pub fn update_telemetry(&mut self, kv: impl IntoIterator<Item = (String, String)>) {
        self.telemetry.extend(kv);
    }

    #[must_use]
    pub const fn is_active_turn(&self) -> bool {
        matches!(
            self.state,
            SessionState::Listening | SessionState::Thinking | SessionState::Speaking
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{AckPayload, EnvelopePayload};

    fn env(seq: u64) -> Envelope {
        Envelope {
            version: "0.1".to_string(),
            msg_id: format!("m-{seq}"),
            device_id: "dev-001".to_string(),
            session_id: Some("s1".to_string()),
            seq: Some(seq),
            ts: 0,
            payload: EnvelopePayload::Ack(AckPayload { ack_seq: seq }),
        }
    }

    #[test]
    fn replay_window_evicts_fifo_when_full() {
        let now = Utc::now();
        let mut session =
            Session::new("dev-001".to_string(), "s1".to_string(), now).with_replay_window_capacity(2);
        session.record_command(1, env(1));
        session.record_command(2, env(2));
        session.record_command(3, env(3));

        let replayed = session.replay_after(0);
        let seqs: Vec<u64> = replayed.iter().map(|e| e.seq.unwrap()).collect();
        assert_eq!(seqs, vec![2, 3]);
    }

    #[test]
    fn replay_after_filters_by_last_recv_seq() {
        let now = Utc::now();
        let mut session = Session::new("dev-001".to_string(), "s1".to_string(), now);
        for seq in 1..=5 {
            session.record_command(seq, env(seq));
        }
        let replayed = session.replay_after(3);
        let seqs: Vec<u64> = replayed.iter().map(|e| e.seq.unwrap()).collect();
        assert_eq!(seqs, vec![4, 5]);
    }

    #[test]
    fn pending_commands_drop_oldest_on_overflow() {
        let now = Utc::now();
        let mut session =
            Session::new("dev-001".to_string(), "s1".to_string(), now).with_pending_commands_capacity(2);
        session.push_pending(env(1));
        session.push_pending(env(2));
        session.push_pending(env(3));
        let drained = session.drain_pending();
        let seqs: Vec<u64> = drained.iter().map(|e| e.seq.unwrap()).collect();
        assert_eq!(seqs, vec![2, 3]);
    }

    #[test]
    fn exactly_one_active_turn_state_at_a_time() {
        let now = Utc::now();
        let mut session = Session::new("dev-001".to_string(), "s1".to_string(), now);
        assert!(!session.is_active_turn());
        session.state = SessionState::Listening;
        assert!(session.is_active_turn());
        session.state = SessionState::Interrupted;
        assert!(!session.is_active_turn());
    }
}
