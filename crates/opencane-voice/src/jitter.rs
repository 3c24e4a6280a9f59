//! Jitter reorder buffer (spec §4.5): reorders `audio_chunk` packets by
//! `seq` before they reach the VAD.
//!
//! Packets are inserted by `seq` into a window of at most `window_packets`
//! entries, also bounded by `window` wall-clock time since the oldest
//! buffered packet. The flusher emits a contiguous prefix starting at
//! `next_seq` once it is present; once the window is exceeded it skips the
//! gap and emits whatever is left, counting the skipped seqs as lost.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// One audio packet awaiting reorder, keyed by its envelope `seq`.
#[derive(Debug, Clone)]
pub struct JitterPacket {
    pub seq: u64,
    pub samples: Vec<f32>,
}

pub struct JitterBuffer {
    window_packets: usize,
    window: Duration,
    next_seq: Option<u64>,
    pending: BTreeMap<u64, Vec<f32>>,
    oldest_arrival: Option<Instant>,
    lost: u64,
}

impl JitterBuffer {
    #[must_use]
    pub fn new(window_packets: usize, window: Duration) -> Self {
        Self {
            window_packets: window_packets.max(1),
            window,
            next_seq: None,
            pending: BTreeMap::new(),
            oldest_arrival: None,
            lost: 0,
        }
    }

    /// Number of packets dropped as unrecoverable gaps so far.
    #[must_use]
    pub fn lost_count(&self) -> u64 {
        self.lost
    }

    #[must_use]
    pub fn window_packets(&self) -> usize {
        self.window_packets
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Insert an arriving packet and return any packets now ready to play,
    /// in seq order.
    pub fn push(&mut self, seq: u64, samples: Vec<f32>) -> Vec<JitterPacket> {
        if self.next_seq.is_none() {
            self.next_seq = Some(seq);
        }
        self.pending.insert(seq, samples);
        if self.oldest_arrival.is_none() {
            self.oldest_arrival = Some(Instant::now());
        }
        self.drain_ready()
    }

    /// Flush whatever is ready without a new arrival — called periodically
    /// so a stalled window (missing the next seq forever) still empties.
    pub fn tick(&mut self) -> Vec<JitterPacket> {
        self.drain_ready()
    }

    fn window_exceeded(&self) -> bool {
        if self.pending.len() > self.window_packets {
            return true;
        }
        self.oldest_arrival
            .is_some_and(|t| t.elapsed() >= self.window)
    }

    fn drain_ready(&mut self) -> Vec<JitterPacket> {
        let mut out = Vec::new();
        loop {
            let Some(next) = self.next_seq else { break };

            if let Some(samples) = self.pending.remove(&next) {
                out.push(JitterPacket { seq: next, samples });
                self.next_seq = Some(next + 1);
                if self.pending.is_empty() {
                    self.oldest_arrival = None;
                } else {
                    self.oldest_arrival = Some(Instant::now());
                }
                continue;
            }

            if self.window_exceeded() {
                if let Some((&first_seq, _)) = self.pending.iter().next() {
                    let skipped = first_seq - next;
                    self.lost += skipped;
                    self.next_seq = Some(first_seq);
                    continue;
                }
                break;
            }

            break;
        }
        out
    }
}
