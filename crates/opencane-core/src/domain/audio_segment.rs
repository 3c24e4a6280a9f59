//! [`AudioSegment`]: one capture turn's worth of ordered audio packets
//! (spec §3, §4.5). Owned exclusively by the Connection Runtime.

use chrono::{DateTime, Utc};

/// One accepted audio packet inside a segment.
#[derive(Debug, Clone)]
pub struct AudioPacket {
    pub seq: u64,
    pub ts: DateTime<Utc>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub session_id: String,
    pub seq_start: u64,
    pub seq_end: Option<u64>,
    pub packets: Vec<AudioPacket>,
    pub vad_accepted: bool,
    pub finalized_transcript: Option<String>,
}

impl AudioSegment {
    /// Opens on `listen_start` (spec §4.6).
    #[must_use]
    pub fn open(session_id: String, seq_start: u64) -> Self {
        Self {
            session_id,
            seq_start,
            seq_end: None,
            packets: Vec::new(),
            vad_accepted: false,
            finalized_transcript: None,
        }
    }

    pub fn append(&mut self, packet: AudioPacket) {
        self.packets.push(packet);
    }

    /// Closes on `listen_stop` or `abort` (spec §3).
    pub fn close(&mut self, seq_end: u64) {
        self.seq_end = Some(seq_end);
    }

    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.packets.iter().map(|p| p.bytes.len()).sum()
    }
}
