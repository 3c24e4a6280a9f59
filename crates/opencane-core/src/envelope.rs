//! The canonical envelope (spec §3, §4.1).
//!
//! Every message that crosses the device/server boundary — event or
//! command — is shaped as an [`Envelope`]. The payload is modeled as a
//! tagged variant over `type` (Design Notes §9: "model as a tagged variant
//! over `type` with type-specific payload structs; parse on the boundary and
//! keep typed values internally"). An unknown `type` deserializes to
//! [`EnvelopePayload::Unknown`] rather than failing the whole envelope —
//! callers treat that as a recoverable parse error, never a panic.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

fn default_version() -> String {
    "0.1".to_string()
}

/// The canonical message envelope exchanged between a device and the server.
///
/// `type`/`payload` are not plain serde-derived fields: [`EnvelopePayload`]
/// mixes a closed set of typed variants with an open [`EnvelopePayload::Unknown`]
/// fallback, which `serde`'s built-in enum tagging cannot express directly.
/// [`Envelope`] therefore implements [`Serialize`]/[`Deserialize`] by hand via
/// an intermediate wire struct (below) that carries `type` as a plain string
/// and `payload` as a `serde_json::Value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Protocol version, defaults to `"0.1"`.
    pub version: String,

    /// Unique token for this message (idempotency key for the sender).
    pub msg_id: String,

    /// The device this message belongs to.
    pub device_id: String,

    /// The session this message belongs to. Required on payload-bearing types.
    pub session_id: Option<String>,

    /// Monotonic sequence number, per direction, per session.
    pub seq: Option<u64>,

    /// Millisecond epoch timestamp.
    pub ts: i64,

    /// The tagged payload — carries both the `type` discriminant and its
    /// type-specific fields.
    pub payload: EnvelopePayload,
}

impl Envelope {
    /// The wire `type` string for this envelope's payload.
    #[must_use]
    pub fn type_name(&self) -> String {
        self.payload.type_name()
    }
}

/// Wire shape for [`Envelope`]: `type` and `payload` kept untyped so an
/// unrecognized `type` can still be parsed (spec §7: malformed/unknown
/// payloads are recoverable, never a hard failure of the whole message).
#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(default = "default_version")]
    version: String,
    msg_id: String,
    device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    seq: Option<u64>,
    ts: i64,
    r#type: String,
    #[serde(default)]
    payload: Value,
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let payload = self.payload.to_wire_value();
        let wire = WireEnvelope {
            version: self.version.clone(),
            msg_id: self.msg_id.clone(),
            device_id: self.device_id.clone(),
            session_id: self.session_id.clone(),
            seq: self.seq,
            ts: self.ts,
            r#type: self.payload.type_name(),
            payload,
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireEnvelope::deserialize(deserializer)?;
        let payload = EnvelopePayload::from_wire(&wire.r#type, wire.payload)
            .map_err(D::Error::custom)?;
        Ok(Self {
            version: wire.version,
            msg_id: wire.msg_id,
            device_id: wire.device_id,
            session_id: wire.session_id,
            seq: wire.seq,
            ts: wire.ts,
            payload,
        })
    }
}

/// Device → server event types and server → device command types, tagged by
/// `type` on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopePayload {
    // ---- device -> server events ----
    Hello(HelloPayload),
    Heartbeat(HeartbeatPayload),
    ListenStart(ListenStartPayload),
    AudioChunk(AudioChunkPayload),
    ListenStop(ListenStopPayload),
    Abort(AbortPayload),
    ImageReady(ImageReadyPayload),
    Telemetry(TelemetryPayload),
    ToolResult(ToolResultPayload),
    Error(ErrorPayload),

    // ---- server -> device commands ----
    HelloAck(HelloAckPayload),
    Ack(AckPayload),
    SttPartial(SttPartialPayload),
    SttFinal(SttFinalPayload),
    TtsStart(TtsStartPayload),
    TtsChunk(TtsChunkPayload),
    TtsStop(TtsStopPayload),
    TaskUpdate(TaskUpdatePayload),
    ToolCall(ToolCallPayload),
    SetConfig(SetConfigPayload),
    OtaPlan(OtaPlanPayload),
    Close(ClosePayload),

    /// Any `type` this codec does not recognize. Parsed, not rejected — the
    /// runtime logs and drops it rather than panicking (spec §7). Keeps the
    /// original `type` string so the envelope still round-trips.
    Unknown(String, Value),
}

macro_rules! payload_variants {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        fn known_type_name(&self) -> Option<&'static str> {
            match self {
                $(Self::$variant(_) => Some($name),)+
                Self::Unknown(..) => None,
            }
        }

        fn from_known_wire(type_name: &str, value: Value) -> Result<Option<Self>, serde_json::Error> {
            Ok(match type_name {
                $($name => Some(Self::$variant(serde_json::from_value(value)?)),)+
                _ => None,
            })
        }

        fn known_wire_value(&self) -> Option<Value> {
            match self {
                $(Self::$variant(inner) => Some(serde_json::to_value(inner).unwrap_or(Value::Null)),)+
                Self::Unknown(..) => None,
            }
        }
    };
}

impl EnvelopePayload {
    payload_variants! {
        Hello => "hello",
        Heartbeat => "heartbeat",
        ListenStart => "listen_start",
        AudioChunk => "audio_chunk",
        ListenStop => "listen_stop",
        Abort => "abort",
        ImageReady => "image_ready",
        Telemetry => "telemetry",
        ToolResult => "tool_result",
        Error => "error",
        HelloAck => "hello_ack",
        Ack => "ack",
        SttPartial => "stt_partial",
        SttFinal => "stt_final",
        TtsStart => "tts_start",
        TtsChunk => "tts_chunk",
        TtsStop => "tts_stop",
        TaskUpdate => "task_update",
        ToolCall => "tool_call",
        SetConfig => "set_config",
        OtaPlan => "ota_plan",
        Close => "close",
    }

    /// Parse a wire `(type, payload)` pair. An unrecognized `type` or a
    /// `payload` that doesn't match the expected shape both fall back to
    /// [`EnvelopePayload::Unknown`] rather than erroring the envelope.
    fn from_wire(type_name: &str, value: Value) -> Result<Self, serde_json::Error> {
        match Self::from_known_wire(type_name, value.clone()) {
            Ok(Some(payload)) => Ok(payload),
            _ => Ok(Self::Unknown(type_name.to_string(), value)),
        }
    }

    /// The raw JSON value for this payload's `payload` wire field.
    fn to_wire_value(&self) -> Value {
        match self {
            Self::Unknown(_, value) => value.clone(),
            other => other.known_wire_value().unwrap_or(Value::Null),
        }
    }

    /// The wire discriminant for this payload variant. Known variants return
    /// their fixed tag; [`Self::Unknown`] returns back whatever `type` string
    /// it was parsed from, so re-serializing it round-trips.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self.known_type_name() {
            Some(name) => name.to_string(),
            None => match self {
                Self::Unknown(type_name, _) => type_name.clone(),
                _ => unreachable!("known_type_name and known_wire_value must agree on variants"),
            },
        }
    }

    /// Whether this event is ack-able and therefore replayable on duplicate
    /// (spec §8 invariant 3): every duplicate of an ack-able type re-emits
    /// exactly one `ack`-family command.
    #[must_use]
    pub const fn is_ackable_event(&self) -> bool {
        matches!(
            self,
            Self::Hello(_)
                | Self::Heartbeat(_)
                | Self::ListenStart(_)
                | Self::AudioChunk(_)
                | Self::ListenStop(_)
                | Self::Abort(_)
                | Self::ImageReady(_)
                | Self::Telemetry(_)
                | Self::ToolResult(_)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HelloPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_recv_seq: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modem_profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HeartbeatPayload {
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub telemetry: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ListenStartPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioChunkPayload {
    /// Raw PCM bytes, base64-encoded on the wire (`json_b64` mode). In
    /// `framed_packet` mode this is populated by the transport adapter after
    /// decoding the 16-byte frame header.
    pub audio_b64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ListenStopPayload {
    /// If the device already has a transcript (on-device STT), it is used
    /// verbatim and no `TranscriptionProvider` call is made (spec §4.5).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AbortPayload {
    #[serde(default)]
    pub cancel_task: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageReadyPayload {
    pub image_b64: String,
    pub mime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TelemetryPayload {
    #[serde(default)]
    pub kv: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolResultPayload {
    pub operation_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HelloAckPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_time_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AckPayload {
    pub ack_seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SttPartialPayload {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SttFinalPayload {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TtsStartPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TtsChunkPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_b64: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TtsStopPayload {
    #[serde(default)]
    pub aborted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskUpdatePayload {
    pub task_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallPayload {
    pub operation_id: String,
    pub tool: String,
    pub args: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SetConfigPayload {
    #[serde(default)]
    pub kv: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OtaPlanPayload {
    pub plan_id: String,
    pub target_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClosePayload {
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(payload: EnvelopePayload) -> Envelope {
        Envelope {
            version: default_version(),
            msg_id: "m-1".to_string(),
            device_id: "dev-001".to_string(),
            session_id: Some("s1".to_string()),
            seq: Some(1),
            ts: 1_700_000_000_000,
            payload,
        }
    }

    #[test]
    fn hello_round_trips_byte_identical() {
        let env = sample(EnvelopePayload::Hello(HelloPayload {
            last_recv_seq: Some(42),
            modem_profile: Some("ec600mcnle_v1".to_string()),
            firmware_version: None,
        }));
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(env, back);
    }

    #[test]
    fn default_version_applies_when_absent() {
        let json = r#"{"msg_id":"m","device_id":"d","ts":1,"type":"heartbeat","payload":{}}"#;
        let env: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.version, "0.1");
    }

    #[test]
    fn unknown_type_parses_recoverably() {
        let json = r#"{"msg_id":"m","device_id":"d","ts":1,"type":"some_future_event","payload":{"x":1}}"#;
        let env: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.type_name(), "some_future_event");
        assert!(matches!(env.payload, EnvelopePayload::Unknown(_, _)));
    }

    #[test]
    fn ackable_events_are_classified() {
        assert!(EnvelopePayload::Heartbeat(HeartbeatPayload::default()).is_ackable_event());
        assert!(!EnvelopePayload::Ack(AckPayload { ack_seq: 1 }).is_ackable_event());
    }
}
