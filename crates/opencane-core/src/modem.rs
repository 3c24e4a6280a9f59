//! [`ModemProfile`]: the per-modem transport parameters named in spec §4.2.
//!
//! The registry of built-in profiles lives in `opencane-transport::profile`
//! (it is transport-specific, e.g. MQTT topic templates); this crate only
//! owns the data shape so `opencane-core::settings::RuntimeConfig` can carry
//! profile overrides without depending on `opencane-transport`.

use serde::{Deserialize, Serialize};

/// Audio wire mode for a device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    /// 16-byte framed binary packets (spec §4.1).
    FramedPacket,
    /// Base64-encoded audio inside the JSON envelope payload.
    JsonB64,
}

/// MQTT quality of service, mirrors the three standard QoS levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl Qos {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

/// A named bundle of modem-specific transport parameters (spec §4.2, glossary
/// "Profile").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModemProfile {
    pub name: String,

    pub inbound_control_topic: String,
    pub inbound_audio_topic: String,
    pub outbound_control_topic: String,
    pub outbound_audio_topic: String,

    pub control_qos: Qos,
    pub audio_qos: Qos,

    pub keepalive_seconds: u16,
    pub reconnect_min_ms: u64,
    pub reconnect_max_ms: u64,

    pub audio_mode: AudioMode,
    pub magic_byte: u8,

    pub supports_tool_result: bool,
    pub supports_telemetry_normalize: bool,
}

impl ModemProfile {
    /// Render a topic template by substituting `{device_id}`.
    #[must_use]
    pub fn render_topic(template: &str, device_id: &str) -> String {
        template.replace("{device_id}", device_id)
    }

    /// Apply textual field overrides supplied via [`RuntimeConfig`](crate::settings::RuntimeConfig).
    /// Unknown override keys are ignored; this mirrors the teacher's
    /// tolerant-merge style for partial updates.
    #[must_use]
    pub fn with_overrides(mut self, overrides: &ModemProfileOverrides) -> Self {
        if let Some(v) = overrides.magic_byte {
            self.magic_byte = v;
        }
        if let Some(v) = overrides.keepalive_seconds {
            self.keepalive_seconds = v;
        }
        if let Some(v) = overrides.reconnect_min_ms {
            self.reconnect_min_ms = v;
        }
        if let Some(v) = overrides.reconnect_max_ms {
            self.reconnect_max_ms = v;
        }
        self
    }
}

/// Runtime-configurable overrides superseding any field of a looked-up
/// [`ModemProfile`] (spec §4.2: "Runtime overrides may supersede any field").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModemProfileOverrides {
    pub magic_byte: Option<u8>,
    pub keepalive_seconds: Option<u16>,
    pub reconnect_min_ms: Option<u64>,
    pub reconnect_max_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_topic_substitutes_device_id() {
        let rendered = ModemProfile::render_topic("device/{device_id}/up/control", "dev-001");
        assert_eq!(rendered, "device/dev-001/up/control");
    }

    #[test]
    fn overrides_supersede_looked_up_fields() {
        let base = ModemProfile {
            name: "ec600mcnle_v1".to_string(),
            inbound_control_topic: "device/{device_id}/up/control".to_string(),
            inbound_audio_topic: "device/{device_id}/up/audio".to_string(),
            outbound_control_topic: "device/{device_id}/down/control".to_string(),
            outbound_audio_topic: "device/{device_id}/down/audio".to_string(),
            control_qos: Qos::AtLeastOnce,
            audio_qos: Qos::AtMostOnce,
            keepalive_seconds: 60,
            reconnect_min_ms: 500,
            reconnect_max_ms: 30_000,
            audio_mode: AudioMode::FramedPacket,
            magic_byte: 0xA1,
            supports_tool_result: true,
            supports_telemetry_normalize: true,
        };
        let overrides = ModemProfileOverrides {
            magic_byte: Some(0x42),
            ..Default::default()
        };
        let applied = base.with_overrides(&overrides);
        assert_eq!(applied.magic_byte, 0x42);
        assert_eq!(applied.keepalive_seconds, 60);
    }
}
