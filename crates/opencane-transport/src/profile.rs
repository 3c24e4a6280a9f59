//! Modem Profile Registry (C2, spec §4.2).
//!
//! A static registry of the five built-in modem profiles, built once behind
//! a [`OnceLock`], following the teacher's static-registry convention in
//! `gglib-core::settings` (a lazily-built, process-lifetime table rather than
//! a runtime-mutable one).

use std::collections::HashMap;
use std::sync::OnceLock;

use opencane_core::modem::{AudioMode, ModemProfile, ModemProfileOverrides, Qos};

use crate::error::TransportError;

static REGISTRY: OnceLock<HashMap<&'static str, ModemProfile>> = OnceLock::new();

fn registry() -> &'static HashMap<&'static str, ModemProfile> {
    REGISTRY.get_or_init(build_registry)
}

/// Look up a built-in profile by name and apply any runtime overrides.
/// An unknown name is a fatal startup error per spec §4.2.
pub fn lookup(name: &str, overrides: Option<&ModemProfileOverrides>) -> Result<ModemProfile, TransportError> {
    let base = registry()
        .get(name)
        .cloned()
        .ok_or_else(|| TransportError::UnknownProfile(name.to_string()))?;
    Ok(match overrides {
        Some(o) => base.with_overrides(o),
        None => base,
    })
}

/// Names of all built-in profiles, for CLI/config validation.
pub fn known_profile_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = registry().keys().copied().collect();
    names.sort_unstable();
    names
}

fn mqtt_profile(name: &str, magic_byte: u8, keepalive_seconds: u16) -> ModemProfile {
    ModemProfile {
        name: name.to_string(),
        inbound_control_topic: format!("device/{{device_id}}/up/control/{name}"),
        inbound_audio_topic: format!("device/{{device_id}}/up/audio/{name}"),
        outbound_control_topic: format!("device/{{device_id}}/down/control/{name}"),
        outbound_audio_topic: format!("device/{{device_id}}/down/audio/{name}"),
        control_qos: Qos::AtLeastOnce,
        audio_qos: Qos::AtMostOnce,
        keepalive_seconds,
        reconnect_min_ms: 500,
        reconnect_max_ms: 30_000,
        audio_mode: AudioMode::FramedPacket,
        magic_byte,
        supports_tool_result: true,
        supports_telemetry_normalize: true,
    }
}

fn build_registry() -> HashMap<&'static str, ModemProfile> {
    let mut map = HashMap::new();
    map.insert("ec600mcnle_v1", mqtt_profile("ec600mcnle_v1", 0xA1, 60));
    map.insert("a7670c_v1", mqtt_profile("a7670c_v1", 0xA2, 60));
    map.insert("sim7600g_h_v1", mqtt_profile("sim7600g_h_v1", 0xA3, 45));
    map.insert("ec800m_v1", mqtt_profile("ec800m_v1", 0xA4, 60));
    // Legacy modem: no telemetry normalization, JSON-b64 audio instead of
    // framed binary packets (spec §9 leaves the legacy dialect's audio mode
    // to the adapter; this registry entry is where that distinction lives).
    map.insert(
        "ml307r_dl_v1",
        ModemProfile {
            audio_mode: AudioMode::JsonB64,
            supports_telemetry_normalize: false,
            ..mqtt_profile("ml307r_dl_v1", 0xA5, 90)
        },
    );
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_all_five_built_in_profiles() {
        for name in [
            "ec600mcnle_v1",
            "a7670c_v1",
            "sim7600g_h_v1",
            "ec800m_v1",
            "ml307r_dl_v1",
        ] {
            assert!(lookup(name, None).is_ok(), "missing built-in profile {name}");
        }
    }

    #[test]
    fn unknown_profile_name_is_an_error() {
        assert!(matches!(lookup("not_a_real_modem", None), Err(TransportError::UnknownProfile(_))));
    }

    #[test]
    fn overrides_supersede_the_looked_up_profile() {
        let overrides = ModemProfileOverrides {
            magic_byte: Some(0xFF),
            ..Default::default()
        };
        let profile = lookup("ec600mcnle_v1", Some(&overrides)).expect("known profile");
        assert_eq!(profile.magic_byte, 0xFF);
        assert_eq!(profile.keepalive_seconds, 60);
    }

    #[test]
    fn legacy_profile_uses_json_b64_audio() {
        let profile = lookup("ml307r_dl_v1", None).expect("known profile");
        assert_eq!(profile.audio_mode, AudioMode::JsonB64);
        assert!(!profile.supports_telemetry_normalize);
    }
}
