//! [`RuntimeConfig`]: the runtime's ambient configuration (SPEC_FULL §3),
//! loaded from environment variables (`opencane-cli` calls `dotenvy::dotenv`
//! before parsing, same as the teacher's CLI entry point).

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::modem::ModemProfileOverrides;

/// Ingest queue overflow policy (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    #[default]
    Reject,
    Wait,
    DropOldest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// HTTP control-surface listener (spec §6.2 default `127.0.0.1:18792`).
    pub http_listen_addr: SocketAddr,

    /// Per-profile-name override applied at adapter construction (spec
    /// §4.2).
    pub modem_profile_overrides: BTreeMap<String, ModemProfileOverrides>,

    /// Jitter reorder buffer window, in packets (spec §4.5 default 32).
    pub jitter_window_packets: usize,
    /// Jitter reorder buffer window, in time (spec §4.5 default 1.5s).
    pub jitter_window: Duration,

    /// VAD pre-roll retained before the first voiced frame (spec §4.5
    /// default 200ms).
    pub vad_preroll: Duration,
    /// Trailing silence duration that closes a voiced chunk (spec §4.5).
    pub vad_hangover: Duration,

    /// Bounded ingest queue capacity (spec §4.7 default 128).
    pub ingest_queue_capacity: usize,
    /// Fixed ingest worker pool size (spec §4.7 default 4).
    pub ingest_workers: usize,
    pub ingest_overflow_policy: OverflowPolicy,

    /// Hamming-distance threshold below which two images are deduped (spec
    /// §4.8 default 8 on a 64-bit hash; open question in spec §9, resolved
    /// here as a configurable default rather than guessed production tuning).
    pub dedup_hamming_threshold: u32,
    /// Recency window images are compared against for dedup (spec §4.8
    /// `dedup_window`; likewise left configurable per spec §9).
    pub dedup_window: Duration,

    /// Bounded concurrency for the digital task executor (spec §4.9 default
    /// 4).
    pub max_concurrent_tasks: usize,
    /// Push retry bound and backoff base (spec §4.9).
    pub status_retry_count: u32,
    pub status_retry_backoff: Duration,

    /// Safety gate thresholds (spec §4.10).
    pub directional_confidence_threshold: f32,
    pub low_confidence_threshold: f32,
    pub safety_text_length_cap: usize,
    pub safety_conflict_window: Duration,

    /// Replay window size N (spec §3 default 64).
    pub replay_window_size: usize,

    /// Session idle timeout (spec §5 default 30 min).
    pub session_idle_timeout: Duration,

    /// MQTT reconnect backoff range, full jitter (spec §4.3); profile
    /// defaults may be overridden here.
    pub reconnect_min: Duration,
    pub reconnect_max: Duration,

    /// Bytes per `tts_chunk` in `server_audio` mode (spec §4.6 default
    /// 4096).
    pub tts_audio_chunk_bytes: usize,

    /// Optional bearer token for the HTTP control surface (spec §6.2).
    pub http_bearer_token: Option<String>,
    /// Replay-protection window for `X-Request-Nonce`/`X-Request-Timestamp`
    /// (spec §6.2); `None` disables the check.
    pub http_replay_window: Option<Duration>,

    /// External provider endpoints (spec §6.4) the composition root dials
    /// out to. These services live outside this workspace; only the wire
    /// contract the port traits describe is assumed.
    pub dialogue_endpoint: String,
    pub vision_endpoint: String,
    pub transcription_endpoint: String,
    pub tts_endpoint: String,

    /// Default MQTT broker a `bind`-triggered `GenericMQTT`/`EC600MQTT`
    /// connection dials (spec §4.3); per-device overrides are out of scope.
    pub mqtt_broker_host: String,
    pub mqtt_broker_port: u16,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            http_listen_addr: "127.0.0.1:18792".parse().expect("valid default addr"),
            modem_profile_overrides: BTreeMap::new(),
            jitter_window_packets: 32,
            jitter_window: Duration::from_millis(1_500),
            vad_preroll: Duration::from_millis(200),
            vad_hangover: Duration::from_millis(500),
            ingest_queue_capacity: 128,
            ingest_workers: 4,
            ingest_overflow_policy: OverflowPolicy::Reject,
            dedup_hamming_threshold: 8,
            dedup_window: Duration::from_secs(24 * 60 * 60),
            max_concurrent_tasks: 4,
            status_retry_count: 5,
            status_retry_backoff: Duration::from_millis(500),
            directional_confidence_threshold: 0.6,
            low_confidence_threshold: 0.4,
            safety_text_length_cap: 600,
            safety_conflict_window: Duration::from_secs(10),
            replay_window_size: 64,
            session_idle_timeout: Duration::from_secs(30 * 60),
            reconnect_min: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
            tts_audio_chunk_bytes: 4096,
            http_bearer_token: None,
            http_replay_window: None,
            dialogue_endpoint: "http://127.0.0.1:8801/v1/reply".to_string(),
            vision_endpoint: "http://127.0.0.1:8802/v1/analyze".to_string(),
            transcription_endpoint: "http://127.0.0.1:8803/v1/transcribe".to_string(),
            tts_endpoint: "http://127.0.0.1:8804/v1/synthesize".to_string(),
            mqtt_broker_host: "127.0.0.1".to_string(),
            mqtt_broker_port: 1883,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl RuntimeConfig {
    /// Load configuration from `OPENCANE_*` environment variables, falling
    /// back to [`Default`] for anything unset. Callers run `dotenvy::dotenv()`
    /// beforehand (as `opencane-cli`'s entry point does) so a `.env` file is
    /// reflected here too.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = env_var("OPENCANE_HTTP_LISTEN_ADDR") {
            config.http_listen_addr = addr.parse().map_err(|e| ConfigError::Invalid {
                field: "OPENCANE_HTTP_LISTEN_ADDR",
                reason: format!("{e}"),
            })?;
        }
        if let Some(v) = env_u64("OPENCANE_JITTER_WINDOW_PACKETS")? {
            config.jitter_window_packets = v as usize;
        }
        if let Some(v) = env_u64("OPENCANE_JITTER_WINDOW_MS")? {
            config.jitter_window = Duration::from_millis(v);
        }
        if let Some(v) = env_u64("OPENCANE_VAD_PREROLL_MS")? {
            config.vad_preroll = Duration::from_millis(v);
        }
        if let Some(v) = env_u64("OPENCANE_VAD_HANGOVER_MS")? {
            config.vad_hangover = Duration::from_millis(v);
        }
        if let Some(v) = env_u64("OPENCANE_INGEST_QUEUE_CAPACITY")? {
            config.ingest_queue_capacity = v as usize;
        }
        if let Some(v) = env_u64("OPENCANE_INGEST_WORKERS")? {
            config.ingest_workers = v as usize;
        }
        if let Some(raw) = env_var("OPENCANE_INGEST_OVERFLOW_POLICY") {
            config.ingest_overflow_policy = match raw.as_str() {
                "reject" => OverflowPolicy::Reject,
                "wait" => OverflowPolicy::Wait,
                "drop_oldest" => OverflowPolicy::DropOldest,
                other => {
                    return Err(ConfigError::Invalid {
                        field: "OPENCANE_INGEST_OVERFLOW_POLICY",
                        reason: format!("unknown policy {other:?}"),
                    });
                }
            };
        }
        if let Some(v) = env_u64("OPENCANE_DEDUP_HAMMING_THRESHOLD")? {
            config.dedup_hamming_threshold = v as u32;
        }
        if let Some(v) = env_u64("OPENCANE_MAX_CONCURRENT_TASKS")? {
            config.max_concurrent_tasks = v as usize;
        }
        if let Some(v) = env_u64("OPENCANE_REPLAY_WINDOW_SIZE")? {
            config.replay_window_size = v as usize;
        }
        if let Some(v) = env_u64("OPENCANE_SESSION_IDLE_TIMEOUT_SECS")? {
            config.session_idle_timeout = Duration::from_secs(v);
        }
        if let Some(token) = env_var("OPENCANE_HTTP_BEARER_TOKEN") {
            config.http_bearer_token = Some(token);
        }
        if let Some(v) = env_var("OPENCANE_DIALOGUE_ENDPOINT") {
            config.dialogue_endpoint = v;
        }
        if let Some(v) = env_var("OPENCANE_VISION_ENDPOINT") {
            config.vision_endpoint = v;
        }
        if let Some(v) = env_var("OPENCANE_TRANSCRIPTION_ENDPOINT") {
            config.transcription_endpoint = v;
        }
        if let Some(v) = env_var("OPENCANE_TTS_ENDPOINT") {
            config.tts_endpoint = v;
        }
        if let Some(v) = env_var("OPENCANE_MQTT_BROKER_HOST") {
            config.mqtt_broker_host = v;
        }
        if let Some(v) = env_u64("OPENCANE_MQTT_BROKER_PORT")? {
            config.mqtt_broker_port = v as u16;
        }

        validate_settings(&config)?;
        tracing::debug!(http_listen_addr = %config.http_listen_addr, "runtime config loaded");
        Ok(config)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env_var(key) {
        Some(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                field: "numeric env var",
                reason: format!("{key}={raw:?}: {e}"),
            }),
        None => Ok(None),
    }
}

/// Validate a [`RuntimeConfig`], same shape as the teacher's
/// `validate_settings` function.
pub fn validate_settings(config: &RuntimeConfig) -> Result<(), ConfigError> {
    if config.ingest_queue_capacity == 0 {
        return Err(ConfigError::Invalid {
            field: "ingest_queue_capacity",
            reason: "must be at least 1".to_string(),
        });
    }
    if config.ingest_workers == 0 {
        return Err(ConfigError::Invalid {
            field: "ingest_workers",
            reason: "must be at least 1".to_string(),
        });
    }
    if config.max_concurrent_tasks == 0 {
        return Err(ConfigError::Invalid {
            field: "max_concurrent_tasks",
            reason: "must be at least 1".to_string(),
        });
    }
    if config.replay_window_size == 0 {
        return Err(ConfigError::Invalid {
            field: "replay_window_size",
            reason: "must be at least 1".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&config.directional_confidence_threshold) {
        return Err(ConfigError::Invalid {
            field: "directional_confidence_threshold",
            reason: "must be within [0.0, 1.0]".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&config.low_confidence_threshold) {
        return Err(ConfigError::Invalid {
            field: "low_confidence_threshold",
            reason: "must be within [0.0, 1.0]".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(validate_settings(&RuntimeConfig::default()).is_ok());
    }

    #[test]
    fn zero_ingest_workers_is_rejected() {
        let config = RuntimeConfig {
            ingest_workers: 0,
            ..Default::default()
        };
        assert!(matches!(
            validate_settings(&config),
            Err(ConfigError::Invalid { field: "ingest_workers", .. })
        ));
    }

    #[test]
    fn out_of_range_confidence_threshold_is_rejected() {
        let config = RuntimeConfig {
            low_confidence_threshold: 1.5,
            ..Default::default()
        };
        assert!(validate_settings(&config).is_err());
    }
}
