//! In-memory device identity lifecycle (spec §6.2
//! `register`/`bind`/`activate`/`revoke`).
//!
//! The persisted-table list in spec §6.3 has no `devices` table — session
//! state, tasks, and operations are all keyed by `device_id` directly, with
//! no separate identity row. This registry is the boundary-level state the
//! HTTP surface needs to track a device's lifecycle without inventing a
//! `Store` method/schema the spec never names (recorded as an Open Question
//! decision in `DESIGN.md`); it does not persist across restarts.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Registered,
    Bound,
    Active,
    Revoked,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DeviceRecord {
    pub device_id: String,
    pub modem_profile: Option<String>,
    pub state: DeviceState,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device not registered: {0}")]
    NotFound(String),
    #[error("device already registered: {0}")]
    AlreadyRegistered(String),
    #[error("illegal transition from {from:?} via {action}")]
    IllegalTransition { from: DeviceState, action: &'static str },
}

pub struct DeviceRegistry {
    inner: RwLock<HashMap<String, DeviceRecord>>,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: RwLock::new(HashMap::new()) }
    }

    fn with_record<T>(&self, device_id: &str, f: impl FnOnce(&mut DeviceRecord) -> Result<T, DeviceError>) -> Result<T, DeviceError> {
        let mut guard = self.inner.write().expect("device registry mutex poisoned");
        let record = guard.get_mut(device_id).ok_or_else(|| DeviceError::NotFound(device_id.to_string()))?;
        f(record)
    }

    pub fn register(&self, device_id: &str) -> Result<DeviceRecord, DeviceError> {
        let mut guard = self.inner.write().expect("device registry mutex poisoned");
        if guard.contains_key(device_id) {
            return Err(DeviceError::AlreadyRegistered(device_id.to_string()));
        }
        let now = Utc::now();
        let record = DeviceRecord {
            device_id: device_id.to_string(),
            modem_profile: None,
            state: DeviceState::Registered,
            registered_at: now,
            updated_at: now,
        };
        guard.insert(device_id.to_string(), record.clone());
        Ok(record)
    }

    pub fn bind(&self, device_id: &str, modem_profile: String) -> Result<DeviceRecord, DeviceError> {
        self.with_record(device_id, |record| {
            if matches!(record.state, DeviceState::Revoked) {
                return Err(DeviceError::IllegalTransition { from: record.state, action: "bind" });
            }
            record.modem_profile = Some(modem_profile);
            record.state = DeviceState::Bound;
            record.updated_at = Utc::now();
            Ok(record.clone())
        })
    }

    pub fn activate(&self, device_id: &str) -> Result<DeviceRecord, DeviceError> {
        self.with_record(device_id, |record| {
            if !matches!(record.state, DeviceState::Bound | DeviceState::Active) {
                return Err(DeviceError::IllegalTransition { from: record.state, action: "activate" });
            }
            record.state = DeviceState::Active;
            record.updated_at = Utc::now();
            Ok(record.clone())
        })
    }

    pub fn revoke(&self, device_id: &str) -> Result<DeviceRecord, DeviceError> {
        self.with_record(device_id, |record| {
            record.state = DeviceState::Revoked;
            record.updated_at = Utc::now();
            Ok(record.clone())
        })
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceRecord> {
        self.inner.read().expect("device registry mutex poisoned").get(device_id).cloned()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_bind_then_activate() {
        let registry = DeviceRegistry::new();
        registry.register("dev-1").expect("register");
        let bound = registry.bind("dev-1", "ec600mcnle_v1".to_string()).expect("bind");
        assert_eq!(bound.state, DeviceState::Bound);
        let active = registry.activate("dev-1").expect("activate");
        assert_eq!(active.state, DeviceState::Active);
    }

    #[test]
    fn revoked_device_cannot_be_bound_again() {
        let registry = DeviceRegistry::new();
        registry.register("dev-1").expect("register");
        registry.revoke("dev-1").expect("revoke");
        assert!(matches!(
            registry.bind("dev-1", "ec600mcnle_v1".to_string()),
            Err(DeviceError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn unknown_device_is_not_found() {
        let registry = DeviceRegistry::new();
        assert!(matches!(registry.activate("ghost"), Err(DeviceError::NotFound(_))));
    }
}
