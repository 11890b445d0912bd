use std::collections::BTreeMap;

use serde::Serialize;

use super::device::Device;
use super::device::DeviceIdentifier;

/// Engine view of a single entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    pub unique_id: String,
    pub name: String,
    pub platform: String,

    /// Whether the state is optimistic (the device does not confirm it).
    pub assumed_state: bool,

    /// False after a failed refresh, true again after the next success.
    pub available: bool,

    /// Platform-specific attributes; `null` until the first refresh.
    pub attributes: serde_json::Value,

    /// Registry key of the device this entity belongs to.
    pub device_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable_reason: Option<String>,
}

/// Centralized snapshot of the entire engine state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub entities: BTreeMap<String, EntityState>,
    pub devices: BTreeMap<String, Device>,
}

impl State {
    /// Find the registry key of a device by any of its identifiers.
    pub fn device_key_for(&self, identifier: &DeviceIdentifier) -> Option<&str> {
        self.devices
            .iter()
            .find(|(_, d)| d.info.identifiers.contains(identifier))
            .map(|(k, _)| k.as_str())
    }

    /// Entities grouped under the device with the given key.
    pub fn entities_of_device(&self, device_key: &str) -> Vec<&EntityState> {
        self.devices
            .get(device_key)
            .map(|d| {
                d.entity_ids
                    .iter()
                    .filter_map(|id| self.entities.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }
}
