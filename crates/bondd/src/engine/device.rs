use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

/// A `(domain, id)` pair naming a device within an integration domain.
pub type DeviceIdentifier = (String, String);

/// Device grouping information reported by an entity.
///
/// The engine uses this to cluster every entity of the same physical device
/// under one device entry, and to link that device to the hub it is reached
/// through via `via_device`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub identifiers: BTreeSet<DeviceIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via_device: Option<DeviceIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
    /// Room the device is installed in, as reported by the integration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_area: Option<String>,
}

impl DeviceInfo {
    pub fn new(name: impl Into<String>, identifier: DeviceIdentifier) -> Self {
        Self {
            name: name.into(),
            identifiers: BTreeSet::from([identifier]),
            ..Self::default()
        }
    }

    pub fn via(mut self, via_device: DeviceIdentifier) -> Self {
        self.via_device = Some(via_device);
        self
    }

    /// Key used by the engine's device registry.
    ///
    /// Identifiers are ordered, so this is the smallest one.
    pub fn primary_identifier(&self) -> Option<&DeviceIdentifier> {
        self.identifiers.iter().next()
    }
}

/// A device in the bondd system.
///
/// A device represents a physical or logical device that contains one or more entities.
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub id: String,
    #[serde(flatten)]
    pub info: DeviceInfo,
    pub entity_ids: Vec<String>,
}

impl Device {
    pub fn new(id: String, info: DeviceInfo) -> Self {
        Self {
            id,
            info,
            entity_ids: Vec::new(),
        }
    }

    pub fn add_entity(&mut self, entity_id: String) {
        if !self.entity_ids.contains(&entity_id) {
            self.entity_ids.push(entity_id);
        }
    }

    pub fn remove_entity(&mut self, entity_id: &str) {
        self.entity_ids.retain(|id| id != entity_id);
    }
}

/// Format a device identifier as a registry key, e.g. `bond:ZZBL12345`.
pub fn device_key(identifier: &DeviceIdentifier) -> String {
    format!("{}:{}", identifier.0, identifier.1)
}
