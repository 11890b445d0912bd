//! Type-safe message system for bondd
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Commands from the engine to integrations

use super::device::DeviceInfo;
use super::entity::EntityCommand;

/// Messages FROM integrations TO the engine (events/state updates)
#[derive(Debug, Clone)]
pub enum FromIntegrationMessage {
    /// A device (typically a hub) that entities may point at via `via_device`
    DeviceRegistered { device: DeviceInfo },

    /// An entity was discovered and registered
    EntityDiscovered {
        entity_id: String,
        integration_name: String,
        unique_id: String,
        name: String,
        platform: String,
        assumed_state: bool,
        device: DeviceInfo,
    },

    /// An entity was removed (device unplugged, etc.)
    EntityRemoved { entity_id: String },

    /// An entity reported fresh state
    EntityStateChanged {
        entity_id: String,
        attributes: serde_json::Value,
    },

    /// An entity could not be refreshed
    EntityUnavailable { entity_id: String, reason: String },
}

/// Messages FROM the engine TO integrations (commands)
#[derive(Debug, Clone)]
pub enum ToIntegrationMessage {
    /// Command targeting a single entity
    EntityCommand {
        entity_id: String,
        command: EntityCommand,
    },
}

impl ToIntegrationMessage {
    pub fn entity_id(&self) -> &str {
        match self {
            ToIntegrationMessage::EntityCommand { entity_id, .. } => entity_id,
        }
    }
}
