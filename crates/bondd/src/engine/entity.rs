//! Entity abstraction for bondd
//!
//! All entities (fans, covers, lights, switches, etc.) implement the Entity trait.

use std::error::Error;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use super::device::DeviceInfo;

/// Generic commands the engine can route to an entity.
///
/// Each platform decides which of these it supports; unsupported commands are
/// rejected by the owning integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EntityCommand {
    TurnOn,
    TurnOff,
    SetSpeed { speed: u8 },
    SetDirection { direction: Direction },
    Open,
    Close,
    Stop,
}

/// Fan rotation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Reverse,
}

/// Base trait that all entities must implement
#[async_trait]
pub trait Entity: Send + Sync {
    /// Stable identifier, used for deduplication and as part of the entity id.
    fn unique_id(&self) -> &str;

    /// Human-readable label.
    fn name(&self) -> &str;

    /// Return the platform type of this entity (e.g. "fan", "cover")
    fn platform(&self) -> &'static str;

    /// Device this entity belongs to.
    fn device_info(&self) -> DeviceInfo;

    /// Whether the displayed state is optimistic rather than confirmed by the device.
    fn assumed_state(&self) -> bool {
        false
    }

    /// Serialize current state to JSON for Engine storage
    fn state_json(&self) -> serde_json::Value;

    /// Fetch fresh state from the device.
    async fn update(&mut self) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Engine-wide identifier, e.g. `fan.abc123`.
    fn entity_id(&self) -> String {
        format!("{}.{}", self.platform(), self.unique_id())
    }
}
