//! Generic Bond entity.
//!
//! Every Bond-controlled device shares the same identity, device grouping and
//! refresh behaviour; only the mapping from the hub's raw state payload to
//! entity fields differs per device type. That mapping is the [`ApplyState`]
//! hook, implemented by the platform types in the sibling modules.

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::DOMAIN;
use super::client::Action;
use super::client::DeviceState;
use super::error::BondError;
use super::hub::BondDevice;
use super::hub::BondHub;
use crate::engine::DeviceInfo;
use crate::engine::Entity;
use crate::engine::EntityCommand;

/// Translate a raw hub state payload into entity fields.
///
/// Implementations extract the fields they care about and leave the rest
/// untouched. They must not fail on well-formed payloads.
pub trait ApplyState {
    fn apply_state(&mut self, state: &DeviceState);
}

/// Read an integer field from a state payload.
pub(super) fn state_i64(state: &DeviceState, key: &str) -> Option<i64> {
    state.get(key).and_then(|v| v.as_i64())
}

/// A device-type variant (fan, cover, ...) that can be wrapped in a [`BondEntity`].
pub trait Platform: ApplyState + Serialize + Send + Sync {
    /// Engine platform name, e.g. `"fan"`
    const NAME: &'static str;

    /// Bond action implementing a generic command, or `None` if unsupported.
    fn action(&self, device: &BondDevice, command: &EntityCommand) -> Option<Action>;
}

/// Entity backed by one device behind one Bond hub.
pub struct BondEntity<P> {
    hub: Arc<BondHub>,
    device: Arc<BondDevice>,
    platform: P,
}

impl<P: Platform> BondEntity<P> {
    pub fn new(hub: Arc<BondHub>, device: Arc<BondDevice>, platform: P) -> Self {
        Self {
            hub,
            device,
            platform,
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.device.device_id
    }

    pub fn name(&self) -> &str {
        &self.device.name
    }

    /// Group this entity under its physical device, reached through the hub.
    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            suggested_area: self.device.location.clone(),
            ..DeviceInfo::new(
                self.name(),
                (DOMAIN.to_string(), self.device.device_id.clone()),
            )
            .via((DOMAIN.to_string(), self.hub.bond_id().to_string()))
        }
    }

    /// Bond tracks state from the commands it sends; devices never confirm it.
    pub fn assumed_state(&self) -> bool {
        true
    }

    /// Fetch the device's state from the hub and apply it.
    pub async fn refresh(&mut self) -> Result<(), BondError> {
        let state = self.hub.device_state(&self.device.device_id).await?;
        self.platform.apply_state(&state);
        Ok(())
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }
}

/// Bond-specific operations on a type-erased entity.
#[async_trait]
pub trait BondControl: Entity {
    /// Execute a generic command by translating it to a Bond action.
    async fn execute(&mut self, command: &EntityCommand) -> Result<(), BondError>;
}

#[async_trait]
impl<P: Platform> Entity for BondEntity<P> {
    fn unique_id(&self) -> &str {
        BondEntity::unique_id(self)
    }

    fn name(&self) -> &str {
        BondEntity::name(self)
    }

    fn platform(&self) -> &'static str {
        P::NAME
    }

    fn device_info(&self) -> DeviceInfo {
        BondEntity::device_info(self)
    }

    fn assumed_state(&self) -> bool {
        BondEntity::assumed_state(self)
    }

    fn state_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.platform).unwrap_or(serde_json::Value::Null)
    }

    async fn update(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(self.refresh().await?)
    }
}

#[async_trait]
impl<P: Platform> BondControl for BondEntity<P> {
    async fn execute(&mut self, command: &EntityCommand) -> Result<(), BondError> {
        let action = self
            .platform
            .action(&self.device, command)
            .ok_or_else(|| BondError::UnsupportedCommand {
                entity_id: self.entity_id(),
                command: command.clone(),
            })?;

        self.hub.action(&self.device.device_id, &action).await
    }
}
