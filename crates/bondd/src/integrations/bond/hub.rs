use std::sync::Arc;

use strum::EnumString;
use strum::IntoStaticStr;
use tracing::info;

use super::DOMAIN;
use super::client::Action;
use super::client::BondApi;
use super::client::DeviceProperties;
use super::client::DeviceState;
use super::client::Version;
use super::error::BondError;
use crate::engine::DeviceInfo;

/// Device type codes reported by the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
pub enum DeviceType {
    #[strum(serialize = "CF")]
    CeilingFan,
    #[strum(serialize = "MS")]
    MotorizedShades,
    #[strum(serialize = "FP")]
    Fireplace,
    #[strum(serialize = "GX")]
    Generic,
}

/// Static description of one device behind the hub.
#[derive(Debug, Clone, PartialEq)]
pub struct BondDevice {
    pub device_id: String,
    pub name: String,

    /// Raw type code, e.g. `CF`
    pub type_code: String,

    pub location: Option<String>,
    pub actions: Vec<String>,
}

impl BondDevice {
    pub fn new(device_id: String, props: DeviceProperties) -> Self {
        Self {
            device_id,
            name: props.name,
            type_code: props.device_type,
            location: props.location,
            actions: props.actions,
        }
    }

    /// Parsed device type; `None` for codes bondd does not know.
    pub fn device_type(&self) -> Option<DeviceType> {
        self.type_code.parse().ok()
    }

    pub fn supports_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }

    pub fn supports_speed(&self) -> bool {
        self.supports_action(Action::SET_SPEED)
    }

    pub fn supports_direction(&self) -> bool {
        self.supports_action(Action::SET_DIRECTION)
    }

    pub fn supports_light(&self) -> bool {
        self.supports_action(Action::TURN_LIGHT_ON) && self.supports_action(Action::TURN_LIGHT_OFF)
    }
}

/// Handle to one Bond hub: its identity, its devices and the API used to reach it.
pub struct BondHub {
    api: Arc<dyn BondApi>,
    version: Version,
    devices: Vec<Arc<BondDevice>>,
}

impl BondHub {
    /// Query the hub's identity and device list.
    pub async fn connect(api: Arc<dyn BondApi>) -> Result<Self, BondError> {
        let version = api.version().await?;
        let device_ids = api.devices().await?;

        let mut devices = Vec::with_capacity(device_ids.len());
        for device_id in device_ids {
            let props = api.device(&device_id).await?;
            devices.push(Arc::new(BondDevice::new(device_id, props)));
        }

        info!(
            "Connected to Bond hub {} (firmware {}), {} devices",
            version.bondid,
            version.fw_ver.as_deref().unwrap_or("unknown"),
            devices.len()
        );

        Ok(Self {
            api,
            version,
            devices,
        })
    }

    /// The hub's own identifier
    pub fn bond_id(&self) -> &str {
        &self.version.bondid
    }

    pub fn devices(&self) -> &[Arc<BondDevice>] {
        &self.devices
    }

    /// Fetch the current state of one device.
    pub async fn device_state(&self, device_id: &str) -> Result<DeviceState, BondError> {
        self.api.device_state(device_id).await
    }

    /// Execute an action on one device.
    pub async fn action(&self, device_id: &str, action: &Action) -> Result<(), BondError> {
        self.api.action(device_id, action).await
    }

    /// Device entry for the hub itself, which every device points at via `via_device`.
    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            manufacturer: Some(
                self.version
                    .make
                    .clone()
                    .unwrap_or_else(|| "Olibra".to_string()),
            ),
            model: self.version.model.clone(),
            sw_version: self.version.fw_ver.clone(),
            ..DeviceInfo::new(self.bond_id(), (DOMAIN.to_string(), self.bond_id().to_string()))
        }
    }
}
