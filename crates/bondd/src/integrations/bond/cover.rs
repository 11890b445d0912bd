use serde::Serialize;

use super::client::Action;
use super::client::DeviceState;
use super::entity::ApplyState;
use super::entity::Platform;
use super::entity::state_i64;
use super::hub::BondDevice;
use crate::engine::EntityCommand;

/// Motorized shades
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Cover {
    /// `None` until the hub has reported a position
    pub is_closed: Option<bool>,
}

impl ApplyState for Cover {
    fn apply_state(&mut self, state: &DeviceState) {
        if let Some(open) = state_i64(state, "open") {
            self.is_closed = Some(open == 0);
        }
    }
}

impl Platform for Cover {
    const NAME: &'static str = "cover";

    fn action(&self, _device: &BondDevice, command: &EntityCommand) -> Option<Action> {
        match command {
            EntityCommand::Open => Some(Action::new(Action::OPEN)),
            EntityCommand::Close => Some(Action::new(Action::CLOSE)),
            EntityCommand::Stop => Some(Action::new(Action::HOLD)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::bond::client::DeviceProperties;

    fn state(value: serde_json::Value) -> DeviceState {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_apply_state() {
        let mut cover = Cover::default();
        assert_eq!(cover.is_closed, None);

        cover.apply_state(&state(serde_json::json!({"open": 1})));
        assert_eq!(cover.is_closed, Some(false));

        cover.apply_state(&state(serde_json::json!({"open": 0})));
        assert_eq!(cover.is_closed, Some(true));

        // Unrelated payloads leave the position alone
        cover.apply_state(&state(serde_json::json!({"power": 1})));
        assert_eq!(cover.is_closed, Some(true));
    }

    #[test]
    fn test_actions() {
        let cover = Cover::default();
        let device = BondDevice::new(
            "42".to_string(),
            DeviceProperties {
                name: "Shade".to_string(),
                device_type: "MS".to_string(),
                location: None,
                actions: vec!["Open".to_string(), "Close".to_string(), "Hold".to_string()],
            },
        );

        assert_eq!(
            cover.action(&device, &EntityCommand::Stop),
            Some(Action::new(Action::HOLD))
        );
        assert_eq!(
            cover.action(&device, &EntityCommand::Open),
            Some(Action::new(Action::OPEN))
        );
        assert_eq!(cover.action(&device, &EntityCommand::TurnOn), None);
    }
}
