use serde::Serialize;

use super::client::Action;
use super::client::DeviceState;
use super::entity::ApplyState;
use super::entity::Platform;
use super::entity::state_i64;
use super::hub::BondDevice;
use crate::engine::EntityCommand;

/// On/off device: fireplaces and generic devices
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Switch {
    pub is_on: bool,
}

impl ApplyState for Switch {
    fn apply_state(&mut self, state: &DeviceState) {
        if let Some(power) = state_i64(state, "power") {
            self.is_on = power == 1;
        }
    }
}

impl Platform for Switch {
    const NAME: &'static str = "switch";

    fn action(&self, _device: &BondDevice, command: &EntityCommand) -> Option<Action> {
        match command {
            EntityCommand::TurnOn => Some(Action::new(Action::TURN_ON)),
            EntityCommand::TurnOff => Some(Action::new(Action::TURN_OFF)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_power() {
        let mut switch = Switch::default();
        let on: DeviceState = serde_json::from_value(serde_json::json!({"power": 1})).unwrap();
        switch.apply_state(&on);
        assert!(switch.is_on);

        let malformed: DeviceState =
            serde_json::from_value(serde_json::json!({"power": "yes"})).unwrap();
        switch.apply_state(&malformed);
        assert!(switch.is_on);
    }

    #[test]
    fn test_switch_commands() {
        let device = BondDevice {
            device_id: "fp1".to_string(),
            name: "Fireplace".to_string(),
            type_code: "FP".to_string(),
            location: None,
            actions: vec!["TurnOn".to_string(), "TurnOff".to_string()],
        };
        let switch = Switch::default();

        assert_eq!(
            switch.action(&device, &EntityCommand::TurnOn),
            Some(Action::new(Action::TURN_ON))
        );
        assert_eq!(
            switch.action(&device, &EntityCommand::TurnOff),
            Some(Action::new(Action::TURN_OFF))
        );
        assert_eq!(switch.action(&device, &EntityCommand::Open), None);
        assert_eq!(switch.action(&device, &EntityCommand::Stop), None);
    }
}
