use serde::Serialize;

use super::client::Action;
use super::client::DeviceState;
use super::entity::ApplyState;
use super::entity::Platform;
use super::entity::state_i64;
use super::hub::BondDevice;
use crate::engine::Direction;
use crate::engine::EntityCommand;

/// Ceiling fan
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Fan {
    pub is_on: bool,

    /// Speed step (1..=max), if the fan reports one
    pub speed: Option<u8>,

    pub direction: Option<Direction>,
}

impl ApplyState for Fan {
    /// Bond reports `{"power": 0|1, "speed": n, "direction": 1|-1}`
    fn apply_state(&mut self, state: &DeviceState) {
        if let Some(power) = state_i64(state, "power") {
            self.is_on = power == 1;
        }
        if let Some(speed) = state_i64(state, "speed") {
            self.speed = u8::try_from(speed).ok();
        }
        if let Some(direction) = state_i64(state, "direction") {
            self.direction = match direction {
                1 => Some(Direction::Forward),
                -1 => Some(Direction::Reverse),
                _ => None,
            };
        }
    }
}

impl Platform for Fan {
    const NAME: &'static str = "fan";

    fn action(&self, device: &BondDevice, command: &EntityCommand) -> Option<Action> {
        match command {
            EntityCommand::TurnOn => Some(Action::new(Action::TURN_ON)),
            EntityCommand::TurnOff => Some(Action::new(Action::TURN_OFF)),
            EntityCommand::SetSpeed { speed: 0 } => Some(Action::new(Action::TURN_OFF)),
            EntityCommand::SetSpeed { speed } if device.supports_speed() => {
                Some(Action::with_argument(Action::SET_SPEED, i64::from(*speed)))
            }
            EntityCommand::SetDirection { direction } if device.supports_direction() => {
                let argument = match direction {
                    Direction::Forward => 1,
                    Direction::Reverse => -1,
                };
                Some(Action::with_argument(Action::SET_DIRECTION, argument))
            }
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

    fn device(actions: &[&str]) -> BondDevice {
        BondDevice::new(
            "fan1".to_string(),
            DeviceProperties {
                name: "Fan".to_string(),
                device_type: "CF".to_string(),
                location: None,
                actions: actions.iter().map(|a| a.to_string()).collect(),
            },
        )
    }

    #[test]
    fn test_apply_full_state() {
        let mut fan = Fan::default();
        fan.apply_state(&state(serde_json::json!({"power": 1, "speed": 3, "direction": -1})));

        assert_eq!(
            fan,
            Fan {
                is_on: true,
                speed: Some(3),
                direction: Some(Direction::Reverse),
            }
        );
    }

    #[test]
    fn test_apply_partial_state_keeps_other_fields() {
        let mut fan = Fan {
            is_on: true,
            speed: Some(2),
            direction: Some(Direction::Forward),
        };
        fan.apply_state(&state(serde_json::json!({"power": 0})));

        assert!(!fan.is_on);
        assert_eq!(fan.speed, Some(2));
        assert_eq!(fan.direction, Some(Direction::Forward));
    }

    #[test]
    fn test_speed_actions() {
        let fan = Fan::default();
        let with_speed = device(&["TurnOn", "TurnOff", "SetSpeed"]);
        let without_speed = device(&["TurnOn", "TurnOff"]);

        assert_eq!(
            fan.action(&with_speed, &EntityCommand::SetSpeed { speed: 2 }),
            Some(Action::with_argument(Action::SET_SPEED, 2))
        );
        assert_eq!(
            fan.action(&with_speed, &EntityCommand::SetSpeed { speed: 0 }),
            Some(Action::new(Action::TURN_OFF))
        );
        assert_eq!(
            fan.action(&without_speed, &EntityCommand::SetSpeed { speed: 2 }),
            None
        );
        assert_eq!(fan.action(&with_speed, &EntityCommand::Open), None);
    }

    #[test]
    fn test_direction_action() {
        let fan = Fan::default();
        let device = device(&["SetDirection"]);

        assert_eq!(
            fan.action(
                &device,
                &EntityCommand::SetDirection {
                    direction: Direction::Reverse
                }
            ),
            Some(Action::with_argument(Action::SET_DIRECTION, -1))
        );
    }
}
