use serde::Serialize;

use super::client::Action;
use super::client::DeviceState;
use super::entity::ApplyState;
use super::entity::Platform;
use super::entity::state_i64;
use super::hub::BondDevice;
use crate::engine::EntityCommand;

/// Light built into a ceiling fan
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Light {
    pub is_on: bool,
}

impl ApplyState for Light {
    fn apply_state(&mut self, state: &DeviceState) {
        if let Some(light) = state_i64(state, "light") {
            self.is_on = light == 1;
        }
    }
}

impl Platform for Light {
    const NAME: &'static str = "light";

    fn action(&self, _device: &BondDevice, command: &EntityCommand) -> Option<Action> {
        match command {
            EntityCommand::TurnOn => Some(Action::new(Action::TURN_LIGHT_ON)),
            EntityCommand::TurnOff => Some(Action::new(Action::TURN_LIGHT_OFF)),
            _ => None,
        }
    }
}
