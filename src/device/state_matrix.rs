// This file is part of instrument_controller.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::collections::HashMap;

use crate::enums::DeviceState;
use crate::error::DeviceError;

/// Declarative table of the device states that allow each command. MOVING
/// is checked as ON. A command that is not declared is allowed in all
/// states.
#[derive(Debug, Default)]
pub struct StateMatrix {
    _allowed: HashMap<String, Vec<DeviceState>>,
}

impl StateMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the allowed states of the command.
    ///
    /// # Arguments
    /// * `command` - Command name.
    /// * `states` - Allowed states.
    pub fn allow(&mut self, command: &str, states: &[DeviceState]) -> &mut Self {
        self._allowed.insert(String::from(command), states.to_vec());
        self
    }

    /// Check the command is allowed in the state.
    ///
    /// # Arguments
    /// * `command` - Command name.
    /// * `state` - Current device state.
    ///
    /// # Errors
    /// InvalidState if the command is not allowed.
    pub fn check(&self, command: &str, state: DeviceState) -> Result<(), DeviceError> {
        let effective = if state == DeviceState::Moving {
            DeviceState::On
        } else {
            state
        };

        match self._allowed.get(command) {
            Some(states) if !states.contains(&effective) => Err(DeviceError::InvalidState {
                command: String::from(command),
                state,
            }),
            _ => Ok(()),
        }
    }

    /// Number of the declared commands.
    pub fn len(&self) -> usize {
        self._allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self._allowed.is_empty()
    }
}
