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

use log::{debug, error};
use serde_json::Value;

use crate::device::device::Device;
use crate::error::DeviceError;
use crate::utility::{
    acknowledge_failure, acknowledge_success, get_message_client_id, get_message_name,
    get_message_sequence_id, is_attribute,
};

pub trait Command<D>: Send {
    /// Get the name of the command.
    ///
    /// # Returns
    /// Command name that begins with "cmd_".
    fn name(&self) -> &str;

    /// Execute the command.
    ///
    /// # Arguments
    /// * `message` - Command message to execute.
    /// * `device` - Device to execute the command.
    ///
    /// # Returns
    /// Returned value of the command. Null if nothing is returned.
    fn execute(&self, message: &Value, device: &mut D) -> Result<Value, DeviceError>;
}

pub struct CommandSchema<D> {
    // List of commands.
    pub commands: Vec<Box<dyn Command<D>>>,
}

impl<D: Device> CommandSchema<D> {
    /// Create a new command schema.
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Add a command to the schema.
    pub fn add_command(&mut self, command: Box<dyn Command<D>>) {
        self.commands.push(command);
    }

    /// Execute a command or read an attribute. The device checks the state
    /// and the lock before the command runs.
    ///
    /// # Arguments
    /// * `message` - Message to execute.
    /// * `device` - Device to execute the command.
    ///
    /// # Returns
    /// Result message of the success or failure.
    pub fn execute(&self, message: &Value, device: &mut D) -> Value {
        let name = get_message_name(message);
        let sequence_id = get_message_sequence_id(message);

        if is_attribute(&name) {
            return match device.read_attribute(&name["attr_".len()..]) {
                Ok(value) => acknowledge_success(sequence_id, value),
                Err(error) => {
                    debug!("Attribute read failed: {message}: {error}.");
                    acknowledge_failure(sequence_id, &error)
                }
            };
        }

        let result = match self.commands.iter().find(|cmd| cmd.name() == name) {
            Some(cmd) => device
                .check_command(&name["cmd_".len()..], &get_message_client_id(message))
                .and_then(|_| cmd.execute(message, device)),
            None => Err(DeviceError::InvalidArgs(format!("unknown command {name}"))),
        };

        match result {
            Ok(value) => acknowledge_success(sequence_id, value),
            Err(error) => {
                error!("Command execution failed: {message}: {error}.");
                acknowledge_failure(sequence_id, &error)
            }
        }
    }

    /// Get the names of the commands and attributes to register.
    ///
    /// # Arguments
    /// * `device` - Device that provides the attributes.
    ///
    /// # Returns
    /// Names that begin with "cmd_" or "attr_".
    pub fn names(&self, device: &D) -> Vec<String> {
        let mut names: Vec<String> = self
            .commands
            .iter()
            .map(|cmd| String::from(cmd.name()))
            .collect();
        names.extend(
            device
                .attribute_names()
                .iter()
                .map(|attribute| format!("attr_{attribute}")),
        );

        names
    }

    /// Get the number of commands.
    ///
    /// # Returns
    /// Number of commands.
    pub fn number_of_commands(&self) -> usize {
        self.commands.len()
    }
}

impl<D: Device> Default for CommandSchema<D> {
    fn default() -> Self {
        Self::new()
    }
}
