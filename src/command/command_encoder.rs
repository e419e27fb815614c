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

use serde_json::{json, Value};

use crate::command::command_schema::{Command, CommandSchema};
use crate::device::encoder_device::EncoderDevice;
use crate::error::DeviceError;
use crate::utility::{get_argument_f64, get_argument_i64};

/// Command to ping the device.
pub struct CommandPing;
impl Command<EncoderDevice> for CommandPing {
    fn name(&self) -> &str {
        "cmd_ping"
    }

    fn execute(&self, _message: &Value, _device: &mut EncoderDevice) -> Result<Value, DeviceError> {
        Ok(Value::Null)
    }
}

/// Command to read the reported position of a channel.
pub struct CommandReadEncoder;
impl Command<EncoderDevice> for CommandReadEncoder {
    fn name(&self) -> &str {
        "cmd_readEncoder"
    }

    fn execute(&self, message: &Value, device: &mut EncoderDevice) -> Result<Value, DeviceError> {
        let channel = get_argument_i64(message, "channel")?;

        Ok(json!(device.read_encoder(channel)?))
    }
}

/// Command to set the zero offset of a channel.
pub struct CommandSetZeroOffset;
impl Command<EncoderDevice> for CommandSetZeroOffset {
    fn name(&self) -> &str {
        "cmd_setZeroOffset"
    }

    fn execute(&self, message: &Value, device: &mut EncoderDevice) -> Result<Value, DeviceError> {
        device.set_zero_offset(
            get_argument_i64(message, "channel")?,
            get_argument_f64(message, "offset")?,
        )?;

        Ok(Value::Null)
    }
}

/// Create the command schema of the encoder device.
pub fn create_encoder_command_schema() -> CommandSchema<EncoderDevice> {
    let mut schema = CommandSchema::new();
    schema.add_command(Box::new(CommandPing));
    schema.add_command(Box::new(CommandReadEncoder));
    schema.add_command(Box::new(CommandSetZeroOffset));

    schema
}
