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

use nalgebra::Vector3;
use serde_json::{json, Value};
use std::path::PathBuf;
use strum::IntoEnumIterator;

use crate::command::command_schema::{Command, CommandSchema};
use crate::constants::NUM_PLATFORM_AXES;
use crate::device::reflection::reflection_device::{axis_command_name, ReflectionDevice};
use crate::enums::{AxisAction, AxisLetter, Platform};
use crate::error::DeviceError;
use crate::utility::{
    get_argument_f64, get_argument_f64_array, get_argument_i64, get_message_client_id,
};

type Action = fn(&mut ReflectionDevice) -> Result<(), DeviceError>;
type ExportAction = fn(&ReflectionDevice) -> Result<PathBuf, DeviceError>;

/// Get the argument of the X, Y, Z values.
fn get_argument_vector(message: &Value, key: &str) -> Result<Vector3<f64>, DeviceError> {
    let values = get_argument_f64_array(message, key, NUM_PLATFORM_AXES)?;

    Ok(Vector3::from_column_slice(&values))
}

/// Command to ping the device.
pub struct CommandPing;
impl Command<ReflectionDevice> for CommandPing {
    fn name(&self) -> &str {
        "cmd_ping"
    }

    fn execute(&self, _message: &Value, _device: &mut ReflectionDevice) -> Result<Value, DeviceError> {
        Ok(Value::Null)
    }
}

/// Command to reset the device.
pub struct CommandReset;
impl Command<ReflectionDevice> for CommandReset {
    fn name(&self) -> &str {
        "cmd_reset"
    }

    fn execute(&self, _message: &Value, device: &mut ReflectionDevice) -> Result<Value, DeviceError> {
        device.reset();

        Ok(Value::Null)
    }
}

/// Command to reset the device and restore the hardware settings.
pub struct CommandInit;
impl Command<ReflectionDevice> for CommandInit {
    fn name(&self) -> &str {
        "cmd_init"
    }

    fn execute(&self, _message: &Value, device: &mut ReflectionDevice) -> Result<Value, DeviceError> {
        device.init()?;

        Ok(Value::Null)
    }
}

/// Command to run the self-check.
pub struct CommandSelfCheck;
impl Command<ReflectionDevice> for CommandSelfCheck {
    fn name(&self) -> &str {
        "cmd_selfCheck"
    }

    fn execute(&self, _message: &Value, device: &mut ReflectionDevice) -> Result<Value, DeviceError> {
        Ok(json!(device.self_check()?))
    }
}

/// Command on the whole platform. The absolute move takes the "position"
/// argument and the relative move takes the "distance" argument. The moves
/// return the planned duration in second.
pub struct CommandPlatform {
    pub name: String,
    pub platform: Platform,
    pub action: AxisAction,
}
impl Command<ReflectionDevice> for CommandPlatform {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, message: &Value, device: &mut ReflectionDevice) -> Result<Value, DeviceError> {
        let duration = match self.action {
            AxisAction::MoveAbsolute => device.move_platform_absolute(
                self.platform,
                &get_argument_vector(message, "position")?,
            )?,
            AxisAction::MoveRelative => device.move_platform_relative(
                self.platform,
                &get_argument_vector(message, "distance")?,
            )?,
            AxisAction::MoveZero => device.move_platform_zero(self.platform)?,
            AxisAction::Stop => {
                device.stop_platform(self.platform)?;
                return Ok(Value::Null);
            }
            AxisAction::Reset => {
                return Err(DeviceError::InvalidArgs(format!(
                    "{} platform has no reset",
                    self.platform.prefix()
                )))
            }
        };

        Ok(json!(duration))
    }
}

/// Command on a single axis of a platform.
pub struct CommandAxis {
    pub name: String,
    pub platform: Platform,
    pub letter: AxisLetter,
    pub action: AxisAction,
}
impl Command<ReflectionDevice> for CommandAxis {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, message: &Value, device: &mut ReflectionDevice) -> Result<Value, DeviceError> {
        match self.action {
            AxisAction::MoveAbsolute => device.axis_move_absolute(
                self.platform,
                self.letter,
                get_argument_f64(message, "position")?,
            )?,
            AxisAction::MoveRelative => device.axis_move_relative(
                self.platform,
                self.letter,
                get_argument_f64(message, "distance")?,
            )?,
            AxisAction::MoveZero => device.axis_move_zero(self.platform, self.letter)?,
            AxisAction::Stop => device.axis_stop(self.platform, self.letter)?,
            AxisAction::Reset => device.axis_reset(self.platform, self.letter)?,
        }

        Ok(Value::Null)
    }
}

/// Command to move both platforms with the "upper" and "lower" targets.
pub struct CommandSynchronizedMove;
impl Command<ReflectionDevice> for CommandSynchronizedMove {
    fn name(&self) -> &str {
        "cmd_synchronizedMove"
    }

    fn execute(&self, message: &Value, device: &mut ReflectionDevice) -> Result<Value, DeviceError> {
        let duration = device.synchronized_move(
            &get_argument_vector(message, "upper")?,
            &get_argument_vector(message, "lower")?,
        )?;

        Ok(json!(duration))
    }
}

pub struct CommandSupportAxisMoveAbsolute;
impl Command<ReflectionDevice> for CommandSupportAxisMoveAbsolute {
    fn name(&self) -> &str {
        "cmd_supportAxisMoveAbsolute"
    }

    fn execute(&self, message: &Value, device: &mut ReflectionDevice) -> Result<Value, DeviceError> {
        device.support_axis_move_absolute(get_argument_f64(message, "position")?)?;

        Ok(Value::Null)
    }
}

/// Command without argument.
pub struct CommandAction {
    pub name: &'static str,
    pub action: Action,
}
impl Command<ReflectionDevice> for CommandAction {
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&self, _message: &Value, device: &mut ReflectionDevice) -> Result<Value, DeviceError> {
        (self.action)(device)?;

        Ok(Value::Null)
    }
}

/// Command to export a file. It returns the path of the file.
pub struct CommandExport {
    pub name: &'static str,
    pub action: ExportAction,
}
impl Command<ReflectionDevice> for CommandExport {
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&self, _message: &Value, device: &mut ReflectionDevice) -> Result<Value, DeviceError> {
        let filepath = (self.action)(device)?;

        Ok(json!(filepath.display().to_string()))
    }
}

pub struct CommandCloseCameras;
impl Command<ReflectionDevice> for CommandCloseCameras {
    fn name(&self) -> &str {
        "cmd_closeCameras"
    }

    fn execute(&self, _message: &Value, device: &mut ReflectionDevice) -> Result<Value, DeviceError> {
        device.close_cameras();

        Ok(Value::Null)
    }
}

/// Command to capture the image of the camera with the "index" argument.
pub struct CommandCaptureImage;
impl Command<ReflectionDevice> for CommandCaptureImage {
    fn name(&self) -> &str {
        "cmd_captureImage"
    }

    fn execute(&self, message: &Value, device: &mut ReflectionDevice) -> Result<Value, DeviceError> {
        let filepath = device.capture_image(get_argument_i64(message, "index")?)?;

        Ok(json!(filepath.display().to_string()))
    }
}

pub struct CommandLockDevice;
impl Command<ReflectionDevice> for CommandLockDevice {
    fn name(&self) -> &str {
        "cmd_lockDevice"
    }

    fn execute(&self, message: &Value, device: &mut ReflectionDevice) -> Result<Value, DeviceError> {
        device.lock_device(&get_message_client_id(message))?;

        Ok(Value::Null)
    }
}

pub struct CommandUnlockDevice;
impl Command<ReflectionDevice> for CommandUnlockDevice {
    fn name(&self) -> &str {
        "cmd_unlockDevice"
    }

    fn execute(&self, message: &Value, device: &mut ReflectionDevice) -> Result<Value, DeviceError> {
        device.unlock_device(&get_message_client_id(message))?;

        Ok(Value::Null)
    }
}

/// Create the command schema of the reflection-imaging device.
pub fn create_reflection_command_schema() -> CommandSchema<ReflectionDevice> {
    let mut schema = CommandSchema::new();

    schema.add_command(Box::new(CommandPing));
    schema.add_command(Box::new(CommandInit));
    schema.add_command(Box::new(CommandReset));
    schema.add_command(Box::new(CommandSelfCheck));

    for platform in Platform::iter() {
        for action in AxisAction::iter().filter(|action| *action != AxisAction::Reset) {
            schema.add_command(Box::new(CommandPlatform {
                name: format!("cmd_{}Platform{}", platform.prefix(), action.as_ref()),
                platform,
                action,
            }));
        }

        for letter in AxisLetter::iter() {
            for action in AxisAction::iter() {
                schema.add_command(Box::new(CommandAxis {
                    name: format!("cmd_{}", axis_command_name(platform, letter, action)),
                    platform,
                    letter,
                    action,
                }));
            }
        }
    }

    schema.add_command(Box::new(CommandSynchronizedMove));
    schema.add_command(Box::new(CommandSupportAxisMoveAbsolute));

    let actions: [(&'static str, Action); 6] = [
        ("cmd_supportAxisStop", ReflectionDevice::support_axis_stop),
        ("cmd_releaseBrake", ReflectionDevice::release_brake),
        ("cmd_engageBrake", ReflectionDevice::engage_brake),
        ("cmd_enableDriverPower", ReflectionDevice::enable_driver_power),
        ("cmd_disableDriverPower", ReflectionDevice::disable_driver_power),
        ("cmd_openCameras", ReflectionDevice::open_cameras),
    ];
    for (name, action) in actions {
        schema.add_command(Box::new(CommandAction { name, action }));
    }

    schema.add_command(Box::new(CommandCloseCameras));
    schema.add_command(Box::new(CommandCaptureImage));

    let exports: [(&'static str, ExportAction); 3] = [
        ("cmd_exportLogs", ReflectionDevice::export_logs),
        ("cmd_exportAxisParameters", ReflectionDevice::export_axis_parameters),
        (
            "cmd_exportEncoderResolution",
            ReflectionDevice::export_encoder_resolution,
        ),
    ];
    for (name, action) in exports {
        schema.add_command(Box::new(CommandExport { name, action }));
    }

    schema.add_command(Box::new(CommandLockDevice));
    schema.add_command(Box::new(CommandUnlockDevice));

    schema
}
