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
use crate::device::vacuum::vacuum_device::VacuumDevice;
use crate::enums::VacuumMode;
use crate::error::DeviceError;
use crate::utility::{
    get_argument_bool, get_argument_f64, get_argument_i64, get_message_client_id,
};

type Action = fn(&mut VacuumDevice) -> Result<(), DeviceError>;
type SwitchAction = fn(&mut VacuumDevice, bool) -> Result<(), DeviceError>;
type IndexedSwitchAction = fn(&mut VacuumDevice, i64, bool) -> Result<(), DeviceError>;
type WordAction = fn(&mut VacuumDevice, u16) -> Result<(), DeviceError>;

/// Get the word argument.
fn get_argument_word(message: &Value, key: &str) -> Result<u16, DeviceError> {
    let value = get_argument_i64(message, key)?;
    u16::try_from(value)
        .map_err(|_| DeviceError::InvalidArgs(format!("{key} {value} should be in [0, 65535]")))
}

/// Command to ping the device.
pub struct CommandPing;
impl Command<VacuumDevice> for CommandPing {
    fn name(&self) -> &str {
        "cmd_ping"
    }

    fn execute(&self, _message: &Value, _device: &mut VacuumDevice) -> Result<Value, DeviceError> {
        Ok(Value::Null)
    }
}

/// Command to initialize or reset the device.
pub struct CommandReset {
    pub name: &'static str,
}
impl Command<VacuumDevice> for CommandReset {
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&self, _message: &Value, device: &mut VacuumDevice) -> Result<Value, DeviceError> {
        device.reset();

        Ok(Value::Null)
    }
}

/// Command to run the self-check.
pub struct CommandSelfCheck;
impl Command<VacuumDevice> for CommandSelfCheck {
    fn name(&self) -> &str {
        "cmd_selfCheck"
    }

    fn execute(&self, _message: &Value, device: &mut VacuumDevice) -> Result<Value, DeviceError> {
        Ok(json!(device.self_check()?))
    }
}

/// Command to switch the mode: 0 is AUTO and 1 is MANUAL.
pub struct CommandSwitchMode;
impl Command<VacuumDevice> for CommandSwitchMode {
    fn name(&self) -> &str {
        "cmd_switchMode"
    }

    fn execute(&self, message: &Value, device: &mut VacuumDevice) -> Result<Value, DeviceError> {
        let mode = get_argument_i64(message, "mode")?;
        let mode = u8::try_from(mode)
            .ok()
            .and_then(VacuumMode::from_repr)
            .ok_or_else(|| DeviceError::InvalidArgs(format!("mode {mode} should be 0 or 1")))?;

        device.switch_mode(mode)?;

        Ok(Value::Null)
    }
}

/// Command without argument.
pub struct CommandAction {
    pub name: &'static str,
    pub action: Action,
}
impl Command<VacuumDevice> for CommandAction {
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&self, _message: &Value, device: &mut VacuumDevice) -> Result<Value, DeviceError> {
        (self.action)(device)?;

        Ok(Value::Null)
    }
}

/// Command to switch a single point with the "state" argument.
pub struct CommandSwitch {
    pub name: &'static str,
    pub action: SwitchAction,
}
impl Command<VacuumDevice> for CommandSwitch {
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&self, message: &Value, device: &mut VacuumDevice) -> Result<Value, DeviceError> {
        (self.action)(device, get_argument_bool(message, "state")?)?;

        Ok(Value::Null)
    }
}

/// Command to switch an indexed point with the "index" and "state"
/// arguments.
pub struct CommandIndexedSwitch {
    pub name: &'static str,
    pub action: IndexedSwitchAction,
}
impl Command<VacuumDevice> for CommandIndexedSwitch {
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&self, message: &Value, device: &mut VacuumDevice) -> Result<Value, DeviceError> {
        (self.action)(
            device,
            get_argument_i64(message, "index")?,
            get_argument_bool(message, "state")?,
        )?;

        Ok(Value::Null)
    }
}

/// Command to write a parameter word with the "value" argument.
pub struct CommandWord {
    pub name: &'static str,
    pub action: WordAction,
}
impl Command<VacuumDevice> for CommandWord {
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&self, message: &Value, device: &mut VacuumDevice) -> Result<Value, DeviceError> {
        (self.action)(device, get_argument_word(message, "value")?)?;

        Ok(Value::Null)
    }
}

/// Command to set the screw pump speed in percent.
pub struct CommandSetScrewPumpSpeed;
impl Command<VacuumDevice> for CommandSetScrewPumpSpeed {
    fn name(&self) -> &str {
        "cmd_setScrewPumpSpeed"
    }

    fn execute(&self, message: &Value, device: &mut VacuumDevice) -> Result<Value, DeviceError> {
        device.set_screw_pump_speed(get_argument_f64(message, "percent")?)?;

        Ok(Value::Null)
    }
}

/// Command to open or close the gate valve.
pub struct CommandSetGateValve;
impl Command<VacuumDevice> for CommandSetGateValve {
    fn name(&self) -> &str {
        "cmd_setGateValve"
    }

    fn execute(&self, message: &Value, device: &mut VacuumDevice) -> Result<Value, DeviceError> {
        device.set_gate_valve(
            get_argument_i64(message, "index")?,
            get_argument_i64(message, "operation")?,
        )?;

        Ok(Value::Null)
    }
}

/// Command to connect the PLC.
pub struct CommandConnectPlc;
impl Command<VacuumDevice> for CommandConnectPlc {
    fn name(&self) -> &str {
        "cmd_connectPLC"
    }

    fn execute(&self, _message: &Value, device: &mut VacuumDevice) -> Result<Value, DeviceError> {
        device.connect_plc()?;

        Ok(Value::Null)
    }
}

/// Command to disconnect the PLC.
pub struct CommandDisconnectPlc;
impl Command<VacuumDevice> for CommandDisconnectPlc {
    fn name(&self) -> &str {
        "cmd_disconnectPLC"
    }

    fn execute(&self, _message: &Value, device: &mut VacuumDevice) -> Result<Value, DeviceError> {
        device.disconnect_plc();

        Ok(Value::Null)
    }
}

/// Command to update the PLC data now.
pub struct CommandUpdatePlcData;
impl Command<VacuumDevice> for CommandUpdatePlcData {
    fn name(&self) -> &str {
        "cmd_updatePLCData"
    }

    fn execute(&self, _message: &Value, device: &mut VacuumDevice) -> Result<Value, DeviceError> {
        device.update_plc_data();

        Ok(json!(device.system_state()))
    }
}

/// Command to lock the device by the client.
pub struct CommandLockDevice;
impl Command<VacuumDevice> for CommandLockDevice {
    fn name(&self) -> &str {
        "cmd_lockDevice"
    }

    fn execute(&self, message: &Value, device: &mut VacuumDevice) -> Result<Value, DeviceError> {
        device.lock_device(&get_message_client_id(message))?;

        Ok(Value::Null)
    }
}

/// Command to unlock the device by the client.
pub struct CommandUnlockDevice;
impl Command<VacuumDevice> for CommandUnlockDevice {
    fn name(&self) -> &str {
        "cmd_unlockDevice"
    }

    fn execute(&self, message: &Value, device: &mut VacuumDevice) -> Result<Value, DeviceError> {
        device.unlock_device(&get_message_client_id(message))?;

        Ok(Value::Null)
    }
}

/// Create the command schema of the vacuum device.
pub fn create_vacuum_command_schema() -> CommandSchema<VacuumDevice> {
    let mut schema = CommandSchema::new();

    schema.add_command(Box::new(CommandPing));
    schema.add_command(Box::new(CommandReset { name: "cmd_init" }));
    schema.add_command(Box::new(CommandReset { name: "cmd_reset" }));
    schema.add_command(Box::new(CommandSelfCheck));
    schema.add_command(Box::new(CommandSwitchMode));

    let actions: [(&'static str, Action); 6] = [
        ("cmd_oneKeyVacuumStart", VacuumDevice::one_key_vacuum_start),
        ("cmd_oneKeyVacuumStop", VacuumDevice::one_key_vacuum_stop),
        ("cmd_ventStart", VacuumDevice::vent_start),
        ("cmd_ventStop", VacuumDevice::vent_stop),
        ("cmd_alarmReset", VacuumDevice::alarm_reset),
        ("cmd_emergencyStop", VacuumDevice::emergency_stop),
    ];
    for (name, action) in actions {
        schema.add_command(Box::new(CommandAction { name, action }));
    }

    let switches: [(&'static str, SwitchAction); 5] = [
        ("cmd_setRemoteControl", VacuumDevice::set_remote_control),
        ("cmd_setScrewPumpPower", VacuumDevice::set_screw_pump_power),
        ("cmd_setScrewPumpStartStop", VacuumDevice::set_screw_pump_start_stop),
        ("cmd_setRootsPumpPower", VacuumDevice::set_roots_pump_power),
        (
            "cmd_setAirMainElectromagneticValve",
            VacuumDevice::set_air_main_electromagnetic_valve,
        ),
    ];
    for (name, action) in switches {
        schema.add_command(Box::new(CommandSwitch { name, action }));
    }

    let indexed_switches: [(&'static str, IndexedSwitchAction); 5] = [
        ("cmd_setMolecularPumpPower", VacuumDevice::set_molecular_pump_power),
        (
            "cmd_setMolecularPumpStartStop",
            VacuumDevice::set_molecular_pump_start_stop,
        ),
        ("cmd_setElectromagneticValve", VacuumDevice::set_electromagnetic_valve),
        ("cmd_setVentValve", VacuumDevice::set_vent_valve),
        (
            "cmd_setWaterElectromagneticValve",
            VacuumDevice::set_water_electromagnetic_valve,
        ),
    ];
    for (name, action) in indexed_switches {
        schema.add_command(Box::new(CommandIndexedSwitch { name, action }));
    }

    let words: [(&'static str, WordAction); 3] = [
        (
            "cmd_setMolecularPumpStartStopSelect",
            VacuumDevice::set_molecular_pump_start_stop_select,
        ),
        ("cmd_setGaugeCriterion", VacuumDevice::set_gauge_criterion),
        (
            "cmd_setMolecularPumpCriterion",
            VacuumDevice::set_molecular_pump_criterion,
        ),
    ];
    for (name, action) in words {
        schema.add_command(Box::new(CommandWord { name, action }));
    }

    schema.add_command(Box::new(CommandSetScrewPumpSpeed));
    schema.add_command(Box::new(CommandSetGateValve));
    schema.add_command(Box::new(CommandConnectPlc));
    schema.add_command(Box::new(CommandDisconnectPlc));
    schema.add_command(Box::new(CommandUpdatePlcData));
    schema.add_command(Box::new(CommandLockDevice));
    schema.add_command(Box::new(CommandUnlockDevice));

    schema
}
