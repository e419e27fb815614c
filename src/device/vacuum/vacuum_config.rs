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

use std::path::Path;

use crate::constants::{DEFAULT_PLC_PORT, DEFAULT_RECONNECT_COOLDOWN_MS};
use crate::utility::{get_config, get_parameter_or};

/// Properties of the vacuum device.
#[derive(Debug, Clone, PartialEq)]
pub struct VacuumConfig {
    pub plc_ip: String,
    pub plc_port: u16,
    // Period of the PLC data update in milliseconds.
    pub plc_update_interval_ms: u64,
    // Minimum interval between the PLC connect attempts in milliseconds.
    pub plc_reconnect_interval_ms: u64,
    // Cooldown of the PLC client after the reconnect attempts are exhausted.
    pub plc_reconnect_cooldown_ms: u64,
    // Width of the pulsed command bits in milliseconds.
    pub pulse_width_ms: u64,
}

impl Default for VacuumConfig {
    fn default() -> Self {
        Self {
            plc_ip: String::from("192.168.0.1"),
            plc_port: DEFAULT_PLC_PORT,
            plc_update_interval_ms: 2000,
            plc_reconnect_interval_ms: 5000,
            plc_reconnect_cooldown_ms: DEFAULT_RECONNECT_COOLDOWN_MS,
            pulse_width_ms: 200,
        }
    }
}

impl VacuumConfig {
    /// Read the properties. The missing ones keep the values of the default
    /// argument.
    ///
    /// # Arguments
    /// * `filepath` - Path of the property file.
    /// * `default` - Default properties. The PLC IP and port normally come
    /// from the system configuration.
    pub fn new(filepath: &Path, default: VacuumConfig) -> Self {
        let config = get_config(filepath);

        Self {
            plc_ip: get_parameter_or(&config, "plcIp", default.plc_ip),
            plc_port: get_parameter_or(&config, "plcPort", default.plc_port),
            plc_update_interval_ms: get_parameter_or(
                &config,
                "plcUpdateIntervalMs",
                default.plc_update_interval_ms,
            ),
            plc_reconnect_interval_ms: get_parameter_or(
                &config,
                "plcReconnectIntervalMs",
                default.plc_reconnect_interval_ms,
            ),
            plc_reconnect_cooldown_ms: get_parameter_or(
                &config,
                "plcReconnectCooldownMs",
                default.plc_reconnect_cooldown_ms,
            ),
            pulse_width_ms: get_parameter_or(&config, "pulseWidthMs", default.pulse_width_ms),
        }
    }
}
