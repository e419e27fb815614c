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

use log::info;
use serde_json::{json, Value};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::constants::{
    CHANNELS_PER_COLLECTOR, DATA_TIMEOUT_MS, DEFAULT_COLLECTOR_PORT, ENCODER_COMBINED_SCALE,
    ENCODER_POSITION_BITS,
};
use crate::device::device::Device;
use crate::encoder::encoder_manager::EncoderManager;
use crate::enums::DeviceState;
use crate::error::DeviceError;
use crate::utility::{get_config, get_parameter_array_or, get_parameter_or};

/// Properties of the encoder device.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    pub collector_ips: Vec<String>,
    pub collector_ports: Vec<u16>,
    pub channels_per_collector: usize,
    // Zero offset of each channel in the combined value.
    pub zero_offsets: Vec<f64>,
    pub data_timeout_ms: u64,
}

impl EncoderConfig {
    /// Read the properties. The missing ones use the default values.
    ///
    /// # Arguments
    /// * `filepath` - Path of the property file.
    pub fn new(filepath: &Path) -> Self {
        let config = get_config(filepath);

        Self {
            collector_ips: get_parameter_array_or(
                &config,
                "encoderCollectorIPs",
                vec![String::from("192.168.1.10"), String::from("192.168.1.11")],
            ),
            collector_ports: get_parameter_array_or(
                &config,
                "encoderCollectorPorts",
                vec![DEFAULT_COLLECTOR_PORT, DEFAULT_COLLECTOR_PORT],
            ),
            channels_per_collector: get_parameter_or(
                &config,
                "channelsPerCollector",
                CHANNELS_PER_COLLECTOR,
            ),
            zero_offsets: get_parameter_array_or(&config, "zeroOffsets", Vec::new()),
            data_timeout_ms: get_parameter_or(&config, "dataTimeoutMs", DATA_TIMEOUT_MS),
        }
    }
}

/// Convert the combined value to the reported position.
///
/// # Arguments
/// * `combined` - Combined value of the reading.
/// * `zero_offset` - Zero offset of the channel.
///
/// # Returns
/// Reported position.
pub fn reported_position(combined: f64, zero_offset: f64) -> f64 {
    (combined - zero_offset) * ENCODER_COMBINED_SCALE / ((1u32 << ENCODER_POSITION_BITS) as f64)
}

/// Device that serves the encoder readings.
pub struct EncoderDevice {
    _name: String,
    _manager: EncoderManager,
    _zero_offsets: Vec<f64>,
    _data_timeout: Duration,
    _is_simulation_mode: bool,
    _is_deleted: bool,
}

impl EncoderDevice {
    /// Create and initialize the encoder device. The acquisition starts in
    /// the hardware mode.
    ///
    /// # Arguments
    /// * `name` - Name of the device.
    /// * `config` - Properties.
    /// * `is_simulation_mode` - Serve the synthetic table or not.
    pub fn new(name: &str, config: &EncoderConfig, is_simulation_mode: bool) -> Self {
        let mut manager = EncoderManager::from_properties(
            &config.collector_ips,
            &config.collector_ports,
            config.channels_per_collector,
        );
        let data_timeout = Duration::from_millis(config.data_timeout_ms);
        manager.set_data_timeout(data_timeout);

        let mut zero_offsets = config.zero_offsets.clone();
        zero_offsets.resize(manager.num_channels(), 0.0);

        if is_simulation_mode {
            info!("{name} serves the synthetic encoder table.");
        } else {
            manager.start();
        }

        let mut device = Self {
            _name: String::from(name),
            _manager: manager,
            _zero_offsets: zero_offsets,
            _data_timeout: data_timeout,
            _is_simulation_mode: is_simulation_mode,
            _is_deleted: false,
        };
        device.refresh_synthetic_table();

        device
    }

    /// Refresh the synthetic table. The channel n reads n turns.
    fn refresh_synthetic_table(&mut self) {
        if !self._is_simulation_mode {
            return;
        }

        for channel in 0..self._manager.num_channels() {
            self._manager
                .inject(channel, (channel as u32) << ENCODER_POSITION_BITS);
        }
    }

    fn channel_index(&self, channel: i64) -> Result<usize, DeviceError> {
        if channel < 0 || (channel as usize) >= self._manager.num_channels() {
            return Err(DeviceError::InvalidArgs(format!(
                "channel {channel} is out of range"
            )));
        }

        Ok(channel as usize)
    }

    /// Read the reported position of the channel.
    ///
    /// # Arguments
    /// * `channel` - Global channel.
    ///
    /// # Returns
    /// Reported position.
    ///
    /// # Errors
    /// InvalidArgs, DataUnavailable or DataTimeout.
    pub fn read_encoder(&self, channel: i64) -> Result<f64, DeviceError> {
        let index = self.channel_index(channel)?;
        let reading = self._manager.get_fresh_reading(index)?;

        Ok(reported_position(reading.combined, self._zero_offsets[index]))
    }

    /// Set the zero offset of the channel.
    ///
    /// # Arguments
    /// * `channel` - Global channel.
    /// * `offset` - Zero offset in the combined value.
    pub fn set_zero_offset(&mut self, channel: i64, offset: f64) -> Result<(), DeviceError> {
        let index = self.channel_index(channel)?;
        self._zero_offsets[index] = offset;

        info!("{}: zero offset of channel {index} is {offset}.", self._name);

        Ok(())
    }

    /// Reported positions. Null for the channel without the fresh data.
    fn encoder_values(&self) -> Vec<Value> {
        let now = Instant::now();
        let timeout = self._data_timeout;
        self._manager
            .get_readings()
            .iter()
            .zip(self._zero_offsets.iter())
            .map(|(reading, offset)| {
                if reading.is_fresh(timeout, now) {
                    json!(reported_position(reading.combined, *offset))
                } else {
                    Value::Null
                }
            })
            .collect()
    }

    fn encoder_valid(&self) -> Vec<bool> {
        let now = Instant::now();
        let timeout = self._data_timeout;
        self._manager
            .get_readings()
            .iter()
            .map(|reading| reading.is_fresh(timeout, now))
            .collect()
    }
}

impl Device for EncoderDevice {
    fn name(&self) -> &str {
        &self._name
    }

    fn state(&self) -> DeviceState {
        if self._is_deleted {
            return DeviceState::Off;
        }

        if self._is_simulation_mode || self._manager.collector_connected().iter().all(|c| *c) {
            DeviceState::On
        } else {
            DeviceState::Alarm
        }
    }

    fn status(&self) -> String {
        let connected = self._manager.collector_connected();
        let num_connected = connected.iter().filter(|c| **c).count();
        if self._is_simulation_mode {
            String::from("Simulation mode")
        } else {
            format!("{num_connected} of {} collector(s) connected", connected.len())
        }
    }

    fn check_command(&self, _command: &str, _client_id: &str) -> Result<(), DeviceError> {
        Ok(())
    }

    fn attribute_names(&self) -> Vec<&'static str> {
        vec![
            "state",
            "status",
            "encoder_values",
            "encoder_valid",
            "collector_connected",
            "zero_offsets",
        ]
    }

    fn read_attribute(&mut self, name: &str) -> Result<Value, DeviceError> {
        match name {
            "state" => Ok(json!(self.state())),
            "status" => Ok(json!(self.status())),
            "encoder_values" => Ok(json!(self.encoder_values())),
            "encoder_valid" => Ok(json!(self.encoder_valid())),
            "collector_connected" => Ok(json!(self._manager.collector_connected())),
            "zero_offsets" => Ok(json!(self._zero_offsets)),
            _ => Err(DeviceError::InvalidArgs(format!("unknown attribute {name}"))),
        }
    }

    fn always_executed_hook(&mut self) {
        self.refresh_synthetic_table();
    }

    fn delete_device(&mut self) {
        self._manager.stop();
        self._is_deleted = true;

        info!("{} is deleted.", self._name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread::sleep;

    use crate::constants::LOCAL_HOST;

    fn create_config(ips: Vec<String>, ports: Vec<u16>) -> EncoderConfig {
        EncoderConfig {
            collector_ips: ips,
            collector_ports: ports,
            channels_per_collector: 10,
            zero_offsets: vec![0.0, 1.0],
            data_timeout_ms: DATA_TIMEOUT_MS,
        }
    }

    #[test]
    fn test_config_default() {
        let config = EncoderConfig::new(Path::new("not_exist.yaml"));

        assert_eq!(config.collector_ips.len(), 2);
        assert_eq!(config.collector_ports, vec![5000, 5000]);
        assert_eq!(config.channels_per_collector, 10);
        assert_eq!(config.data_timeout_ms, 500);
    }

    #[test]
    fn test_reported_position() {
        assert_relative_eq!(reported_position(1.0, 0.0), 1e6 / 131072.0);
        assert_relative_eq!(reported_position(1.5, 0.5), 1e6 / 131072.0);
    }

    #[test]
    fn test_read_encoder_simulation() {
        let config = create_config(
            vec![String::from(LOCAL_HOST), String::from(LOCAL_HOST)],
            vec![1, 1],
        );
        let mut device = EncoderDevice::new("encoder", &config, true);

        assert_eq!(device.read_encoder(0).unwrap(), 0.0);

        // Channel 1 reads 1 turn with the zero offset of 1.
        assert_eq!(device.read_encoder(1).unwrap(), 0.0);
        assert_relative_eq!(device.read_encoder(3).unwrap(), 3e6 / 131072.0);

        device.set_zero_offset(3, 1.0).unwrap();

        assert_relative_eq!(device.read_encoder(3).unwrap(), 2e6 / 131072.0);

        assert!(matches!(
            device.read_encoder(20),
            Err(DeviceError::InvalidArgs(_))
        ));
        assert!(device.set_zero_offset(-1, 0.0).is_err());

        assert_eq!(device.state(), DeviceState::On);
    }

    #[test]
    fn test_read_encoder_hardware() {
        let listener = TcpListener::bind(format!("{LOCAL_HOST}:0")).unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = create_config(vec![String::from(LOCAL_HOST)], vec![port]);
        let mut device = EncoderDevice::new("encoder", &config, false);

        // No data yet.
        assert_eq!(device.read_encoder(2), Err(DeviceError::DataUnavailable(2)));

        let (mut stream, _) = listener.accept().unwrap();
        stream
            .write_all(&[0x7E, 0x02, 0x00, 0x02, 0x00, 0x00, 0x7F])
            .unwrap();
        stream.flush().unwrap();

        sleep(Duration::from_millis(200));

        assert_relative_eq!(device.read_encoder(2).unwrap(), 1e6 / 131072.0);
        assert_eq!(device.read_attribute("encoder_valid").unwrap()[2], true);

        // The data becomes stale.
        sleep(Duration::from_millis(DATA_TIMEOUT_MS + 100));

        assert_eq!(device.read_encoder(2), Err(DeviceError::DataTimeout(2)));
        assert_eq!(device.read_attribute("encoder_values").unwrap()[2], Value::Null);

        device.delete_device();

        assert_eq!(device.state(), DeviceState::Off);
    }
}
