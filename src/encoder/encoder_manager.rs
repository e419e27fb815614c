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
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::constants::{DATA_TIMEOUT_MS, DEFAULT_COLLECTOR_PORT};
use crate::encoder::acquisition_client::{AcquisitionClient, ChannelConfig, ChannelTable};
use crate::encoder::encoder_reading::EncoderReading;
use crate::error::DeviceError;

/// Manager of the encoder acquisition. It owns one acquisition client per
/// collector and the shared channel table.
pub struct EncoderManager {
    _clients: Vec<AcquisitionClient>,
    _table: ChannelTable,
    _data_timeout: Duration,
}

impl EncoderManager {
    /// Create a new encoder manager.
    ///
    /// # Arguments
    /// * `configs` - Configurations of the collectors.
    /// * `num_channels` - Total number of the channels in the table.
    ///
    /// # Returns
    /// New instance of the encoder manager. The workers are not started.
    pub fn new(configs: Vec<ChannelConfig>, num_channels: usize) -> Self {
        let table: ChannelTable = Arc::new(Mutex::new(vec![
            EncoderReading::default();
            num_channels
        ]));

        Self {
            _clients: configs
                .into_iter()
                .map(|config| AcquisitionClient::new(config, &table))
                .collect(),
            _table: table,
            _data_timeout: Duration::from_millis(DATA_TIMEOUT_MS),
        }
    }

    /// Create the encoder manager from the device properties. The collector
    /// k owns the channels [k * channels_per_collector, (k + 1) *
    /// channels_per_collector).
    ///
    /// # Arguments
    /// * `ips` - IPs of the collectors.
    /// * `ports` - Ports of the collectors. The default port is used for the
    /// missing ones.
    /// * `channels_per_collector` - Number of the channels of each collector.
    ///
    /// # Returns
    /// New instance of the encoder manager.
    pub fn from_properties(ips: &[String], ports: &[u16], channels_per_collector: usize) -> Self {
        let configs: Vec<ChannelConfig> = ips
            .iter()
            .enumerate()
            .map(|(idx, ip)| ChannelConfig {
                ip: ip.clone(),
                port: ports.get(idx).copied().unwrap_or(DEFAULT_COLLECTOR_PORT),
                channel_offset: idx * channels_per_collector,
                channel_count: channels_per_collector,
            })
            .collect();

        let num_channels = ips.len() * channels_per_collector;

        Self::new(configs, num_channels)
    }

    fn table(&self) -> MutexGuard<'_, Vec<EncoderReading>> {
        self._table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Set the data timeout.
    pub fn set_data_timeout(&mut self, timeout: Duration) {
        self._data_timeout = timeout;
    }

    /// Start all acquisition workers.
    pub fn start(&mut self) {
        info!(
            "Start the encoder acquisition of {} collector(s).",
            self._clients.len()
        );
        for client in self._clients.iter_mut() {
            client.start();
        }
    }

    /// Stop all acquisition workers and wait for them.
    pub fn stop(&mut self) {
        for client in self._clients.iter_mut() {
            client.stop();
        }
    }

    /// Any worker is running or not.
    pub fn is_running(&self) -> bool {
        self._clients.iter().any(|client| client.is_running())
    }

    /// Connection state of each collector.
    pub fn collector_connected(&self) -> Vec<bool> {
        self._clients
            .iter()
            .map(|client| client.is_connected())
            .collect()
    }

    pub fn num_channels(&self) -> usize {
        self.table().len()
    }

    /// Get the copy of the reading. The staleness is not checked.
    ///
    /// # Arguments
    /// * `channel` - Global channel.
    ///
    /// # Returns
    /// Reading. None if the channel is out of range.
    pub fn get_reading(&self, channel: usize) -> Option<EncoderReading> {
        self.table().get(channel).copied()
    }

    /// Get the snapshot of all readings.
    pub fn get_readings(&self) -> Vec<EncoderReading> {
        self.table().clone()
    }

    /// Get the reading that is valid and not stale.
    ///
    /// # Arguments
    /// * `channel` - Global channel.
    ///
    /// # Returns
    /// Fresh reading.
    ///
    /// # Errors
    /// InvalidArgs if the channel is out of range, DataUnavailable if no
    /// data is received, and DataTimeout if the data is stale.
    pub fn get_fresh_reading(&self, channel: usize) -> Result<EncoderReading, DeviceError> {
        let reading = self.get_reading(channel).ok_or_else(|| {
            DeviceError::InvalidArgs(format!("channel {channel} is out of range"))
        })?;

        if !reading.valid {
            return Err(DeviceError::DataUnavailable(channel));
        }

        if !reading.is_fresh(self._data_timeout, Instant::now()) {
            return Err(DeviceError::DataTimeout(channel));
        }

        Ok(reading)
    }

    /// Put the raw value into the table directly. This is used in the
    /// simulation.
    ///
    /// # Arguments
    /// * `channel` - Global channel.
    /// * `raw` - Raw value.
    pub fn inject(&self, channel: usize, raw: u32) {
        if let Some(reading) = self.table().get_mut(channel) {
            *reading = EncoderReading::decode(raw, Instant::now());
        }
    }
}

impl Drop for EncoderManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;
    use std::net::TcpListener;
    use std::thread::sleep;

    use crate::constants::{FRAME_HEAD, FRAME_TAIL, LOCAL_HOST};

    fn frame_bytes(channel: u8, raw: u32) -> Vec<u8> {
        let mut bytes = vec![FRAME_HEAD, channel];
        bytes.extend_from_slice(&raw.to_be_bytes());
        bytes.push(FRAME_TAIL);

        bytes
    }

    #[test]
    fn test_from_properties() {
        let manager = EncoderManager::from_properties(
            &[String::from("10.0.0.1"), String::from("10.0.0.2")],
            &[5001],
            10,
        );

        assert_eq!(manager.num_channels(), 20);
        assert_eq!(manager._clients[0].config().port, 5001);
        assert_eq!(manager._clients[1].config().port, DEFAULT_COLLECTOR_PORT);
        assert_eq!(manager._clients[1].config().channel_offset, 10);
        assert!(!manager.is_running());
    }

    #[test]
    fn test_get_fresh_reading() {
        let mut manager = EncoderManager::from_properties(&[String::from(LOCAL_HOST)], &[0], 10);
        manager.set_data_timeout(Duration::from_millis(100));

        assert_eq!(
            manager.get_fresh_reading(3),
            Err(DeviceError::DataUnavailable(3))
        );
        assert!(matches!(
            manager.get_fresh_reading(10),
            Err(DeviceError::InvalidArgs(_))
        ));

        manager.inject(3, 0x0002_0000);

        assert_eq!(manager.get_fresh_reading(3).unwrap().turns, 1);

        sleep(Duration::from_millis(150));

        // Stored as valid but reported as stale.
        assert!(manager.get_reading(3).unwrap().valid);
        assert_eq!(manager.get_fresh_reading(3), Err(DeviceError::DataTimeout(3)));
    }

    #[test]
    fn test_two_collectors() {
        let listener_1 = TcpListener::bind(format!("{LOCAL_HOST}:0")).unwrap();
        let listener_2 = TcpListener::bind(format!("{LOCAL_HOST}:0")).unwrap();
        let ports = [
            listener_1.local_addr().unwrap().port(),
            listener_2.local_addr().unwrap().port(),
        ];

        let mut manager = EncoderManager::from_properties(
            &[String::from(LOCAL_HOST), String::from(LOCAL_HOST)],
            &ports,
            10,
        );
        manager.start();

        let (mut collector_1, _) = listener_1.accept().unwrap();
        let (mut collector_2, _) = listener_2.accept().unwrap();

        collector_1
            .write_all(&[0x7E, 0x03, 0x00, 0x02, 0x00, 0x00, 0x7F])
            .unwrap();
        collector_2
            .write_all(&[0x80, 0x7E, 0x05, 0x00, 0x00, 0xC0, 0x00, 0x7F])
            .unwrap();
        collector_2.write_all(&frame_bytes(0, 7)).unwrap();

        sleep(Duration::from_millis(400));

        assert_eq!(manager.collector_connected(), vec![true, true]);

        let reading = manager.get_fresh_reading(3).unwrap();
        assert_eq!(reading.turns, 1);
        assert_eq!(reading.position, 0);
        assert_eq!(reading.combined, 1.0);

        let reading = manager.get_fresh_reading(15).unwrap();
        assert_eq!(reading.turns, 0);
        assert_eq!(reading.position, 49152);
        assert_eq!(reading.combined, 0.049152);

        assert_eq!(manager.get_fresh_reading(10).unwrap().position, 7);

        manager.stop();

        assert!(!manager.is_running());
        assert_eq!(manager.collector_connected(), vec![false, false]);
    }
}
