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
use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex,
};

use crate::error::DeviceError;
use crate::mock::mock_constants::MOCK_DEFAULT_TIMEOUT_MS;
use crate::motion::proxy::EncoderProxy;

/// Mock encoder device that serves the positions of the channels.
pub struct MockEncoder {
    _values: Mutex<HashMap<i16, f64>>,
    _online: AtomicBool,
    // Number of the readEncoder calls.
    _read_count: AtomicUsize,
}

impl MockEncoder {
    /// Create a new mock encoder that is online. All channels read 0.
    pub fn new() -> Self {
        Self {
            _values: Mutex::new(HashMap::new()),
            _online: AtomicBool::new(true),
            _read_count: AtomicUsize::new(0),
        }
    }

    pub fn set_online(&self, is_online: bool) {
        self._online.store(is_online, Ordering::Relaxed);
    }

    pub fn is_online(&self) -> bool {
        self._online.load(Ordering::Relaxed)
    }

    /// Set the position of the channel.
    pub fn set_value(&self, channel: i16, value: f64) {
        self._values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(channel, value);
    }

    pub fn read_count(&self) -> usize {
        self._read_count.load(Ordering::Relaxed)
    }

    fn read(&self, channel: i16) -> Result<f64, DeviceError> {
        if !self.is_online() {
            return Err(DeviceError::TransportFailure(String::from(
                "mock encoder is offline",
            )));
        }

        self._read_count.fetch_add(1, Ordering::Relaxed);

        Ok(self
            ._values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&channel)
            .copied()
            .unwrap_or_default())
    }
}

impl Default for MockEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the mock encoder.
pub struct MockEncoderHandle {
    _encoder: Arc<MockEncoder>,
    _timeout_ms: AtomicU64,
}

impl MockEncoderHandle {
    pub fn new(encoder: &Arc<MockEncoder>) -> Self {
        Self {
            _encoder: encoder.clone(),
            _timeout_ms: AtomicU64::new(MOCK_DEFAULT_TIMEOUT_MS),
        }
    }
}

impl EncoderProxy for MockEncoderHandle {
    fn ping(&self) -> Result<(), DeviceError> {
        if self._encoder.is_online() {
            Ok(())
        } else {
            Err(DeviceError::TransportFailure(String::from(
                "mock encoder is offline",
            )))
        }
    }

    fn timeout_ms(&self) -> u64 {
        self._timeout_ms.load(Ordering::Relaxed)
    }

    fn set_timeout_ms(&self, timeout_ms: u64) {
        self._timeout_ms.store(timeout_ms, Ordering::Relaxed);
    }

    fn read_encoder(&self, channel: i16) -> Result<f64, DeviceError> {
        self._encoder.read(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::motion::proxy::ping_encoder_with_timeout;

    #[test]
    fn test_read_encoder() {
        let encoder = Arc::new(MockEncoder::new());
        let handle = MockEncoderHandle::new(&encoder);

        assert_eq!(handle.read_encoder(1).unwrap(), 0.0);

        encoder.set_value(1, 12.5);

        assert_eq!(handle.read_encoder(1).unwrap(), 12.5);
        assert_eq!(encoder.read_count(), 2);
    }

    #[test]
    fn test_offline() {
        let encoder = Arc::new(MockEncoder::new());
        let handle = MockEncoderHandle::new(&encoder);
        handle.set_timeout_ms(1000);

        encoder.set_online(false);

        assert!(handle.read_encoder(1).is_err());
        assert!(ping_encoder_with_timeout(&handle, 300).is_err());
        assert_eq!(handle.timeout_ms(), 1000);
        assert_eq!(encoder.read_count(), 0);
    }
}
