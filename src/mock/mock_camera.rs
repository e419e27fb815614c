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

use crate::device::reflection::camera::Camera;
use crate::error::DeviceError;
use crate::mock::mock_constants::MOCK_IMAGE_SIZE;

/// Mock camera that captures a gray image.
pub struct MockCamera {
    _name: String,
    _is_open: bool,
    _is_failing: bool,
    _capture_count: usize,
}

impl MockCamera {
    pub fn new(name: &str) -> Self {
        Self {
            _name: String::from(name),
            _is_open: false,
            _is_failing: false,
            _capture_count: 0,
        }
    }

    /// Create a camera that fails to open.
    pub fn failing(name: &str) -> Self {
        Self {
            _is_failing: true,
            ..Self::new(name)
        }
    }

    pub fn capture_count(&self) -> usize {
        self._capture_count
    }
}

impl Camera for MockCamera {
    fn name(&self) -> &str {
        &self._name
    }

    fn open(&mut self) -> Result<(), DeviceError> {
        if self._is_failing {
            return Err(DeviceError::HardwareFault(format!(
                "failed to open {}",
                self._name
            )));
        }

        self._is_open = true;

        Ok(())
    }

    fn close(&mut self) {
        self._is_open = false;
    }

    fn is_open(&self) -> bool {
        self._is_open
    }

    fn capture(&mut self) -> Result<Vec<u8>, DeviceError> {
        if !self._is_open {
            return Err(DeviceError::HardwareFault(format!("{} is not open", self._name)));
        }

        self._capture_count += 1;

        Ok(vec![0x80; MOCK_IMAGE_SIZE])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut camera = MockCamera::new("camera0");

        assert!(camera.capture().is_err());

        camera.open().unwrap();

        assert!(camera.is_open());
        assert_eq!(camera.capture().unwrap().len(), MOCK_IMAGE_SIZE);
        assert_eq!(camera.capture_count(), 1);

        camera.close();

        assert!(!camera.is_open());
    }

    #[test]
    fn test_failing() {
        let mut camera = MockCamera::failing("camera1");

        assert!(camera.open().is_err());
        assert!(!camera.is_open());
    }
}
