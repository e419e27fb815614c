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
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DeviceError;
use crate::utility::get_timestamp_string;

/// Industrial camera. Only the lifecycle and a single capture are handled
/// here; the frame acquisition belongs to the vendor SDK.
pub trait Camera: Send {
    /// Serial or name of the camera.
    fn name(&self) -> &str;

    fn open(&mut self) -> Result<(), DeviceError>;

    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Capture one image.
    ///
    /// # Returns
    /// Encoded image.
    ///
    /// # Errors
    /// HardwareFault if the camera is closed or the capture fails.
    fn capture(&mut self) -> Result<Vec<u8>, DeviceError>;
}

/// Camera slot without a vendor SDK attached. Opening it always fails.
pub struct DetachedCamera {
    _name: String,
}

impl DetachedCamera {
    pub fn new(name: &str) -> Self {
        Self {
            _name: String::from(name),
        }
    }
}

impl Camera for DetachedCamera {
    fn name(&self) -> &str {
        &self._name
    }

    fn open(&mut self) -> Result<(), DeviceError> {
        Err(DeviceError::HardwareFault(format!(
            "no camera driver is attached to {}",
            self._name
        )))
    }

    fn close(&mut self) {}

    fn is_open(&self) -> bool {
        false
    }

    fn capture(&mut self) -> Result<Vec<u8>, DeviceError> {
        Err(DeviceError::HardwareFault(format!("{} is not open", self._name)))
    }
}

/// Capture an image and save it as `<dir>/<camera>_YYYYMMDD_HHMMSS.<format>`.
///
/// # Arguments
/// * `camera` - Camera to capture.
/// * `dir` - Directory of the image.
/// * `format` - File suffix such as "png".
///
/// # Returns
/// Path of the image.
///
/// # Errors
/// HardwareFault if the capture fails, CommandFailed if the image can not be
/// written.
pub fn capture_to_file(
    camera: &mut dyn Camera,
    dir: &Path,
    format: &str,
) -> Result<PathBuf, DeviceError> {
    let image = camera.capture()?;

    let filepath = dir.join(format!(
        "{}_{}.{format}",
        camera.name(),
        get_timestamp_string()
    ));
    fs::create_dir_all(dir)
        .and_then(|_| fs::write(&filepath, image))
        .map_err(|error| {
            DeviceError::CommandFailed(format!("failed to save the image {filepath:?}: {error}"))
        })?;

    info!("Image of {} is saved to {:?}.", camera.name(), filepath);

    Ok(filepath)
}
