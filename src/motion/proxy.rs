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

use std::sync::Arc;

use crate::enums::LinkRole;
use crate::error::DeviceError;

/// Handle to the motion controller. A handle is shared between the
/// supervisor and the request path, so all methods take `&self`.
pub trait MotionProxy: Send + Sync {
    /// Ping the controller.
    fn ping(&self) -> Result<(), DeviceError>;

    /// Get the call timeout in milliseconds.
    fn timeout_ms(&self) -> u64;

    /// Set the call timeout in milliseconds.
    fn set_timeout_ms(&self, timeout_ms: u64);

    fn move_absolute(&self, axis: i16, position: f64) -> Result<(), DeviceError>;

    fn move_relative(&self, axis: i16, distance: f64) -> Result<(), DeviceError>;

    fn move_zero(&self, axis: i16) -> Result<(), DeviceError>;

    fn stop_move(&self, axis: i16) -> Result<(), DeviceError>;

    fn reset(&self, axis: i16) -> Result<(), DeviceError>;

    /// Read the limit switch. The nominal contract is 1 (EL+), -1 (EL-),
    /// and 0 (none).
    fn read_el(&self, axis: i16) -> Result<i16, DeviceError>;

    /// Read the origin switch.
    fn read_org(&self, axis: i16) -> Result<bool, DeviceError>;

    fn set_struct_parameter(
        &self,
        axis: i16,
        step_angle: f64,
        gear_ratio: f64,
        subdivision: f64,
    ) -> Result<(), DeviceError>;

    fn set_encoder_position(&self, axis: i16, position: f64) -> Result<(), DeviceError>;

    /// Write the logical value to the output port. The controller handles
    /// the active-low wiring.
    fn write_io(&self, port: i16, value: bool) -> Result<(), DeviceError>;
}

/// Handle to the encoder device.
pub trait EncoderProxy: Send + Sync {
    fn ping(&self) -> Result<(), DeviceError>;

    fn timeout_ms(&self) -> u64;

    fn set_timeout_ms(&self, timeout_ms: u64);

    /// Read the reported position of the channel.
    fn read_encoder(&self, channel: i16) -> Result<f64, DeviceError>;
}

/// Factory of the collaborator handles.
pub trait ProxyFactory: Send + Sync {
    /// Create a new motion handle and ping it.
    ///
    /// # Arguments
    /// * `role` - Role of the handle.
    /// * `timeout_ms` - Timeout of the creation and ping.
    ///
    /// # Returns
    /// Handle that answered the ping.
    ///
    /// # Errors
    /// NoProxy if the handle can not be created or does not answer.
    fn create_motion_proxy_and_ping(
        &self,
        role: LinkRole,
        timeout_ms: u64,
    ) -> Result<Arc<dyn MotionProxy>, DeviceError>;

    /// Create a new encoder handle and ping it.
    ///
    /// # Errors
    /// NoProxy if the handle can not be created or does not answer.
    fn create_encoder_proxy_and_ping(
        &self,
        timeout_ms: u64,
    ) -> Result<Arc<dyn EncoderProxy>, DeviceError>;
}

/// Restore the original timeout of the motion handle when dropped.
pub struct MotionTimeoutGuard<'a> {
    _proxy: &'a dyn MotionProxy,
    _original_ms: u64,
}

impl<'a> MotionTimeoutGuard<'a> {
    /// Shorten the timeout of the handle until the guard is dropped.
    ///
    /// # Arguments
    /// * `proxy` - Handle.
    /// * `timeout_ms` - Temporary timeout in milliseconds.
    pub fn new(proxy: &'a dyn MotionProxy, timeout_ms: u64) -> Self {
        let original_ms = proxy.timeout_ms();
        proxy.set_timeout_ms(timeout_ms);

        Self {
            _proxy: proxy,
            _original_ms: original_ms,
        }
    }
}

impl Drop for MotionTimeoutGuard<'_> {
    fn drop(&mut self) {
        self._proxy.set_timeout_ms(self._original_ms);
    }
}

/// Restore the original timeout of the encoder handle when dropped.
pub struct EncoderTimeoutGuard<'a> {
    _proxy: &'a dyn EncoderProxy,
    _original_ms: u64,
}

impl<'a> EncoderTimeoutGuard<'a> {
    /// Shorten the timeout of the handle until the guard is dropped.
    pub fn new(proxy: &'a dyn EncoderProxy, timeout_ms: u64) -> Self {
        let original_ms = proxy.timeout_ms();
        proxy.set_timeout_ms(timeout_ms);

        Self {
            _proxy: proxy,
            _original_ms: original_ms,
        }
    }
}

impl Drop for EncoderTimeoutGuard<'_> {
    fn drop(&mut self) {
        self._proxy.set_timeout_ms(self._original_ms);
    }
}

/// Ping the motion handle with the shortened timeout. The original timeout
/// is restored on return.
pub fn ping_motion_with_timeout(proxy: &dyn MotionProxy, timeout_ms: u64) -> Result<(), DeviceError> {
    let _guard = MotionTimeoutGuard::new(proxy, timeout_ms);
    proxy.ping()
}

/// Ping the encoder handle with the shortened timeout. The original timeout
/// is restored on return.
pub fn ping_encoder_with_timeout(
    proxy: &dyn EncoderProxy,
    timeout_ms: u64,
) -> Result<(), DeviceError> {
    let _guard = EncoderTimeoutGuard::new(proxy, timeout_ms);
    proxy.ping()
}
