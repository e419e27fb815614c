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

use thiserror::Error;

use crate::enums::DeviceState;

/// Errors of the PLC transport.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlcError {
    #[error("PLC is not connected")]
    NotConnected,
    #[error("reconnect is cooling down")]
    Cooldown,
    #[error("I/O error on {address}: {message}")]
    Io { address: String, message: String },
    #[error("protocol error on {address}: {message}")]
    Protocol { address: String, message: String },
    #[error("address {0} is out of range")]
    AddressOutOfRange(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Errors surfaced by the device commands.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("command {command} is not allowed in the {state:?} state")]
    InvalidState { command: String, state: DeviceState },
    #[error("device is locked by {0}")]
    DeviceLocked(String),
    #[error("target {target} of axis {axis} exceeds the range {range}")]
    LimitExceeded { axis: usize, target: f64, range: f64 },
    #[error("collision risk: {0}")]
    CollisionRisk(String),
    #[error("no proxy for {0}")]
    NoProxy(String),
    #[error("network connection is unhealthy")]
    NetworkUnhealthy,
    #[error("transport failure: {0}")]
    TransportFailure(String),
    #[error("no data in channel {0}")]
    DataUnavailable(usize),
    #[error("data of channel {0} is stale")]
    DataTimeout(usize),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("self-check failed: {0}")]
    SelfCheckFailed(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
}

impl DeviceError {
    /// Get the reason reported on the supervisory bus.
    ///
    /// # Returns
    /// Reason string.
    pub fn reason(&self) -> &'static str {
        match self {
            DeviceError::InvalidArgs(_) => "API_InvalidArgs",
            DeviceError::InvalidState { .. } => "API_InvalidState",
            DeviceError::DeviceLocked(_) => "API_DeviceLocked",
            DeviceError::LimitExceeded { .. } => "API_LimitExceeded",
            DeviceError::CollisionRisk(_) => "API_CollisionRisk",
            DeviceError::NoProxy(_) | DeviceError::NetworkUnhealthy => "API_NoProxy",
            DeviceError::TransportFailure(_) => "API_TransportFailure",
            DeviceError::DataUnavailable(_) => "API_DataUnavailable",
            DeviceError::DataTimeout(_) => "API_DataTimeout",
            DeviceError::HardwareFault(_) => "API_HardwareFault",
            DeviceError::SelfCheckFailed(_) => "API_SelfCheckFailed",
            DeviceError::CommandFailed(_) => "API_CommandFailed",
        }
    }
}

impl From<PlcError> for DeviceError {
    fn from(error: PlcError) -> Self {
        DeviceError::TransportFailure(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason() {
        assert_eq!(
            DeviceError::InvalidArgs(String::from("x")).reason(),
            "API_InvalidArgs"
        );
        assert_eq!(DeviceError::NetworkUnhealthy.reason(), "API_NoProxy");
        assert_eq!(
            DeviceError::NoProxy(String::from("encoder")).reason(),
            "API_NoProxy"
        );
        assert_eq!(
            DeviceError::CommandFailed(String::from("x")).reason(),
            "API_CommandFailed"
        );
    }

    #[test]
    fn test_from_plc_error() {
        let error: DeviceError = PlcError::NotConnected.into();

        assert_eq!(
            error,
            DeviceError::TransportFailure(String::from("PLC is not connected"))
        );
    }

    #[test]
    fn test_display() {
        let error = DeviceError::LimitExceeded {
            axis: 0,
            target: 1001.0,
            range: 1000.0,
        };

        assert_eq!(
            error.to_string(),
            "target 1001 of axis 0 exceeds the range 1000"
        );
    }
}
