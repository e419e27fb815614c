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

use num_traits::PrimInt;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString, FromRepr, VariantNames};

/// A trait to provide value and bit value methods for the bit enum.
pub trait BitEnum<T: PrimInt> {
    /// Get the value.
    ///
    /// # Returns
    /// Value.
    fn value(&self) -> T;

    /// Get the bit value.
    ///
    /// # Returns
    /// Bit value. If the value is not defined, it returns 0.
    fn bit_value(&self) -> T {
        match self.value().to_usize() {
            Some(value) => T::one() << value,
            None => T::zero(),
        }
    }
}

impl BitEnum<u16> for VacuumFault {
    fn value(&self) -> u16 {
        *self as u16
    }
}

/// Command status.
#[derive(Debug, VariantNames, AsRefStr)]
pub enum CommandStatus {
    Success,
    Fail,
    Ack,
    NoAck,
}

/// Device state published on the supervisory bus.
#[derive(
    FromRepr, Debug, PartialEq, Eq, Hash, Clone, Copy, AsRefStr, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum DeviceState {
    Unknown = 0,
    Off = 1,
    On = 2,
    Moving = 3,
    Fault = 4,
    Alarm = 5,
    Init = 6,
}

/// Kind of the device server.
#[derive(Debug, PartialEq, Eq, Clone, Copy, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DeviceKind {
    Encoder,
    Vacuum,
    Reflection,
}

/// Memory area of the PLC.
#[derive(FromRepr, Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
#[repr(u8)]
pub enum PlcArea {
    Input = 0,
    Output = 1,
    Memory = 2,
    InputWord = 3,
    OutputWord = 4,
    DbBlock = 5,
}

impl PlcArea {
    /// Get the S7 area code.
    ///
    /// # Returns
    /// Area code used in the S7 read/write variable job.
    pub fn s7_code(&self) -> u8 {
        match self {
            PlcArea::Input | PlcArea::InputWord => 0x81,
            PlcArea::Output | PlcArea::OutputWord => 0x82,
            PlcArea::Memory => 0x83,
            PlcArea::DbBlock => 0x84,
        }
    }
}

/// State of the vacuum plant.
#[derive(FromRepr, Debug, PartialEq, Eq, Clone, Copy, AsRefStr, Serialize, Deserialize)]
#[repr(u8)]
pub enum SystemState {
    Idle = 0,
    Pumping = 1,
    Venting = 2,
    Fault = 3,
}

/// Operation mode of the vacuum plant.
#[derive(FromRepr, Debug, PartialEq, Eq, Clone, Copy, AsRefStr, Serialize, Deserialize)]
#[repr(u8)]
pub enum VacuumMode {
    Auto = 0,
    Manual = 1,
}

/// Faults of the vacuum plant. The discriminant is the bit position in the
/// fault summary.
#[derive(Debug, PartialEq, Eq, Clone, Copy, EnumIter, AsRefStr)]
pub enum VacuumFault {
    ScrewPump,
    RootsPump,
    MolecularPump1,
    MolecularPump2,
    MolecularPump3,
    WaterCooling1,
    WaterCooling2,
    WaterCooling3,
    WaterCooling4,
    PhaseSequence,
}

/// State of the self-check.
#[derive(FromRepr, Debug, PartialEq, Eq, Clone, Copy, AsRefStr, Serialize, Deserialize)]
#[repr(u8)]
pub enum SelfCheckState {
    Idle = 0,
    Checking = 1,
    Succeed = 2,
    Warning = 3,
    Failed = 4,
}

/// State of the limit switch of an axis.
#[derive(FromRepr, Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[repr(i8)]
pub enum LimitState {
    None = 0,
    ElPos = 1,
    ElNeg = -1,
    Unknown = 2,
}

/// Motion platform.
#[derive(FromRepr, Debug, PartialEq, Eq, Hash, Clone, Copy, AsRefStr, EnumIter)]
#[repr(u8)]
pub enum Platform {
    Upper = 0,
    Lower = 1,
}

impl Platform {
    /// Get the physical axis on the motion controller.
    ///
    /// # Arguments
    /// * `logical_axis` - Logical axis of the platform: 0 (X), 1 (Y), 2 (Z).
    ///
    /// # Returns
    /// Physical axis. The upper platform uses the even axes and the lower
    /// platform uses the odd axes.
    pub fn physical_axis(&self, logical_axis: usize) -> i16 {
        (2 * logical_axis + (*self as usize)) as i16
    }

    /// Get the name prefix of the platform commands.
    pub fn prefix(&self) -> &'static str {
        match self {
            Platform::Upper => "upper",
            Platform::Lower => "lower",
        }
    }
}

/// Axis of a platform.
#[derive(FromRepr, Debug, PartialEq, Eq, Hash, Clone, Copy, AsRefStr, EnumIter)]
#[repr(u8)]
pub enum AxisLetter {
    X = 0,
    Y = 1,
    Z = 2,
}

/// Action on a single axis.
#[derive(Debug, PartialEq, Eq, Clone, Copy, AsRefStr, EnumIter)]
pub enum AxisAction {
    MoveAbsolute,
    MoveRelative,
    MoveZero,
    Stop,
    Reset,
}

/// Role of a collaborator link watched by the connection supervisor.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, AsRefStr, EnumIter)]
pub enum LinkRole {
    Encoder,
    UpperPlatform,
    LowerPlatform,
    Plc,
}

impl LinkRole {
    /// The link needs the restore sequence after it is rebuilt or not.
    pub fn needs_restore(&self) -> bool {
        !matches!(self, LinkRole::Encoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::str::FromStr;

    #[test]
    fn test_command_status() {
        assert_eq!(CommandStatus::Success.as_ref().to_lowercase(), "success");
        assert_eq!(CommandStatus::Fail.as_ref().to_lowercase(), "fail");
        assert_eq!(CommandStatus::Ack.as_ref().to_lowercase(), "ack");
        assert_eq!(CommandStatus::NoAck.as_ref().to_lowercase(), "noack");
    }

    #[test]
    fn test_vacuum_fault_bit_value() {
        assert_eq!(VacuumFault::ScrewPump.bit_value(), 1);
        assert_eq!(VacuumFault::RootsPump.bit_value(), 2);
        assert_eq!(VacuumFault::PhaseSequence.bit_value(), 1 << 9);
    }

    #[test]
    fn test_plc_area_s7_code() {
        assert_eq!(PlcArea::Input.s7_code(), 0x81);
        assert_eq!(PlcArea::InputWord.s7_code(), 0x81);
        assert_eq!(PlcArea::Output.s7_code(), 0x82);
        assert_eq!(PlcArea::Memory.s7_code(), 0x83);
        assert_eq!(PlcArea::DbBlock.s7_code(), 0x84);
    }

    #[test]
    fn test_limit_state_from_repr() {
        assert_eq!(LimitState::from_repr(0), Some(LimitState::None));
        assert_eq!(LimitState::from_repr(1), Some(LimitState::ElPos));
        assert_eq!(LimitState::from_repr(-1), Some(LimitState::ElNeg));
        assert_eq!(LimitState::from_repr(2), Some(LimitState::Unknown));
        assert_eq!(LimitState::from_repr(3), None);
    }

    #[test]
    fn test_physical_axis() {
        assert_eq!(Platform::Upper.physical_axis(0), 0);
        assert_eq!(Platform::Upper.physical_axis(2), 4);
        assert_eq!(Platform::Lower.physical_axis(0), 1);
        assert_eq!(Platform::Lower.physical_axis(2), 5);
    }

    #[test]
    fn test_device_kind_from_str() {
        assert_eq!(DeviceKind::from_str("vacuum").unwrap(), DeviceKind::Vacuum);
        assert_eq!(
            DeviceKind::from_str("reflection").unwrap(),
            DeviceKind::Reflection
        );
        assert!(DeviceKind::from_str("camera").is_err());
    }

    #[test]
    fn test_link_role_needs_restore() {
        assert!(!LinkRole::Encoder.needs_restore());
        assert!(LinkRole::UpperPlatform.needs_restore());
        assert!(LinkRole::Plc.needs_restore());
    }
}
