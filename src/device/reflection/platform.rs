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

use nalgebra::Vector3;
use serde::Serialize;

use crate::constants::{IN_POSITION_TOLERANCE, NUM_PLATFORM_AXES};
use crate::enums::LimitState;

/// State of a physical axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MotionAxisState {
    pub position_reported: f64,
    pub position_commanded: f64,
    pub in_motion: bool,
    pub limit_state: LimitState,
}

impl Default for MotionAxisState {
    fn default() -> Self {
        Self {
            position_reported: 0.0,
            position_commanded: 0.0,
            in_motion: false,
            limit_state: LimitState::None,
        }
    }
}

/// Interpret the raw value of the readEL. The limit switches are low-active,
/// so 0 means a limit is active with the unknown direction and it is
/// reported as EL+.
///
/// # Arguments
/// * `raw` - Value returned by the controller.
///
/// # Returns
/// Limit state.
pub fn interpret_limit_switch(raw: i16) -> LimitState {
    if raw == 0 {
        LimitState::ElPos
    } else {
        LimitState::None
    }
}

/// State of the X, Y, Z axes of a platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlatformState {
    pub axes: [MotionAxisState; NUM_PLATFORM_AXES],
}

impl PlatformState {
    pub fn reported(&self) -> Vector3<f64> {
        Vector3::from_fn(|idx, _| self.axes[idx].position_reported)
    }

    pub fn commanded(&self) -> Vector3<f64> {
        Vector3::from_fn(|idx, _| self.axes[idx].position_commanded)
    }

    pub fn in_motion(&self) -> [bool; NUM_PLATFORM_AXES] {
        self.axes.map(|axis| axis.in_motion)
    }

    pub fn is_moving(&self) -> bool {
        self.axes.iter().any(|axis| axis.in_motion)
    }

    /// Command the new target. Only the axes whose target changes are in
    /// motion.
    pub fn command(&mut self, target: &Vector3<f64>) {
        for (axis, value) in self.axes.iter_mut().zip(target.iter()) {
            if axis.position_reported != *value {
                axis.in_motion = true;
            }
            axis.position_commanded = *value;
        }
    }

    /// Update the reported positions.
    pub fn report(&mut self, position: &Vector3<f64>) {
        for (axis, value) in self.axes.iter_mut().zip(position.iter()) {
            axis.position_reported = *value;
        }
    }

    /// Clear the motion of the axes that are in position.
    pub fn settle(&mut self) {
        for axis in self.axes.iter_mut() {
            if (axis.position_reported - axis.position_commanded).abs() <= IN_POSITION_TOLERANCE {
                axis.in_motion = false;
            }
        }
    }

    /// Hold the axis at the reported position.
    pub fn hold_axis(&mut self, idx: usize) {
        if let Some(axis) = self.axes.get_mut(idx) {
            axis.position_commanded = axis.position_reported;
            axis.in_motion = false;
        }
    }

    /// Hold all axes at the reported positions.
    pub fn hold(&mut self) {
        for idx in 0..NUM_PLATFORM_AXES {
            self.hold_axis(idx);
        }
    }

    /// Synchronize both positions to the value read from the encoder.
    pub fn synchronize_axis(&mut self, idx: usize, position: f64) {
        if let Some(axis) = self.axes.get_mut(idx) {
            axis.position_reported = position;
            axis.position_commanded = position;
            axis.in_motion = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_limit_switch() {
        assert_eq!(interpret_limit_switch(0), LimitState::ElPos);
        assert_eq!(interpret_limit_switch(1), LimitState::None);
        assert_eq!(interpret_limit_switch(-1), LimitState::None);
    }

    #[test]
    fn test_command_and_settle() {
        let mut platform = PlatformState::default();

        platform.command(&Vector3::new(10.0, 0.0, 0.0));

        assert_eq!(platform.in_motion(), [true, false, false]);
        assert!(platform.is_moving());

        platform.report(&Vector3::new(9.995, 0.0, 0.0));
        platform.settle();

        assert!(!platform.is_moving());
        assert_eq!(platform.commanded(), Vector3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn test_hold() {
        let mut platform = PlatformState::default();
        platform.command(&Vector3::new(10.0, 20.0, 30.0));
        platform.report(&Vector3::new(1.0, 2.0, 3.0));

        platform.hold_axis(2);

        assert_eq!(platform.in_motion(), [true, true, false]);
        assert_eq!(platform.commanded(), Vector3::new(10.0, 20.0, 3.0));

        platform.hold();

        assert_eq!(platform.commanded(), platform.reported());
    }
}
