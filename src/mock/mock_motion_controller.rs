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

use std::collections::{HashMap, HashSet};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
};

use crate::error::DeviceError;
use crate::mock::mock_constants::{MOCK_DEFAULT_TIMEOUT_MS, MOCK_EL_NO_LIMIT, MOCK_NUM_AXES};
use crate::motion::proxy::MotionProxy;

/// Call received by the mock motion controller.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionCall {
    MoveAbsolute(i16, f64),
    MoveRelative(i16, f64),
    MoveZero(i16),
    StopMove(i16),
    Reset(i16),
    ReadEl(i16),
    ReadOrg(i16),
    SetStructParameter(i16, f64, f64, f64),
    SetEncoderPosition(i16, f64),
    WriteIo(i16, bool),
}

impl MotionCall {
    /// Name of the call on the controller.
    pub fn name(&self) -> &'static str {
        match self {
            MotionCall::MoveAbsolute(..) => "moveAbsolute",
            MotionCall::MoveRelative(..) => "moveRelative",
            MotionCall::MoveZero(_) => "moveZero",
            MotionCall::StopMove(_) => "stopMove",
            MotionCall::Reset(_) => "reset",
            MotionCall::ReadEl(_) => "readEL",
            MotionCall::ReadOrg(_) => "readOrg",
            MotionCall::SetStructParameter(..) => "setStructParameter",
            MotionCall::SetEncoderPosition(..) => "setEncoderPosition",
            MotionCall::WriteIo(..) => "writeIO",
        }
    }
}

struct MockMotionState {
    positions: [f64; MOCK_NUM_AXES],
    el: [i16; MOCK_NUM_AXES],
    org: [bool; MOCK_NUM_AXES],
    io: HashMap<i16, bool>,
    calls: Vec<MotionCall>,
    // Names of the calls that fail.
    failing_calls: HashSet<String>,
}

/// Mock motion controller. All handles created from it share the same
/// state, as the two platform handles do on the real controller.
pub struct MockMotionController {
    _state: Mutex<MockMotionState>,
    _online: AtomicBool,
}

impl MockMotionController {
    /// Create a new mock motion controller that is online.
    pub fn new() -> Self {
        Self {
            _state: Mutex::new(MockMotionState {
                positions: [0.0; MOCK_NUM_AXES],
                el: [MOCK_EL_NO_LIMIT; MOCK_NUM_AXES],
                org: [false; MOCK_NUM_AXES],
                io: HashMap::new(),
                calls: Vec::new(),
                failing_calls: HashSet::new(),
            }),
            _online: AtomicBool::new(true),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockMotionState> {
        self._state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Set the controller online or not.
    pub fn set_online(&self, is_online: bool) {
        self._online.store(is_online, Ordering::Relaxed);
    }

    pub fn is_online(&self) -> bool {
        self._online.load(Ordering::Relaxed)
    }

    /// Set the raw value returned by the readEL.
    pub fn set_el(&self, axis: usize, value: i16) {
        if let Some(el) = self.state().el.get_mut(axis) {
            *el = value;
        }
    }

    /// Set the value returned by the readOrg.
    pub fn set_org(&self, axis: usize, value: bool) {
        if let Some(org) = self.state().org.get_mut(axis) {
            *org = value;
        }
    }

    /// Make the call fail or not.
    ///
    /// # Arguments
    /// * `name` - Name of the call such as "moveAbsolute".
    /// * `is_failing` - The call fails or not.
    pub fn set_failing(&self, name: &str, is_failing: bool) {
        let mut state = self.state();
        if is_failing {
            state.failing_calls.insert(String::from(name));
        } else {
            state.failing_calls.remove(name);
        }
    }

    pub fn position(&self, axis: usize) -> f64 {
        self.state().positions.get(axis).copied().unwrap_or_default()
    }

    /// Get the logical value of the output port.
    pub fn io(&self, port: i16) -> Option<bool> {
        self.state().io.get(&port).copied()
    }

    /// Get the received calls.
    pub fn calls(&self) -> Vec<MotionCall> {
        self.state().calls.clone()
    }

    /// Get the received calls except the reads of the switches.
    pub fn command_calls(&self) -> Vec<MotionCall> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, MotionCall::ReadEl(_) | MotionCall::ReadOrg(_)))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Record the call and apply it to the state.
    fn handle(&self, call: MotionCall) -> Result<MockMotionReply, DeviceError> {
        if !self.is_online() {
            return Err(DeviceError::TransportFailure(String::from(
                "mock motion controller is offline",
            )));
        }

        let mut state = self.state();
        if state.failing_calls.contains(call.name()) {
            return Err(DeviceError::CommandFailed(format!("{} failed", call.name())));
        }

        state.calls.push(call.clone());

        let axis_index = |axis: i16| -> Result<usize, DeviceError> {
            let index = axis as usize;
            if axis < 0 || index >= MOCK_NUM_AXES {
                return Err(DeviceError::InvalidArgs(format!("axis {axis}")));
            }
            Ok(index)
        };

        let reply = match call {
            MotionCall::MoveAbsolute(axis, position) => {
                let index = axis_index(axis)?;
                state.positions[index] = position;
                state.org[index] = false;
                MockMotionReply::None
            }
            MotionCall::MoveRelative(axis, distance) => {
                let index = axis_index(axis)?;
                state.positions[index] += distance;
                state.org[index] = false;
                MockMotionReply::None
            }
            // Zero return stops at the origin switch.
            MotionCall::MoveZero(axis) => {
                let index = axis_index(axis)?;
                state.positions[index] = 0.0;
                state.org[index] = true;
                MockMotionReply::None
            }
            MotionCall::ReadEl(axis) => MockMotionReply::Short(state.el[axis_index(axis)?]),
            MotionCall::ReadOrg(axis) => MockMotionReply::Bool(state.org[axis_index(axis)?]),
            MotionCall::SetEncoderPosition(axis, position) => {
                state.positions[axis_index(axis)?] = position;
                MockMotionReply::None
            }
            MotionCall::WriteIo(port, value) => {
                state.io.insert(port, value);
                MockMotionReply::None
            }
            MotionCall::StopMove(axis)
            | MotionCall::Reset(axis)
            | MotionCall::SetStructParameter(axis, ..) => {
                axis_index(axis)?;
                MockMotionReply::None
            }
        };

        Ok(reply)
    }
}

impl Default for MockMotionController {
    fn default() -> Self {
        Self::new()
    }
}

enum MockMotionReply {
    None,
    Short(i16),
    Bool(bool),
}

/// Handle to the mock motion controller.
pub struct MockMotionHandle {
    _controller: Arc<MockMotionController>,
    _timeout_ms: AtomicU64,
}

impl MockMotionHandle {
    pub fn new(controller: &Arc<MockMotionController>) -> Self {
        Self {
            _controller: controller.clone(),
            _timeout_ms: AtomicU64::new(MOCK_DEFAULT_TIMEOUT_MS),
        }
    }

    fn command(&self, call: MotionCall) -> Result<(), DeviceError> {
        self._controller.handle(call).map(|_| ())
    }
}

impl MotionProxy for MockMotionHandle {
    fn ping(&self) -> Result<(), DeviceError> {
        if self._controller.is_online() {
            Ok(())
        } else {
            Err(DeviceError::TransportFailure(String::from(
                "mock motion controller is offline",
            )))
        }
    }

    fn timeout_ms(&self) -> u64 {
        self._timeout_ms.load(Ordering::Relaxed)
    }

    fn set_timeout_ms(&self, timeout_ms: u64) {
        self._timeout_ms.store(timeout_ms, Ordering::Relaxed);
    }

    fn move_absolute(&self, axis: i16, position: f64) -> Result<(), DeviceError> {
        self.command(MotionCall::MoveAbsolute(axis, position))
    }

    fn move_relative(&self, axis: i16, distance: f64) -> Result<(), DeviceError> {
        self.command(MotionCall::MoveRelative(axis, distance))
    }

    fn move_zero(&self, axis: i16) -> Result<(), DeviceError> {
        self.command(MotionCall::MoveZero(axis))
    }

    fn stop_move(&self, axis: i16) -> Result<(), DeviceError> {
        self.command(MotionCall::StopMove(axis))
    }

    fn reset(&self, axis: i16) -> Result<(), DeviceError> {
        self.command(MotionCall::Reset(axis))
    }

    fn read_el(&self, axis: i16) -> Result<i16, DeviceError> {
        match self._controller.handle(MotionCall::ReadEl(axis))? {
            MockMotionReply::Short(value) => Ok(value),
            _ => Err(DeviceError::CommandFailed(String::from("unexpected reply"))),
        }
    }

    fn read_org(&self, axis: i16) -> Result<bool, DeviceError> {
        match self._controller.handle(MotionCall::ReadOrg(axis))? {
            MockMotionReply::Bool(value) => Ok(value),
            _ => Err(DeviceError::CommandFailed(String::from("unexpected reply"))),
        }
    }

    fn set_struct_parameter(
        &self,
        axis: i16,
        step_angle: f64,
        gear_ratio: f64,
        subdivision: f64,
    ) -> Result<(), DeviceError> {
        self.command(MotionCall::SetStructParameter(
            axis,
            step_angle,
            gear_ratio,
            subdivision,
        ))
    }

    fn set_encoder_position(&self, axis: i16, position: f64) -> Result<(), DeviceError> {
        self.command(MotionCall::SetEncoderPosition(axis, position))
    }

    fn write_io(&self, port: i16, value: bool) -> Result<(), DeviceError> {
        self.command(MotionCall::WriteIo(port, value))
    }
}
