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

use log::{debug, error, info, warn};
use nalgebra::Vector3;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strum::IntoEnumIterator;

use crate::constants::{
    MAX_LOG_HISTORY, MAX_RESTORE_RETRIES, NUM_MOTION_AXES, NUM_PLATFORM_AXES,
};
use crate::device::device::Device;
use crate::device::device_lock::DeviceLock;
use crate::device::reflection::camera::{capture_to_file, Camera};
use crate::device::reflection::platform::{interpret_limit_switch, PlatformState};
use crate::device::reflection::reflection_config::ReflectionConfig;
use crate::device::reflection::sim_interpolator::SimInterpolator;
use crate::device::self_check::SelfCheck;
use crate::device::state_matrix::StateMatrix;
use crate::enums::{AxisAction, AxisLetter, DeviceState, LimitState, Platform, SelfCheckState};
use crate::error::DeviceError;
use crate::event_log::{write_timestamped_json, EventLog};
use crate::motion::proxy::{EncoderProxy, MotionProxy, ProxyFactory};
use crate::motion::trajectory::{
    check_collision, check_soft_limit, check_z_distance, plan_synchronized_move,
};
use crate::supervisor::connection_supervisor::{ConnectionSupervisor, SupervisedLinks};
use crate::supervisor::proxy_links::ProxyLinks;

// Index of the Z axis in the platform vector.
const AXIS_Z: usize = 2;

// Simulated axis within this distance of zero is at the origin.
const SIM_ORIGIN_TOLERANCE: f64 = 1e-6;

// Commands that do not check the device lock.
const READ_ONLY_COMMANDS: [&str; 5] = [
    "ping",
    "selfCheck",
    "exportLogs",
    "exportAxisParameters",
    "exportEncoderResolution",
];

// Commands that call the motion controller besides the moves and stops.
const NETWORK_COMMANDS: [&str; 5] = [
    "synchronizedMove",
    "releaseBrake",
    "engageBrake",
    "enableDriverPower",
    "disableDriverPower",
];

const STATUS_NETWORK_LOST: &str = "Network connection lost";

/// Get the name of the single-axis command such as "upperZReset".
pub fn axis_command_name(platform: Platform, letter: AxisLetter, action: AxisAction) -> String {
    format!("{}{}{}", platform.prefix(), letter.as_ref(), action.as_ref())
}

/// Platform of the physical axis. The upper platform uses the even axes.
fn platform_of_axis(axis: usize) -> Platform {
    if axis % 2 == 0 {
        Platform::Upper
    } else {
        Platform::Lower
    }
}

/// The command calls the motion controller or not.
fn needs_network(command: &str) -> bool {
    ["MoveAbsolute", "MoveRelative", "MoveZero", "Stop"]
        .iter()
        .any(|suffix| command.ends_with(suffix))
        || NETWORK_COMMANDS.contains(&command)
}

/// Kind of the move sent to the motion controller.
#[derive(Debug, Clone, Copy, PartialEq)]
enum MoveKind {
    Absolute,
    Relative,
    Zero,
}

/// Send the move to the motion controller.
///
/// # Arguments
/// * `motion` - Motion controller.
/// * `kind` - Kind of the move.
/// * `axis` - Physical axis.
/// * `value` - Position of the absolute move or distance of the relative
/// move. The zero return does not use it.
fn dispatch_move(
    motion: &dyn MotionProxy,
    kind: MoveKind,
    axis: i16,
    value: f64,
) -> Result<(), DeviceError> {
    match kind {
        MoveKind::Absolute => motion.move_absolute(axis, value),
        MoveKind::Relative => motion.move_relative(axis, value),
        MoveKind::Zero => motion.move_zero(axis),
    }
}

/// Reclassify the error of a proxy call.
fn to_command_error(error: DeviceError) -> DeviceError {
    match error {
        DeviceError::TransportFailure(reason) => DeviceError::NoProxy(reason),
        DeviceError::NoProxy(_) | DeviceError::CommandFailed(_) => error,
        other => DeviceError::CommandFailed(other.to_string()),
    }
}

/// Declare the allowed states of the commands.
fn create_state_matrix() -> StateMatrix {
    let on = [DeviceState::On];
    let on_fault = [DeviceState::On, DeviceState::Fault];

    let mut matrix = StateMatrix::new();
    for platform in Platform::iter() {
        let prefix = platform.prefix();
        for action in ["MoveAbsolute", "MoveRelative", "MoveZero"] {
            matrix.allow(&format!("{prefix}Platform{action}"), &on);
        }
        matrix.allow(&format!("{prefix}PlatformStop"), &on_fault);

        for letter in AxisLetter::iter() {
            for action in AxisAction::iter() {
                let name = axis_command_name(platform, letter, action);
                match action {
                    AxisAction::MoveAbsolute | AxisAction::MoveRelative | AxisAction::MoveZero => {
                        matrix.allow(&name, &on);
                    }
                    AxisAction::Stop => {
                        matrix.allow(&name, &on_fault);
                    }
                    // Allowed in all states to clear the latch.
                    AxisAction::Reset => {}
                }
            }
        }
    }

    matrix
        .allow("synchronizedMove", &on)
        .allow("supportAxisMoveAbsolute", &on)
        .allow("supportAxisStop", &on_fault)
        .allow("releaseBrake", &on)
        .allow("enableDriverPower", &on)
        .allow("engageBrake", &on_fault)
        .allow("disableDriverPower", &on_fault);

    matrix
}

/// Dual-platform reflection-imaging device. The upper platform uses the even
/// axes and the lower platform uses the odd axes of one motion controller.
pub struct ReflectionDevice {
    _name: String,
    _config: ReflectionConfig,
    _links: Arc<ProxyLinks>,
    _supervisor: ConnectionSupervisor,
    _lock: DeviceLock,
    _self_check: SelfCheck,
    _state_matrix: StateMatrix,
    _is_simulation_mode: bool,
    _is_deleted: bool,
    _status: String,
    // The connection was healthy once.
    _has_connected: bool,
    _was_healthy: bool,
    // Restore gave up after the maximum retries.
    _restore_failed: bool,
    _upper: PlatformState,
    _lower: PlatformState,
    _support_position: f64,
    _interpolator: SimInterpolator,
    _limit_fault_latched: bool,
    _limit_fault_axis: i16,
    _limit_fault_direction: LimitState,
    // Origin switches of the physical axes.
    _origin: [bool; NUM_MOTION_AXES],
    _brake_released: bool,
    _driver_power_enabled: bool,
    _position_read_failed: bool,
    _event_log: EventLog,
    _cameras: Vec<Box<dyn Camera>>,
    _last_image: Option<PathBuf>,
}

impl ReflectionDevice {
    /// Create the device and start the connection supervisor. The handles
    /// are built by the supervisor and the restore runs in the hook.
    ///
    /// # Arguments
    /// * `name` - Name of the device.
    /// * `config` - Properties.
    /// * `factory` - Factory of the collaborator handles.
    /// * `cameras` - Cameras.
    /// * `is_simulation_mode` - Simulation mode or not.
    /// * `reconnect_interval_sec` - Minimum interval between the rebuild
    /// attempts of the supervisor.
    pub fn new(
        name: &str,
        config: &ReflectionConfig,
        factory: Arc<dyn ProxyFactory>,
        cameras: Vec<Box<dyn Camera>>,
        is_simulation_mode: bool,
        reconnect_interval_sec: u64,
    ) -> Self {
        let links = Arc::new(ProxyLinks::new(name, factory));

        let mut supervisor = ConnectionSupervisor::new(links.clone(), reconnect_interval_sec);
        supervisor.start();

        let mut device = Self {
            _name: String::from(name),
            _config: config.clone(),
            _links: links,
            _supervisor: supervisor,
            _lock: DeviceLock::new(),
            _self_check: SelfCheck::new(),
            _state_matrix: create_state_matrix(),
            _is_simulation_mode: is_simulation_mode,
            _is_deleted: false,
            _status: String::new(),
            _has_connected: false,
            _was_healthy: false,
            _restore_failed: false,
            _upper: PlatformState::default(),
            _lower: PlatformState::default(),
            _support_position: 0.0,
            _interpolator: SimInterpolator::new(),
            _limit_fault_latched: false,
            _limit_fault_axis: -1,
            _limit_fault_direction: LimitState::None,
            _origin: [false; NUM_MOTION_AXES],
            _brake_released: false,
            _driver_power_enabled: false,
            _position_read_failed: false,
            _event_log: EventLog::new(MAX_LOG_HISTORY),
            _cameras: cameras,
            _last_image: None,
        };

        if config.camera_auto_open {
            if let Err(error) = device.open_cameras() {
                warn!("{name}: {error}.");
            }
        }

        info!("{name} is initialized (simulation: {is_simulation_mode}).");

        device
    }

    pub fn platform_state(&self, platform: Platform) -> &PlatformState {
        match platform {
            Platform::Upper => &self._upper,
            Platform::Lower => &self._lower,
        }
    }

    fn platform_state_mut(&mut self, platform: Platform) -> &mut PlatformState {
        match platform {
            Platform::Upper => &mut self._upper,
            Platform::Lower => &mut self._lower,
        }
    }

    pub fn is_limit_fault_latched(&self) -> bool {
        self._limit_fault_latched
    }

    pub fn limit_fault_axis(&self) -> i16 {
        self._limit_fault_axis
    }

    pub fn is_brake_released(&self) -> bool {
        self._brake_released
    }

    pub fn is_driver_power_enabled(&self) -> bool {
        self._driver_power_enabled
    }

    pub fn latest_event(&self) -> &str {
        self._event_log.latest()
    }

    fn log_event(&mut self, message: &str) {
        info!("{}: {message}", self._name);
        self._event_log.add_event(message);
    }

    fn motion(&self, platform: Platform) -> Result<Arc<dyn MotionProxy>, DeviceError> {
        self._links
            .motion(platform)
            .ok_or_else(|| DeviceError::NoProxy(format!("{} platform", platform.prefix())))
    }

    fn encoder(&self) -> Result<Arc<dyn EncoderProxy>, DeviceError> {
        self._links
            .encoder()
            .ok_or_else(|| DeviceError::NoProxy(String::from("encoder")))
    }

    /// Write the logical value to the output port. The controller inverts it
    /// for the low-active wiring.
    fn write_io(&self, port: i16, value: bool) -> Result<(), DeviceError> {
        self.motion(Platform::Upper)?
            .write_io(port, value)
            .map_err(to_command_error)
    }

    fn has_brake(&self) -> bool {
        self._config.brake_power_port >= 0
    }

    pub fn release_brake(&mut self) -> Result<(), DeviceError> {
        if !self.has_brake() {
            return Err(DeviceError::CommandFailed(String::from(
                "brake is not configured",
            )));
        }

        self.write_io(self._config.brake_power_port, true)?;
        self._brake_released = true;
        self.log_event("Brake is released.");

        Ok(())
    }

    /// Engage the brake. The brake is regarded as engaged even if the write
    /// fails.
    pub fn engage_brake(&mut self) -> Result<(), DeviceError> {
        if !self.has_brake() {
            return Err(DeviceError::CommandFailed(String::from(
                "brake is not configured",
            )));
        }

        let result = self.write_io(self._config.brake_power_port, false);
        self._brake_released = false;

        match &result {
            Ok(()) => self.log_event("Brake is engaged."),
            Err(error) => warn!("{}: failed to engage the brake: {error}.", self._name),
        }

        result
    }

    /// Engage the brake if it is released.
    fn auto_engage_brake(&mut self, reason: &str) {
        if !self.has_brake() || !self._brake_released {
            return;
        }

        // Failure is logged by the engage_brake().
        let _ = self.engage_brake();
        self.log_event(&format!("Brake is engaged automatically: {reason}."));
    }

    /// Release the brake before the Z motion.
    ///
    /// # Errors
    /// CommandFailed if the brake is engaged and the auto-release is
    /// disabled.
    fn ensure_brake_released(&mut self) -> Result<(), DeviceError> {
        if !self.has_brake() || self._brake_released {
            return Ok(());
        }

        if !self._config.auto_release_brake {
            return Err(DeviceError::CommandFailed(String::from(
                "brake is engaged before the Z motion",
            )));
        }

        if let Err(error) = self.release_brake() {
            warn!(
                "{}: failed to release the brake before the Z motion: {error}. Proceed anyway.",
                self._name
            );
        }

        Ok(())
    }

    fn driver_power_port(&self) -> Result<i16, DeviceError> {
        if self._config.driver_power_port < 0 {
            return Err(DeviceError::CommandFailed(String::from(
                "driver power is not configured",
            )));
        }

        Ok(self._config.driver_power_port)
    }

    pub fn enable_driver_power(&mut self) -> Result<(), DeviceError> {
        let port = self.driver_power_port()?;

        self.write_io(port, true)?;
        self._driver_power_enabled = true;
        self.log_event("Driver power is enabled.");

        Ok(())
    }

    /// Disable the driver power. The brake is engaged first.
    pub fn disable_driver_power(&mut self) -> Result<(), DeviceError> {
        let port = self.driver_power_port()?;

        if self.has_brake() {
            // Failure is logged by the engage_brake().
            let _ = self.engage_brake();
        }

        self.write_io(port, false)?;
        self._driver_power_enabled = false;
        self.log_event("Driver power is disabled.");

        Ok(())
    }

    /// Check the trajectories from the reported positions to the ends.
    fn check_trajectory(
        &self,
        upper_end: &Vector3<f64>,
        lower_end: &Vector3<f64>,
    ) -> Result<(), DeviceError> {
        check_collision(
            &self._upper.reported(),
            upper_end,
            &self._lower.reported(),
            lower_end,
            self._config.min_platform_z_distance,
        )
    }

    /// Plan the motion from the reported to the commanded positions and
    /// start the interpolator in the simulation mode.
    ///
    /// # Returns
    /// Duration in second.
    fn start_motion(&mut self) -> Result<f64, DeviceError> {
        let upper_start = self._upper.reported();
        let upper_target = self._upper.commanded();
        let lower_start = self._lower.reported();
        let lower_target = self._lower.commanded();

        let plan = plan_synchronized_move(
            &upper_start,
            &upper_target,
            &lower_start,
            &lower_target,
            self._config.max_velocity,
        )?;

        if self._is_simulation_mode {
            self._interpolator.start(
                (upper_start, upper_target),
                (lower_start, lower_target),
                Duration::from_secs_f64(plan.duration),
                Instant::now(),
            );
        }

        Ok(plan.duration)
    }

    /// Hold the platform and let the other one continue.
    fn hold_platform(&mut self, platform: Platform) {
        self.platform_state_mut(platform).hold();
        if self._is_simulation_mode {
            let _ = self.start_motion();
        }
    }

    fn hold_axis(&mut self, platform: Platform, idx: usize) {
        self.platform_state_mut(platform).hold_axis(idx);
        if self._is_simulation_mode {
            let _ = self.start_motion();
        }
    }

    /// Stop the axes of the platform and ignore the failures.
    fn stop_platform_quietly(&mut self, platform: Platform) {
        if let Ok(motion) = self.motion(platform) {
            for idx in 0..NUM_PLATFORM_AXES {
                if let Err(error) = motion.stop_move(platform.physical_axis(idx)) {
                    error!(
                        "{}: failed to stop the axis {}: {error}.",
                        self._name,
                        platform.physical_axis(idx)
                    );
                }
            }
        }

        self.hold_platform(platform);
    }

    /// Move the platform.
    ///
    /// # Arguments
    /// * `platform` - Platform to move.
    /// * `kind` - Kind of the move.
    /// * `values` - Target position or distance of the X, Y, Z axes. Ignored
    /// by the zero return.
    ///
    /// # Returns
    /// Planned duration in second.
    ///
    /// # Errors
    /// LimitExceeded, CollisionRisk, or the failure of the motion
    /// controller. Nothing is dispatched if a check fails.
    fn move_platform(
        &mut self,
        platform: Platform,
        kind: MoveKind,
        values: &Vector3<f64>,
    ) -> Result<f64, DeviceError> {
        let target = match kind {
            MoveKind::Absolute => *values,
            MoveKind::Relative => self.platform_state(platform).reported() + values,
            MoveKind::Zero => Vector3::zeros(),
        };
        check_soft_limit(platform, &target, self._config.range(platform))?;

        let (upper_end, lower_end) = match platform {
            Platform::Upper => (target, self._lower.commanded()),
            Platform::Lower => (self._upper.commanded(), target),
        };
        self.check_trajectory(&upper_end, &lower_end)?;

        if target[AXIS_Z] != self.platform_state(platform).reported()[AXIS_Z] {
            self.ensure_brake_released()?;
        }

        if !self._is_simulation_mode {
            let motion = self.motion(platform)?;
            for idx in 0..NUM_PLATFORM_AXES {
                let axis = platform.physical_axis(idx);
                if let Err(error) = dispatch_move(motion.as_ref(), kind, axis, values[idx]) {
                    self.stop_platform_quietly(platform);
                    return Err(to_command_error(error));
                }
            }
        }

        self.platform_state_mut(platform).command(&target);
        let duration = self.start_motion()?;

        self.log_event(&format!(
            "{} platform moves to [{}, {}, {}] in {duration:.3} sec.",
            platform.as_ref(),
            target[0],
            target[1],
            target[2]
        ));

        Ok(duration)
    }

    /// Move the platform to the absolute position.
    pub fn move_platform_absolute(
        &mut self,
        platform: Platform,
        target: &Vector3<f64>,
    ) -> Result<f64, DeviceError> {
        self.move_platform(platform, MoveKind::Absolute, target)
    }

    /// Move the platform by the distance. The soft limits are checked on the
    /// reported position plus the distance.
    pub fn move_platform_relative(
        &mut self,
        platform: Platform,
        distance: &Vector3<f64>,
    ) -> Result<f64, DeviceError> {
        self.move_platform(platform, MoveKind::Relative, distance)
    }

    /// Return all axes of the platform to the origin.
    pub fn move_platform_zero(&mut self, platform: Platform) -> Result<f64, DeviceError> {
        self.move_platform(platform, MoveKind::Zero, &Vector3::zeros())
    }

    /// Stop the platform. The brake is not engaged.
    pub fn stop_platform(&mut self, platform: Platform) -> Result<(), DeviceError> {
        let motion = self.motion(platform)?;

        let mut result = Ok(());
        for idx in 0..NUM_PLATFORM_AXES {
            if let Err(error) = motion.stop_move(platform.physical_axis(idx)) {
                result = Err(to_command_error(error));
            }
        }

        self.hold_platform(platform);
        self.log_event(&format!("{} platform is stopped.", platform.as_ref()));

        result
    }

    /// Move both platforms so that all axes arrive at the same time.
    ///
    /// # Arguments
    /// * `upper_target` - Target of the upper platform.
    /// * `lower_target` - Target of the lower platform.
    ///
    /// # Returns
    /// Planned duration in second.
    ///
    /// # Errors
    /// LimitExceeded, CollisionRisk, or CommandFailed if the dispatch fails.
    /// Both platforms are stopped on a partial failure.
    pub fn synchronized_move(
        &mut self,
        upper_target: &Vector3<f64>,
        lower_target: &Vector3<f64>,
    ) -> Result<f64, DeviceError> {
        check_soft_limit(Platform::Upper, upper_target, &self._config.upper_platform_range)?;
        check_soft_limit(Platform::Lower, lower_target, &self._config.lower_platform_range)?;

        let min_distance = self._config.min_platform_z_distance;
        check_z_distance(upper_target[AXIS_Z], lower_target[AXIS_Z], min_distance)?;
        self.check_trajectory(upper_target, lower_target)?;

        let upper_start = self._upper.reported();
        let lower_start = self._lower.reported();
        let plan = plan_synchronized_move(
            &upper_start,
            upper_target,
            &lower_start,
            lower_target,
            self._config.max_velocity,
        )?;

        if (upper_target[AXIS_Z] != upper_start[AXIS_Z])
            || (lower_target[AXIS_Z] != lower_start[AXIS_Z])
        {
            self.ensure_brake_released()?;
        }

        if !self._is_simulation_mode {
            let upper = self.motion(Platform::Upper)?;
            let lower = self.motion(Platform::Lower)?;

            let result = [
                (Platform::Upper, &upper, upper_target),
                (Platform::Lower, &lower, lower_target),
            ]
            .iter()
            .try_for_each(|(platform, motion, target)| {
                (0..NUM_PLATFORM_AXES)
                    .try_for_each(|idx| motion.move_absolute(platform.physical_axis(idx), target[idx]))
            });

            if let Err(error) = result {
                self.stop_platform_quietly(Platform::Upper);
                self.stop_platform_quietly(Platform::Lower);

                return Err(DeviceError::CommandFailed(format!(
                    "synchronized move failed: {error}"
                )));
            }
        }

        self._upper.command(upper_target);
        self._lower.command(lower_target);

        if self._is_simulation_mode {
            self._interpolator.start(
                (upper_start, *upper_target),
                (lower_start, *lower_target),
                Duration::from_secs_f64(plan.duration),
                Instant::now(),
            );
        }

        self.log_event(&format!(
            "Synchronized move in {:.3} sec with the velocities {:?} and {:?}.",
            plan.duration,
            plan.upper_velocity.as_slice(),
            plan.lower_velocity.as_slice()
        ));

        Ok(plan.duration)
    }

    /// Move a single axis. The other axes keep their commanded positions.
    ///
    /// # Arguments
    /// * `platform` - Platform of the axis.
    /// * `letter` - Axis letter.
    /// * `kind` - Kind of the move.
    /// * `value` - Target position or distance. Ignored by the zero return.
    fn axis_move(
        &mut self,
        platform: Platform,
        letter: AxisLetter,
        kind: MoveKind,
        value: f64,
    ) -> Result<(), DeviceError> {
        let idx = letter as usize;

        let position = match kind {
            MoveKind::Absolute => value,
            MoveKind::Relative => self.platform_state(platform).reported()[idx] + value,
            MoveKind::Zero => 0.0,
        };

        let mut target = self.platform_state(platform).commanded();
        target[idx] = position;
        check_soft_limit(platform, &target, self._config.range(platform))?;

        if letter == AxisLetter::Z {
            let (upper_z, lower_z) = match platform {
                Platform::Upper => (position, self._lower.commanded()[AXIS_Z]),
                Platform::Lower => (self._upper.commanded()[AXIS_Z], position),
            };
            let min_distance = self._config.min_platform_z_distance;
            check_z_distance(
                self._upper.reported()[AXIS_Z],
                self._lower.reported()[AXIS_Z],
                min_distance,
            )?;
            check_z_distance(upper_z, lower_z, min_distance)?;

            if position != self.platform_state(platform).reported()[AXIS_Z] {
                self.ensure_brake_released()?;
            }
        }

        let axis = platform.physical_axis(idx);
        if !self._is_simulation_mode {
            let motion = self.motion(platform)?;
            dispatch_move(motion.as_ref(), kind, axis, value).map_err(to_command_error)?;
        }

        self.platform_state_mut(platform).command(&target);
        self.start_motion()?;

        self.log_event(&format!("Axis {axis} moves to {position}."));

        Ok(())
    }

    /// Move a single axis to the absolute position.
    pub fn axis_move_absolute(
        &mut self,
        platform: Platform,
        letter: AxisLetter,
        position: f64,
    ) -> Result<(), DeviceError> {
        self.axis_move(platform, letter, MoveKind::Absolute, position)
    }

    pub fn axis_move_relative(
        &mut self,
        platform: Platform,
        letter: AxisLetter,
        distance: f64,
    ) -> Result<(), DeviceError> {
        self.axis_move(platform, letter, MoveKind::Relative, distance)
    }

    /// Return the axis to the origin.
    pub fn axis_move_zero(&mut self, platform: Platform, letter: AxisLetter) -> Result<(), DeviceError> {
        self.axis_move(platform, letter, MoveKind::Zero, 0.0)
    }

    pub fn axis_stop(&mut self, platform: Platform, letter: AxisLetter) -> Result<(), DeviceError> {
        let idx = letter as usize;
        let axis = platform.physical_axis(idx);

        let result = self
            .motion(platform)?
            .stop_move(axis)
            .map_err(to_command_error);

        self.hold_axis(platform, idx);
        self.log_event(&format!("Axis {axis} is stopped."));

        result
    }

    /// Reset the axis and clear the limit latch. The device returns to ON
    /// from the FAULT.
    pub fn axis_reset(&mut self, platform: Platform, letter: AxisLetter) -> Result<(), DeviceError> {
        let axis = platform.physical_axis(letter as usize);

        if self._links.is_healthy() {
            if let Err(error) = self.motion(platform).and_then(|motion| motion.reset(axis)) {
                warn!("{}: failed to reset the axis {axis}: {error}.", self._name);
            }
        }

        self.clear_limit_fault();
        self.log_event(&format!("Axis {axis} is reset."));

        Ok(())
    }

    fn clear_limit_fault(&mut self) {
        if self._limit_fault_latched {
            info!(
                "{}: clear the limit latch of the axis {}.",
                self._name, self._limit_fault_axis
            );
        }

        self._limit_fault_latched = false;
        self._limit_fault_axis = -1;
        self._limit_fault_direction = LimitState::None;
        for platform in [&mut self._upper, &mut self._lower] {
            for axis in platform.axes.iter_mut() {
                axis.limit_state = LimitState::None;
            }
        }

        self._restore_failed = false;
        if self._status != STATUS_NETWORK_LOST || self._links.is_healthy() {
            self._status.clear();
        }
    }

    /// Reset the device.
    pub fn reset(&mut self) {
        if self._links.is_healthy() {
            for platform in Platform::iter() {
                if let Ok(motion) = self.motion(platform) {
                    for idx in 0..NUM_PLATFORM_AXES {
                        if let Err(error) = motion.reset(platform.physical_axis(idx)) {
                            warn!("{}: reset failed: {error}.", self._name);
                        }
                    }
                }
            }
        }

        // The hook retries the pending restore again.
        if self._links.is_restore_pending() {
            self._links.rearm_restore_retry();
        }

        self.clear_limit_fault();
        self._self_check.reset();
        self.log_event("Device is reset.");
    }

    /// Reset the device and re-assert the motor parameters, power and
    /// encoder positions. A pending restore is finished by this.
    ///
    /// # Errors
    /// NetworkUnhealthy if a handle is missing or the links are unhealthy
    /// without a pending restore. Otherwise the failure of the restore.
    pub fn init(&mut self) -> Result<(), DeviceError> {
        self.reset();

        if !self._links.all_present() {
            return Err(DeviceError::NetworkUnhealthy);
        }

        let is_pending = self._links.is_restore_pending();
        if !is_pending && !self._links.is_healthy() {
            return Err(DeviceError::NetworkUnhealthy);
        }

        self.perform_post_motion_reconnect_restore()?;

        if is_pending {
            self.finish_restore();
        }

        Ok(())
    }

    /// Move the support axis.
    pub fn support_axis_move_absolute(&mut self, position: f64) -> Result<(), DeviceError> {
        let axis = self.support_axis()?;

        if position.abs() > self._config.support_axis_range {
            return Err(DeviceError::LimitExceeded {
                axis: axis as usize,
                target: position,
                range: self._config.support_axis_range,
            });
        }

        if !self._is_simulation_mode {
            self.motion(Platform::Upper)?
                .move_absolute(axis, position)
                .map_err(to_command_error)?;
        }

        self._support_position = position;
        self.log_event(&format!("Support axis moves to {position}."));

        Ok(())
    }

    pub fn support_axis_stop(&mut self) -> Result<(), DeviceError> {
        let axis = self.support_axis()?;

        self.motion(Platform::Upper)?
            .stop_move(axis)
            .map_err(to_command_error)?;
        self.log_event("Support axis is stopped.");

        Ok(())
    }

    fn support_axis(&self) -> Result<i16, DeviceError> {
        if !self._config.has_support_axis() {
            return Err(DeviceError::CommandFailed(String::from(
                "support axis is not configured",
            )));
        }

        Ok(self._config.support_axis)
    }

    /// Re-assert the motor parameters, driver power, brake and encoder
    /// positions after the motion controller is reconnected.
    ///
    /// # Errors
    /// The first failure of the sequence.
    pub fn perform_post_motion_reconnect_restore(&mut self) -> Result<(), DeviceError> {
        let upper = self.motion(Platform::Upper)?;
        let lower = self.motion(Platform::Lower)?;
        let encoder = self.encoder()?;

        for axis in 0..NUM_MOTION_AXES {
            let motion = match platform_of_axis(axis) {
                Platform::Upper => &upper,
                Platform::Lower => &lower,
            };
            motion
                .set_struct_parameter(
                    axis as i16,
                    self._config.motor_step_angle,
                    self._config.motor_gear_ratio,
                    self._config.motor_subdivision,
                )
                .map_err(to_command_error)?;
        }

        if self._config.driver_power_port >= 0 {
            self.enable_driver_power()?;
        }
        if self.has_brake() {
            self.release_brake()?;
        }

        for axis in 0..NUM_MOTION_AXES {
            let platform = platform_of_axis(axis);
            let motion = match platform {
                Platform::Upper => &upper,
                Platform::Lower => &lower,
            };
            let channel = self._config.encoder_channel(axis as i16).ok_or_else(|| {
                DeviceError::CommandFailed(format!("no encoder channel for the axis {axis}"))
            })?;

            let position = encoder.read_encoder(channel).map_err(to_command_error)?;
            motion
                .set_encoder_position(axis as i16, position)
                .map_err(to_command_error)?;

            self.platform_state_mut(platform)
                .synchronize_axis(axis / 2, position);
        }

        self._interpolator.stop();
        self._position_read_failed = false;

        Ok(())
    }

    /// Run the restore in the hook if it is pending.
    fn restore_if_pending(&mut self) {
        if !self._links.is_restore_pending() || !self._links.all_present() {
            return;
        }

        if self._links.restore_retry_count() >= MAX_RESTORE_RETRIES {
            return;
        }

        match self.perform_post_motion_reconnect_restore() {
            Ok(()) => self.finish_restore(),
            Err(error) => {
                let count = self._links.increment_restore_retry();
                warn!(
                    "{}: restore attempt {count} of {MAX_RESTORE_RETRIES} failed: {error}.",
                    self._name
                );

                if count >= MAX_RESTORE_RETRIES {
                    self._restore_failed = true;
                    self._status = format!("Restore failed after {count} attempts: {error}");
                    error!("{}: {}.", self._name, self._status);
                }
            }
        }
    }

    /// Clear the pending restore and update the health.
    fn finish_restore(&mut self) {
        self._links.clear_restore_pending();
        self._links.update_health();
        self._restore_failed = false;
        self.log_event("Restore after the reconnection succeeds.");
    }

    /// Handle the transition of the connection health.
    fn on_health_change(&mut self, is_healthy: bool) {
        if is_healthy {
            self._has_connected = true;
            if self._status == STATUS_NETWORK_LOST {
                self._status.clear();
            }
            self.log_event("Network connection is healthy.");
        } else {
            self.auto_engage_brake("network connection lost");
            self._upper.hold();
            self._lower.hold();
            self._interpolator.stop();

            if self._has_connected {
                self._status = String::from(STATUS_NETWORK_LOST);
                error!("{}: {STATUS_NETWORK_LOST}.", self._name);
                self._event_log.add_event(STATUS_NETWORK_LOST);
            }
        }

        self._was_healthy = is_healthy;
    }

    /// Read the Z limit switches while the brake is released. A trigger
    /// latches the fault.
    fn check_limit_switches(&mut self) {
        if !self._brake_released || self._limit_fault_latched {
            return;
        }

        for platform in Platform::iter() {
            let Ok(motion) = self.motion(platform) else {
                continue;
            };

            let axis = platform.physical_axis(AXIS_Z);
            match motion.read_el(axis) {
                Ok(raw) => {
                    let limit_state = interpret_limit_switch(raw);
                    self.platform_state_mut(platform).axes[AXIS_Z].limit_state = limit_state;

                    if limit_state != LimitState::None {
                        self.latch_limit_fault(platform, limit_state);
                        return;
                    }
                }
                Err(error) => debug!("{}: failed to read the EL of axis {axis}: {error}.", self._name),
            }
        }
    }

    fn latch_limit_fault(&mut self, platform: Platform, direction: LimitState) {
        let axis = platform.physical_axis(AXIS_Z);

        self._limit_fault_latched = true;
        self._limit_fault_axis = axis;
        self._limit_fault_direction = direction;

        self.auto_engage_brake("limit switch triggered");

        if let Ok(motion) = self.motion(platform) {
            if let Err(error) = motion.stop_move(axis) {
                error!("{}: failed to stop the axis {axis}: {error}.", self._name);
            }
        }
        self.hold_axis(platform, AXIS_Z);

        self._status = format!("Limit switch triggered on axis {axis} ({direction:?})");
        error!("{}: {}.", self._name, self._status);
        self._event_log.add_event(&self._status.clone());
    }

    /// Read the origin switches of the platform. The simulated axis is at the
    /// origin when its position is zero. The last values are kept if the
    /// controller can not be read.
    ///
    /// # Returns
    /// Origin switches of the X, Y, Z axes.
    fn read_origin(&mut self, platform: Platform) -> Vec<bool> {
        let reported = self.platform_state(platform).reported();
        let motion = if self._is_simulation_mode || !self._links.is_healthy() {
            None
        } else {
            self.motion(platform).ok()
        };

        for idx in 0..NUM_PLATFORM_AXES {
            let axis = platform.physical_axis(idx);
            if self._is_simulation_mode {
                self._origin[axis as usize] = reported[idx].abs() < SIM_ORIGIN_TOLERANCE;
            } else if let Some(motion) = motion.as_ref() {
                match motion.read_org(axis) {
                    Ok(is_origin) => self._origin[axis as usize] = is_origin,
                    Err(error) => {
                        debug!("{}: failed to read the origin of axis {axis}: {error}.", self._name)
                    }
                }
            }
        }

        (0..NUM_PLATFORM_AXES)
            .map(|idx| self._origin[platform.physical_axis(idx) as usize])
            .collect()
    }

    /// Refresh the reported positions from the encoder. The cached positions
    /// are kept if the read fails.
    fn refresh_positions(&mut self) {
        let Ok(encoder) = self.encoder() else {
            return;
        };

        let mut is_failed = false;
        for axis in 0..NUM_MOTION_AXES {
            let Some(channel) = self._config.encoder_channel(axis as i16) else {
                continue;
            };

            match encoder.read_encoder(channel) {
                Ok(position) => {
                    self.platform_state_mut(platform_of_axis(axis)).axes[axis / 2]
                        .position_reported = position;
                }
                Err(error) => {
                    if !self._position_read_failed {
                        warn!(
                            "{}: use the cached position of the axis {axis}: {error}.",
                            self._name
                        );
                    }
                    is_failed = true;
                }
            }
        }
        self._position_read_failed = is_failed;

        self._upper.settle();
        self._lower.settle();
    }

    /// Advance the simulated motion.
    fn update_simulation(&mut self, now: Instant) {
        if let Some((upper, lower, _)) = self._interpolator.advance(now) {
            self._upper.report(&upper);
            self._lower.report(&lower);

            if !self._interpolator.is_active() {
                self._upper.settle();
                self._lower.settle();
            }
        }
    }

    /// Run the self-check over the collaborators and sensors.
    ///
    /// # Returns
    /// Final state of the self-check.
    ///
    /// # Errors
    /// SelfCheckFailed if the check fails.
    pub fn self_check(&mut self) -> Result<SelfCheckState, DeviceError> {
        self._self_check.begin();

        if !self._links.is_healthy() {
            self._self_check.fail("network connection is unhealthy");
        } else if let Ok(encoder) = self.encoder() {
            for axis in 0..NUM_MOTION_AXES as i16 {
                if let Some(channel) = self._config.encoder_channel(axis) {
                    if let Err(error) = encoder.read_encoder(channel) {
                        self._self_check
                            .fail(&format!("encoder channel {channel}: {error}"));
                    }
                }
            }
        }

        if self._limit_fault_latched {
            self._self_check.fail(&format!(
                "limit switch latched on axis {}",
                self._limit_fault_axis
            ));
        }

        if self._config.driver_power_port >= 0 && !self._driver_power_enabled {
            self._self_check.warn("driver power is disabled");
        }

        for camera in self._cameras.iter() {
            if !camera.is_open() {
                self._self_check.warn(&format!("{} is not open", camera.name()));
            }
        }

        match self._self_check.finish() {
            SelfCheckState::Failed => Err(DeviceError::SelfCheckFailed(self._self_check.reason())),
            state => Ok(state),
        }
    }

    /// Open all cameras.
    ///
    /// # Errors
    /// HardwareFault with the cameras that fail. The others are still
    /// opened.
    pub fn open_cameras(&mut self) -> Result<(), DeviceError> {
        let mut errors = Vec::new();
        for camera in self._cameras.iter_mut() {
            if camera.is_open() {
                continue;
            }

            if let Err(error) = camera.open() {
                errors.push(error.to_string());
            }
        }

        let number_of_open = self._cameras.iter().filter(|camera| camera.is_open()).count();
        self.log_event(&format!(
            "{number_of_open} of {} cameras are open.",
            self._cameras.len()
        ));

        if !errors.is_empty() {
            return Err(DeviceError::HardwareFault(errors.join("; ")));
        }

        Ok(())
    }

    pub fn close_cameras(&mut self) {
        for camera in self._cameras.iter_mut() {
            camera.close();
        }

        self.log_event("Cameras are closed.");
    }

    /// Capture the image of the camera.
    ///
    /// # Arguments
    /// * `index` - Index of the camera.
    ///
    /// # Returns
    /// Path of the saved image.
    pub fn capture_image(&mut self, index: i64) -> Result<PathBuf, DeviceError> {
        let camera = usize::try_from(index)
            .ok()
            .and_then(|idx| self._cameras.get_mut(idx))
            .ok_or_else(|| DeviceError::InvalidArgs(format!("camera index {index}")))?;

        let filepath = capture_to_file(
            camera.as_mut(),
            &self._config.image_save_path,
            &self._config.image_format,
        )?;

        self._last_image = Some(filepath.clone());
        self.log_event(&format!("Image is captured: {}.", filepath.display()));

        Ok(filepath)
    }

    /// Export the event history.
    pub fn export_logs(&self) -> Result<PathBuf, DeviceError> {
        self._event_log
            .export(&self._config.log_export_path, "reflection_logs")
            .map_err(|error| DeviceError::CommandFailed(format!("failed to export the logs: {error}")))
    }

    /// Export the motion parameters.
    pub fn export_axis_parameters(&self) -> Result<PathBuf, DeviceError> {
        let parameters = json!({
            "upper_platform_range": self._config.upper_platform_range.as_slice(),
            "lower_platform_range": self._config.lower_platform_range.as_slice(),
            "min_platform_z_distance": self._config.min_platform_z_distance,
            "max_velocity": self._config.max_velocity,
            "motor_step_angle": self._config.motor_step_angle,
            "motor_gear_ratio": self._config.motor_gear_ratio,
            "motor_subdivision": self._config.motor_subdivision,
            "driver_power_port": self._config.driver_power_port,
            "brake_power_port": self._config.brake_power_port,
            "support_axis": self._config.support_axis,
            "upper_platform_position": self._upper.reported().as_slice(),
            "lower_platform_position": self._lower.reported().as_slice(),
        });

        write_timestamped_json(&self._config.log_export_path, "axis_parameters", &parameters)
            .map_err(|error| {
                DeviceError::CommandFailed(format!("failed to export the axis parameters: {error}"))
            })
    }

    /// Export the encoder channels and resolutions of the axes.
    pub fn export_encoder_resolution(&self) -> Result<PathBuf, DeviceError> {
        let channels: Vec<Value> = (0..NUM_MOTION_AXES)
            .map(|axis| {
                json!({
                    "axis": axis,
                    "channel": self._config.encoder_channels.get(axis),
                    "resolution": self._config.encoder_resolution.get(axis),
                })
            })
            .collect();

        write_timestamped_json(
            &self._config.log_export_path,
            "encoder_resolution",
            &json!({ "channels": channels }),
        )
        .map_err(|error| {
            DeviceError::CommandFailed(format!("failed to export the encoder resolution: {error}"))
        })
    }

    pub fn lock_device(&mut self, client_id: &str) -> Result<(), DeviceError> {
        self._lock.lock(client_id)
    }

    pub fn unlock_device(&mut self, client_id: &str) -> Result<(), DeviceError> {
        self._lock.unlock(client_id)
    }
}

impl Device for ReflectionDevice {
    fn name(&self) -> &str {
        &self._name
    }

    fn state(&self) -> DeviceState {
        if self._is_deleted {
            DeviceState::Off
        } else if self._limit_fault_latched || self._restore_failed {
            DeviceState::Fault
        } else if !self._links.is_healthy() {
            if self._has_connected {
                DeviceState::Fault
            } else {
                DeviceState::Init
            }
        } else if self._upper.is_moving() || self._lower.is_moving() {
            DeviceState::Moving
        } else {
            DeviceState::On
        }
    }

    fn status(&self) -> String {
        if !self._status.is_empty() {
            return self._status.clone();
        }

        format!(
            "Device is {:?}, brake {}, driver power {}",
            self.state(),
            if self._brake_released { "released" } else { "engaged" },
            if self._driver_power_enabled { "on" } else { "off" }
        )
    }

    fn check_command(&self, command: &str, client_id: &str) -> Result<(), DeviceError> {
        if command == "lockDevice" || command == "unlockDevice" {
            return Ok(());
        }

        if !READ_ONLY_COMMANDS.contains(&command) {
            self._lock.check(client_id)?;
        }

        self._state_matrix.check(command, self.state())?;

        if needs_network(command) && !self._links.is_healthy() {
            return Err(DeviceError::NetworkUnhealthy);
        }

        Ok(())
    }

    fn attribute_names(&self) -> Vec<&'static str> {
        vec![
            "state",
            "status",
            "upper_platform_position",
            "lower_platform_position",
            "upper_platform_target",
            "lower_platform_target",
            "upper_platform_state",
            "lower_platform_state",
            "upper_platform_limit",
            "lower_platform_limit",
            "upper_platform_origin",
            "lower_platform_origin",
            "support_axis_position",
            "limit_fault_latched",
            "limit_fault_axis",
            "limit_fault_direction",
            "brake_released",
            "driver_power_enabled",
            "connection_healthy",
            "motion_restore_pending",
            "restore_retry_count",
            "reflection_logs",
            "camera_states",
            "last_image_path",
            "self_check_state",
            "self_check_reason",
            "locker_id",
        ]
    }

    fn read_attribute(&mut self, name: &str) -> Result<Value, DeviceError> {
        let limit = |platform: &PlatformState| -> Vec<i8> {
            platform.axes.iter().map(|axis| axis.limit_state as i8).collect()
        };

        let value = match name {
            "state" => json!(self.state()),
            "status" => json!(self.status()),
            "upper_platform_position" => json!(self._upper.reported().as_slice()),
            "lower_platform_position" => json!(self._lower.reported().as_slice()),
            "upper_platform_target" => json!(self._upper.commanded().as_slice()),
            "lower_platform_target" => json!(self._lower.commanded().as_slice()),
            "upper_platform_state" => json!(self._upper.in_motion()),
            "lower_platform_state" => json!(self._lower.in_motion()),
            "upper_platform_limit" => json!(limit(&self._upper)),
            "lower_platform_limit" => json!(limit(&self._lower)),
            "upper_platform_origin" => json!(self.read_origin(Platform::Upper)),
            "lower_platform_origin" => json!(self.read_origin(Platform::Lower)),
            "support_axis_position" => json!(self._support_position),
            "limit_fault_latched" => json!(self._limit_fault_latched),
            "limit_fault_axis" => json!(self._limit_fault_axis),
            "limit_fault_direction" => json!(self._limit_fault_direction as i8),
            "brake_released" => json!(self._brake_released),
            "driver_power_enabled" => json!(self._driver_power_enabled),
            "connection_healthy" => json!(self._links.is_healthy()),
            "motion_restore_pending" => json!(self._links.is_restore_pending()),
            "restore_retry_count" => json!(self._links.restore_retry_count()),
            "reflection_logs" => json!(self._event_log.latest()),
            "camera_states" => json!(self
                ._cameras
                .iter()
                .map(|camera| camera.is_open())
                .collect::<Vec<bool>>()),
            "last_image_path" => json!(self._last_image.as_ref().map(|path| path.display().to_string())),
            "self_check_state" => json!(self._self_check.state()),
            "self_check_reason" => json!(self._self_check.reason()),
            "locker_id" => json!(self._lock.locker_id()),
            _ => return Err(DeviceError::InvalidArgs(format!("unknown attribute {name}"))),
        };

        Ok(value)
    }

    fn always_executed_hook(&mut self) {
        if self._is_deleted {
            return;
        }

        self.restore_if_pending();

        let is_healthy = self._links.is_healthy();
        if is_healthy != self._was_healthy {
            self.on_health_change(is_healthy);
        }

        if is_healthy {
            self.check_limit_switches();

            if !self._is_simulation_mode {
                self.refresh_positions();
            }
        }

        if self._is_simulation_mode {
            self.update_simulation(Instant::now());
        }
    }

    fn delete_device(&mut self) {
        self._supervisor.stop();

        self.auto_engage_brake("device teardown");
        self.close_cameras();
        self._links.release_all();
        self._interpolator.stop();

        self._is_deleted = true;

        info!("{} is deleted.", self._name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use tempfile::tempdir;

    use crate::mock::mock_camera::MockCamera;
    use crate::mock::mock_motion_controller::MotionCall;
    use crate::mock::mock_proxy_factory::MockProxyFactory;

    fn create_device_with_mode(
        config: ReflectionConfig,
        is_simulation_mode: bool,
    ) -> (ReflectionDevice, Arc<MockProxyFactory>) {
        let factory = Arc::new(MockProxyFactory::new());
        let cameras: Vec<Box<dyn Camera>> = vec![
            Box::new(MockCamera::new("camera0")),
            Box::new(MockCamera::failing("camera1")),
        ];

        let mut device = ReflectionDevice::new(
            "reflection",
            &config,
            factory.clone(),
            cameras,
            is_simulation_mode,
            1,
        );

        // The tests drive the links by hand.
        device._supervisor.stop();

        connect(&mut device);

        (device, factory)
    }

    fn create_device(config: ReflectionConfig) -> (ReflectionDevice, Arc<MockProxyFactory>) {
        create_device_with_mode(config, true)
    }

    fn connect(device: &mut ReflectionDevice) {
        device._links.ping_links();
        device._links.rebuild_links();
        device._links.update_health();

        device.always_executed_hook();
    }

    fn finish_simulation(device: &mut ReflectionDevice) {
        device.update_simulation(Instant::now() + Duration::from_secs(3600));
    }

    fn call_names(factory: &MockProxyFactory) -> Vec<&'static str> {
        factory
            .controller
            .command_calls()
            .iter()
            .map(|call| call.name())
            .collect()
    }

    #[test]
    fn test_axis_command_name() {
        assert_eq!(
            axis_command_name(Platform::Upper, AxisLetter::Z, AxisAction::Reset),
            "upperZReset"
        );
        assert_eq!(
            axis_command_name(Platform::Lower, AxisLetter::X, AxisAction::MoveAbsolute),
            "lowerXMoveAbsolute"
        );
    }

    #[test]
    fn test_needs_network() {
        assert!(needs_network("upperPlatformMoveAbsolute"));
        assert!(needs_network("lowerYStop"));
        assert!(needs_network("supportAxisStop"));
        assert!(needs_network("disableDriverPower"));

        assert!(!needs_network("upperZReset"));
        assert!(!needs_network("exportLogs"));
    }

    #[test]
    fn test_new_and_restore() {
        let factory = Arc::new(MockProxyFactory::new());
        factory.encoder.set_value(3, 12.5);

        let mut device = ReflectionDevice::new(
            "reflection",
            &ReflectionConfig::default(),
            factory.clone(),
            Vec::new(),
            true,
            1,
        );
        device._supervisor.stop();

        connect(&mut device);

        assert_eq!(device.state(), DeviceState::On);
        assert!(!device._links.is_restore_pending());
        assert!(device.is_brake_released());
        assert!(device.is_driver_power_enabled());

        let calls = factory.controller.command_calls();

        assert_eq!(calls.len(), 14);
        for (axis, call) in calls[0..6].iter().enumerate() {
            assert_eq!(
                *call,
                MotionCall::SetStructParameter(axis as i16, 1.8, 1.0, 12800.0)
            );
        }
        assert_eq!(calls[6], MotionCall::WriteIo(1, true));
        assert_eq!(calls[7], MotionCall::WriteIo(2, true));
        for (axis, call) in calls[8..14].iter().enumerate() {
            assert_eq!(call.name(), "setEncoderPosition");
            if let MotionCall::SetEncoderPosition(call_axis, _) = call {
                assert_eq!(*call_axis, axis as i16);
            }
        }
        assert_eq!(calls[11], MotionCall::SetEncoderPosition(3, 12.5));
        assert_eq!(device.platform_state(Platform::Lower).reported()[1], 12.5);
    }

    #[test]
    fn test_init_state_before_connection() {
        let factory = Arc::new(MockProxyFactory::new());
        factory.controller.set_online(false);

        let mut device = ReflectionDevice::new(
            "reflection",
            &ReflectionConfig::default(),
            factory.clone(),
            Vec::new(),
            true,
            1,
        );
        device._supervisor.stop();

        connect(&mut device);

        assert_eq!(device.state(), DeviceState::Init);
        assert_eq!(
            device.check_command("upperPlatformMoveAbsolute", ""),
            Err(DeviceError::InvalidState {
                command: String::from("upperPlatformMoveAbsolute"),
                state: DeviceState::Init,
            })
        );
        assert_eq!(
            device.check_command("engageBrake", ""),
            Err(DeviceError::InvalidState {
                command: String::from("engageBrake"),
                state: DeviceState::Init,
            })
        );
        assert!(device.check_command("reset", "").is_ok());
    }

    #[test]
    fn test_soft_limit() {
        let (mut device, factory) = create_device(ReflectionConfig::default());
        factory.controller.clear_calls();

        let result = device.move_platform_absolute(Platform::Upper, &Vector3::new(1001.0, 0.0, 0.0));

        assert_eq!(
            result,
            Err(DeviceError::LimitExceeded {
                axis: 0,
                target: 1001.0,
                range: 1000.0,
            })
        );
        assert!(factory.controller.command_calls().is_empty());
        assert_eq!(
            device.read_attribute("upper_platform_state").unwrap(),
            json!([false, false, false])
        );

        // The projected position of the relative move is checked.
        device
            .move_platform_absolute(Platform::Lower, &Vector3::new(0.0, 0.0, 400.0))
            .unwrap();
        finish_simulation(&mut device);

        assert!(matches!(
            device.move_platform_relative(Platform::Lower, &Vector3::new(0.0, 0.0, 101.0)),
            Err(DeviceError::LimitExceeded { axis: 5, .. })
        ));
    }

    #[test]
    fn test_collision() {
        let config = ReflectionConfig {
            min_platform_z_distance: 50.0,
            ..Default::default()
        };
        let (mut device, _) = create_device(config);

        device._upper.synchronize_axis(AXIS_Z, 100.0);
        device._lower.synchronize_axis(AXIS_Z, 40.0);

        assert!(matches!(
            device.move_platform_absolute(Platform::Upper, &Vector3::new(0.0, 0.0, 80.0)),
            Err(DeviceError::CollisionRisk(_))
        ));
        assert!(matches!(
            device.axis_move_absolute(Platform::Lower, AxisLetter::Z, 60.0),
            Err(DeviceError::CollisionRisk(_))
        ));
        assert!(!device._upper.is_moving());
        assert!(device
            .move_platform_absolute(Platform::Upper, &Vector3::new(0.0, 0.0, 120.0))
            .is_ok());

        // The check is disabled by the zero distance.
        device._config.min_platform_z_distance = 0.0;

        assert!(device
            .axis_move_absolute(Platform::Lower, AxisLetter::Z, 60.0)
            .is_ok());
    }

    #[test]
    fn test_synchronized_move() {
        let (mut device, factory) = create_device(ReflectionConfig::default());
        factory.controller.clear_calls();

        let upper_target = Vector3::new(10.0, 20.0, 30.0);
        let lower_target = Vector3::new(5.0, -5.0, -10.0);

        let duration = device
            .synchronized_move(&upper_target, &lower_target)
            .unwrap();

        assert_relative_eq!(duration, 0.3);
        assert_eq!(device.state(), DeviceState::Moving);

        // Nothing is dispatched in the simulation mode.
        assert!(call_names(&factory).iter().all(|name| *name != "moveAbsolute"));

        finish_simulation(&mut device);

        let upper_error = (device._upper.reported() - upper_target).amax();
        let lower_error = (device._lower.reported() - lower_target).amax();

        assert!(upper_error.max(lower_error) < 1e-6);
        assert_eq!(device.state(), DeviceState::On);
    }

    #[test]
    fn test_synchronized_move_progress() {
        let (mut device, _) = create_device(ReflectionConfig::default());

        let now = Instant::now();
        device
            .synchronized_move(&Vector3::new(100.0, 0.0, 0.0), &Vector3::new(0.0, 50.0, 0.0))
            .unwrap();
        device.update_simulation(now + Duration::from_millis(500));

        assert_relative_eq!(device._upper.reported()[0], 50.0, epsilon = 0.5);
        assert_relative_eq!(device._lower.reported()[1], 25.0, epsilon = 0.25);
        assert_eq!(device._upper.in_motion(), [true, false, false]);
    }

    #[test]
    fn test_synchronized_move_real_mode() {
        let (mut device, factory) =
            create_device_with_mode(ReflectionConfig::default(), false);
        factory.controller.clear_calls();

        device
            .synchronized_move(&Vector3::new(1.0, 2.0, 3.0), &Vector3::new(4.0, 5.0, 6.0))
            .unwrap();

        assert_eq!(
            factory.controller.command_calls(),
            vec![
                MotionCall::MoveAbsolute(0, 1.0),
                MotionCall::MoveAbsolute(2, 2.0),
                MotionCall::MoveAbsolute(4, 3.0),
                MotionCall::MoveAbsolute(1, 4.0),
                MotionCall::MoveAbsolute(3, 5.0),
                MotionCall::MoveAbsolute(5, 6.0),
            ]
        );

        // Reported positions come from the encoder.
        factory.encoder.set_value(0, 1.0);
        device.always_executed_hook();

        assert_eq!(device._upper.in_motion(), [false, true, true]);
    }

    #[test]
    fn test_synchronized_move_partial_failure() {
        let (mut device, factory) =
            create_device_with_mode(ReflectionConfig::default(), false);
        factory.controller.clear_calls();
        factory.controller.set_failing("moveAbsolute", true);

        let result = device.synchronized_move(&Vector3::new(1.0, 0.0, 0.0), &Vector3::zeros());

        assert!(matches!(result, Err(DeviceError::CommandFailed(_))));

        let stops: Vec<MotionCall> = factory
            .controller
            .command_calls()
            .into_iter()
            .filter(|call| call.name() == "stopMove")
            .collect();

        assert_eq!(stops.len(), 6);
        assert!(!device._upper.is_moving());
        assert!(!device._lower.is_moving());
    }

    #[test]
    fn test_limit_latch() {
        let (mut device, factory) = create_device(ReflectionConfig::default());

        device
            .axis_move_absolute(Platform::Upper, AxisLetter::Z, 10.0)
            .unwrap();
        assert!(device.is_brake_released());

        factory.controller.set_el(4, 0);
        factory.controller.clear_calls();

        device.always_executed_hook();

        assert!(device.is_limit_fault_latched());
        assert_eq!(device.limit_fault_axis(), 4);
        assert_eq!(device.state(), DeviceState::Fault);
        assert!(!device.is_brake_released());

        let calls = factory.controller.command_calls();

        assert!(calls.contains(&MotionCall::StopMove(4)));
        assert!(calls.contains(&MotionCall::WriteIo(2, false)));
        assert_eq!(
            device.read_attribute("upper_platform_limit").unwrap(),
            json!([0, 0, 1])
        );

        assert!(matches!(
            device.check_command("upperPlatformMoveAbsolute", ""),
            Err(DeviceError::InvalidState { .. })
        ));
        assert!(matches!(
            device.check_command("synchronizedMove", ""),
            Err(DeviceError::InvalidState { .. })
        ));
        assert!(device.check_command("upperPlatformStop", "").is_ok());
        assert!(device.check_command("upperZReset", "").is_ok());

        device.axis_reset(Platform::Upper, AxisLetter::Z).unwrap();

        assert!(!device.is_limit_fault_latched());
        assert_eq!(device.limit_fault_axis(), -1);
        assert_eq!(device.state(), DeviceState::On);
    }

    #[test]
    fn test_limit_latch_both_modes() {
        for is_simulation_mode in [true, false] {
            let (mut device, factory) =
                create_device_with_mode(ReflectionConfig::default(), is_simulation_mode);

            assert!(device.is_brake_released());

            factory.controller.set_el(5, 0);
            device.always_executed_hook();

            assert!(device.is_limit_fault_latched(), "{is_simulation_mode}");
            assert_eq!(device.limit_fault_axis(), 5);
            assert!(factory.controller.calls().contains(&MotionCall::ReadEl(5)));
        }
    }

    #[test]
    fn test_limit_switch_not_read_with_brake() {
        let (mut device, factory) = create_device(ReflectionConfig::default());

        device.engage_brake().unwrap();
        factory.controller.set_el(5, 0);
        factory.controller.clear_calls();

        device.always_executed_hook();

        assert!(!device.is_limit_fault_latched());
        assert!(factory.controller.calls().is_empty());
    }

    #[test]
    fn test_brake_and_driver_power() {
        let (mut device, factory) = create_device(ReflectionConfig::default());

        device.disable_driver_power().unwrap();

        assert!(!device.is_brake_released());
        assert!(!device.is_driver_power_enabled());
        assert_eq!(factory.controller.io(2), Some(false));
        assert_eq!(factory.controller.io(1), Some(false));

        // Disable again from the engaged brake.
        device.disable_driver_power().unwrap();

        assert!(!device.is_brake_released());

        // Z motion releases the brake.
        device.enable_driver_power().unwrap();
        device
            .move_platform_absolute(Platform::Lower, &Vector3::new(0.0, 0.0, 5.0))
            .unwrap();

        assert!(device.is_brake_released());
        assert_eq!(factory.controller.io(2), Some(true));

        // Normal stop keeps the brake released.
        device.stop_platform(Platform::Lower).unwrap();

        assert!(device.is_brake_released());
    }

    #[test]
    fn test_brake_without_auto_release() {
        let config = ReflectionConfig {
            auto_release_brake: false,
            ..Default::default()
        };
        let (mut device, _) = create_device(config);

        device.engage_brake().unwrap();

        assert!(matches!(
            device.axis_move_relative(Platform::Upper, AxisLetter::Z, 1.0),
            Err(DeviceError::CommandFailed(_))
        ));
        assert!(device
            .axis_move_relative(Platform::Upper, AxisLetter::X, 1.0)
            .is_ok());
    }

    #[test]
    fn test_brake_not_configured() {
        let config = ReflectionConfig {
            brake_power_port: -1,
            driver_power_port: -1,
            ..Default::default()
        };
        let (mut device, factory) = create_device(config);

        assert!(factory.controller.io(2).is_none());
        assert!(matches!(
            device.release_brake(),
            Err(DeviceError::CommandFailed(_))
        ));
        assert!(matches!(
            device.enable_driver_power(),
            Err(DeviceError::CommandFailed(_))
        ));
        assert!(device
            .move_platform_absolute(Platform::Upper, &Vector3::new(0.0, 0.0, 10.0))
            .is_ok());
    }

    #[test]
    fn test_network_lost_and_restore() {
        let (mut device, factory) = create_device(ReflectionConfig::default());

        device
            .move_platform_absolute(Platform::Upper, &Vector3::new(10.0, 0.0, 0.0))
            .unwrap();

        factory.controller.set_online(false);
        device._links.ping_links();
        device._links.update_health();
        device.always_executed_hook();

        assert_eq!(device.state(), DeviceState::Fault);
        assert_eq!(device.status(), STATUS_NETWORK_LOST);
        assert!(!device.is_brake_released());
        assert!(!device._upper.is_moving());

        // Request path fails fast without any call.
        factory.controller.clear_calls();

        assert!(matches!(
            device.check_command("upperPlatformMoveAbsolute", ""),
            Err(DeviceError::InvalidState { .. })
        ));
        assert_eq!(
            device.check_command("upperPlatformStop", ""),
            Err(DeviceError::NetworkUnhealthy)
        );
        assert_eq!(
            device.check_command("disableDriverPower", ""),
            Err(DeviceError::NetworkUnhealthy)
        );
        assert_eq!(
            device.read_attribute("connection_healthy").unwrap(),
            json!(false)
        );
        device.axis_reset(Platform::Upper, AxisLetter::X).unwrap();

        assert!(factory.controller.calls().is_empty());

        // Back online.
        factory.controller.set_online(true);
        device._links.rebuild_links();
        device._links.update_health();

        assert!(device._links.is_restore_pending());
        assert!(!device._links.is_healthy());

        device.always_executed_hook();

        assert!(!device._links.is_restore_pending());
        assert!(device._links.is_healthy());
        assert_eq!(device.state(), DeviceState::On);
        assert!(device.is_brake_released());
        assert_eq!(
            call_names(&factory),
            [
                vec!["setStructParameter"; 6],
                vec!["writeIO"; 2],
                vec!["setEncoderPosition"; 6]
            ]
            .concat()
        );
    }

    fn exhaust_restore_retries(device: &mut ReflectionDevice, factory: &MockProxyFactory) {
        factory.controller.set_online(false);
        device._links.ping_links();
        device._links.update_health();
        device.always_executed_hook();

        factory.controller.set_online(true);
        factory.controller.set_failing("setStructParameter", true);
        device._links.rebuild_links();
        device._links.update_health();

        for _ in 0..(MAX_RESTORE_RETRIES + 2) {
            device.always_executed_hook();
        }
    }

    fn run_supervision_cycles(device: &mut ReflectionDevice, cycles: usize) {
        for _ in 0..cycles {
            device._links.ping_links();
            if device._links.has_missing_links() {
                device._links.rebuild_links();
            }
            device._links.update_health();

            device.always_executed_hook();
        }
    }

    #[test]
    fn test_restore_retry() {
        let (mut device, factory) = create_device(ReflectionConfig::default());

        exhaust_restore_retries(&mut device, &factory);

        assert_eq!(device._links.restore_retry_count(), MAX_RESTORE_RETRIES);
        assert_eq!(device.state(), DeviceState::Fault);
        assert!(device.status().starts_with("Restore failed after 3 attempts"));

        // No more attempts after the maximum.
        factory.controller.clear_calls();
        run_supervision_cycles(&mut device, 5);

        assert!(factory.controller.command_calls().is_empty());
        assert_eq!(device.state(), DeviceState::Fault);

        // Recover by the init.
        factory.controller.set_failing("setStructParameter", false);

        device.init().unwrap();

        assert!(!device._links.is_restore_pending());
        assert_eq!(device._links.restore_retry_count(), 0);
        assert!(device._links.is_healthy());
        assert_eq!(device.state(), DeviceState::On);

        run_supervision_cycles(&mut device, 5);

        assert_eq!(device.state(), DeviceState::On);
        assert_eq!(
            device.read_attribute("connection_healthy").unwrap(),
            json!(true)
        );
        assert!(!device.status().starts_with("Restore failed"));
    }

    #[test]
    fn test_restore_retry_after_reset() {
        let (mut device, factory) = create_device(ReflectionConfig::default());

        exhaust_restore_retries(&mut device, &factory);
        factory.controller.set_failing("setStructParameter", false);

        // The reset lets the hook retry the restore.
        device.reset();

        assert_eq!(device._links.restore_retry_count(), 0);
        assert!(device._links.is_restore_pending());

        run_supervision_cycles(&mut device, 5);

        assert!(!device._links.is_restore_pending());
        assert_eq!(device.state(), DeviceState::On);
        assert!(device.is_brake_released());
    }

    #[test]
    fn test_init_without_handles() {
        let (mut device, factory) = create_device(ReflectionConfig::default());

        factory.controller.set_online(false);
        device._links.ping_links();
        device._links.update_health();

        assert_eq!(device.init(), Err(DeviceError::NetworkUnhealthy));
    }

    #[test]
    fn test_axis_commands() {
        let (mut device, factory) = create_device(ReflectionConfig::default());

        device
            .axis_move_relative(Platform::Lower, AxisLetter::Y, 5.0)
            .unwrap();

        assert_eq!(device._lower.in_motion(), [false, true, false]);

        finish_simulation(&mut device);

        assert_eq!(device._lower.reported(), Vector3::new(0.0, 5.0, 0.0));

        device
            .axis_move_absolute(Platform::Lower, AxisLetter::Y, 1500.0)
            .unwrap_err();
        device.axis_move_zero(Platform::Lower, AxisLetter::Y).unwrap();
        finish_simulation(&mut device);

        assert_eq!(device._lower.reported(), Vector3::zeros());

        device
            .axis_move_absolute(Platform::Upper, AxisLetter::X, 100.0)
            .unwrap();
        factory.controller.clear_calls();
        device.axis_stop(Platform::Upper, AxisLetter::X).unwrap();

        assert_eq!(factory.controller.command_calls(), vec![MotionCall::StopMove(0)]);
        assert!(!device._upper.is_moving());
    }

    #[test]
    fn test_axis_moves_real_mode() {
        let (mut device, factory) =
            create_device_with_mode(ReflectionConfig::default(), false);
        factory.controller.clear_calls();

        device.axis_move_zero(Platform::Upper, AxisLetter::X).unwrap();
        device
            .axis_move_relative(Platform::Upper, AxisLetter::Y, 5.0)
            .unwrap();

        assert_eq!(
            factory.controller.command_calls(),
            vec![MotionCall::MoveZero(0), MotionCall::MoveRelative(2, 5.0)]
        );
        assert_eq!(device._upper.commanded(), Vector3::new(0.0, 5.0, 0.0));

        // The projected position is checked before the dispatch.
        factory.controller.clear_calls();

        assert!(matches!(
            device.axis_move_relative(Platform::Upper, AxisLetter::X, 1001.0),
            Err(DeviceError::LimitExceeded { axis: 0, .. })
        ));
        assert!(factory.controller.command_calls().is_empty());
    }

    #[test]
    fn test_platform_moves_real_mode() {
        let (mut device, factory) =
            create_device_with_mode(ReflectionConfig::default(), false);
        factory.controller.clear_calls();

        device.move_platform_zero(Platform::Lower).unwrap();
        device
            .move_platform_relative(Platform::Lower, &Vector3::new(1.0, 2.0, 3.0))
            .unwrap();

        assert_eq!(
            factory.controller.command_calls(),
            vec![
                MotionCall::MoveZero(1),
                MotionCall::MoveZero(3),
                MotionCall::MoveZero(5),
                MotionCall::MoveRelative(1, 1.0),
                MotionCall::MoveRelative(3, 2.0),
                MotionCall::MoveRelative(5, 3.0),
            ]
        );
        assert_eq!(device._lower.commanded(), Vector3::new(1.0, 2.0, 3.0));

        factory.controller.set_failing("moveRelative", true);
        factory.controller.clear_calls();

        assert!(device
            .move_platform_relative(Platform::Lower, &Vector3::new(1.0, 0.0, 0.0))
            .is_err());
        assert_eq!(call_names(&factory), vec!["stopMove"; 3]);
    }

    #[test]
    fn test_origin() {
        let (mut device, factory) =
            create_device_with_mode(ReflectionConfig::default(), false);

        device
            .axis_move_absolute(Platform::Upper, AxisLetter::X, 10.0)
            .unwrap();
        device.axis_move_zero(Platform::Upper, AxisLetter::X).unwrap();
        factory.controller.set_org(4, true);

        assert_eq!(
            device.read_attribute("upper_platform_origin").unwrap(),
            json!([true, false, true])
        );

        // The last values are kept without the connection.
        factory.controller.set_online(false);
        device._links.ping_links();
        device._links.update_health();

        assert_eq!(
            device.read_attribute("upper_platform_origin").unwrap(),
            json!([true, false, true])
        );
    }

    #[test]
    fn test_origin_simulation() {
        let (mut device, _) = create_device(ReflectionConfig::default());

        assert_eq!(
            device.read_attribute("lower_platform_origin").unwrap(),
            json!([true, true, true])
        );

        device
            .move_platform_absolute(Platform::Lower, &Vector3::new(0.0, 5.0, 0.0))
            .unwrap();
        finish_simulation(&mut device);

        assert_eq!(
            device.read_attribute("lower_platform_origin").unwrap(),
            json!([true, false, true])
        );
    }

    #[test]
    fn test_move_platform_zero() {
        let (mut device, _) = create_device(ReflectionConfig::default());

        device
            .move_platform_absolute(Platform::Upper, &Vector3::new(1.0, 2.0, 3.0))
            .unwrap();
        finish_simulation(&mut device);
        device.move_platform_zero(Platform::Upper).unwrap();
        finish_simulation(&mut device);

        assert_eq!(device._upper.reported(), Vector3::zeros());
    }

    #[test]
    fn test_support_axis() {
        let (mut device, _) = create_device(ReflectionConfig::default());

        assert!(matches!(
            device.support_axis_move_absolute(1.0),
            Err(DeviceError::CommandFailed(_))
        ));

        let config = ReflectionConfig {
            support_axis: 6,
            support_axis_range: 100.0,
            ..Default::default()
        };
        let (mut device, factory) = create_device_with_mode(config, false);

        assert!(matches!(
            device.support_axis_move_absolute(150.0),
            Err(DeviceError::LimitExceeded { axis: 6, .. })
        ));

        device.support_axis_move_absolute(50.0).unwrap();
        device.support_axis_stop().unwrap();

        assert_eq!(factory.controller.position(6), 50.0);
        assert_eq!(
            device.read_attribute("support_axis_position").unwrap(),
            json!(50.0)
        );
    }

    #[test]
    fn test_cameras() {
        let dir = tempdir().unwrap();
        let config = ReflectionConfig {
            image_save_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let (mut device, _) = create_device(config);

        assert!(matches!(
            device.open_cameras(),
            Err(DeviceError::HardwareFault(_))
        ));
        assert_eq!(
            device.read_attribute("camera_states").unwrap(),
            json!([true, false])
        );

        let filepath = device.capture_image(0).unwrap();

        assert!(filepath.exists());
        assert!(matches!(
            device.capture_image(1),
            Err(DeviceError::HardwareFault(_))
        ));
        assert!(matches!(
            device.capture_image(5),
            Err(DeviceError::InvalidArgs(_))
        ));

        device.close_cameras();

        assert_eq!(
            device.read_attribute("camera_states").unwrap(),
            json!([false, false])
        );
    }

    #[test]
    fn test_exports() {
        let dir = tempdir().unwrap();
        let config = ReflectionConfig {
            log_export_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let (device, _) = create_device(config);

        assert_eq!(
            device.latest_event(),
            "Network connection is healthy."
        );

        for (filepath, prefix) in [
            (device.export_logs().unwrap(), "reflection_logs_"),
            (device.export_axis_parameters().unwrap(), "axis_parameters_"),
            (device.export_encoder_resolution().unwrap(), "encoder_resolution_"),
        ] {
            assert!(filepath.exists());
            assert!(filepath
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(prefix));
        }
    }

    #[test]
    fn test_self_check() {
        let (mut device, factory) = create_device(ReflectionConfig::default());

        assert_eq!(device.self_check(), Ok(SelfCheckState::Warning));
        assert_eq!(device.read_attribute("self_check_reason").unwrap(), json!("camera0 is not open; camera1 is not open"));

        factory.encoder.set_online(false);
        device._links.ping_links();
        device._links.update_health();

        assert!(matches!(
            device.self_check(),
            Err(DeviceError::SelfCheckFailed(_))
        ));
        assert_eq!(device._self_check.state(), SelfCheckState::Failed);
    }

    #[test]
    fn test_lock() {
        let (mut device, _) = create_device(ReflectionConfig::default());

        device.lock_device("a").unwrap();

        assert!(matches!(
            device.check_command("upperPlatformStop", "b"),
            Err(DeviceError::DeviceLocked(_))
        ));
        assert!(device.check_command("upperPlatformStop", "a").is_ok());
        assert!(device.check_command("ping", "b").is_ok());
        assert!(device.check_command("exportLogs", "b").is_ok());

        device.unlock_device("a").unwrap();

        assert!(device.check_command("upperPlatformStop", "b").is_ok());
    }

    #[test]
    fn test_delete_device() {
        let (mut device, factory) = create_device(ReflectionConfig::default());

        assert!(device.is_brake_released());

        device.delete_device();

        assert_eq!(device.state(), DeviceState::Off);
        assert!(!device.is_brake_released());
        assert_eq!(factory.controller.io(2), Some(false));
        assert!(device._links.encoder().is_none());
    }
}
