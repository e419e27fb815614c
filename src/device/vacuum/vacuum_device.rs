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

use log::{error, info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};
use strum::IntoEnumIterator;

use crate::constants::{
    MIN_PROXY_RECONNECT_INTERVAL_SEC, RECONNECT_DELAY_MS, SUPERVISOR_PERIOD_MS,
};
use crate::device::device::Device;
use crate::device::device_lock::DeviceLock;
use crate::device::self_check::SelfCheck;
use crate::device::vacuum::vacuum_config::VacuumConfig;
use crate::device::vacuum::vacuum_points::{
    self, NUM_ELECTROMAGNETIC_VALVES, NUM_GATE_VALVES, NUM_GAUGES, NUM_MOLECULAR_PUMPS,
    NUM_VENT_VALVES, NUM_WATER_VALVES,
};
use crate::enums::{BitEnum, DeviceState, SelfCheckState, SystemState, VacuumFault, VacuumMode};
use crate::error::{DeviceError, PlcError};
use crate::mock::mock_plc_transport::MockPlcTransport;
use crate::plc::plc_address::PlcAddress;
use crate::plc::plc_client::{PlcClient, PlcValue};
use crate::plc::plc_transport::PlcTransport;
use crate::supervisor::connection_supervisor::ConnectionSupervisor;
use crate::supervisor::plc_link::PlcLink;

// Commands that do not touch the PLC.
const LOCAL_COMMANDS: [&str; 8] = [
    "ping",
    "init",
    "reset",
    "selfCheck",
    "connectPLC",
    "disconnectPLC",
    "lockDevice",
    "unlockDevice",
];

// Commands that are refused in the MANUAL mode.
const AUTO_ONLY_COMMANDS: [&str; 2] = ["oneKeyVacuumStart", "ventStart"];

// Atmospheric pressure in mbar of the simulated gauges.
const SIM_ATMOSPHERIC_PRESSURE: f32 = 1013.25;

/// Data refreshed by the update cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VacuumData {
    pub screw_pump_powered: bool,
    pub roots_pump_powered: bool,
    pub molecular_pump_powered: [bool; NUM_MOLECULAR_PUMPS],
    pub manual_feedback: bool,
    pub auto_feedback: bool,
    pub remote_feedback: bool,
    pub gauge_pressures: [f32; NUM_GAUGES],
    // Bits of the active faults.
    pub fault_summary: u16,
    pub molecular_pump_start_stop_select: u16,
    pub gauge_criterion: u16,
    pub molecular_pump_criterion: u16,
}

impl VacuumData {
    /// Any pump is powered or not.
    pub fn is_any_pump_powered(&self) -> bool {
        self.screw_pump_powered
            || self.roots_pump_powered
            || self.molecular_pump_powered.iter().any(|powered| *powered)
    }

    /// Active faults.
    pub fn faults(&self) -> Vec<VacuumFault> {
        VacuumFault::iter()
            .filter(|fault| self.fault_summary & fault.bit_value() != 0)
            .collect()
    }
}

/// Mirrored state of the valves.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValveStates {
    pub gate_opened: [bool; NUM_GATE_VALVES],
    pub gate_closed: [bool; NUM_GATE_VALVES],
    pub electromagnetic: [bool; NUM_ELECTROMAGNETIC_VALVES],
    pub vent: [bool; NUM_VENT_VALVES],
    pub water: [bool; NUM_WATER_VALVES],
    pub air_main: bool,
}

/// Derive the system state.
///
/// # Arguments
/// * `data` - Latest data.
/// * `valves` - Mirrored valve states.
///
/// # Returns
/// System state.
pub fn derive_system_state(data: &VacuumData, valves: &ValveStates) -> SystemState {
    if data.fault_summary != 0 {
        SystemState::Fault
    } else if data.is_any_pump_powered() {
        SystemState::Pumping
    } else if valves.vent.iter().any(|opened| *opened) {
        SystemState::Venting
    } else {
        SystemState::Idle
    }
}

/// Create the in-memory PLC of the simulation. The plant feedback follows
/// the commanded bits.
pub fn create_simulated_plc() -> MockPlcTransport {
    let transport = MockPlcTransport::new();
    for (source, target, invert) in vacuum_points::simulated_feedbacks() {
        transport.add_feedback(source, target, invert);
    }

    transport.set_bit(&vacuum_points::AUTO_FEEDBACK, true);
    for idx in 1..=NUM_GAUGES {
        if let Some(address) = vacuum_points::gauge_pressure(idx) {
            transport.set_real(&address, SIM_ATMOSPHERIC_PRESSURE);
        }
    }
    for idx in 1..=NUM_GATE_VALVES {
        if let Some((_, closed)) = vacuum_points::gate_valve_position(idx) {
            transport.set_bit(&closed, true);
        }
    }

    transport
}

/// Read the value into the target. The target keeps the cached value if the
/// read fails.
fn refresh<T: PlcValue>(
    client: &PlcClient,
    address: &PlcAddress,
    target: &mut T,
    errors: &mut Vec<String>,
) {
    match client.read::<T>(address) {
        Ok(value) => *target = value,
        Err(error) => errors.push(format!("{address}: {error}")),
    }
}

/// Validate the one-based index.
fn check_index(name: &str, index: i64, count: usize) -> Result<usize, DeviceError> {
    if index < 1 || index > count as i64 {
        return Err(DeviceError::InvalidArgs(format!(
            "{name} index {index} should be in [1, {count}]"
        )));
    }

    Ok(index as usize)
}

/// Vacuum plant over the PLC I/O plane.
pub struct VacuumDevice {
    _name: String,
    _config: VacuumConfig,
    _client: Arc<PlcClient>,
    _link: Arc<PlcLink>,
    _supervisor: ConnectionSupervisor,
    _lock: DeviceLock,
    _self_check: SelfCheck,
    _is_simulation_mode: bool,
    _is_deleted: bool,
    _status: String,
    _was_healthy: bool,
    _mode: VacuumMode,
    _remote: bool,
    _screw_pump_speed: u16,
    _system_state: SystemState,
    _data: VacuumData,
    _valves: ValveStates,
    // Commanded gate valves whose pair write failed. Re-asserted after the
    // PLC link is restored.
    _gate_valve_pending: [Option<bool>; NUM_GATE_VALVES],
    // Gate valve positions are read in the next update cycle.
    _gate_valve_refresh: bool,
    // Gate valve positions are read in the next hook without waiting for
    // the update interval.
    _gate_valve_refresh_now: bool,
    _last_update: Option<Instant>,
    // Read failures of the last update cycle.
    _read_errors: Vec<String>,
    _last_write_log: String,
}

impl VacuumDevice {
    /// Create and initialize the vacuum device. The PLC is connected once,
    /// after which the connection supervisor keeps the link.
    ///
    /// # Arguments
    /// * `name` - Name of the device.
    /// * `config` - Properties.
    /// * `transport` - Transport to the PLC.
    /// * `is_simulation_mode` - Simulation mode or not.
    pub fn new(
        name: &str,
        config: &VacuumConfig,
        transport: Box<dyn PlcTransport>,
        is_simulation_mode: bool,
    ) -> Self {
        let client = Arc::new(PlcClient::with_policy(
            transport,
            Duration::from_millis(RECONNECT_DELAY_MS),
            Duration::from_millis(config.plc_reconnect_cooldown_ms),
        ));
        let link = Arc::new(PlcLink::new(
            name,
            &client,
            &config.plc_ip,
            config.plc_port,
            vacuum_points::REMOTE_FEEDBACK,
        ));

        if !link.connect() {
            warn!("{name}: PLC is not connected at the startup.");
        }

        let reconnect_interval = Duration::from_millis(
            config
                .plc_reconnect_interval_ms
                .max(MIN_PROXY_RECONNECT_INTERVAL_SEC * 1000),
        );
        let mut supervisor = ConnectionSupervisor::with_timing(
            link.clone(),
            Duration::from_millis(SUPERVISOR_PERIOD_MS),
            reconnect_interval,
        );
        supervisor.start();

        let was_healthy = link.is_healthy();

        info!("{name} is initialized (simulation: {is_simulation_mode}).");

        Self {
            _name: String::from(name),
            _config: config.clone(),
            _client: client,
            _link: link,
            _supervisor: supervisor,
            _lock: DeviceLock::new(),
            _self_check: SelfCheck::new(),
            _is_simulation_mode: is_simulation_mode,
            _is_deleted: false,
            _status: String::new(),
            _was_healthy: was_healthy,
            _mode: VacuumMode::Auto,
            _remote: false,
            _screw_pump_speed: 0,
            _system_state: SystemState::Idle,
            _data: VacuumData::default(),
            _valves: ValveStates::default(),
            _gate_valve_pending: [None; NUM_GATE_VALVES],
            _gate_valve_refresh: true,
            _gate_valve_refresh_now: false,
            _last_update: None,
            _read_errors: Vec::new(),
            _last_write_log: String::new(),
        }
    }

    pub fn system_state(&self) -> SystemState {
        self._system_state
    }

    pub fn mode(&self) -> VacuumMode {
        self._mode
    }

    pub fn data(&self) -> &VacuumData {
        &self._data
    }

    pub fn valves(&self) -> &ValveStates {
        &self._valves
    }

    pub fn last_write_log(&self) -> &str {
        &self._last_write_log
    }

    /// Log the outcome of a write and convert the error.
    fn record_write(&mut self, label: &str, result: Result<(), PlcError>) -> Result<(), DeviceError> {
        match result {
            Ok(()) => {
                info!("{}: {label} succeeded.", self._name);
                self._last_write_log = format!("{label}: OK");

                Ok(())
            }
            Err(error) => {
                error!("{}: {label} failed: {error}.", self._name);
                self._last_write_log = format!("{label}: FAILED ({error})");

                Err(error.into())
            }
        }
    }

    fn write_bit(&mut self, label: &str, address: PlcAddress, value: bool) -> Result<(), DeviceError> {
        let result = self._client.write_bool(&address, value);
        self.record_write(&format!("{label} <- {value} at {address}"), result)
    }

    fn write_word(&mut self, label: &str, address: PlcAddress, value: u16) -> Result<(), DeviceError> {
        let result = self._client.write_word(&address, value);
        self.record_write(&format!("{label} <- {value} at {address}"), result)
    }

    /// Pulse the command bit.
    fn pulse(&mut self, label: &str, address: PlcAddress) -> Result<(), DeviceError> {
        let pulse_width = Duration::from_millis(self._config.pulse_width_ms);
        let result = self._client.write_bool(&address, true).and_then(|_| {
            sleep(pulse_width);
            self._client.write_bool(&address, false)
        });

        self.record_write(&format!("{label} pulse at {address}"), result)
    }

    /// Run the self-check over the PLC link and the sensors.
    ///
    /// # Returns
    /// Final state of the self-check.
    ///
    /// # Errors
    /// SelfCheckFailed if the check fails.
    pub fn self_check(&mut self) -> Result<SelfCheckState, DeviceError> {
        self._self_check.begin();

        if !self._link.is_healthy() {
            self._self_check.fail("PLC is not connected");
        } else {
            match self
                ._client
                .read_bool(&vacuum_points::fault_address(VacuumFault::PhaseSequence))
            {
                Ok(true) => self._self_check.fail("phase sequence fault"),
                Ok(false) => {}
                Err(error) => self._self_check.fail(&format!("PLC read failed: {error}")),
            }

            for idx in 1..=NUM_GAUGES {
                let Some(address) = vacuum_points::gauge_pressure(idx) else {
                    continue;
                };
                match self._client.read_real(&address) {
                    Ok(pressure) if pressure.is_finite() && pressure >= 0.0 => {}
                    Ok(pressure) => self
                        ._self_check
                        .warn(&format!("gauge {idx} reads invalid pressure {pressure}")),
                    Err(error) => self._self_check.warn(&format!("gauge {idx}: {error}")),
                }
            }

            for fault in VacuumFault::iter().filter(|f| *f != VacuumFault::PhaseSequence) {
                match self._client.read_bool(&vacuum_points::fault_address(fault)) {
                    Ok(true) => self._self_check.warn(&format!("{} fault", fault.as_ref())),
                    Ok(false) => {}
                    Err(error) => self
                        ._self_check
                        .warn(&format!("{} fault bit: {error}", fault.as_ref())),
                }
            }

            for read_error in self._read_errors.clone() {
                self._self_check.warn(&format!("last update: {read_error}"));
            }
        }

        let state = self._self_check.finish();
        if state == SelfCheckState::Failed {
            return Err(DeviceError::SelfCheckFailed(self._self_check.reason()));
        }

        Ok(state)
    }

    /// Return to the idle state and clear the status.
    pub fn reset(&mut self) {
        self._system_state = SystemState::Idle;
        self._status.clear();
        self._self_check.reset();
        self._read_errors.clear();

        info!("{} is reset.", self._name);
    }

    pub fn switch_mode(&mut self, mode: VacuumMode) -> Result<(), DeviceError> {
        self.write_bit("mode", vacuum_points::MODE_SELECT, mode == VacuumMode::Manual)?;
        self._mode = mode;

        Ok(())
    }

    pub fn set_remote_control(&mut self, is_remote: bool) -> Result<(), DeviceError> {
        self.write_bit("remote control", vacuum_points::REMOTE_CONTROL, is_remote)?;
        self._remote = is_remote;

        Ok(())
    }

    pub fn one_key_vacuum_start(&mut self) -> Result<(), DeviceError> {
        self.pulse("one-key vacuum start", vacuum_points::ONE_KEY_VACUUM_START)
    }

    pub fn one_key_vacuum_stop(&mut self) -> Result<(), DeviceError> {
        self.pulse("one-key vacuum stop", vacuum_points::ONE_KEY_VACUUM_STOP)
    }

    pub fn vent_start(&mut self) -> Result<(), DeviceError> {
        self.pulse("vent start", vacuum_points::VENT_START)
    }

    pub fn vent_stop(&mut self) -> Result<(), DeviceError> {
        self.pulse("vent stop", vacuum_points::VENT_STOP)
    }

    pub fn alarm_reset(&mut self) -> Result<(), DeviceError> {
        self.pulse("alarm reset", vacuum_points::ALARM_RESET)
    }

    pub fn emergency_stop(&mut self) -> Result<(), DeviceError> {
        warn!("{}: emergency stop is requested.", self._name);
        self.pulse("emergency stop", vacuum_points::EMERGENCY_STOP)
    }

    pub fn set_screw_pump_power(&mut self, is_on: bool) -> Result<(), DeviceError> {
        self.write_bit("screw pump power", vacuum_points::SCREW_PUMP_POWER, is_on)
    }

    pub fn set_screw_pump_start_stop(&mut self, is_start: bool) -> Result<(), DeviceError> {
        self.write_bit("screw pump start", vacuum_points::SCREW_PUMP_START, is_start)
    }

    pub fn set_roots_pump_power(&mut self, is_on: bool) -> Result<(), DeviceError> {
        self.write_bit("roots pump power", vacuum_points::ROOTS_PUMP_POWER, is_on)
    }

    pub fn set_molecular_pump_power(&mut self, index: i64, is_on: bool) -> Result<(), DeviceError> {
        let idx = check_index("molecular pump", index, NUM_MOLECULAR_PUMPS)?;
        let address = vacuum_points::molecular_pump_power(idx)
            .ok_or_else(|| DeviceError::InvalidArgs(format!("molecular pump {idx}")))?;

        self.write_bit(&format!("molecular pump {idx} power"), address, is_on)
    }

    pub fn set_molecular_pump_start_stop(
        &mut self,
        index: i64,
        is_start: bool,
    ) -> Result<(), DeviceError> {
        let idx = check_index("molecular pump", index, NUM_MOLECULAR_PUMPS)?;
        let address = vacuum_points::molecular_pump_start(idx)
            .ok_or_else(|| DeviceError::InvalidArgs(format!("molecular pump {idx}")))?;

        self.write_bit(&format!("molecular pump {idx} start"), address, is_start)
    }

    /// Set the speed of the screw pump.
    ///
    /// # Arguments
    /// * `percent` - Speed in [0, 100] %.
    pub fn set_screw_pump_speed(&mut self, percent: f64) -> Result<(), DeviceError> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(DeviceError::InvalidArgs(format!(
                "screw pump speed {percent} should be in [0, 100]"
            )));
        }

        let value = percent.round() as u16;
        self.write_word("screw pump speed", vacuum_points::SCREW_PUMP_SPEED, value)?;
        self._screw_pump_speed = value;

        Ok(())
    }

    /// Write the open and close bits of the gate valve as a pair. The pair
    /// is retried once on the partial failure.
    fn write_gate_valve_pair(&mut self, idx: usize, is_open: bool) -> Result<(), DeviceError> {
        let (open, close) = vacuum_points::gate_valve_command(idx)
            .ok_or_else(|| DeviceError::InvalidArgs(format!("gate valve {idx}")))?;

        let mut result = Ok(());
        for attempt in 1..=2 {
            result = self
                ._client
                .write_bool(&open, is_open)
                .and_then(|_| self._client.write_bool(&close, !is_open));
            if result.is_ok() {
                break;
            }

            warn!(
                "{}: gate valve {idx} pair write failed in attempt {attempt}.",
                self._name
            );
        }

        let label = format!("gate valve {idx} {}", if is_open { "open" } else { "close" });
        self.record_write(&label, result)
    }

    /// Open or close the gate valve.
    ///
    /// # Arguments
    /// * `index` - Gate valve in [1, 5].
    /// * `operation` - 0 to close and 1 to open.
    pub fn set_gate_valve(&mut self, index: i64, operation: i64) -> Result<(), DeviceError> {
        let idx = check_index("gate valve", index, NUM_GATE_VALVES)?;
        let is_open = match operation {
            0 => false,
            1 => true,
            _ => {
                return Err(DeviceError::InvalidArgs(format!(
                    "gate valve operation {operation} should be 0 or 1"
                )))
            }
        };

        if let Err(error) = self.write_gate_valve_pair(idx, is_open) {
            self._gate_valve_pending[idx - 1] = Some(is_open);
            return Err(error);
        }

        self._gate_valve_pending[idx - 1] = None;
        if self._is_simulation_mode {
            self._valves.gate_opened[idx - 1] = is_open;
            self._valves.gate_closed[idx - 1] = !is_open;
        } else {
            self.request_gate_valve_refresh();
        }

        Ok(())
    }

    /// Re-assert the gate valves whose pair write failed.
    fn reassert_gate_valves(&mut self) {
        for idx in 1..=NUM_GATE_VALVES {
            if let Some(is_open) = self._gate_valve_pending[idx - 1] {
                info!("{}: re-assert the gate valve {idx}.", self._name);
                if self.write_gate_valve_pair(idx, is_open).is_ok() {
                    self._gate_valve_pending[idx - 1] = None;
                    self.request_gate_valve_refresh();
                }
            }
        }
    }

    pub fn set_electromagnetic_valve(&mut self, index: i64, is_open: bool) -> Result<(), DeviceError> {
        let idx = check_index("electromagnetic valve", index, NUM_ELECTROMAGNETIC_VALVES)?;
        let address = vacuum_points::electromagnetic_valve(idx)
            .ok_or_else(|| DeviceError::InvalidArgs(format!("electromagnetic valve {idx}")))?;

        self.write_bit(&format!("electromagnetic valve {idx}"), address, is_open)?;
        self._valves.electromagnetic[idx - 1] = is_open;

        Ok(())
    }

    pub fn set_vent_valve(&mut self, index: i64, is_open: bool) -> Result<(), DeviceError> {
        let idx = check_index("vent valve", index, NUM_VENT_VALVES)?;
        let address = vacuum_points::vent_valve(idx)
            .ok_or_else(|| DeviceError::InvalidArgs(format!("vent valve {idx}")))?;

        self.write_bit(&format!("vent valve {idx}"), address, is_open)?;
        self._valves.vent[idx - 1] = is_open;

        Ok(())
    }

    pub fn set_water_electromagnetic_valve(
        &mut self,
        index: i64,
        is_open: bool,
    ) -> Result<(), DeviceError> {
        let idx = check_index("water electromagnetic valve", index, NUM_WATER_VALVES)?;
        let address = vacuum_points::water_valve(idx)
            .ok_or_else(|| DeviceError::InvalidArgs(format!("water valve {idx}")))?;

        self.write_bit(&format!("water electromagnetic valve {idx}"), address, is_open)?;
        self._valves.water[idx - 1] = is_open;

        Ok(())
    }

    pub fn set_air_main_electromagnetic_valve(&mut self, is_open: bool) -> Result<(), DeviceError> {
        self.write_bit("air main valve", vacuum_points::AIR_MAIN_VALVE, is_open)?;
        self._valves.air_main = is_open;

        Ok(())
    }

    pub fn set_molecular_pump_start_stop_select(&mut self, value: u16) -> Result<(), DeviceError> {
        self.write_word(
            "molecular pump start/stop select",
            vacuum_points::MOLECULAR_PUMP_START_STOP_SELECT,
            value,
        )?;
        self._data.molecular_pump_start_stop_select = value;

        Ok(())
    }

    pub fn set_gauge_criterion(&mut self, value: u16) -> Result<(), DeviceError> {
        self.write_word("gauge criterion", vacuum_points::GAUGE_CRITERION, value)?;
        self._data.gauge_criterion = value;

        Ok(())
    }

    pub fn set_molecular_pump_criterion(&mut self, value: u16) -> Result<(), DeviceError> {
        self.write_word(
            "molecular pump criterion",
            vacuum_points::MOLECULAR_PUMP_CRITERION,
            value,
        )?;
        self._data.molecular_pump_criterion = value;

        Ok(())
    }

    /// Connect the PLC now.
    ///
    /// # Errors
    /// TransportFailure if the PLC can not be connected.
    pub fn connect_plc(&mut self) -> Result<(), DeviceError> {
        if !self._link.connect() {
            return Err(DeviceError::TransportFailure(format!(
                "failed to connect the PLC {}:{}",
                self._config.plc_ip, self._config.plc_port
            )));
        }

        self._gate_valve_refresh = true;
        self._last_update = None;

        Ok(())
    }

    /// Disconnect the PLC. The supervisor reconnects it later.
    pub fn disconnect_plc(&mut self) {
        self._link.disconnect();
    }

    /// Read the fresh data set and derive the system state.
    pub fn update_plc_data(&mut self) {
        let mut errors = Vec::new();
        let client = self._client.as_ref();
        let data = &mut self._data;

        refresh(client, &vacuum_points::SCREW_PUMP_POWERED, &mut data.screw_pump_powered, &mut errors);
        refresh(client, &vacuum_points::ROOTS_PUMP_POWERED, &mut data.roots_pump_powered, &mut errors);
        for idx in 1..=NUM_MOLECULAR_PUMPS {
            if let Some(address) = vacuum_points::molecular_pump_powered(idx) {
                refresh(client, &address, &mut data.molecular_pump_powered[idx - 1], &mut errors);
            }
        }

        refresh(client, &vacuum_points::MANUAL_FEEDBACK, &mut data.manual_feedback, &mut errors);
        refresh(client, &vacuum_points::AUTO_FEEDBACK, &mut data.auto_feedback, &mut errors);
        refresh(client, &vacuum_points::REMOTE_FEEDBACK, &mut data.remote_feedback, &mut errors);

        for idx in 1..=NUM_GAUGES {
            if let Some(address) = vacuum_points::gauge_pressure(idx) {
                refresh(client, &address, &mut data.gauge_pressures[idx - 1], &mut errors);
            }
        }

        for fault in VacuumFault::iter() {
            match client.read_bool(&vacuum_points::fault_address(fault)) {
                Ok(true) => data.fault_summary |= fault.bit_value(),
                Ok(false) => data.fault_summary &= !fault.bit_value(),
                Err(error) => errors.push(format!("{} fault: {error}", fault.as_ref())),
            }
        }

        refresh(
            client,
            &vacuum_points::MOLECULAR_PUMP_START_STOP_SELECT,
            &mut data.molecular_pump_start_stop_select,
            &mut errors,
        );
        refresh(client, &vacuum_points::GAUGE_CRITERION, &mut data.gauge_criterion, &mut errors);
        refresh(
            client,
            &vacuum_points::MOLECULAR_PUMP_CRITERION,
            &mut data.molecular_pump_criterion,
            &mut errors,
        );

        if data.manual_feedback {
            self._mode = VacuumMode::Manual;
        } else if data.auto_feedback {
            self._mode = VacuumMode::Auto;
        }
        self._remote = data.remote_feedback;

        if self._gate_valve_refresh {
            self.refresh_gate_valves(&mut errors);
        }

        if !errors.is_empty() {
            warn!(
                "{}: {} PLC read(s) failed in the update.",
                self._name,
                errors.len()
            );
        }
        self._read_errors = errors;

        self.update_system_state();
    }

    /// Read the gate valve positions in the next hook.
    fn request_gate_valve_refresh(&mut self) {
        self._gate_valve_refresh = true;
        self._gate_valve_refresh_now = true;
    }

    /// Read the gate valve positions. The failed ones are read again in the
    /// next regular update.
    fn refresh_gate_valves(&mut self, errors: &mut Vec<String>) {
        let number_of_errors = errors.len();
        for idx in 1..=NUM_GATE_VALVES {
            if let Some((opened, closed)) = vacuum_points::gate_valve_position(idx) {
                refresh(&self._client, &opened, &mut self._valves.gate_opened[idx - 1], errors);
                refresh(&self._client, &closed, &mut self._valves.gate_closed[idx - 1], errors);
            }
        }

        self._gate_valve_refresh = errors.len() > number_of_errors;
        self._gate_valve_refresh_now = false;
    }

    /// Derive the system state from the latest data.
    fn update_system_state(&mut self) {
        let system_state = derive_system_state(&self._data, &self._valves);
        if system_state != self._system_state {
            info!(
                "{}: system state {:?} -> {system_state:?}.",
                self._name, self._system_state
            );

            if system_state == SystemState::Fault {
                let faults = self._data.faults();
                error!("{}: faults {faults:?}.", self._name);
            }
        }

        self._system_state = system_state;
    }

    pub fn lock_device(&mut self, client_id: &str) -> Result<(), DeviceError> {
        self._lock.lock(client_id)
    }

    pub fn unlock_device(&mut self, client_id: &str) -> Result<(), DeviceError> {
        self._lock.unlock(client_id)
    }

    /// Read the screw pump speed feedback. The cached value is used if the
    /// link is down or the read fails.
    fn screw_pump_speed(&mut self) -> u16 {
        if self._link.is_healthy() {
            match self._client.read_word(&vacuum_points::SCREW_PUMP_SPEED_FEEDBACK) {
                Ok(speed) => self._screw_pump_speed = speed,
                Err(error) => warn!("{}: use the cached screw pump speed: {error}.", self._name),
            }
        }

        self._screw_pump_speed
    }

    /// Read the gate valve positions on demand.
    fn gate_valve_states(&mut self) -> Value {
        if self._link.is_healthy() && !self._is_simulation_mode {
            let mut errors = Vec::new();
            self.refresh_gate_valves(&mut errors);
            for read_error in errors {
                warn!("{}: use the cached gate valve: {read_error}.", self._name);
            }
        }

        json!({
            "opened": self._valves.gate_opened,
            "closed": self._valves.gate_closed,
        })
    }
}

impl Device for VacuumDevice {
    fn name(&self) -> &str {
        &self._name
    }

    fn state(&self) -> DeviceState {
        if self._is_deleted {
            DeviceState::Off
        } else if !self._link.is_healthy() {
            DeviceState::Alarm
        } else if self._system_state == SystemState::Fault {
            DeviceState::Fault
        } else {
            DeviceState::On
        }
    }

    fn status(&self) -> String {
        if !self._status.is_empty() {
            return self._status.clone();
        }

        format!(
            "PLC {}, system {}, mode {}",
            if self._link.is_healthy() { "connected" } else { "disconnected" },
            self._system_state.as_ref(),
            self._mode.as_ref()
        )
    }

    fn check_command(&self, command: &str, client_id: &str) -> Result<(), DeviceError> {
        if command == "ping" || command == "lockDevice" || command == "unlockDevice" {
            return Ok(());
        }

        self._lock.check(client_id)?;

        if LOCAL_COMMANDS.contains(&command) {
            return Ok(());
        }

        if !self._link.is_healthy() {
            return Err(DeviceError::NetworkUnhealthy);
        }

        if self._mode == VacuumMode::Manual && AUTO_ONLY_COMMANDS.contains(&command) {
            return Err(DeviceError::InvalidState {
                command: command.to_string(),
                state: self.state(),
            });
        }

        Ok(())
    }

    fn attribute_names(&self) -> Vec<&'static str> {
        vec![
            "state",
            "status",
            "system_state",
            "auto_state",
            "manual_state",
            "remote_state",
            "screw_pump_power",
            "roots_pump_power",
            "molecular_pump_power",
            "gauge_pressures",
            "water_cooling_faults",
            "faults",
            "fault_summary",
            "molecular_pump_start_stop_select",
            "gauge_criterion",
            "molecular_pump_criterion",
            "screw_pump_speed",
            "gate_valve_states",
            "valve_states",
            "self_check_state",
            "self_check_reason",
            "last_write_log",
            "plc_connected",
            "locker_id",
        ]
    }

    fn read_attribute(&mut self, name: &str) -> Result<Value, DeviceError> {
        let value = match name {
            "state" => json!(self.state()),
            "status" => json!(self.status()),
            "system_state" => json!(self._system_state),
            "auto_state" => json!(self._mode == VacuumMode::Auto),
            "manual_state" => json!(self._mode == VacuumMode::Manual),
            "remote_state" => json!(self._remote),
            "screw_pump_power" => json!(self._data.screw_pump_powered),
            "roots_pump_power" => json!(self._data.roots_pump_powered),
            "molecular_pump_power" => json!(self._data.molecular_pump_powered),
            "gauge_pressures" => json!(self._data.gauge_pressures),
            "water_cooling_faults" => json!([
                VacuumFault::WaterCooling1,
                VacuumFault::WaterCooling2,
                VacuumFault::WaterCooling3,
                VacuumFault::WaterCooling4,
            ]
            .iter()
            .map(|fault| self._data.fault_summary & fault.bit_value() != 0)
            .collect::<Vec<bool>>()),
            "faults" => json!(self
                ._data
                .faults()
                .iter()
                .map(|fault| fault.as_ref())
                .collect::<Vec<&str>>()),
            "fault_summary" => json!(self._data.fault_summary),
            "molecular_pump_start_stop_select" => {
                json!(self._data.molecular_pump_start_stop_select)
            }
            "gauge_criterion" => json!(self._data.gauge_criterion),
            "molecular_pump_criterion" => json!(self._data.molecular_pump_criterion),
            "screw_pump_speed" => json!(self.screw_pump_speed()),
            "gate_valve_states" => self.gate_valve_states(),
            "valve_states" => json!(self._valves),
            "self_check_state" => json!(self._self_check.state()),
            "self_check_reason" => json!(self._self_check.reason()),
            "last_write_log" => json!(self._last_write_log),
            "plc_connected" => json!(self._link.is_healthy()),
            "locker_id" => json!(self._lock.locker_id()),
            _ => return Err(DeviceError::InvalidArgs(format!("unknown attribute {name}"))),
        };

        Ok(value)
    }

    fn always_executed_hook(&mut self) {
        let is_healthy = self._link.is_healthy();
        if is_healthy != self._was_healthy {
            if is_healthy {
                info!("{}: PLC connection is restored.", self._name);
                self._status.clear();
                self._last_update = None;
            } else {
                error!("{}: PLC connection is lost.", self._name);
                self._status = String::from("PLC connection lost");
            }

            self._was_healthy = is_healthy;
        }

        if !is_healthy {
            return;
        }

        if self._link.take_reassert_pending() {
            self.reassert_gate_valves();
        }

        let now = Instant::now();
        let is_due = self._last_update.map_or(true, |last| {
            now.duration_since(last) >= Duration::from_millis(self._config.plc_update_interval_ms)
        });
        if is_due || self._gate_valve_refresh_now {
            self.update_plc_data();
            self._last_update = Some(now);
        }
    }

    fn delete_device(&mut self) {
        self._supervisor.stop();
        self._client.disconnect();
        self._is_deleted = true;

        info!("{} is deleted.", self._name);
    }
}
