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

//! Point table of the vacuum plant. Commands are written to DB1, the plant
//! feedback is read from the inputs and the gauge readings from DB2.

use crate::enums::{PlcArea, VacuumFault};
use crate::plc::plc_address::PlcAddress;

const DB_COMMAND: u16 = 1;
const DB_GAUGE: u16 = 2;

pub const NUM_MOLECULAR_PUMPS: usize = 3;
pub const NUM_GATE_VALVES: usize = 5;
pub const NUM_ELECTROMAGNETIC_VALVES: usize = 5;
pub const NUM_VENT_VALVES: usize = 2;
pub const NUM_WATER_VALVES: usize = 4;
pub const NUM_GAUGES: usize = 3;

// Commands

/// 1 selects MANUAL and 0 selects AUTO.
pub const MODE_SELECT: PlcAddress = PlcAddress::db_bit(DB_COMMAND, 0, 0);
pub const REMOTE_CONTROL: PlcAddress = PlcAddress::db_bit(DB_COMMAND, 0, 1);
pub const ONE_KEY_VACUUM_START: PlcAddress = PlcAddress::db_bit(DB_COMMAND, 0, 2);
pub const ONE_KEY_VACUUM_STOP: PlcAddress = PlcAddress::db_bit(DB_COMMAND, 0, 3);
pub const VENT_START: PlcAddress = PlcAddress::db_bit(DB_COMMAND, 0, 4);
pub const VENT_STOP: PlcAddress = PlcAddress::db_bit(DB_COMMAND, 0, 5);
pub const ALARM_RESET: PlcAddress = PlcAddress::db_bit(DB_COMMAND, 0, 6);
pub const EMERGENCY_STOP: PlcAddress = PlcAddress::db_bit(DB_COMMAND, 0, 7);

pub const SCREW_PUMP_POWER: PlcAddress = PlcAddress::db_bit(DB_COMMAND, 1, 0);
pub const SCREW_PUMP_START: PlcAddress = PlcAddress::db_bit(DB_COMMAND, 1, 1);
pub const ROOTS_PUMP_POWER: PlcAddress = PlcAddress::db_bit(DB_COMMAND, 1, 2);

const MOLECULAR_PUMP_POWER: [PlcAddress; NUM_MOLECULAR_PUMPS] = [
    PlcAddress::db_bit(DB_COMMAND, 1, 3),
    PlcAddress::db_bit(DB_COMMAND, 1, 4),
    PlcAddress::db_bit(DB_COMMAND, 1, 5),
];
const MOLECULAR_PUMP_START: [PlcAddress; NUM_MOLECULAR_PUMPS] = [
    PlcAddress::db_bit(DB_COMMAND, 1, 6),
    PlcAddress::db_bit(DB_COMMAND, 1, 7),
    PlcAddress::db_bit(DB_COMMAND, 2, 0),
];

const GATE_VALVE_OPEN: [PlcAddress; NUM_GATE_VALVES] = [
    PlcAddress::db_bit(DB_COMMAND, 3, 0),
    PlcAddress::db_bit(DB_COMMAND, 3, 1),
    PlcAddress::db_bit(DB_COMMAND, 3, 2),
    PlcAddress::db_bit(DB_COMMAND, 3, 3),
    PlcAddress::db_bit(DB_COMMAND, 3, 4),
];
const GATE_VALVE_CLOSE: [PlcAddress; NUM_GATE_VALVES] = [
    PlcAddress::db_bit(DB_COMMAND, 4, 0),
    PlcAddress::db_bit(DB_COMMAND, 4, 1),
    PlcAddress::db_bit(DB_COMMAND, 4, 2),
    PlcAddress::db_bit(DB_COMMAND, 4, 3),
    PlcAddress::db_bit(DB_COMMAND, 4, 4),
];

const ELECTROMAGNETIC_VALVE: [PlcAddress; NUM_ELECTROMAGNETIC_VALVES] = [
    PlcAddress::db_bit(DB_COMMAND, 5, 0),
    PlcAddress::db_bit(DB_COMMAND, 5, 1),
    PlcAddress::db_bit(DB_COMMAND, 5, 2),
    PlcAddress::db_bit(DB_COMMAND, 5, 3),
    PlcAddress::db_bit(DB_COMMAND, 5, 4),
];
const VENT_VALVE: [PlcAddress; NUM_VENT_VALVES] = [
    PlcAddress::db_bit(DB_COMMAND, 6, 0),
    PlcAddress::db_bit(DB_COMMAND, 6, 1),
];
const WATER_VALVE: [PlcAddress; NUM_WATER_VALVES] = [
    PlcAddress::db_bit(DB_COMMAND, 6, 2),
    PlcAddress::db_bit(DB_COMMAND, 6, 3),
    PlcAddress::db_bit(DB_COMMAND, 6, 4),
    PlcAddress::db_bit(DB_COMMAND, 6, 5),
];
pub const AIR_MAIN_VALVE: PlcAddress = PlcAddress::db_bit(DB_COMMAND, 6, 6);

pub const SCREW_PUMP_SPEED: PlcAddress = PlcAddress::db_value(DB_COMMAND, 10, 2);
pub const MOLECULAR_PUMP_START_STOP_SELECT: PlcAddress = PlcAddress::db_value(DB_COMMAND, 12, 2);
pub const GAUGE_CRITERION: PlcAddress = PlcAddress::db_value(DB_COMMAND, 14, 2);
pub const MOLECULAR_PUMP_CRITERION: PlcAddress = PlcAddress::db_value(DB_COMMAND, 16, 2);

// Feedback

pub const SCREW_PUMP_POWERED: PlcAddress = PlcAddress::bit(PlcArea::Input, 0, 0);
pub const ROOTS_PUMP_POWERED: PlcAddress = PlcAddress::bit(PlcArea::Input, 0, 1);
const MOLECULAR_PUMP_POWERED: [PlcAddress; NUM_MOLECULAR_PUMPS] = [
    PlcAddress::bit(PlcArea::Input, 0, 2),
    PlcAddress::bit(PlcArea::Input, 0, 3),
    PlcAddress::bit(PlcArea::Input, 0, 4),
];
pub const MANUAL_FEEDBACK: PlcAddress = PlcAddress::bit(PlcArea::Input, 0, 5);
pub const AUTO_FEEDBACK: PlcAddress = PlcAddress::bit(PlcArea::Input, 0, 6);
pub const REMOTE_FEEDBACK: PlcAddress = PlcAddress::bit(PlcArea::Input, 0, 7);

const GATE_VALVE_OPENED: [PlcAddress; NUM_GATE_VALVES] = [
    PlcAddress::bit(PlcArea::Input, 1, 0),
    PlcAddress::bit(PlcArea::Input, 1, 1),
    PlcAddress::bit(PlcArea::Input, 1, 2),
    PlcAddress::bit(PlcArea::Input, 1, 3),
    PlcAddress::bit(PlcArea::Input, 1, 4),
];
const GATE_VALVE_CLOSED: [PlcAddress; NUM_GATE_VALVES] = [
    PlcAddress::bit(PlcArea::Input, 2, 0),
    PlcAddress::bit(PlcArea::Input, 2, 1),
    PlcAddress::bit(PlcArea::Input, 2, 2),
    PlcAddress::bit(PlcArea::Input, 2, 3),
    PlcAddress::bit(PlcArea::Input, 2, 4),
];

pub const EMERGENCY_STOP_ACTIVE: PlcAddress = PlcAddress::bit(PlcArea::Input, 6, 1);

const GAUGE_PRESSURE: [PlcAddress; NUM_GAUGES] = [
    PlcAddress::db_value(DB_GAUGE, 0, 4),
    PlcAddress::db_value(DB_GAUGE, 4, 4),
    PlcAddress::db_value(DB_GAUGE, 8, 4),
];

pub const SCREW_PUMP_SPEED_FEEDBACK: PlcAddress = PlcAddress::value(PlcArea::InputWord, 130, 2);

/// Get the address of the indexed point.
///
/// # Arguments
/// * `table` - Point table.
/// * `index` - One-based index.
///
/// # Returns
/// Address. None if the index is out of range.
fn indexed(table: &[PlcAddress], index: usize) -> Option<PlcAddress> {
    index.checked_sub(1).and_then(|idx| table.get(idx)).copied()
}

pub fn molecular_pump_power(index: usize) -> Option<PlcAddress> {
    indexed(&MOLECULAR_PUMP_POWER, index)
}

pub fn molecular_pump_start(index: usize) -> Option<PlcAddress> {
    indexed(&MOLECULAR_PUMP_START, index)
}

pub fn molecular_pump_powered(index: usize) -> Option<PlcAddress> {
    indexed(&MOLECULAR_PUMP_POWERED, index)
}

/// Get the open and close command bits of the gate valve.
pub fn gate_valve_command(index: usize) -> Option<(PlcAddress, PlcAddress)> {
    Some((indexed(&GATE_VALVE_OPEN, index)?, indexed(&GATE_VALVE_CLOSE, index)?))
}

/// Get the opened and closed position feedback of the gate valve.
pub fn gate_valve_position(index: usize) -> Option<(PlcAddress, PlcAddress)> {
    Some((
        indexed(&GATE_VALVE_OPENED, index)?,
        indexed(&GATE_VALVE_CLOSED, index)?,
    ))
}

pub fn electromagnetic_valve(index: usize) -> Option<PlcAddress> {
    indexed(&ELECTROMAGNETIC_VALVE, index)
}

pub fn vent_valve(index: usize) -> Option<PlcAddress> {
    indexed(&VENT_VALVE, index)
}

pub fn water_valve(index: usize) -> Option<PlcAddress> {
    indexed(&WATER_VALVE, index)
}

pub fn gauge_pressure(index: usize) -> Option<PlcAddress> {
    indexed(&GAUGE_PRESSURE, index)
}

/// Get the input bit of the fault. The bit is 1 when the fault is active.
pub fn fault_address(fault: VacuumFault) -> PlcAddress {
    match fault {
        VacuumFault::ScrewPump => PlcAddress::bit(PlcArea::Input, 4, 0),
        VacuumFault::RootsPump => PlcAddress::bit(PlcArea::Input, 4, 1),
        VacuumFault::MolecularPump1 => PlcAddress::bit(PlcArea::Input, 4, 2),
        VacuumFault::MolecularPump2 => PlcAddress::bit(PlcArea::Input, 4, 3),
        VacuumFault::MolecularPump3 => PlcAddress::bit(PlcArea::Input, 4, 4),
        VacuumFault::WaterCooling1 => PlcAddress::bit(PlcArea::Input, 5, 0),
        VacuumFault::WaterCooling2 => PlcAddress::bit(PlcArea::Input, 5, 1),
        VacuumFault::WaterCooling3 => PlcAddress::bit(PlcArea::Input, 5, 2),
        VacuumFault::WaterCooling4 => PlcAddress::bit(PlcArea::Input, 5, 3),
        VacuumFault::PhaseSequence => PlcAddress::bit(PlcArea::Input, 6, 0),
    }
}

/// Pairs of the commanded bit and the feedback bit that the simulated plant
/// mirrors. The flag tells whether the feedback is inverted.
pub fn simulated_feedbacks() -> Vec<(PlcAddress, PlcAddress, bool)> {
    let mut feedbacks = vec![
        (SCREW_PUMP_POWER, SCREW_PUMP_POWERED, false),
        (ROOTS_PUMP_POWER, ROOTS_PUMP_POWERED, false),
        (MODE_SELECT, MANUAL_FEEDBACK, false),
        (MODE_SELECT, AUTO_FEEDBACK, true),
        (REMOTE_CONTROL, REMOTE_FEEDBACK, false),
        (EMERGENCY_STOP, EMERGENCY_STOP_ACTIVE, false),
        (SCREW_PUMP_SPEED, SCREW_PUMP_SPEED_FEEDBACK, false),
    ];

    for idx in 0..NUM_MOLECULAR_PUMPS {
        feedbacks.push((MOLECULAR_PUMP_POWER[idx], MOLECULAR_PUMP_POWERED[idx], false));
    }

    for idx in 0..NUM_GATE_VALVES {
        feedbacks.push((GATE_VALVE_OPEN[idx], GATE_VALVE_OPENED[idx], false));
        feedbacks.push((GATE_VALVE_CLOSE[idx], GATE_VALVE_CLOSED[idx], false));
    }

    feedbacks
}
