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

//! # Instrument Control System
//!
//! This library is the device control core of the vacuum and
//! reflection-imaging instrument: the PLC client, the encoder acquisition,
//! the motion controller proxies, and the device servers on top of them.
pub mod application;
pub mod command;
pub mod config;
pub mod constants;
pub mod device;
pub mod encoder;
pub mod enums;
pub mod error;
pub mod event_log;
pub mod interface;
pub mod mock;
pub mod motion;
pub mod plc;
pub mod supervisor;
pub mod utility;
