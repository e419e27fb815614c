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

use std::io;

use crate::enums::PlcArea;

/// Low-level transport to the PLC memory areas. The implementation does not
/// need to be thread-safe, the PLC client serializes all calls.
///
/// Protocol errors are reported as `io::ErrorKind::InvalidData` and the
/// out-of-range addresses as `io::ErrorKind::InvalidInput`.
pub trait PlcTransport: Send {
    /// Open a session.
    ///
    /// # Arguments
    /// * `ip` - IP of the PLC.
    /// * `port` - Port of the PLC.
    ///
    /// # Errors
    /// If the session can not be established.
    fn connect(&mut self, ip: &str, port: u16) -> io::Result<()>;

    /// Close the session. This is best-effort.
    fn disconnect(&mut self);

    /// The session is open or not.
    fn is_connected(&self) -> bool;

    /// Read the bytes of the memory area.
    ///
    /// # Arguments
    /// * `area` - Memory area.
    /// * `db_number` - DB number. Ignored if the area is not the DB block.
    /// * `start` - Start byte.
    /// * `size` - Number of bytes.
    ///
    /// # Returns
    /// Bytes read.
    ///
    /// # Errors
    /// If the read fails.
    fn read_area(
        &mut self,
        area: PlcArea,
        db_number: u16,
        start: u32,
        size: usize,
    ) -> io::Result<Vec<u8>>;

    /// Write the bytes to the memory area.
    ///
    /// # Errors
    /// If the write fails.
    fn write_area(&mut self, area: PlcArea, db_number: u16, start: u32, data: &[u8])
        -> io::Result<()>;

    /// Write a single bit to the memory area.
    ///
    /// # Errors
    /// If the write fails.
    fn write_bit(
        &mut self,
        area: PlcArea,
        db_number: u16,
        start: u32,
        bit: u8,
        value: bool,
    ) -> io::Result<()>;
}
