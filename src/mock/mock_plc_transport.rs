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

use std::collections::HashMap;
use std::io;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard,
};

use crate::enums::PlcArea;
use crate::mock::mock_constants::MOCK_PLC_AREA_SIZE;
use crate::plc::plc_address::PlcAddress;
use crate::plc::plc_transport::PlcTransport;

#[derive(Clone, Copy)]
struct Feedback {
    source: PlcAddress,
    target: PlcAddress,
    invert: bool,
}

#[derive(Default)]
struct MockPlcMemory {
    // Key is the S7 area code and the DB number.
    areas: HashMap<(u8, u16), Vec<u8>>,
    feedbacks: Vec<Feedback>,
}

impl MockPlcMemory {
    fn area_mut(&mut self, area: PlcArea, db_number: u16) -> &mut Vec<u8> {
        let db = if area == PlcArea::DbBlock { db_number } else { 0 };
        self.areas
            .entry((area.s7_code(), db))
            .or_insert_with(|| vec![0; MOCK_PLC_AREA_SIZE])
    }

    fn read(&mut self, area: PlcArea, db_number: u16, start: u32, size: usize) -> io::Result<Vec<u8>> {
        let memory = self.area_mut(area, db_number);
        let start = start as usize;
        memory
            .get(start..(start + size))
            .map(|bytes| bytes.to_vec())
            .ok_or_else(out_of_range)
    }

    fn write(&mut self, area: PlcArea, db_number: u16, start: u32, data: &[u8]) -> io::Result<()> {
        let memory = self.area_mut(area, db_number);
        let start = start as usize;
        memory
            .get_mut(start..(start + data.len()))
            .ok_or_else(out_of_range)?
            .copy_from_slice(data);

        Ok(())
    }

    fn write_bit(&mut self, area: PlcArea, db_number: u16, start: u32, bit: u8, value: bool) -> io::Result<()> {
        let memory = self.area_mut(area, db_number);
        let byte = memory.get_mut(start as usize).ok_or_else(out_of_range)?;
        if value {
            *byte |= 1 << bit;
        } else {
            *byte &= !(1 << bit);
        }

        Ok(())
    }

    /// Copy the written values to the feedback addresses.
    fn apply_feedbacks(&mut self, area: PlcArea, db_number: u16, start: u32, size: usize) {
        let end = start + size as u32;
        let feedbacks: Vec<Feedback> = self
            .feedbacks
            .iter()
            .filter(|feedback| {
                let source = &feedback.source;
                source.area().s7_code() == area.s7_code()
                    && (area != PlcArea::DbBlock || source.db_number() == db_number)
                    && source.byte_offset() >= start
                    && source.byte_offset() < end
            })
            .copied()
            .collect();

        for feedback in feedbacks {
            let (source, target) = (feedback.source, feedback.target);
            if source.is_bit() {
                let value = self
                    .read(source.area(), source.db_number(), source.byte_offset(), 1)
                    .map(|bytes| (bytes[0] >> source.bit_offset()) & 0x01 == 1)
                    .unwrap_or_default();
                let _ = self.write_bit(
                    target.area(),
                    target.db_number(),
                    target.byte_offset(),
                    target.bit_offset() as u8,
                    value ^ feedback.invert,
                );
            } else if let Ok(bytes) = self.read(
                source.area(),
                source.db_number(),
                source.byte_offset(),
                source.width() as usize,
            ) {
                let _ = self.write(target.area(), target.db_number(), target.byte_offset(), &bytes);
            }
        }
    }
}

fn out_of_range() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "address out of range")
}

fn link_down() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "mock PLC is offline")
}

/// In-memory PLC. The clones share the memory and the link state, so a clone
/// can be kept to drive the PLC from outside.
#[derive(Clone)]
pub struct MockPlcTransport {
    _memory: Arc<Mutex<MockPlcMemory>>,
    _online: Arc<AtomicBool>,
    _connected: bool,
    // Number of the coming writes that fail.
    _fail_next_writes: Arc<AtomicUsize>,
    // Bytes whose reads always fail.
    _failing_reads: Arc<Mutex<Vec<(PlcArea, u16, u32)>>>,
    // Number of the connect calls.
    pub connect_count: Arc<AtomicUsize>,
    // Number of the successful writes.
    pub write_count: Arc<AtomicUsize>,
    // Number of the read calls.
    pub read_count: Arc<AtomicUsize>,
}

impl MockPlcTransport {
    /// Create a new mock PLC transport that is online.
    pub fn new() -> Self {
        Self {
            _memory: Arc::new(Mutex::new(MockPlcMemory::default())),
            _online: Arc::new(AtomicBool::new(true)),
            _connected: false,
            _fail_next_writes: Arc::new(AtomicUsize::new(0)),
            _failing_reads: Arc::new(Mutex::new(Vec::new())),
            connect_count: Arc::new(AtomicUsize::new(0)),
            write_count: Arc::new(AtomicUsize::new(0)),
            read_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn memory(&self) -> MutexGuard<'_, MockPlcMemory> {
        self._memory
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Set the link online or not. The offline link refuses the connection
    /// and fails all reads and writes.
    pub fn set_online(&self, is_online: bool) {
        self._online.store(is_online, Ordering::Relaxed);
    }

    /// Fail the coming writes.
    ///
    /// # Arguments
    /// * `count` - Number of the writes to fail.
    pub fn fail_next_writes(&self, count: usize) {
        self._fail_next_writes.store(count, Ordering::Relaxed);
    }

    /// Fail every read that covers the byte of the address.
    pub fn fail_reads(&self, address: &PlcAddress) {
        self._failing_reads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((address.area(), address.db_number(), address.byte_offset()));
    }

    fn is_failing_read(&self, area: PlcArea, db_number: u16, start: u32, size: usize) -> bool {
        self._failing_reads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .any(|(failing_area, failing_db, byte)| {
                *failing_area == area
                    && *failing_db == db_number
                    && *byte >= start
                    && *byte < start + size as u32
            })
    }

    /// Copy the value written to the source address to the target address.
    /// This mimics the feedback of the plant.
    ///
    /// # Arguments
    /// * `source` - Commanded address.
    /// * `target` - Feedback address.
    /// * `invert` - Invert the bit value or not.
    pub fn add_feedback(&self, source: PlcAddress, target: PlcAddress, invert: bool) {
        self.memory().feedbacks.push(Feedback {
            source,
            target,
            invert,
        });
    }

    /// Get the bytes of the memory area.
    pub fn get_bytes(&self, area: PlcArea, db_number: u16, start: u32, size: usize) -> Vec<u8> {
        self.memory()
            .read(area, db_number, start, size)
            .unwrap_or_default()
    }

    /// Set the bytes of the memory area directly. This bypasses the link.
    pub fn set_bytes(&self, area: PlcArea, db_number: u16, start: u32, data: &[u8]) {
        let _ = self.memory().write(area, db_number, start, data);
    }

    /// Get the bit value.
    pub fn get_bit(&self, address: &PlcAddress) -> bool {
        let bytes = self.get_bytes(address.area(), address.db_number(), address.byte_offset(), 1);
        bytes
            .first()
            .map(|byte| (byte >> address.bit_offset().max(0)) & 0x01 == 1)
            .unwrap_or_default()
    }

    /// Set the bit value directly. This bypasses the link.
    pub fn set_bit(&self, address: &PlcAddress, value: bool) {
        let _ = self.memory().write_bit(
            address.area(),
            address.db_number(),
            address.byte_offset(),
            address.bit_offset().max(0) as u8,
            value,
        );
    }

    /// Set the real value directly. This bypasses the link.
    pub fn set_real(&self, address: &PlcAddress, value: f32) {
        self.set_bytes(
            address.area(),
            address.db_number(),
            address.byte_offset(),
            &value.to_bits().to_be_bytes(),
        );
    }

    fn check_link(&mut self) -> io::Result<()> {
        if self._online.load(Ordering::Relaxed) && self._connected {
            Ok(())
        } else {
            self._connected = false;
            Err(link_down())
        }
    }

    fn check_write(&mut self) -> io::Result<()> {
        self.check_link()?;

        let remaining = self._fail_next_writes.load(Ordering::Relaxed);
        if remaining > 0 {
            self._fail_next_writes.store(remaining - 1, Ordering::Relaxed);
            return Err(io::Error::new(io::ErrorKind::TimedOut, "mock write timeout"));
        }

        Ok(())
    }
}

impl Default for MockPlcTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl PlcTransport for MockPlcTransport {
    fn connect(&mut self, _ip: &str, _port: u16) -> io::Result<()> {
        self.connect_count.fetch_add(1, Ordering::Relaxed);

        if !self._online.load(Ordering::Relaxed) {
            self._connected = false;
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "mock PLC is offline",
            ));
        }

        self._connected = true;

        Ok(())
    }

    fn disconnect(&mut self) {
        self._connected = false;
    }

    fn is_connected(&self) -> bool {
        self._connected
    }

    fn read_area(
        &mut self,
        area: PlcArea,
        db_number: u16,
        start: u32,
        size: usize,
    ) -> io::Result<Vec<u8>> {
        self.check_link()?;
        self.read_count.fetch_add(1, Ordering::Relaxed);

        if self.is_failing_read(area, db_number, start, size) {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "mock read timeout"));
        }

        self.memory().read(area, db_number, start, size)
    }

    fn write_area(
        &mut self,
        area: PlcArea,
        db_number: u16,
        start: u32,
        data: &[u8],
    ) -> io::Result<()> {
        self.check_write()?;

        let mut memory = self.memory();
        memory.write(area, db_number, start, data)?;
        memory.apply_feedbacks(area, db_number, start, data.len());
        drop(memory);

        self.write_count.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    fn write_bit(
        &mut self,
        area: PlcArea,
        db_number: u16,
        start: u32,
        bit: u8,
        value: bool,
    ) -> io::Result<()> {
        self.check_write()?;

        let mut memory = self.memory();
        memory.write_bit(area, db_number, start, bit, value)?;
        memory.apply_feedbacks(area, db_number, start, 1);
        drop(memory);

        self.write_count.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect() {
        let mut transport = MockPlcTransport::new();

        assert!(!transport.is_connected());
        assert!(transport.read_area(PlcArea::Memory, 0, 0, 1).is_err());

        transport.connect("127.0.0.1", 102).unwrap();

        assert!(transport.is_connected());
        assert_eq!(transport.connect_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_offline() {
        let mut transport = MockPlcTransport::new();
        transport.connect("127.0.0.1", 102).unwrap();

        transport.set_online(false);

        assert_eq!(
            transport.read_area(PlcArea::Memory, 0, 0, 1).unwrap_err().kind(),
            io::ErrorKind::ConnectionAborted
        );
        assert!(!transport.is_connected());
        assert!(transport.connect("127.0.0.1", 102).is_err());
    }

    #[test]
    fn test_db_blocks_are_separated() {
        let mut transport = MockPlcTransport::new();
        transport.connect("127.0.0.1", 102).unwrap();

        transport.write_area(PlcArea::DbBlock, 1, 0, &[0xAB]).unwrap();

        assert_eq!(transport.read_area(PlcArea::DbBlock, 1, 0, 1).unwrap(), vec![0xAB]);
        assert_eq!(transport.read_area(PlcArea::DbBlock, 2, 0, 1).unwrap(), vec![0x00]);
    }

    #[test]
    fn test_feedback() {
        let mut transport = MockPlcTransport::new();
        transport.connect("127.0.0.1", 102).unwrap();

        let command = PlcAddress::db_bit(1, 0, 6);
        let manual = PlcAddress::bit(PlcArea::Input, 0, 6);
        let auto = PlcAddress::bit(PlcArea::Input, 0, 5);
        transport.add_feedback(command, manual, false);
        transport.add_feedback(command, auto, true);

        transport.write_bit(PlcArea::DbBlock, 1, 0, 6, true).unwrap();

        assert!(transport.get_bit(&manual));
        assert!(!transport.get_bit(&auto));

        transport.write_bit(PlcArea::DbBlock, 1, 0, 6, false).unwrap();

        assert!(!transport.get_bit(&manual));
        assert!(transport.get_bit(&auto));
    }

    #[test]
    fn test_feedback_word() {
        let mut transport = MockPlcTransport::new();
        transport.connect("127.0.0.1", 102).unwrap();

        let command = PlcAddress::db_value(1, 10, 2);
        let feedback = PlcAddress::value(PlcArea::InputWord, 130, 2);
        transport.add_feedback(command, feedback, false);

        transport.write_area(PlcArea::DbBlock, 1, 10, &[0x00, 0x32]).unwrap();

        assert_eq!(transport.get_bytes(PlcArea::InputWord, 0, 130, 2), vec![0x00, 0x32]);
    }

    #[test]
    fn test_fail_next_writes() {
        let mut transport = MockPlcTransport::new();
        transport.connect("127.0.0.1", 102).unwrap();

        transport.fail_next_writes(1);

        assert!(transport.write_bit(PlcArea::Memory, 0, 0, 0, true).is_err());
        assert!(transport.write_bit(PlcArea::Memory, 0, 0, 0, true).is_ok());
        assert_eq!(transport.write_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_fail_reads() {
        let mut transport = MockPlcTransport::new();
        transport.connect("127.0.0.1", 102).unwrap();

        transport.fail_reads(&PlcAddress::db_bit(1, 20, 3));

        assert!(transport.read_area(PlcArea::DbBlock, 1, 19, 2).is_err());
        assert!(transport.read_area(PlcArea::DbBlock, 1, 21, 1).is_ok());
        assert!(transport.read_area(PlcArea::DbBlock, 2, 20, 1).is_ok());
        assert_eq!(transport.read_count.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_clone_shares_memory() {
        let mut transport = MockPlcTransport::new();
        let handle = transport.clone();
        transport.connect("127.0.0.1", 102).unwrap();

        handle.set_real(&PlcAddress::db_value(2, 0, 4), 1.5);

        assert_eq!(
            transport.read_area(PlcArea::DbBlock, 2, 0, 4).unwrap(),
            1.5f32.to_bits().to_be_bytes().to_vec()
        );
    }
}
