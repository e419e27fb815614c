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

use log::{debug, info};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::constants::{PLC_PING_TIMEOUT_MS, PLC_RECV_TIMEOUT_MS, PLC_SEND_TIMEOUT_MS};
use crate::enums::PlcArea;
use crate::plc::plc_transport::PlcTransport;

// ISO-on-TCP (RFC 1006)
const TPKT_VERSION: u8 = 0x03;
const TPKT_HEADER_LENGTH: usize = 4;
const COTP_CONNECTION_REQUEST: u8 = 0xE0;
const COTP_CONNECTION_CONFIRM: u8 = 0xD0;
const COTP_DATA: u8 = 0xF0;
const COTP_EOT: u8 = 0x80;

// S7 protocol
const S7_PROTOCOL_ID: u8 = 0x32;
const S7_ROSCTR_JOB: u8 = 0x01;
const S7_ROSCTR_ACK_DATA: u8 = 0x03;
const S7_FUNCTION_SETUP: u8 = 0xF0;
const S7_FUNCTION_READ: u8 = 0x04;
const S7_FUNCTION_WRITE: u8 = 0x05;
const S7_RETURN_SUCCESS: u8 = 0xFF;

const S7_TRANSPORT_BIT: u8 = 0x01;
const S7_TRANSPORT_BYTE: u8 = 0x02;
const S7_DATA_BIT: u8 = 0x03;
const S7_DATA_BYTE: u8 = 0x04;

const REQUESTED_PDU_LENGTH: u16 = 960;
const LOCAL_TSAP: u16 = 0x0100;
// Programming-device connection type.
const CONNECTION_TYPE_PG: u16 = 0x01;

// Header size of the read/write response before the data items.
const S7_ACK_HEADER_LENGTH: usize = 12;
// Overhead of one read item in the response.
const READ_ITEM_OVERHEAD: usize = 4;
// Overhead of the read request parameters in the PDU.
const READ_REQUEST_OVERHEAD: usize = 18;
// Overhead of the write request in the PDU.
const WRITE_REQUEST_OVERHEAD: usize = 28;

/// S7 communication over ISO-on-TCP with single-item read-var and write-var
/// jobs.
pub struct S7Transport {
    _stream: Option<TcpStream>,
    _rack: u16,
    _slot: u16,
    // Negotiated PDU length.
    _pdu_length: usize,
    _pdu_reference: u16,
}

impl S7Transport {
    /// Create a new S7 transport.
    ///
    /// # Arguments
    /// * `rack` - Rack of the CPU.
    /// * `slot` - Slot of the CPU.
    ///
    /// # Returns
    /// New instance of the transport.
    pub fn new(rack: u16, slot: u16) -> Self {
        Self {
            _stream: None,
            _rack: rack,
            _slot: slot,
            _pdu_length: REQUESTED_PDU_LENGTH as usize,
            _pdu_reference: 0,
        }
    }

    /// Remote TSAP from the connection type, rack, and slot.
    fn remote_tsap(&self) -> u16 {
        (CONNECTION_TYPE_PG << 8) + self._rack * 0x20 + self._slot
    }

    fn next_pdu_reference(&mut self) -> u16 {
        self._pdu_reference = self._pdu_reference.wrapping_add(1);
        self._pdu_reference
    }

    /// Get the stream.
    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self._stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no S7 session"))
    }

    /// Send the TPKT packet.
    ///
    /// # Arguments
    /// * `payload` - Payload after the TPKT header.
    fn send_tpkt(&mut self, payload: &[u8]) -> io::Result<()> {
        let length = (payload.len() + TPKT_HEADER_LENGTH) as u16;
        let mut packet = Vec::with_capacity(length as usize);
        packet.extend_from_slice(&[TPKT_VERSION, 0x00]);
        packet.extend_from_slice(&length.to_be_bytes());
        packet.extend_from_slice(payload);

        let stream = self.stream()?;
        stream.write_all(&packet)?;
        stream.flush()
    }

    /// Receive the TPKT packet.
    ///
    /// # Returns
    /// Payload after the TPKT header.
    fn receive_tpkt(&mut self) -> io::Result<Vec<u8>> {
        let stream = self.stream()?;

        let mut header = [0; TPKT_HEADER_LENGTH];
        stream.read_exact(&mut header)?;
        if header[0] != TPKT_VERSION {
            return Err(invalid_data("invalid TPKT version"));
        }

        let length = u16::from_be_bytes([header[2], header[3]]) as usize;
        if length < TPKT_HEADER_LENGTH {
            return Err(invalid_data("invalid TPKT length"));
        }

        let mut payload = vec![0; length - TPKT_HEADER_LENGTH];
        stream.read_exact(&mut payload)?;

        Ok(payload)
    }

    /// Exchange the S7 PDU in the COTP data packet.
    ///
    /// # Arguments
    /// * `pdu` - S7 PDU.
    ///
    /// # Returns
    /// S7 PDU of the response.
    fn exchange_pdu(&mut self, pdu: &[u8]) -> io::Result<Vec<u8>> {
        let mut payload = vec![0x02, COTP_DATA, COTP_EOT];
        payload.extend_from_slice(pdu);
        self.send_tpkt(&payload)?;

        let response = self.receive_tpkt()?;
        if response.len() < 3 || response[1] != COTP_DATA {
            return Err(invalid_data("unexpected COTP packet"));
        }

        let pdu = response[3..].to_vec();
        if pdu.len() < S7_ACK_HEADER_LENGTH
            || pdu[0] != S7_PROTOCOL_ID
            || pdu[1] != S7_ROSCTR_ACK_DATA
        {
            return Err(invalid_data("unexpected S7 response"));
        }

        // Error class and code.
        if pdu[10] != 0 || pdu[11] != 0 {
            return Err(invalid_data(&format!(
                "S7 error class 0x{:02X} code 0x{:02X}",
                pdu[10], pdu[11]
            )));
        }

        Ok(pdu)
    }

    /// Build the S7 job header.
    fn job_header(&mut self, parameter_length: u16, data_length: u16) -> Vec<u8> {
        let reference = self.next_pdu_reference();

        let mut header = vec![S7_PROTOCOL_ID, S7_ROSCTR_JOB, 0x00, 0x00];
        header.extend_from_slice(&reference.to_be_bytes());
        header.extend_from_slice(&parameter_length.to_be_bytes());
        header.extend_from_slice(&data_length.to_be_bytes());

        header
    }

    /// Build the variable item of the read/write job.
    fn variable_item(
        transport_size: u8,
        count: u16,
        area: PlcArea,
        db_number: u16,
        bit_address: u32,
    ) -> Vec<u8> {
        let db = if area == PlcArea::DbBlock { db_number } else { 0 };

        let mut item = vec![0x12, 0x0A, 0x10, transport_size];
        item.extend_from_slice(&count.to_be_bytes());
        item.extend_from_slice(&db.to_be_bytes());
        item.push(area.s7_code());
        item.extend_from_slice(&bit_address.to_be_bytes()[1..]);

        item
    }

    fn connect_iso(&mut self) -> io::Result<()> {
        let remote_tsap = self.remote_tsap().to_be_bytes();
        let local_tsap = LOCAL_TSAP.to_be_bytes();
        let request = [
            0x11,
            COTP_CONNECTION_REQUEST,
            0x00,
            0x00,
            0x00,
            0x01,
            0x00,
            // TPDU size 1024
            0xC0,
            0x01,
            0x0A,
            0xC1,
            0x02,
            local_tsap[0],
            local_tsap[1],
            0xC2,
            0x02,
            remote_tsap[0],
            remote_tsap[1],
        ];
        self.send_tpkt(&request)?;

        let response = self.receive_tpkt()?;
        if response.len() < 2 || response[1] != COTP_CONNECTION_CONFIRM {
            return Err(invalid_data("COTP connection is refused"));
        }

        Ok(())
    }

    fn setup_communication(&mut self) -> io::Result<()> {
        let mut pdu = self.job_header(8, 0);
        pdu.extend_from_slice(&[S7_FUNCTION_SETUP, 0x00, 0x00, 0x01, 0x00, 0x01]);
        pdu.extend_from_slice(&REQUESTED_PDU_LENGTH.to_be_bytes());

        let response = self.exchange_pdu(&pdu)?;
        if response.len() < S7_ACK_HEADER_LENGTH + 8 {
            return Err(invalid_data("short setup-communication response"));
        }

        let offset = S7_ACK_HEADER_LENGTH + 6;
        self._pdu_length = u16::from_be_bytes([response[offset], response[offset + 1]]) as usize;
        debug!("Negotiated S7 PDU length: {}.", self._pdu_length);

        Ok(())
    }

    /// Read the bytes in one job. The size should fit the PDU.
    fn read_chunk(
        &mut self,
        area: PlcArea,
        db_number: u16,
        start: u32,
        size: usize,
    ) -> io::Result<Vec<u8>> {
        let item = Self::variable_item(S7_TRANSPORT_BYTE, size as u16, area, db_number, start * 8);
        let mut pdu = self.job_header((2 + item.len()) as u16, 0);
        pdu.extend_from_slice(&[S7_FUNCTION_READ, 0x01]);
        pdu.extend_from_slice(&item);

        let response = self.exchange_pdu(&pdu)?;
        // Parameters: function and item count.
        let data = response
            .get((S7_ACK_HEADER_LENGTH + 2)..)
            .ok_or_else(|| invalid_data("short read response"))?;
        if data.len() < READ_ITEM_OVERHEAD {
            return Err(invalid_data("short read response"));
        }
        if data[0] != S7_RETURN_SUCCESS {
            return Err(item_error(data[0]));
        }

        let payload = &data[READ_ITEM_OVERHEAD..];
        if payload.len() < size {
            return Err(invalid_data("incomplete read data"));
        }

        Ok(payload[..size].to_vec())
    }

    fn write_item(
        &mut self,
        item: Vec<u8>,
        data_transport_size: u8,
        data_length: u16,
        data: &[u8],
    ) -> io::Result<()> {
        let mut data_block = vec![0x00, data_transport_size];
        data_block.extend_from_slice(&data_length.to_be_bytes());
        data_block.extend_from_slice(data);

        let mut pdu = self.job_header((2 + item.len()) as u16, data_block.len() as u16);
        pdu.extend_from_slice(&[S7_FUNCTION_WRITE, 0x01]);
        pdu.extend_from_slice(&item);
        pdu.extend_from_slice(&data_block);

        let response = self.exchange_pdu(&pdu)?;
        let return_code = response
            .get(S7_ACK_HEADER_LENGTH + 2)
            .copied()
            .ok_or_else(|| invalid_data("short write response"))?;
        if return_code != S7_RETURN_SUCCESS {
            return Err(item_error(return_code));
        }

        Ok(())
    }
}

impl PlcTransport for S7Transport {
    fn connect(&mut self, ip: &str, port: u16) -> io::Result<()> {
        self.disconnect();

        let address = (ip, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no address"))?;
        let stream =
            TcpStream::connect_timeout(&address, Duration::from_millis(PLC_PING_TIMEOUT_MS))?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(Duration::from_millis(PLC_SEND_TIMEOUT_MS)))?;
        stream.set_read_timeout(Some(Duration::from_millis(PLC_RECV_TIMEOUT_MS)))?;
        self._stream = Some(stream);

        let result = self.connect_iso().and_then(|_| self.setup_communication());
        match result {
            Ok(_) => {
                info!("S7 session to {ip}:{port} is established.");
                Ok(())
            }
            Err(error) => {
                self.disconnect();
                Err(error)
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self._stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn is_connected(&self) -> bool {
        self._stream.is_some()
    }

    fn read_area(
        &mut self,
        area: PlcArea,
        db_number: u16,
        start: u32,
        size: usize,
    ) -> io::Result<Vec<u8>> {
        let max_chunk = self._pdu_length.saturating_sub(READ_REQUEST_OVERHEAD).max(1);

        let mut bytes = Vec::with_capacity(size);
        let mut offset = 0;
        while offset < size {
            let chunk = (size - offset).min(max_chunk);
            let data = self.read_chunk(area, db_number, start + offset as u32, chunk)?;
            bytes.extend_from_slice(&data);

            offset += chunk;
        }

        Ok(bytes)
    }

    fn write_area(
        &mut self,
        area: PlcArea,
        db_number: u16,
        start: u32,
        data: &[u8],
    ) -> io::Result<()> {
        let max_chunk = self._pdu_length.saturating_sub(WRITE_REQUEST_OVERHEAD).max(1);

        for (idx, chunk) in data.chunks(max_chunk).enumerate() {
            let chunk_start = start + (idx * max_chunk) as u32;
            let item = Self::variable_item(
                S7_TRANSPORT_BYTE,
                chunk.len() as u16,
                area,
                db_number,
                chunk_start * 8,
            );
            self.write_item(item, S7_DATA_BYTE, (chunk.len() * 8) as u16, chunk)?;
        }

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
        let item = Self::variable_item(
            S7_TRANSPORT_BIT,
            1,
            area,
            db_number,
            start * 8 + (bit & 0x07) as u32,
        );
        self.write_item(item, S7_DATA_BIT, 1, &[value as u8])
    }
}

fn invalid_data(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, String::from(message))
}

fn item_error(code: u8) -> io::Error {
    match code {
        // Address out of range.
        0x05 => io::Error::new(io::ErrorKind::InvalidInput, "address out of range"),
        _ => invalid_data(&format!("S7 item return code 0x{code:02X}")),
    }
}
