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
use std::io;
use std::sync::{Mutex, MutexGuard};
use std::thread::sleep;
use std::time::{Duration, Instant};

use crate::constants::{DEFAULT_RECONNECT_COOLDOWN_MS, MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY_MS};
use crate::error::PlcError;
use crate::plc::plc_address::PlcAddress;
use crate::plc::plc_transport::PlcTransport;

/// Value that can be read from or written to the PLC. Multi-byte values are
/// big-endian on the wire.
pub trait PlcValue: Sized + Copy {
    /// Number of bytes on the wire.
    const SIZE: usize;
    /// The value is a single bit.
    const IS_BIT: bool = false;

    fn from_be_slice(bytes: &[u8]) -> Self;

    fn to_be_vec(self) -> Vec<u8>;
}

impl PlcValue for bool {
    const SIZE: usize = 1;
    const IS_BIT: bool = true;

    fn from_be_slice(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    fn to_be_vec(self) -> Vec<u8> {
        vec![self as u8]
    }
}

impl PlcValue for u8 {
    const SIZE: usize = 1;

    fn from_be_slice(bytes: &[u8]) -> Self {
        bytes[0]
    }

    fn to_be_vec(self) -> Vec<u8> {
        vec![self]
    }
}

impl PlcValue for u16 {
    const SIZE: usize = 2;

    fn from_be_slice(bytes: &[u8]) -> Self {
        u16::from_be_bytes([bytes[0], bytes[1]])
    }

    fn to_be_vec(self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }
}

impl PlcValue for i16 {
    const SIZE: usize = 2;

    fn from_be_slice(bytes: &[u8]) -> Self {
        i16::from_be_bytes([bytes[0], bytes[1]])
    }

    fn to_be_vec(self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }
}

impl PlcValue for u32 {
    const SIZE: usize = 4;

    fn from_be_slice(bytes: &[u8]) -> Self {
        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn to_be_vec(self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }
}

impl PlcValue for f32 {
    const SIZE: usize = 4;

    fn from_be_slice(bytes: &[u8]) -> Self {
        f32::from_bits(u32::from_be_slice(bytes))
    }

    fn to_be_vec(self) -> Vec<u8> {
        self.to_bits().to_be_vec()
    }
}

struct PlcSession {
    transport: Box<dyn PlcTransport>,
    ip: String,
    port: u16,
    connected: bool,
    reconnect_attempts: u32,
    cooldown_until: Option<Instant>,
}

/// Client of the PLC I/O plane. All public calls are serialized by the
/// internal mutex.
pub struct PlcClient {
    _session: Mutex<PlcSession>,
    // Delay between the reconnect attempts.
    _reconnect_delay: Duration,
    // Cooldown after the reconnect attempts are exhausted.
    _reconnect_cooldown: Duration,
}

impl PlcClient {
    /// Create a new PLC client.
    ///
    /// # Arguments
    /// * `transport` - Transport to the PLC.
    ///
    /// # Returns
    /// New instance of the PLC client.
    pub fn new(transport: Box<dyn PlcTransport>) -> Self {
        Self::with_policy(
            transport,
            Duration::from_millis(RECONNECT_DELAY_MS),
            Duration::from_millis(DEFAULT_RECONNECT_COOLDOWN_MS),
        )
    }

    /// Create a new PLC client with the reconnect policy.
    ///
    /// # Arguments
    /// * `transport` - Transport to the PLC.
    /// * `reconnect_delay` - Delay between the reconnect attempts.
    /// * `reconnect_cooldown` - Cooldown after the attempts are exhausted.
    ///
    /// # Returns
    /// New instance of the PLC client.
    pub fn with_policy(
        transport: Box<dyn PlcTransport>,
        reconnect_delay: Duration,
        reconnect_cooldown: Duration,
    ) -> Self {
        Self {
            _session: Mutex::new(PlcSession {
                transport,
                ip: String::new(),
                port: 0,
                connected: false,
                reconnect_attempts: 0,
                cooldown_until: None,
            }),
            _reconnect_delay: reconnect_delay,
            _reconnect_cooldown: reconnect_cooldown,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlcSession> {
        self._session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open a fresh session. The existing session is closed first.
    ///
    /// # Arguments
    /// * `ip` - IP of the PLC.
    /// * `port` - Port of the PLC.
    ///
    /// # Returns
    /// True if connected, false otherwise.
    pub fn connect(&self, ip: &str, port: u16) -> bool {
        let mut session = self.lock();
        session.ip = String::from(ip);
        session.port = port;

        session.transport.disconnect();
        match session.transport.connect(ip, port) {
            Ok(_) => {
                info!("PLC {ip}:{port} is connected.");

                session.connected = true;
                session.reconnect_attempts = 0;
                session.cooldown_until = None;

                true
            }
            Err(error) => {
                warn!("Failed to connect the PLC {ip}:{port}: {error}.");
                session.connected = false;

                false
            }
        }
    }

    /// Close the session.
    pub fn disconnect(&self) {
        let mut session = self.lock();
        session.transport.disconnect();
        session.connected = false;
    }

    /// The session is open or not.
    pub fn is_connected(&self) -> bool {
        let session = self.lock();
        session.connected && session.transport.is_connected()
    }

    /// Try to reconnect the PLC. Up to the maximum attempts are tried back to
    /// back, after which the client stays quiet until the cooldown ends.
    ///
    /// # Returns
    /// Result of the reconnection.
    pub fn attempt_reconnect(&self) -> Result<(), PlcError> {
        let mut session = self.lock();
        self.reconnect(&mut session)
    }

    fn reconnect(&self, session: &mut PlcSession) -> Result<(), PlcError> {
        if session.ip.is_empty() {
            return Err(PlcError::NotConnected);
        }

        if let Some(cooldown_until) = session.cooldown_until {
            if Instant::now() < cooldown_until {
                return Err(PlcError::Cooldown);
            }

            session.cooldown_until = None;
            session.reconnect_attempts = 0;
        }

        while session.reconnect_attempts < MAX_RECONNECT_ATTEMPTS {
            if session.reconnect_attempts > 0 {
                sleep(self._reconnect_delay);
            }
            session.reconnect_attempts += 1;

            // Clear the residual socket state.
            session.transport.disconnect();

            let (ip, port) = (session.ip.clone(), session.port);
            match session.transport.connect(&ip, port) {
                Ok(_) => {
                    info!(
                        "PLC {ip}:{port} is reconnected after {} attempt(s).",
                        session.reconnect_attempts
                    );

                    session.connected = true;
                    session.reconnect_attempts = 0;

                    return Ok(());
                }
                Err(error) => {
                    debug!(
                        "Reconnect attempt {} to the PLC {ip}:{port} failed: {error}.",
                        session.reconnect_attempts
                    );
                }
            }
        }

        warn!(
            "PLC reconnect failed {MAX_RECONNECT_ATTEMPTS} times. Cool down for {} ms.",
            self._reconnect_cooldown.as_millis()
        );
        session.connected = false;
        session.cooldown_until = Some(Instant::now() + self._reconnect_cooldown);

        Err(PlcError::NotConnected)
    }

    /// Make sure the session is open. Reconnect once if not.
    fn ensure_connected(&self, session: &mut PlcSession) -> Result<(), PlcError> {
        if session.connected && session.transport.is_connected() {
            return Ok(());
        }

        self.reconnect(session)
    }

    /// Read the value.
    ///
    /// # Arguments
    /// * `address` - Address of the value. Bit address for the bool.
    ///
    /// # Returns
    /// Value read.
    ///
    /// # Errors
    /// If the client is not connected or the transport fails.
    pub fn read<T: PlcValue>(&self, address: &PlcAddress) -> Result<T, PlcError> {
        if T::IS_BIT != address.is_bit() {
            return Err(PlcError::InvalidAddress(address.to_string()));
        }

        let mut session = self.lock();
        self.ensure_connected(&mut session)?;

        let result = session.transport.read_area(
            address.area(),
            address.db_number(),
            address.byte_offset(),
            T::SIZE,
        );
        match result {
            Ok(bytes) if bytes.len() >= T::SIZE => {
                if T::IS_BIT {
                    let bit = (bytes[0] >> address.bit_offset()) & 0x01;
                    Ok(T::from_be_slice(&[bit]))
                } else {
                    Ok(T::from_be_slice(&bytes))
                }
            }
            Ok(bytes) => {
                let error = PlcError::Protocol {
                    address: address.to_string(),
                    message: format!("expect {} bytes but get {}", T::SIZE, bytes.len()),
                };
                error!("PLC read failed: {error}.");

                Err(error)
            }
            Err(io_error) => Err(Self::handle_transport_error(
                &mut session,
                address,
                io_error,
                "read",
            )),
        }
    }

    /// Write the value.
    ///
    /// # Arguments
    /// * `address` - Address of the value. Bit address for the bool.
    /// * `value` - Value to write.
    ///
    /// # Errors
    /// If the client is not connected or the transport fails.
    pub fn write<T: PlcValue>(&self, address: &PlcAddress, value: T) -> Result<(), PlcError> {
        if T::IS_BIT != address.is_bit() {
            return Err(PlcError::InvalidAddress(address.to_string()));
        }

        let mut session = self.lock();
        self.ensure_connected(&mut session)?;

        let bytes = value.to_be_vec();
        let result = if T::IS_BIT {
            session.transport.write_bit(
                address.area(),
                address.db_number(),
                address.byte_offset(),
                address.bit_offset() as u8,
                bytes[0] != 0,
            )
        } else {
            session.transport.write_area(
                address.area(),
                address.db_number(),
                address.byte_offset(),
                &bytes,
            )
        };

        result.map_err(|io_error| {
            Self::handle_transport_error(&mut session, address, io_error, "write")
        })
    }

    /// Classify the transport error. The session is marked as disconnected
    /// unless the address is the problem.
    fn handle_transport_error(
        session: &mut PlcSession,
        address: &PlcAddress,
        io_error: io::Error,
        operation: &str,
    ) -> PlcError {
        let error = match io_error.kind() {
            io::ErrorKind::InvalidInput => PlcError::AddressOutOfRange(address.to_string()),
            io::ErrorKind::InvalidData => PlcError::Protocol {
                address: address.to_string(),
                message: io_error.to_string(),
            },
            _ => {
                session.connected = false;
                PlcError::Io {
                    address: address.to_string(),
                    message: io_error.to_string(),
                }
            }
        };

        error!("PLC {operation} failed: {error}.");

        error
    }

    pub fn read_bool(&self, address: &PlcAddress) -> Result<bool, PlcError> {
        self.read(address)
    }

    pub fn read_word(&self, address: &PlcAddress) -> Result<u16, PlcError> {
        self.read(address)
    }

    pub fn read_int(&self, address: &PlcAddress) -> Result<i16, PlcError> {
        self.read(address)
    }

    pub fn read_real(&self, address: &PlcAddress) -> Result<f32, PlcError> {
        self.read(address)
    }

    pub fn read_dword(&self, address: &PlcAddress) -> Result<u32, PlcError> {
        self.read(address)
    }

    pub fn write_bool(&self, address: &PlcAddress, value: bool) -> Result<(), PlcError> {
        self.write(address, value)
    }

    pub fn write_word(&self, address: &PlcAddress, value: u16) -> Result<(), PlcError> {
        self.write(address, value)
    }

    pub fn write_int(&self, address: &PlcAddress, value: i16) -> Result<(), PlcError> {
        self.write(address, value)
    }

    pub fn write_real(&self, address: &PlcAddress, value: f32) -> Result<(), PlcError> {
        self.write(address, value)
    }

    pub fn write_dword(&self, address: &PlcAddress, value: u32) -> Result<(), PlcError> {
        self.write(address, value)
    }

    /// Read multiple values. Each address is read separately.
    ///
    /// # Arguments
    /// * `addresses` - Addresses of the values.
    ///
    /// # Returns
    /// Results in the same order as the addresses.
    pub fn read_multiple<T: PlcValue>(&self, addresses: &[PlcAddress]) -> Vec<Result<T, PlcError>> {
        addresses.iter().map(|address| self.read(address)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::Ordering;

    use crate::enums::PlcArea;
    use crate::mock::mock_plc_transport::MockPlcTransport;

    fn create_client() -> (PlcClient, MockPlcTransport) {
        let transport = MockPlcTransport::new();
        let client = PlcClient::with_policy(
            Box::new(transport.clone()),
            Duration::from_millis(1),
            Duration::from_millis(200),
        );

        (client, transport)
    }

    #[test]
    fn test_connect() {
        let (client, _) = create_client();

        assert!(!client.is_connected());

        assert!(client.connect("127.0.0.1", 102));
        assert!(client.is_connected());

        client.disconnect();
        assert!(!client.is_connected());
    }

    #[test]
    fn test_connect_offline() {
        let (client, transport) = create_client();
        transport.set_online(false);

        assert!(!client.connect("127.0.0.1", 102));
        assert!(!client.is_connected());
    }

    #[test]
    fn test_read_write_bool() {
        let (client, _) = create_client();
        client.connect("127.0.0.1", 102);

        let address = PlcAddress::db_bit(1, 2, 4);
        let neighbor = PlcAddress::db_bit(1, 2, 5);

        client.write_bool(&address, true).unwrap();

        assert!(client.read_bool(&address).unwrap());
        assert!(!client.read_bool(&neighbor).unwrap());

        client.write_bool(&address, false).unwrap();

        assert!(!client.read_bool(&address).unwrap());
    }

    #[test]
    fn test_read_write_real() {
        let (client, _) = create_client();
        client.connect("127.0.0.1", 102);

        let address = PlcAddress::db_value(2, 8, 4);
        for value in [1.5e-3_f32, -273.15, f32::MAX, f32::MIN_POSITIVE] {
            client.write_real(&address, value).unwrap();

            assert_eq!(client.read_real(&address).unwrap().to_bits(), value.to_bits());
        }
    }

    #[test]
    fn test_read_write_word() {
        let (client, transport) = create_client();
        client.connect("127.0.0.1", 102);

        let address = PlcAddress::value(PlcArea::Memory, 10, 2);
        client.write_word(&address, 0x1234).unwrap();

        assert_eq!(client.read_word(&address).unwrap(), 0x1234);
        // Big-endian
        assert_eq!(transport.get_bytes(PlcArea::Memory, 0, 10, 2), vec![0x12, 0x34]);

        client.write_int(&address, -2).unwrap();

        assert_eq!(client.read_int(&address).unwrap(), -2);

        let address = PlcAddress::value(PlcArea::Memory, 20, 4);
        client.write_dword(&address, 0xDEADBEEF).unwrap();

        assert_eq!(client.read_dword(&address).unwrap(), 0xDEADBEEF);
    }

    #[test]
    fn test_read_bit_mismatch() {
        let (client, _) = create_client();
        client.connect("127.0.0.1", 102);

        assert_eq!(
            client.read_word(&PlcAddress::db_bit(1, 0, 0)),
            Err(PlcError::InvalidAddress(String::from("DB1.DBX0.0")))
        );
        assert!(client
            .write_bool(&PlcAddress::db_value(1, 0, 2), true)
            .is_err());
    }

    #[test]
    fn test_read_out_of_range() {
        let (client, _) = create_client();
        client.connect("127.0.0.1", 102);

        let address = PlcAddress::value(PlcArea::Memory, 100_000, 2);

        assert_eq!(
            client.read_word(&address),
            Err(PlcError::AddressOutOfRange(String::from("%MW100000")))
        );

        // The session is kept.
        assert!(client.is_connected());
    }

    #[test]
    fn test_read_multiple() {
        let (client, _) = create_client();
        client.connect("127.0.0.1", 102);

        let addresses = [PlcAddress::db_bit(1, 0, 0), PlcAddress::db_bit(1, 0, 1)];
        client.write_bool(&addresses[1], true).unwrap();

        let values: Vec<Result<bool, PlcError>> = client.read_multiple(&addresses);

        assert_eq!(values, vec![Ok(false), Ok(true)]);
    }

    #[test]
    fn test_transport_failure_marks_disconnected() {
        let (client, transport) = create_client();
        client.connect("127.0.0.1", 102);

        transport.set_online(false);

        let address = PlcAddress::db_bit(1, 0, 0);
        assert!(client.read_bool(&address).is_err());
        assert!(!client.is_connected());

        // Back online and the next read reconnects.
        transport.set_online(true);

        assert_eq!(client.read_bool(&address), Ok(false));
        assert!(client.is_connected());
    }

    #[test]
    fn test_attempt_reconnect_cooldown() {
        let (client, transport) = create_client();
        client.connect("127.0.0.1", 102);
        transport.set_online(false);
        client.disconnect();

        let count_before = transport.connect_count.load(Ordering::Relaxed);

        assert_eq!(client.attempt_reconnect(), Err(PlcError::NotConnected));
        assert_eq!(
            transport.connect_count.load(Ordering::Relaxed) - count_before,
            MAX_RECONNECT_ATTEMPTS as usize
        );

        // In the cooldown, no attempt is made.
        assert_eq!(client.attempt_reconnect(), Err(PlcError::Cooldown));
        assert_eq!(
            transport.connect_count.load(Ordering::Relaxed) - count_before,
            MAX_RECONNECT_ATTEMPTS as usize
        );

        // After the cooldown, the counter is reset.
        sleep(Duration::from_millis(250));
        transport.set_online(true);

        assert_eq!(client.attempt_reconnect(), Ok(()));
        assert!(client.is_connected());
    }

    #[test]
    fn test_attempt_reconnect_never_connected() {
        let (client, _) = create_client();

        assert_eq!(client.attempt_reconnect(), Err(PlcError::NotConnected));
    }
}
