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
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::{
    atomic::{AtomicI64, AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
};
use std::time::{Duration, Instant};

use crate::constants::{PROXY_CALL_TIMEOUT_MS, TERMINATOR};
use crate::enums::LinkRole;
use crate::error::DeviceError;
use crate::motion::proxy::{EncoderProxy, MotionProxy, ProxyFactory};
use crate::utility::{get_message_name, get_message_sequence_id};

/// Handle to a device server that speaks the line-delimited JSON protocol.
/// Each handle owns one socket.
pub struct JsonTcpProxy {
    _name: String,
    _address: String,
    _stream: Mutex<Option<BufReader<TcpStream>>>,
    _timeout_ms: AtomicU64,
    _sequence_id: AtomicI64,
}

impl JsonTcpProxy {
    /// Create a new proxy. The socket is opened on the first call.
    ///
    /// # Arguments
    /// * `name` - Name of the handle.
    /// * `address` - Address of the device server in "host:port".
    /// * `timeout_ms` - Call timeout in milliseconds.
    ///
    /// # Returns
    /// New instance of the proxy.
    pub fn new(name: &str, address: &str, timeout_ms: u64) -> Self {
        Self {
            _name: String::from(name),
            _address: String::from(address),
            _stream: Mutex::new(None),
            _timeout_ms: AtomicU64::new(timeout_ms),
            _sequence_id: AtomicI64::new(0),
        }
    }

    fn stream(&self) -> MutexGuard<'_, Option<BufReader<TcpStream>>> {
        self._stream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self._timeout_ms.load(Ordering::Relaxed).max(1))
    }

    fn transport_failure(&self, message: &str) -> DeviceError {
        DeviceError::TransportFailure(format!("{} ({}): {message}", self._name, self._address))
    }

    /// Open the socket if it is not open.
    fn ensure_stream(&self, slot: &mut Option<BufReader<TcpStream>>) -> Result<(), DeviceError> {
        if slot.is_some() {
            return Ok(());
        }

        let address = self
            ._address
            .to_socket_addrs()
            .map_err(|error| self.transport_failure(&error.to_string()))?
            .next()
            .ok_or_else(|| self.transport_failure("no address"))?;

        let stream = TcpStream::connect_timeout(&address, self.timeout())
            .map_err(|error| self.transport_failure(&error.to_string()))?;
        let _ = stream.set_nodelay(true);

        debug!("{} is connected to {}.", self._name, self._address);
        *slot = Some(BufReader::new(stream));

        Ok(())
    }

    /// Close the socket.
    pub fn close(&self) {
        let mut slot = self.stream();
        if let Some(reader) = slot.take() {
            let _ = reader.get_ref().shutdown(Shutdown::Both);
            info!("{} is disconnected from {}.", self._name, self._address);
        }
    }

    /// Call the command and wait for the result.
    ///
    /// # Arguments
    /// * `command` - Name of the command without the "cmd_" prefix.
    /// * `arguments` - JSON object of the arguments.
    ///
    /// # Returns
    /// Returned value. Null if the command returns nothing.
    ///
    /// # Errors
    /// TransportFailure if the socket fails or the call times out, and
    /// CommandFailed if the device rejects the command.
    pub fn call(&self, command: &str, arguments: Value) -> Result<Value, DeviceError> {
        let mut slot = self.stream();
        self.ensure_stream(&mut slot)?;

        let result = match slot.as_mut() {
            Some(reader) => self.exchange(reader, command, arguments),
            None => Err(self.transport_failure("no socket")),
        };

        // The socket state is unknown after a transport failure.
        if let Err(DeviceError::TransportFailure(_)) = &result {
            if let Some(reader) = slot.take() {
                let _ = reader.get_ref().shutdown(Shutdown::Both);
            }
        }

        result
    }

    fn exchange(
        &self,
        reader: &mut BufReader<TcpStream>,
        command: &str,
        arguments: Value,
    ) -> Result<Value, DeviceError> {
        let timeout = self.timeout();
        let sequence_id = self._sequence_id.fetch_add(1, Ordering::Relaxed);

        let mut message = json!({"id": format!("cmd_{command}"), "sequence_id": sequence_id});
        if let Value::Object(fields) = arguments {
            for (key, value) in fields {
                message[key] = value;
            }
        }

        let stream = reader.get_mut();
        stream
            .set_write_timeout(Some(timeout))
            .and_then(|_| stream.set_read_timeout(Some(timeout)))
            .map_err(|error| self.transport_failure(&error.to_string()))?;

        let mut data = message.to_string().into_bytes();
        data.extend_from_slice(TERMINATOR);
        stream
            .write_all(&data)
            .and_then(|_| stream.flush())
            .map_err(|error| self.transport_failure(&error.to_string()))?;

        let deadline = Instant::now() + timeout;
        let mut line = Vec::new();
        loop {
            if Instant::now() > deadline {
                return Err(self.transport_failure(&format!("{command} timed out")));
            }

            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => return Err(self.transport_failure("connection closed")),
                Ok(_) => {}
                Err(error)
                    if error.kind() == ErrorKind::WouldBlock
                        || error.kind() == ErrorKind::TimedOut =>
                {
                    return Err(self.transport_failure(&format!("{command} timed out")));
                }
                Err(error) => return Err(self.transport_failure(&error.to_string())),
            }

            let text = String::from_utf8_lossy(&line);
            let reply: Value = match serde_json::from_str(text.trim_end()) {
                Ok(reply) => reply,
                Err(_) => continue,
            };

            if get_message_sequence_id(&reply) != sequence_id {
                continue;
            }

            match get_message_name(&reply).as_str() {
                "success" => return Ok(reply["value"].clone()),
                "fail" => {
                    let description = reply["description"].as_str().unwrap_or_default();
                    return Err(match reply["reason"].as_str() {
                        Some("API_NoProxy") => DeviceError::NoProxy(String::from(description)),
                        _ => DeviceError::CommandFailed(format!("{command}: {description}")),
                    });
                }
                "noack" => {
                    return Err(DeviceError::CommandFailed(format!(
                        "{command} is not acknowledged"
                    )))
                }
                _ => continue,
            }
        }
    }

    fn command(&self, command: &str, arguments: Value) -> Result<(), DeviceError> {
        self.call(command, arguments).map(|_| ())
    }
}

fn unexpected(command: &str, value: &Value) -> DeviceError {
    DeviceError::CommandFailed(format!("{command} returns unexpected value {value}"))
}

impl MotionProxy for JsonTcpProxy {
    fn ping(&self) -> Result<(), DeviceError> {
        self.command("ping", json!({}))
    }

    fn timeout_ms(&self) -> u64 {
        self._timeout_ms.load(Ordering::Relaxed)
    }

    fn set_timeout_ms(&self, timeout_ms: u64) {
        self._timeout_ms.store(timeout_ms, Ordering::Relaxed);
    }

    fn move_absolute(&self, axis: i16, position: f64) -> Result<(), DeviceError> {
        self.command("moveAbsolute", json!({"axis": axis, "position": position}))
    }

    fn move_relative(&self, axis: i16, distance: f64) -> Result<(), DeviceError> {
        self.command("moveRelative", json!({"axis": axis, "distance": distance}))
    }

    fn move_zero(&self, axis: i16) -> Result<(), DeviceError> {
        self.command("moveZero", json!({"axis": axis}))
    }

    fn stop_move(&self, axis: i16) -> Result<(), DeviceError> {
        self.command("stopMove", json!({"axis": axis}))
    }

    fn reset(&self, axis: i16) -> Result<(), DeviceError> {
        self.command("reset", json!({"axis": axis}))
    }

    fn read_el(&self, axis: i16) -> Result<i16, DeviceError> {
        let value = self.call("readEL", json!({"axis": axis}))?;
        value
            .as_i64()
            .map(|el| el as i16)
            .ok_or_else(|| unexpected("readEL", &value))
    }

    fn read_org(&self, axis: i16) -> Result<bool, DeviceError> {
        let value = self.call("readOrg", json!({"axis": axis}))?;
        value.as_bool().ok_or_else(|| unexpected("readOrg", &value))
    }

    fn set_struct_parameter(
        &self,
        axis: i16,
        step_angle: f64,
        gear_ratio: f64,
        subdivision: f64,
    ) -> Result<(), DeviceError> {
        self.command(
            "setStructParameter",
            json!({
                "axis": axis,
                "step_angle": step_angle,
                "gear_ratio": gear_ratio,
                "subdivision": subdivision,
            }),
        )
    }

    fn set_encoder_position(&self, axis: i16, position: f64) -> Result<(), DeviceError> {
        self.command("setEncoderPosition", json!({"axis": axis, "position": position}))
    }

    fn write_io(&self, port: i16, value: bool) -> Result<(), DeviceError> {
        self.command("writeIO", json!({"port": port, "value": value}))
    }
}

impl EncoderProxy for JsonTcpProxy {
    fn ping(&self) -> Result<(), DeviceError> {
        self.command("ping", json!({}))
    }

    fn timeout_ms(&self) -> u64 {
        self._timeout_ms.load(Ordering::Relaxed)
    }

    fn set_timeout_ms(&self, timeout_ms: u64) {
        self._timeout_ms.store(timeout_ms, Ordering::Relaxed);
    }

    fn read_encoder(&self, channel: i16) -> Result<f64, DeviceError> {
        let value = self.call("readEncoder", json!({"channel": channel}))?;
        value.as_f64().ok_or_else(|| unexpected("readEncoder", &value))
    }
}

impl Drop for JsonTcpProxy {
    fn drop(&mut self) {
        self.close();
    }
}

/// Factory of the JSON/TCP handles.
pub struct TcpProxyFactory {
    _motion_address: String,
    _encoder_address: String,
}

impl TcpProxyFactory {
    /// Create a new factory.
    ///
    /// # Arguments
    /// * `motion_address` - Address of the motion controller.
    /// * `encoder_address` - Address of the encoder device server.
    pub fn new(motion_address: &str, encoder_address: &str) -> Self {
        Self {
            _motion_address: String::from(motion_address),
            _encoder_address: String::from(encoder_address),
        }
    }

    fn create_and_ping(
        &self,
        role: LinkRole,
        address: &str,
        timeout_ms: u64,
    ) -> Result<Arc<JsonTcpProxy>, DeviceError> {
        let proxy = Arc::new(JsonTcpProxy::new(role.as_ref(), address, timeout_ms));
        MotionProxy::ping(proxy.as_ref())
            .map_err(|error| DeviceError::NoProxy(format!("{}: {error}", role.as_ref())))?;

        proxy._timeout_ms.store(PROXY_CALL_TIMEOUT_MS, Ordering::Relaxed);

        Ok(proxy)
    }
}

impl ProxyFactory for TcpProxyFactory {
    fn create_motion_proxy_and_ping(
        &self,
        role: LinkRole,
        timeout_ms: u64,
    ) -> Result<Arc<dyn MotionProxy>, DeviceError> {
        let proxy = self.create_and_ping(role, &self._motion_address, timeout_ms)?;
        Ok(proxy)
    }

    fn create_encoder_proxy_and_ping(
        &self,
        timeout_ms: u64,
    ) -> Result<Arc<dyn EncoderProxy>, DeviceError> {
        let proxy = self.create_and_ping(LinkRole::Encoder, &self._encoder_address, timeout_ms)?;
        Ok(proxy)
    }
}
