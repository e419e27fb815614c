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
use serde_json::Value;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::sleep;
use std::time::Duration;

/// Line-based TCP server that serves one client at a time.
pub struct TcpServer {
    _name: String,
    _listener: TcpListener,
    _reader: Option<BufReader<TcpStream>>,
    _writer: Option<BufWriter<TcpStream>>,
    // Timeout in milliseconds.
    pub timeout: u64,
    // Buffer of the partially received message.
    _buffer: Vec<u8>,
    // Terminator of the message.
    _terminator: Vec<u8>,
    // Stop the server.
    _stop: Arc<AtomicBool>,
    // The server is connected or not.
    _is_connected: Arc<AtomicBool>,
}

impl TcpServer {
    /// Create a new TcpServer instance.
    ///
    /// # Arguments
    /// * `name` - Name of the server.
    /// * `address` - Address to bind in "host:port". Use the port 0 to let
    /// the OS choose the port number.
    /// * `timeout` - Timeout in milliseconds.
    /// * `terminator` - Terminator of the message.
    /// * `stop` - Flag to stop the server.
    ///
    /// # Returns
    /// A TcpServer instance.
    ///
    /// # Errors
    /// If the address can not be bound.
    pub fn new(
        name: &str,
        address: &str,
        timeout: u64,
        terminator: &[u8],
        stop: &Arc<AtomicBool>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(address)?;
        listener.set_nonblocking(true)?;

        const DEFAULT_BUFFER_SIZE: usize = 100;

        Ok(Self {
            _name: String::from(name),

            _listener: listener,
            _reader: None,
            _writer: None,
            timeout: timeout,

            _buffer: Vec::with_capacity(DEFAULT_BUFFER_SIZE),
            _terminator: terminator.to_vec(),

            _stop: stop.clone(),
            _is_connected: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get the port number.
    ///
    /// # Returns
    /// Port number. If the port number is not available, return -1.
    pub fn get_port(&self) -> i32 {
        match self._listener.local_addr() {
            Ok(addr) => addr.port() as i32,
            Err(_) => -1,
        }
    }

    /// Accept a connection.
    ///
    /// # Returns
    /// True if a connection is accepted. Otherwise, false.
    fn accept(&mut self) -> bool {
        if let Ok((stream, peer_addr)) = self._listener.accept() {
            let cloned = stream
                .set_nodelay(true)
                .and_then(|_| stream.set_nonblocking(true))
                .and_then(|_| stream.try_clone());

            match cloned {
                Ok(stream_read) => {
                    info!("{} is connected from {}.", self._name, peer_addr);

                    self._buffer.clear();
                    self._reader = Some(BufReader::new(stream_read));
                    self._writer = Some(BufWriter::new(stream));

                    self._is_connected.store(true, Ordering::Relaxed);

                    return true;
                }
                Err(error) => {
                    info!("{} fails to set up the connection: {error}.", self._name);
                }
            }
        };

        false
    }

    /// Check if the server is connected.
    fn is_connected(&self) -> bool {
        self._reader.is_some() && self._writer.is_some()
    }

    /// Get the reference to the connection status. This is useful to check the
    /// connection status in a separate thread.
    ///
    /// # Returns
    /// Connection status.
    pub fn get_connection_status_reference(&self) -> Arc<AtomicBool> {
        self._is_connected.clone()
    }

    /// Read the JSON data.
    ///
    /// # Returns
    /// JSON data. Null if there is no complete message or it is not JSON.
    pub fn read_json(&mut self) -> Value {
        let data = self.read_string();
        match serde_json::from_str(&data) {
            Ok(value) => value,
            Err(_) => {
                if !data.is_empty() {
                    info!("{} receives non-JSON message: {}.", self._name, data);
                }
                Value::Null
            }
        }
    }

    /// Read the string data. The incomplete message is kept in the buffer
    /// until the terminator arrives.
    ///
    /// # Returns
    /// Message without the terminator, or an empty string.
    fn read_string(&mut self) -> String {
        let mut is_complete = false;
        let mut is_disconnected = false;
        if let Some(stream) = self._reader.as_mut() {
            let mut byte = [0; 1];
            loop {
                match stream.read(&mut byte) {
                    Ok(0) => {
                        debug!(
                            "{} is disconnected from the client when reading.",
                            self._name
                        );
                        is_disconnected = true;
                        break;
                    }

                    Ok(_) => {
                        self._buffer.push(byte[0]);
                        if self._buffer.ends_with(&self._terminator) {
                            is_complete = true;
                            break;
                        }
                    }

                    Err(_) => {
                        break;
                    }
                }
            }
        }

        if is_disconnected {
            self.close_stream();
        }

        if !is_complete {
            return String::new();
        }

        let length = self._buffer.len() - self._terminator.len();
        let message = String::from_utf8(self._buffer[..length].to_vec()).unwrap_or_default();
        self._buffer.clear();

        if !message.is_empty() {
            debug!("{} receives: {}.", self._name, message);
        }

        message
    }

    /// Write the JSON item.
    ///
    /// # Arguments
    /// * `item` - JSON data.
    pub fn write_json(&mut self, item: &Value) {
        self.write_string(item.to_string());
        self.flush();
    }

    /// Write the JSON items.
    ///
    /// # Arguments
    /// * `items` - JSON data.
    pub fn write_jsons(&mut self, items: &[Value]) {
        for item in items {
            self.write_string(item.to_string());
        }
        self.flush();
    }

    /// Write the string data to buffer.
    ///
    /// # Arguments
    /// * `data` - Data.
    fn write_string(&mut self, data: String) {
        if let Some(stream) = self._writer.as_mut() {
            let mut data_with_terminator = data.into_bytes();
            data_with_terminator.extend_from_slice(&self._terminator);

            // Ignore the possible error.
            let _ = stream.write(&data_with_terminator);
        }
    }

    /// Flush the stream.
    fn flush(&mut self) {
        let mut is_broken = false;
        if let Some(stream) = self._writer.as_mut() {
            loop {
                match stream.flush() {
                    Ok(_) => break,
                    Err(error) if error.kind() == ErrorKind::WouldBlock => {
                        // The replies are small. Wait for the socket buffer.
                        sleep(Duration::from_millis(1));
                    }
                    Err(error) => {
                        debug!(
                            "{} fails to flush the stream: {}. Disconnecting...",
                            self._name, error
                        );
                        is_broken = true;
                        break;
                    }
                }
            }
        }

        if is_broken {
            self.close_stream();
        }
    }

    /// Close the stream.
    fn close_stream(&mut self) {
        info!("{} is disconnected.", self._name);

        if let Some(stream) = self._writer.as_mut() {
            let _ = stream.flush();
        }

        if let Some(stream) = self._reader.as_ref() {
            let _ = stream.get_ref().shutdown(Shutdown::Both);
        }

        self._reader = None;
        self._writer = None;
        self._buffer.clear();

        self._is_connected.store(false, Ordering::Relaxed);
    }

    /// Run the server.
    ///
    /// # Arguments
    /// * `callback_periodic` - Periodic callback that is called once the
    /// server is connected.
    /// * `callback_first_time` - Optional callback that is called when a new
    /// connection is accepted.
    /// * `other` - Other data used in the callback functions.
    pub fn run<F1, F2, T>(
        &mut self,
        mut callback_periodic: F1,
        mut callback_first_time: Option<F2>,
        other: &mut T,
    ) where
        F1: FnMut(&mut TcpServer, &mut T),
        F2: FnMut(&mut TcpServer, &mut T),
    {
        info!("{} is running on port {}.", self._name, self.get_port());
        while !self._stop.load(Ordering::Relaxed) {
            if self.is_connected() {
                callback_periodic(self, other);
            } else if self.accept() {
                if let Some(ref mut callback) = callback_first_time {
                    callback(self, other);
                }
            } else {
                sleep(Duration::from_millis(self.timeout));
            }
        }

        if self.is_connected() {
            self.close_stream();
        }

        info!("{} is stopped.", self._name);
    }
}
