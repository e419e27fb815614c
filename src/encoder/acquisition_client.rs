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

use log::{debug, info, warn};
use std::io::{ErrorKind, Read};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};
use std::thread::{sleep, spawn, JoinHandle};
use std::time::{Duration, Instant};

use crate::constants::{ENCODER_RECV_TIMEOUT_MS, RECONNECT_DELAY_MS, SUPERVISOR_CONNECT_TIMEOUT_MS};
use crate::encoder::encoder_reading::EncoderReading;
use crate::encoder::frame_parser::{EncoderFrame, FrameParser};

// Sleep slice while waiting to reconnect, so the stop is noticed quickly.
const RECONNECT_SLEEP_SLICE_MS: u64 = 50;
const RECEIVE_BUFFER_SIZE: usize = 256;

/// Channel table shared by the acquisition clients and the readers.
pub type ChannelTable = Arc<Mutex<Vec<EncoderReading>>>;

/// Configuration of a collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub ip: String,
    pub port: u16,
    // Global channel of the local channel 0.
    pub channel_offset: usize,
    pub channel_count: usize,
}

impl ChannelConfig {
    /// Map the local channel to the global channel.
    ///
    /// # Arguments
    /// * `local_channel` - Local channel of the collector.
    ///
    /// # Returns
    /// Global channel. None if the local channel is not owned by this
    /// collector.
    pub fn global_channel(&self, local_channel: usize) -> Option<usize> {
        if local_channel < self.channel_count {
            Some(self.channel_offset + local_channel)
        } else {
            None
        }
    }
}

/// Acquisition client of a collector. It owns one worker thread and one TCP
/// socket.
pub struct AcquisitionClient {
    _config: ChannelConfig,
    _table: ChannelTable,
    _running: Arc<AtomicBool>,
    _connected: Arc<AtomicBool>,
    // Number of the delivered frames.
    _frame_count: Arc<AtomicU64>,
    _handle: Option<JoinHandle<()>>,
}

impl AcquisitionClient {
    /// Create a new acquisition client.
    ///
    /// # Arguments
    /// * `config` - Configuration of the collector.
    /// * `table` - Shared channel table.
    ///
    /// # Returns
    /// New instance of the acquisition client. The worker is not started.
    pub fn new(config: ChannelConfig, table: &ChannelTable) -> Self {
        Self {
            _config: config,
            _table: table.clone(),
            _running: Arc::new(AtomicBool::new(false)),
            _connected: Arc::new(AtomicBool::new(false)),
            _frame_count: Arc::new(AtomicU64::new(0)),
            _handle: None,
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self._config
    }

    /// The socket is connected or not.
    pub fn is_connected(&self) -> bool {
        self._connected.load(Ordering::Relaxed)
    }

    /// The worker is running or not.
    pub fn is_running(&self) -> bool {
        self._handle.is_some()
    }

    /// Number of the delivered frames.
    pub fn frame_count(&self) -> u64 {
        self._frame_count.load(Ordering::Relaxed)
    }

    /// Start the worker. Do nothing if it is already running.
    pub fn start(&mut self) {
        if self._handle.is_some() {
            return;
        }

        self._running.store(true, Ordering::Relaxed);

        let worker = AcquisitionWorker {
            config: self._config.clone(),
            table: self._table.clone(),
            running: self._running.clone(),
            connected: self._connected.clone(),
            frame_count: self._frame_count.clone(),
        };
        self._handle = Some(spawn(move || worker.run()));
    }

    /// Stop the worker and wait for it. The socket is closed by the worker.
    pub fn stop(&mut self) {
        self._running.store(false, Ordering::Relaxed);

        if let Some(handle) = self._handle.take() {
            if handle.join().is_err() {
                warn!(
                    "Acquisition worker of {}:{} panicked.",
                    self._config.ip, self._config.port
                );
            }
        }
    }
}

impl Drop for AcquisitionClient {
    fn drop(&mut self) {
        self.stop();
    }
}

struct AcquisitionWorker {
    config: ChannelConfig,
    table: ChannelTable,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    frame_count: Arc<AtomicU64>,
}

impl AcquisitionWorker {
    fn run(&self) {
        let name = format!("{}:{}", self.config.ip, self.config.port);
        info!("Acquisition worker of {name} is running.");

        let mut parser = FrameParser::new();
        let mut stream: Option<TcpStream> = None;
        let mut buffer = [0; RECEIVE_BUFFER_SIZE];
        let mut is_failure_logged = false;

        while self.running.load(Ordering::Relaxed) {
            if stream.is_none() {
                match self.open_socket() {
                    Ok(socket) => {
                        info!("Encoder collector {name} is connected.");
                        is_failure_logged = false;

                        parser.clear();
                        self.connected.store(true, Ordering::Relaxed);
                        stream = Some(socket);
                    }
                    Err(error) => {
                        if !is_failure_logged {
                            warn!("Failed to connect the encoder collector {name}: {error}.");
                            is_failure_logged = true;
                        }
                        self.wait_reconnect();
                    }
                }
                continue;
            }

            let Some(socket) = stream.as_mut() else {
                continue;
            };

            match socket.read(&mut buffer) {
                Ok(0) => {
                    info!("Encoder collector {name} closed the connection.");
                    Self::close(&mut stream);
                    self.connected.store(false, Ordering::Relaxed);
                }
                Ok(size) => {
                    for frame in parser.push(&buffer[..size]) {
                        self.deliver(&frame);
                    }
                }
                Err(error)
                    if error.kind() == ErrorKind::WouldBlock
                        || error.kind() == ErrorKind::TimedOut => {}
                Err(error) => {
                    warn!("Encoder collector {name} is disconnected: {error}.");
                    Self::close(&mut stream);
                    self.connected.store(false, Ordering::Relaxed);
                }
            }
        }

        Self::close(&mut stream);
        self.connected.store(false, Ordering::Relaxed);

        info!("Acquisition worker of {name} is stopped.");
    }

    fn open_socket(&self) -> std::io::Result<TcpStream> {
        let address = (self.config.ip.as_str(), self.config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::new(ErrorKind::AddrNotAvailable, "no address"))?;

        let socket =
            TcpStream::connect_timeout(&address, Duration::from_millis(SUPERVISOR_CONNECT_TIMEOUT_MS))?;
        socket.set_read_timeout(Some(Duration::from_millis(ENCODER_RECV_TIMEOUT_MS)))?;
        socket.set_nodelay(true)?;

        Ok(socket)
    }

    fn wait_reconnect(&self) {
        let mut waited = 0;
        while waited < RECONNECT_DELAY_MS && self.running.load(Ordering::Relaxed) {
            sleep(Duration::from_millis(RECONNECT_SLEEP_SLICE_MS));
            waited += RECONNECT_SLEEP_SLICE_MS;
        }
    }

    fn close(stream: &mut Option<TcpStream>) {
        if let Some(socket) = stream.take() {
            let _ = socket.shutdown(Shutdown::Both);
        }
    }

    /// Deliver the frame to the channel table.
    fn deliver(&self, frame: &EncoderFrame) {
        let global_channel = match self.config.global_channel(frame.channel as usize) {
            Some(channel) => channel,
            None => {
                debug!("Drop the frame of unknown channel {}.", frame.channel);
                return;
            }
        };

        let mut table = self
            .table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(reading) = table.get_mut(global_channel) {
            *reading = EncoderReading::decode(frame.raw, Instant::now());
            self.frame_count.fetch_add(1, Ordering::Relaxed);
        }
    }
}
