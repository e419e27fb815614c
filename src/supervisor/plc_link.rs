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

use log::{info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::plc::plc_address::PlcAddress;
use crate::plc::plc_client::PlcClient;
use crate::supervisor::connection_supervisor::SupervisedLinks;

/// Link of the vacuum device to the PLC.
pub struct PlcLink {
    _name: String,
    _client: Arc<PlcClient>,
    _ip: String,
    _port: u16,
    // Point read that checks the session.
    _heartbeat: PlcAddress,
    _connection_healthy: AtomicBool,
    // Commanded outputs should be re-asserted after the reconnection.
    _reassert_pending: AtomicBool,
}

impl PlcLink {
    /// Create a new link.
    ///
    /// # Arguments
    /// * `name` - Name of the owner device.
    /// * `client` - PLC client shared with the device.
    /// * `ip` - IP of the PLC.
    /// * `port` - Port of the PLC.
    /// * `heartbeat` - Bit address read to check the session.
    pub fn new(name: &str, client: &Arc<PlcClient>, ip: &str, port: u16, heartbeat: PlcAddress) -> Self {
        Self {
            _name: String::from(name),
            _client: client.clone(),
            _ip: String::from(ip),
            _port: port,
            _heartbeat: heartbeat,
            _connection_healthy: AtomicBool::new(client.is_connected()),
            _reassert_pending: AtomicBool::new(false),
        }
    }

    /// Connection is healthy or not. This never does any I/O.
    pub fn is_healthy(&self) -> bool {
        self._connection_healthy.load(Ordering::Relaxed)
    }

    /// Take the pending re-assert flag.
    ///
    /// # Returns
    /// The re-assert was pending or not.
    pub fn take_reassert_pending(&self) -> bool {
        self._reassert_pending.swap(false, Ordering::Relaxed)
    }

    /// Connect the PLC now. Used by the explicit connect command.
    ///
    /// # Returns
    /// True if connected.
    pub fn connect(&self) -> bool {
        let is_connected = self._client.connect(&self._ip, self._port);
        self.update_health();

        is_connected
    }

    /// Disconnect the PLC. The supervisor reconnects it in the next cycle
    /// that the interval allows.
    pub fn disconnect(&self) {
        self._client.disconnect();
        self.update_health();
    }
}

impl SupervisedLinks for PlcLink {
    fn name(&self) -> &str {
        &self._name
    }

    fn ping_links(&self) {
        if !self._client.is_connected() {
            return;
        }

        // A failed read marks the session as disconnected.
        if let Err(error) = self._client.read_bool(&self._heartbeat) {
            warn!("{}: PLC heartbeat read failed: {error}.", self._name);
        }
    }

    fn has_missing_links(&self) -> bool {
        !self._client.is_connected()
    }

    fn rebuild_links(&self) {
        if self._client.connect(&self._ip, self._port) {
            info!("{}: PLC link is rebuilt.", self._name);
            self._reassert_pending.store(true, Ordering::Relaxed);
        }
    }

    fn update_health(&self) -> bool {
        let is_healthy = self._client.is_connected();
        self._connection_healthy.store(is_healthy, Ordering::Relaxed);

        is_healthy
    }
}
