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

use log::{error, info};
use std::io;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::sync_channel,
    Arc,
};
use std::thread::{spawn, JoinHandle};
use std::time::Duration;

use crate::command::command_schema::CommandSchema;
use crate::constants::{BOUND_SYNC_CHANNEL, SERVER_TIMEOUT_MS, TERMINATOR};
use crate::device::device::{Device, DeviceProcess};
use crate::interface::command_server::CommandServer;
use crate::interface::tcp_server::TcpServer;

/// Device served on a TCP/IP port. One thread runs the TCP/IP server and
/// another one owns the device.
pub struct DeviceServer {
    _name: String,
    _port: i32,
    // Stop the threads.
    _stop: Arc<AtomicBool>,
    // Connection status of the TCP/IP server.
    _connection: Arc<AtomicBool>,
    _handles: Vec<JoinHandle<()>>,
}

impl DeviceServer {
    /// Start to serve the device.
    ///
    /// # Arguments
    /// * `name` - Name of the server.
    /// * `address` - Address to bind in "host:port". The port 0 lets the OS
    /// choose one.
    /// * `device` - Device after the initialization.
    /// * `command_schema` - Command schema of the device.
    /// * `stop` - Flag to stop the server.
    /// * `loop_time` - Period of the device hook.
    ///
    /// # Returns
    /// Running server.
    ///
    /// # Errors
    /// If the address can not be bound.
    pub fn start<D: Device + 'static>(
        name: &str,
        address: &str,
        device: D,
        command_schema: CommandSchema<D>,
        stop: &Arc<AtomicBool>,
        loop_time: Duration,
    ) -> io::Result<Self> {
        let (sender_from_tcp, receiver_from_tcp) = sync_channel(BOUND_SYNC_CHANNEL);

        let mut command_server = CommandServer::new(&sender_from_tcp);
        command_server.register(&command_schema.names(&device));
        let sender_to_tcp = command_server.get_sender_to_tcp();

        let mut tcp_server = TcpServer::new(
            &format!("{name} CommandServer"),
            address,
            SERVER_TIMEOUT_MS,
            TERMINATOR,
            stop,
        )?;
        let port = tcp_server.get_port();
        let connection = tcp_server.get_connection_status_reference();

        let handle_tcp = spawn(move || {
            tcp_server.run(
                CommandServer::process_command,
                Some(CommandServer::process_first_connection),
                &mut command_server,
            );
        });

        let process = DeviceProcess::new(
            device,
            command_schema,
            receiver_from_tcp,
            &sender_to_tcp,
            stop,
            loop_time,
        );
        let handle_device = spawn(move || {
            process.run();
        });

        info!("{name} is served on port {port}.");

        Ok(Self {
            _name: String::from(name),
            _port: port,
            _stop: stop.clone(),
            _connection: connection,
            _handles: vec![handle_tcp, handle_device],
        })
    }

    pub fn port(&self) -> i32 {
        self._port
    }

    /// A client is connected or not.
    pub fn is_connected(&self) -> bool {
        self._connection.load(Ordering::Relaxed)
    }

    /// Stop the threads and wait for them.
    pub fn stop(&mut self) {
        self._stop.store(true, Ordering::Relaxed);

        for handle in self._handles.drain(..) {
            if handle.join().is_err() {
                error!("Thread of {} panicked.", self._name);
            }
        }
    }
}

impl Drop for DeviceServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::TcpStream;
    use std::path::Path;
    use std::thread::sleep;

    use crate::command::command_encoder::create_encoder_command_schema;
    use crate::constants::LOCAL_HOST;
    use crate::device::encoder_device::{EncoderConfig, EncoderDevice};
    use crate::utility::{client_read_json, client_read_result, client_write_and_sleep};

    const SLEEP_TIME: u64 = 100;

    fn create_server() -> (DeviceServer, Arc<AtomicBool>) {
        let config = EncoderConfig::new(Path::new("config/nonexistent.yaml"));
        let device = EncoderDevice::new("encoder", &config, true);

        let stop = Arc::new(AtomicBool::new(false));
        let server = DeviceServer::start(
            "encoder",
            &format!("{LOCAL_HOST}:0"),
            device,
            create_encoder_command_schema(),
            &stop,
            Duration::from_millis(SLEEP_TIME),
        )
        .unwrap();

        (server, stop)
    }

    fn create_client(port: i32) -> TcpStream {
        let client = TcpStream::connect(format!("{LOCAL_HOST}:{port}"))
            .expect("Tcp stream should connect.");
        sleep(Duration::from_millis(SLEEP_TIME));

        client
    }

    #[test]
    fn test_request() {
        let (mut server, _) = create_server();
        let mut client = create_client(server.port());

        assert!(server.is_connected());

        client_write_and_sleep(
            &mut client,
            "{\"id\": \"cmd_ping\", \"sequence_id\": 1}\r\n",
            SLEEP_TIME,
        );

        assert_eq!(
            client_read_json(&mut client, TERMINATOR)["id"],
            "ack"
        );
        assert_eq!(
            client_read_result(&mut client, TERMINATOR, 1)["id"],
            "success"
        );

        client_write_and_sleep(
            &mut client,
            "{\"id\": \"attr_state\", \"sequence_id\": 2}\r\n",
            SLEEP_TIME,
        );

        assert_eq!(
            client_read_result(&mut client, TERMINATOR, 2)["value"],
            "On"
        );

        server.stop();
    }

    #[test]
    fn test_unregistered_request() {
        let (mut server, _) = create_server();
        let mut client = create_client(server.port());

        client_write_and_sleep(
            &mut client,
            "{\"id\": \"cmd_unknown\", \"sequence_id\": 1}\r\n",
            SLEEP_TIME,
        );

        assert_eq!(
            client_read_json(&mut client, TERMINATOR)["id"],
            "noack"
        );

        server.stop();
    }

    #[test]
    fn test_stop() {
        let (mut server, stop) = create_server();

        server.stop();

        assert!(stop.load(Ordering::Relaxed));
        assert!(server._handles.is_empty());
    }
}
