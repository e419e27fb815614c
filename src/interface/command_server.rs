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

use log::info;
use serde_json::Value;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::thread::sleep;
use std::time::Duration;

use crate::constants::BOUND_SYNC_CHANNEL;
use crate::enums::CommandStatus;
use crate::interface::tcp_server::TcpServer;
use crate::utility::{
    acknowledge_command, get_message_name, get_message_sequence_id, is_attribute, is_command,
};

pub struct CommandServer {
    // Sender of the messages to the TCP/IP.
    _sender_to_tcp: SyncSender<Vec<Value>>,
    // Receiver of the messages to the TCP/IP.
    pub receiver_to_tcp: Receiver<Vec<Value>>,
    // Sender of the messages from the TCP/IP.
    pub sender_from_tcp: SyncSender<Value>,
    // Registered commands and attributes.
    _names: Vec<String>,
    // Last sequence ID.
    _last_sequence_id: i64,
}

impl CommandServer {
    /// Create a new command server instance.
    ///
    /// # Arguments
    /// * `sender` - Sender of the messages from the TCP/IP.
    ///
    /// # Returns
    /// Command server.
    pub fn new(sender: &SyncSender<Value>) -> Self {
        let (sender_to_tcp, receiver_to_tcp) = sync_channel(BOUND_SYNC_CHANNEL);

        Self {
            _sender_to_tcp: sender_to_tcp,
            receiver_to_tcp: receiver_to_tcp,

            sender_from_tcp: sender.clone(),

            _names: Vec::new(),

            _last_sequence_id: -1,
        }
    }

    /// Get the sender to the TCP/IP.
    ///
    /// # Returns
    /// Sender.
    pub fn get_sender_to_tcp(&self) -> SyncSender<Vec<Value>> {
        self._sender_to_tcp.clone()
    }

    /// Register the commands and attributes.
    ///
    /// # Arguments
    /// * `names` - Names that begin with "cmd_" or "attr_".
    pub fn register(&mut self, names: &[String]) {
        self._names = names.to_vec();
    }

    /// Check if the command or attribute is registered or not.
    ///
    /// # Arguments
    /// * `name` - Name that begins with "cmd_" or "attr_".
    ///
    /// # Returns
    /// True if registered, false otherwise.
    pub fn is_registered(&self, name: &str) -> bool {
        self._names.iter().any(|registered| registered == name)
    }

    /// Reset the sequence ID.
    pub fn reset_sequence_id(&mut self) {
        self._last_sequence_id = -1;
    }

    /// Check the sequence ID.
    ///
    /// # Arguments
    /// * `sequence_id` - Sequence ID, which should be >= 0.
    ///
    /// # Returns
    /// Lost sequence IDs.
    pub fn check_sequence_id(&mut self, sequence_id: i64) -> Vec<i64> {
        if self._last_sequence_id == -1 {
            self._last_sequence_id = sequence_id;
            return Vec::new();
        }

        let expected_sequence_id = self._last_sequence_id + 1;

        let mut lost_sequence_ids = Vec::new();
        if sequence_id > expected_sequence_id {
            lost_sequence_ids = (expected_sequence_id..sequence_id).collect();
        }

        self._last_sequence_id = sequence_id;

        lost_sequence_ids
    }

    /// Process the request from the TCP/IP and the reply from the device.
    ///
    /// # Arguments
    /// * `tcp_server` - TCP server.
    /// * `command_server` - Command server.
    pub fn process_command(tcp_server: &mut TcpServer, command_server: &mut CommandServer) {
        let mut is_processed = false;

        let message_received = tcp_server.read_json();
        if !message_received.is_null() {
            let name = get_message_name(&message_received);
            let sequence_id = get_message_sequence_id(&message_received);

            if (is_command(&name) || is_attribute(&name)) && command_server.is_registered(&name)
            {
                // For the lost sequence IDs, send a NoAck.
                let lost_sequence_ids = command_server.check_sequence_id(sequence_id);
                for lost_sequence_id in lost_sequence_ids {
                    tcp_server
                        .write_json(&acknowledge_command(CommandStatus::NoAck, lost_sequence_id));
                }

                tcp_server.write_json(&acknowledge_command(CommandStatus::Ack, sequence_id));

                match command_server.sender_from_tcp.try_send(message_received) {
                    Ok(_) => {}
                    Err(TrySendError::Full(message)) => {
                        info!("Request queue is full. Drop {message}.");
                        tcp_server
                            .write_json(&acknowledge_command(CommandStatus::NoAck, sequence_id));
                    }
                    // The device is stopping.
                    Err(TrySendError::Disconnected(_)) => {}
                }
            } else {
                info!("Invalid request: {message_received}.");
                tcp_server.write_json(&acknowledge_command(CommandStatus::NoAck, sequence_id));
            }

            is_processed = true;
        }

        // Send the results of the device to the TCP/IP.
        while let Ok(message_send) = command_server.receiver_to_tcp.try_recv() {
            tcp_server.write_jsons(&message_send);

            is_processed = true;
        }

        // Avoid the busy waiting if nothing is received or sent.
        if !is_processed {
            sleep(Duration::from_millis(tcp_server.timeout));
        }
    }

    /// Process the first connection.
    ///
    /// # Arguments
    /// * `tcp_server` - TCP server.
    /// * `command_server` - Command server.
    pub fn process_first_connection(
        _tcp_server: &mut TcpServer,
        command_server: &mut CommandServer,
    ) {
        command_server.reset_sequence_id();

        // Results of the previous client are not delivered.
        while command_server.receiver_to_tcp.try_recv().is_ok() {}
    }
}
