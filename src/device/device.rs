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
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{Receiver, RecvTimeoutError, SyncSender},
    Arc,
};
use std::time::{Duration, Instant};

use crate::command::command_schema::CommandSchema;
use crate::enums::DeviceState;
use crate::error::DeviceError;

/// Device served on the supervisory bus.
pub trait Device: Send {
    /// Name of the device.
    fn name(&self) -> &str;

    /// Current device state.
    fn state(&self) -> DeviceState;

    /// Free-text status.
    fn status(&self) -> String;

    /// Check the command is allowed for the client in the current state.
    ///
    /// # Arguments
    /// * `command` - Command name without the "cmd_" prefix.
    /// * `client_id` - Client that issues the command.
    ///
    /// # Errors
    /// InvalidState or DeviceLocked.
    fn check_command(&self, command: &str, client_id: &str) -> Result<(), DeviceError>;

    /// Names of the readable attributes.
    fn attribute_names(&self) -> Vec<&'static str>;

    /// Read the attribute.
    ///
    /// # Arguments
    /// * `name` - Attribute name without the "attr_" prefix.
    ///
    /// # Returns
    /// Attribute value.
    fn read_attribute(&mut self, name: &str) -> Result<Value, DeviceError>;

    /// Hook executed by the device thread in every loop.
    fn always_executed_hook(&mut self);

    /// Tear down the device.
    fn delete_device(&mut self);
}

/// Thread body that owns the device. It executes the requests from the
/// command server and runs the hook periodically.
pub struct DeviceProcess<D: Device> {
    _device: D,
    _command_schema: CommandSchema<D>,
    // Receiver of the requests from the TCP/IP.
    _receiver_from_tcp: Receiver<Value>,
    // Sender of the results to the TCP/IP.
    _sender_to_tcp: SyncSender<Vec<Value>>,
    // Stop the loop.
    _stop: Arc<AtomicBool>,
    // Period of the hook.
    _loop_time: Duration,
}

impl<D: Device> DeviceProcess<D> {
    /// Create a new device process.
    ///
    /// # Arguments
    /// * `device` - Device after the initialization.
    /// * `command_schema` - Command schema of the device.
    /// * `receiver_from_tcp` - Receiver of the requests.
    /// * `sender_to_tcp` - Sender of the results.
    /// * `stop` - Flag to stop the loop.
    /// * `loop_time` - Period of the hook.
    pub fn new(
        device: D,
        command_schema: CommandSchema<D>,
        receiver_from_tcp: Receiver<Value>,
        sender_to_tcp: &SyncSender<Vec<Value>>,
        stop: &Arc<AtomicBool>,
        loop_time: Duration,
    ) -> Self {
        Self {
            _device: device,
            _command_schema: command_schema,
            _receiver_from_tcp: receiver_from_tcp,
            _sender_to_tcp: sender_to_tcp.clone(),
            _stop: stop.clone(),
            _loop_time: loop_time,
        }
    }

    /// Execute one request.
    ///
    /// # Arguments
    /// * `message` - Request.
    fn process_request(&mut self, message: &Value) {
        let result = self._command_schema.execute(message, &mut self._device);

        // Ignore the error if the TCP/IP side is gone.
        let _ = self._sender_to_tcp.try_send(vec![result]);
    }

    /// Run the loop until the stop flag is set or the command server is
    /// gone. The device is deleted on return.
    ///
    /// # Returns
    /// The device after the teardown.
    pub fn run(mut self) -> D {
        info!("Device process of {} is running.", self._device.name());

        let mut next_hook = Instant::now();
        while !self._stop.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= next_hook {
                self._device.always_executed_hook();
                next_hook = now + self._loop_time;
                continue;
            }

            match self._receiver_from_tcp.recv_timeout(next_hook - now) {
                Ok(message) => self.process_request(&message),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self._device.delete_device();

        info!("Device process of {} is stopped.", self._device.name());

        self._device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use std::sync::mpsc::sync_channel;
    use std::thread::{sleep, spawn};

    use crate::command::command_schema::Command;
    use crate::constants::BOUND_SYNC_CHANNEL;

    #[derive(Default)]
    struct DeviceTest {
        hook_count: usize,
        is_deleted: bool,
    }

    impl Device for DeviceTest {
        fn name(&self) -> &str {
            "test"
        }

        fn state(&self) -> DeviceState {
            DeviceState::On
        }

        fn status(&self) -> String {
            String::new()
        }

        fn check_command(&self, _command: &str, _client_id: &str) -> Result<(), DeviceError> {
            Ok(())
        }

        fn attribute_names(&self) -> Vec<&'static str> {
            vec!["hook_count"]
        }

        fn read_attribute(&mut self, _name: &str) -> Result<Value, DeviceError> {
            Ok(json!(self.hook_count))
        }

        fn always_executed_hook(&mut self) {
            self.hook_count += 1;
        }

        fn delete_device(&mut self) {
            self.is_deleted = true;
        }
    }

    struct CommandPing;
    impl Command<DeviceTest> for CommandPing {
        fn name(&self) -> &str {
            "cmd_ping"
        }

        fn execute(&self, _message: &Value, _device: &mut DeviceTest) -> Result<Value, DeviceError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_run() {
        let (sender_from_tcp, receiver_from_tcp) = sync_channel(BOUND_SYNC_CHANNEL);
        let (sender_to_tcp, receiver_to_tcp) = sync_channel(BOUND_SYNC_CHANNEL);
        let stop = Arc::new(AtomicBool::new(false));

        let mut schema = CommandSchema::new();
        schema.add_command(Box::new(CommandPing));

        let process = DeviceProcess::new(
            DeviceTest::default(),
            schema,
            receiver_from_tcp,
            &sender_to_tcp,
            &stop,
            Duration::from_millis(20),
        );

        let handle = spawn(move || process.run());

        sender_from_tcp
            .send(json!({"id": "cmd_ping", "sequence_id": 1}))
            .unwrap();

        assert_eq!(
            receiver_to_tcp.recv_timeout(Duration::from_secs(1)).unwrap(),
            vec![json!({"id": "success", "sequence_id": 1})]
        );

        sleep(Duration::from_millis(200));
        stop.store(true, Ordering::Relaxed);

        let device = handle.join().unwrap();

        assert!(device.hook_count > 2);
        assert!(device.is_deleted);
    }

    #[test]
    fn test_run_sender_dropped() {
        let (sender_from_tcp, receiver_from_tcp) = sync_channel(BOUND_SYNC_CHANNEL);
        let (sender_to_tcp, _receiver_to_tcp) = sync_channel(BOUND_SYNC_CHANNEL);
        let stop = Arc::new(AtomicBool::new(false));

        let process = DeviceProcess::new(
            DeviceTest::default(),
            CommandSchema::new(),
            receiver_from_tcp,
            &sender_to_tcp,
            &stop,
            Duration::from_millis(20),
        );

        drop(sender_from_tcp);

        let device = process.run();

        assert!(device.is_deleted);
    }
}
