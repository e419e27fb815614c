use config::Config;
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::thread::sleep;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use time::{macros::format_description, OffsetDateTime};

use crate::enums::CommandStatus;
use crate::error::DeviceError;

/// Trait to parse the configuration value.
pub trait ConfigValue {
    /// Parse the configuration value.
    ///
    /// # Parameters
    /// * `s` - String to parse.
    ///
    /// # Returns
    /// The parsed configuration value. None if the string can not be parsed.
    fn parse_value(s: &str) -> Option<Self>
    where
        Self: Sized;
}

impl ConfigValue for String {
    fn parse_value(s: &str) -> Option<Self> {
        Some(s.to_string())
    }
}

impl ConfigValue for f64 {
    fn parse_value(s: &str) -> Option<Self> {
        s.parse::<f64>().ok()
    }
}

impl ConfigValue for usize {
    fn parse_value(s: &str) -> Option<Self> {
        s.parse::<usize>().ok()
    }
}

impl ConfigValue for i16 {
    fn parse_value(s: &str) -> Option<Self> {
        s.parse::<i16>().ok()
    }
}

impl ConfigValue for i32 {
    fn parse_value(s: &str) -> Option<Self> {
        s.parse::<i32>().ok()
    }
}

impl ConfigValue for u16 {
    fn parse_value(s: &str) -> Option<Self> {
        s.parse::<u16>().ok()
    }
}

impl ConfigValue for u64 {
    fn parse_value(s: &str) -> Option<Self> {
        s.parse::<u64>().ok()
    }
}

impl ConfigValue for bool {
    fn parse_value(s: &str) -> Option<Self> {
        s.parse::<bool>().ok()
    }
}

/// Get the configuation from the file. A missing file gives an empty
/// configuration.
///
/// # Parameters
/// * `filepath` - Path to the config file.
///
/// # Returns
/// The configuration.
pub fn get_config(filepath: &Path) -> Config {
    match Config::builder()
        .add_source(config::File::from(filepath).required(false))
        .build()
    {
        Ok(config) => config,
        Err(error) => {
            log::warn!("Failed to read the {:?}: {error}. Use the defaults.", filepath);
            Config::default()
        }
    }
}

/// Get the parameter from the configuration or the default value.
///
/// # Parameters
/// * `config` - Configuration.
/// * `key` - Key to find the parameter in the configuration.
/// * `default` - Default value.
///
/// # Returns
/// The parameter.
pub fn get_parameter_or<T: ConfigValue>(config: &Config, key: &str, default: T) -> T {
    config
        .get_string(key)
        .ok()
        .and_then(|v| T::parse_value(&v))
        .unwrap_or(default)
}

/// Get the array parameter from the configuration or the default value.
///
/// # Parameters
/// * `config` - Configuration.
/// * `key` - Key to find the parameter in the configuration.
/// * `default` - Default value.
///
/// # Returns
/// The array parameter. The default is returned if any element can not be
/// parsed.
pub fn get_parameter_array_or<T: ConfigValue>(config: &Config, key: &str, default: Vec<T>) -> Vec<T> {
    let config_array = match config.get_array(key) {
        Ok(array) => array,
        Err(_) => return default,
    };

    let values: Option<Vec<T>> = config_array
        .into_iter()
        .map(|x| x.into_string().ok().and_then(|s| T::parse_value(&s)))
        .collect();

    values.unwrap_or(default)
}

/// Check if the message is a command.
///
/// # Arguments
/// * `name` - Name of the message.
///
/// # Returns
/// True if the message is a command, false otherwise.
pub fn is_command(name: &str) -> bool {
    name.starts_with("cmd_")
}

/// Check if the message is an attribute read.
///
/// # Arguments
/// * `name` - Name of the message.
///
/// # Returns
/// True if the message is an attribute read, false otherwise.
pub fn is_attribute(name: &str) -> bool {
    name.starts_with("attr_")
}

/// Acknowledge the command.
///
/// # Arguments
/// * `command_status` - Command status.
/// * `sequence_id` - Sequence ID.
///
/// # Returns
/// Acknowledged command.
pub fn acknowledge_command(command_status: CommandStatus, sequence_id: i64) -> Value {
    json!({"id": command_status.as_ref().to_lowercase(), "sequence_id": sequence_id})
}

/// Acknowledge the successful command with the returned value.
///
/// # Arguments
/// * `sequence_id` - Sequence ID.
/// * `value` - Returned value. Null is omitted.
///
/// # Returns
/// Acknowledged command.
pub fn acknowledge_success(sequence_id: i64, value: Value) -> Value {
    let mut message = acknowledge_command(CommandStatus::Success, sequence_id);
    if !value.is_null() {
        message["value"] = value;
    }

    message
}

/// Acknowledge the failed command.
///
/// # Arguments
/// * `sequence_id` - Sequence ID.
/// * `error` - Error of the command.
///
/// # Returns
/// Acknowledged command with the reason and description.
pub fn acknowledge_failure(sequence_id: i64, error: &DeviceError) -> Value {
    let mut message = acknowledge_command(CommandStatus::Fail, sequence_id);
    message["reason"] = json!(error.reason());
    message["description"] = json!(error.to_string());
    message["result_value"] = json!(1);

    message
}

/// Get the message name.
///
/// # Arguments
/// * `message` - Message that should have the "id" field.
///
/// # Returns
/// Message name. Return an empty string if the name is not found.
pub fn get_message_name(message: &Value) -> String {
    match message["id"].as_str() {
        Some(id) => String::from(id),
        None => String::new(),
    }
}

/// Get the message sequence ID.
///
/// # Arguments
/// * `message` - Message.
///
/// # Returns
/// Message sequence ID. Return -1 if the sequence ID is not found.
pub fn get_message_sequence_id(message: &Value) -> i64 {
    match message["sequence_id"].as_i64() {
        Some(sequence_id) => sequence_id,
        None => -1,
    }
}

/// Get the client ID of the message.
///
/// # Arguments
/// * `message` - Message.
///
/// # Returns
/// Client ID. Return an empty string if not found.
pub fn get_message_client_id(message: &Value) -> String {
    message["client_id"].as_str().unwrap_or_default().to_string()
}

/// Get the floating-point argument.
///
/// # Arguments
/// * `message` - Message.
/// * `key` - Key of the argument.
///
/// # Returns
/// Argument value.
///
/// # Errors
/// InvalidArgs if the argument is missing or not a number.
pub fn get_argument_f64(message: &Value, key: &str) -> Result<f64, DeviceError> {
    message[key]
        .as_f64()
        .ok_or_else(|| DeviceError::InvalidArgs(format!("{key} should be a number")))
}

/// Get the integer argument.
///
/// # Arguments
/// * `message` - Message.
/// * `key` - Key of the argument.
///
/// # Returns
/// Argument value.
///
/// # Errors
/// InvalidArgs if the argument is missing or not an integer.
pub fn get_argument_i64(message: &Value, key: &str) -> Result<i64, DeviceError> {
    message[key]
        .as_i64()
        .ok_or_else(|| DeviceError::InvalidArgs(format!("{key} should be an integer")))
}

/// Get the boolean argument.
///
/// # Arguments
/// * `message` - Message.
/// * `key` - Key of the argument.
///
/// # Returns
/// Argument value.
///
/// # Errors
/// InvalidArgs if the argument is missing or not a boolean.
pub fn get_argument_bool(message: &Value, key: &str) -> Result<bool, DeviceError> {
    message[key]
        .as_bool()
        .ok_or_else(|| DeviceError::InvalidArgs(format!("{key} should be a boolean")))
}

/// Get the array argument of floating-point values.
///
/// # Arguments
/// * `message` - Message.
/// * `key` - Key of the argument.
/// * `length` - Expected length.
///
/// # Returns
/// Argument values.
///
/// # Errors
/// InvalidArgs if the argument is missing, has another length or contains
/// a non-number.
pub fn get_argument_f64_array(
    message: &Value,
    key: &str,
    length: usize,
) -> Result<Vec<f64>, DeviceError> {
    let array = message[key]
        .as_array()
        .ok_or_else(|| DeviceError::InvalidArgs(format!("{key} should be an array")))?;
    if array.len() != length {
        return Err(DeviceError::InvalidArgs(format!(
            "{key} should have {length} elements instead of {}",
            array.len()
        )));
    }

    array
        .iter()
        .map(|x| {
            x.as_f64()
                .ok_or_else(|| DeviceError::InvalidArgs(format!("{key} should be numbers")))
        })
        .collect()
}

/// Get the system time in milliseconds.
///
/// # Returns
/// System time in milliseconds since the UNIX epoch. Return 0 if fail.
pub fn get_system_time_ms() -> u64 {
    let now = SystemTime::now();
    match now.duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis() as u64,
        Err(_) => 0,
    }
}

/// Get the timestamp used in the exported file names.
///
/// # Returns
/// Timestamp in the format of YYYYMMDD_HHMMSS.
pub fn get_timestamp_string() -> String {
    let format = format_description!("[year][month][day]_[hour][minute][second]");
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .format(&format)
        .unwrap_or_default()
}

/// TCP/IP client writes the message and sleep.
///
/// # Arguments
/// * `client` - TCP/IP client.
/// * `message` - Message to write.
/// * `sleep_time` - Sleep time in milliseconds.
///
/// # Panics
/// If the TCP stream of the client cannot write or flush.
pub fn client_write_and_sleep(client: &mut TcpStream, message: &str, sleep_time: u64) {
    client
        .write_all(message.as_bytes())
        .expect("Tcp stream should write.");
    client.flush().expect("Tcp stream should flush.");

    sleep(Duration::from_millis(sleep_time));
}

/// TCP/IP client reads the JSON message.
///
/// # Arguments
/// * `client` - TCP/IP client.
/// * `terminator` - Terminator of the message.
///
/// # Returns
/// JSON message.
///
/// # Panics
/// If the TCP stream of the client cannot read.
pub fn client_read_json(client: &mut TcpStream, terminator: &[u8]) -> Value {
    let mut buffer = Vec::new();
    loop {
        let mut byte = [0; 1];
        client
            .read_exact(&mut byte)
            .expect("Tcp stream of the client should read.");

        buffer.push(byte[0]);
        if buffer.ends_with(terminator) {
            break;
        }
    }

    serde_json::from_slice(&buffer[0..(buffer.len() - terminator.len())])
        .expect("Should be able to convert to JSON.")
}

/// TCP/IP client reads the message and asserts it.
///
/// # Arguments
/// * `client` - TCP/IP client.
/// * `expected` - Expected message.
///
/// # Panics
/// If the TCP stream of the client cannot read or the message is not the
/// expected one.
pub fn client_read_and_assert(client: &mut TcpStream, expected: &str) {
    let mut buffer = vec![0; expected.len()];
    client
        .read_exact(&mut buffer)
        .expect("Tcp stream of the client should read.");

    assert_eq!(String::from_utf8_lossy(&buffer), expected);
}

/// TCP/IP client reads the JSON messages until the one with the specific
/// sequence ID and result is found.
///
/// # Arguments
/// * `client` - TCP/IP client.
/// * `terminator` - Terminator of the message.
/// * `sequence_id` - Sequence ID.
///
/// # Returns
/// The first non-ack JSON message of the sequence ID.
pub fn client_read_result(client: &mut TcpStream, terminator: &[u8], sequence_id: i64) -> Value {
    loop {
        let message = client_read_json(client, terminator);
        if get_message_sequence_id(&message) != sequence_id {
            continue;
        }

        let name = get_message_name(&message);
        if name == "success" || name == "fail" {
            return message;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn create_config_file() -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(file, "plc_update_interval_ms: 1000").unwrap();
        writeln!(file, "upperPlatformRange: [1000, 1000, 500]").unwrap();
        writeln!(file, "simMode: true").unwrap();
        writeln!(file, "badArray: [1, abc]").unwrap();

        file
    }

    #[test]
    fn test_get_parameter_or() {
        let file = create_config_file();
        let config = get_config(file.path());

        assert_eq!(get_parameter_or(&config, "plc_update_interval_ms", 2000u64), 1000);
        assert_eq!(get_parameter_or(&config, "missing", 2000u64), 2000);
        assert!(get_parameter_or(&config, "simMode", false));
    }

    #[test]
    fn test_get_parameter_array_or() {
        let file = create_config_file();
        let config = get_config(file.path());

        let range: Vec<i16> = get_parameter_array_or(&config, "upperPlatformRange", vec![0; 3]);
        assert_eq!(range, vec![1000, 1000, 500]);

        let bad: Vec<i16> = get_parameter_array_or(&config, "badArray", vec![7]);
        assert_eq!(bad, vec![7]);

        let missing: Vec<i16> = get_parameter_array_or(&config, "missing", vec![1, 2]);
        assert_eq!(missing, vec![1, 2]);
    }

    #[test]
    fn test_get_config_missing_file() {
        let config = get_config(Path::new("config/missing_file.yaml"));

        assert_eq!(get_parameter_or(&config, "key", 3i32), 3);
    }

    #[test]
    fn test_is_command() {
        assert!(is_command("cmd_test"));
        assert!(!is_command("attr_test"));
        assert!(!is_command("test"));
    }

    #[test]
    fn test_is_attribute() {
        assert!(is_attribute("attr_state"));
        assert!(!is_attribute("cmd_state"));
    }

    #[test]
    fn test_acknowledge_command() {
        assert_eq!(
            acknowledge_command(CommandStatus::Success, 1),
            json!({"id": "success", "sequence_id": 1})
        );
        assert_eq!(
            acknowledge_command(CommandStatus::NoAck, 4),
            json!({"id": "noack", "sequence_id": 4})
        );
    }

    #[test]
    fn test_acknowledge_success() {
        assert_eq!(
            acknowledge_success(2, Value::Null),
            json!({"id": "success", "sequence_id": 2})
        );
        assert_eq!(
            acknowledge_success(3, json!(1.5)),
            json!({"id": "success", "sequence_id": 3, "value": 1.5})
        );
    }

    #[test]
    fn test_acknowledge_failure() {
        let message = acknowledge_failure(5, &DeviceError::NetworkUnhealthy);

        assert_eq!(message["id"], "fail");
        assert_eq!(message["sequence_id"], 5);
        assert_eq!(message["reason"], "API_NoProxy");
        assert_eq!(message["result_value"], 1);
    }

    #[test]
    fn test_get_message_name() {
        assert_eq!(get_message_name(&json!({"id": "cmd_test"})), "cmd_test");
        assert_eq!(get_message_name(&json!({"id": 1})), "");
        assert_eq!(get_message_name(&json!({})), "");
    }

    #[test]
    fn test_get_message_sequence_id() {
        assert_eq!(get_message_sequence_id(&json!({"sequence_id": 1})), 1);
        assert_eq!(get_message_sequence_id(&json!({"sequence_id": 1.0})), -1);
        assert_eq!(get_message_sequence_id(&json!({})), -1);
    }

    #[test]
    fn test_get_message_client_id() {
        assert_eq!(get_message_client_id(&json!({"client_id": "gui"})), "gui");
        assert_eq!(get_message_client_id(&json!({})), "");
    }

    #[test]
    fn test_get_argument_f64_array() {
        let message = json!({"position": [1.0, 2, 3.5]});

        assert_eq!(
            get_argument_f64_array(&message, "position", 3).unwrap(),
            vec![1.0, 2.0, 3.5]
        );
        assert!(matches!(
            get_argument_f64_array(&message, "position", 2),
            Err(DeviceError::InvalidArgs(_))
        ));
        assert!(matches!(
            get_argument_f64_array(&json!({"position": [1, "a", 3]}), "position", 3),
            Err(DeviceError::InvalidArgs(_))
        ));
        assert!(get_argument_f64_array(&json!({}), "position", 3).is_err());
    }

    #[test]
    fn test_get_argument_scalars() {
        let message = json!({"value": 1.5, "index": 2, "state": true});

        assert_eq!(get_argument_f64(&message, "value").unwrap(), 1.5);
        assert_eq!(get_argument_i64(&message, "index").unwrap(), 2);
        assert!(get_argument_bool(&message, "state").unwrap());

        assert!(get_argument_i64(&message, "value").is_err());
        assert!(get_argument_bool(&message, "missing").is_err());
    }

    #[test]
    fn test_get_system_time_ms() {
        assert!(get_system_time_ms() > 0);
    }

    #[test]
    fn test_get_timestamp_string() {
        let timestamp = get_timestamp_string();

        assert_eq!(timestamp.len(), 15);
        assert_eq!(&timestamp[8..9], "_");
    }
}
