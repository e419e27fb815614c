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
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

use crate::constants::{DEFAULT_PLC_PORT, MIN_PROXY_RECONNECT_INTERVAL_SEC};

const FILENAME_SYSTEM_CONFIG: &str = "system_config.json";
const FILENAME_RUNTIME_CONFIG: &str = "runtime_config.json";

// Client timeouts exported to the environment of the device servers.
const CLIENT_CALL_TIMEOUT_MS: &str = "5000";
const CLIENT_CONNECT_TIMEOUT_MS: &str = "3000";

fn default_controller_ip() -> String {
    String::from("127.0.0.1")
}

fn default_controller_port() -> u16 {
    6000
}

fn default_encoder_port() -> u16 {
    6001
}

fn default_plc_ip() -> String {
    String::from("192.168.0.1")
}

fn default_plc_port() -> u16 {
    DEFAULT_PLC_PORT
}

fn default_tango_host() -> String {
    String::from("127.0.0.1:10000")
}

fn default_proxy_reconnect_interval_sec() -> u64 {
    MIN_PROXY_RECONNECT_INTERVAL_SEC
}

/// System configuration shared by all device servers.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct SystemConfig {
    // IP of the motion controller.
    #[serde(default = "default_controller_ip")]
    pub controller_ip: String,
    // Command port of the motion controller.
    #[serde(default = "default_controller_port")]
    pub controller_port: u16,
    // Command port of the encoder device server.
    #[serde(default = "default_encoder_port")]
    pub encoder_port: u16,
    #[serde(default = "default_plc_ip")]
    pub plc_ip: String,
    #[serde(default = "default_plc_port")]
    pub plc_port: u16,
    // Address of the supervisory bus.
    #[serde(default = "default_tango_host")]
    pub tango_host: String,
    #[serde(default)]
    pub sim_mode: bool,
    // Interval between the proxy rebuild attempts in second.
    #[serde(default = "default_proxy_reconnect_interval_sec")]
    pub proxy_reconnect_interval_sec: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            controller_ip: default_controller_ip(),
            controller_port: default_controller_port(),
            encoder_port: default_encoder_port(),
            plc_ip: default_plc_ip(),
            plc_port: default_plc_port(),
            tango_host: default_tango_host(),
            sim_mode: false,
            proxy_reconnect_interval_sec: default_proxy_reconnect_interval_sec(),
        }
    }
}

/// Runtime override of the system configuration.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
pub struct RuntimeConfig {
    pub sim_mode: Option<bool>,
}

impl SystemConfig {
    /// Load the system configuration from the directory. The runtime
    /// configuration overrides the simulation mode if it exists.
    ///
    /// # Arguments
    /// * `config_dir` - Directory of the configuration files.
    ///
    /// # Returns
    /// System configuration. The default is used if the file is missing or
    /// can not be parsed.
    pub fn load(config_dir: &Path) -> Self {
        let mut config: SystemConfig = read_json_file(&config_dir.join(FILENAME_SYSTEM_CONFIG))
            .unwrap_or_default();

        if let Some(runtime) =
            read_json_file::<RuntimeConfig>(&config_dir.join(FILENAME_RUNTIME_CONFIG))
        {
            if let Some(sim_mode) = runtime.sim_mode {
                info!("Runtime configuration overrides the simulation mode: {sim_mode}.");
                config.sim_mode = sim_mode;
            }
        }

        config.proxy_reconnect_interval_sec = config
            .proxy_reconnect_interval_sec
            .max(MIN_PROXY_RECONNECT_INTERVAL_SEC);

        config
    }

    /// Export the client settings to the process environment.
    pub fn export_environment(&self) {
        env::set_var("TANGO_HOST", &self.tango_host);
        env::set_var("ORBclientCallTimeOutPeriod", CLIENT_CALL_TIMEOUT_MS);
        env::set_var("ORBclientConnectTimeOutPeriod", CLIENT_CONNECT_TIMEOUT_MS);
    }

    /// Get the address of the motion controller.
    pub fn controller_address(&self) -> String {
        format!("{}:{}", self.controller_ip, self.controller_port)
    }

    /// Get the address of the encoder device server.
    pub fn encoder_address(&self) -> String {
        format!("{}:{}", self.controller_ip, self.encoder_port)
    }
}

/// Read the JSON file.
///
/// # Arguments
/// * `filepath` - Path of the file.
///
/// # Returns
/// Deserialized content. None if the file is missing or invalid.
fn read_json_file<T: for<'de> Deserialize<'de>>(filepath: &Path) -> Option<T> {
    let content = fs::read_to_string(filepath).ok()?;
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(error) => {
            warn!("Failed to parse the {:?}: {error}.", filepath);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[test]
    fn test_load_default() {
        let dir = tempdir().unwrap();

        assert_eq!(SystemConfig::load(dir.path()), SystemConfig::default());
    }

    #[test]
    fn test_load() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(FILENAME_SYSTEM_CONFIG),
            r#"{"controller_ip": "10.0.0.2", "plc_ip": "10.0.0.3", "sim_mode": false, "proxy_reconnect_interval_sec": 0}"#,
        )
        .unwrap();

        let config = SystemConfig::load(dir.path());

        assert_eq!(config.controller_ip, "10.0.0.2");
        assert_eq!(config.plc_ip, "10.0.0.3");
        assert_eq!(config.plc_port, DEFAULT_PLC_PORT);
        assert!(!config.sim_mode);

        // Floored to the minimum.
        assert_eq!(config.proxy_reconnect_interval_sec, 1);

        assert_eq!(config.controller_address(), "10.0.0.2:6000");
    }

    #[test]
    fn test_load_runtime_override() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(FILENAME_SYSTEM_CONFIG),
            r#"{"sim_mode": false}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join(FILENAME_RUNTIME_CONFIG),
            r#"{"sim_mode": true}"#,
        )
        .unwrap();

        assert!(SystemConfig::load(dir.path()).sim_mode);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(FILENAME_SYSTEM_CONFIG), "not json").unwrap();

        assert_eq!(SystemConfig::load(dir.path()), SystemConfig::default());
    }

    #[test]
    fn test_export_environment() {
        let config = SystemConfig {
            tango_host: String::from("host:1234"),
            ..SystemConfig::default()
        };

        config.export_environment();

        assert_eq!(env::var("TANGO_HOST").unwrap(), "host:1234");
        assert_eq!(env::var("ORBclientCallTimeOutPeriod").unwrap(), "5000");
        assert_eq!(env::var("ORBclientConnectTimeOutPeriod").unwrap(), "3000");
    }
}
