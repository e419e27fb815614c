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
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    flag::register,
};
use std::io;
use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::sleep;
use std::time::Duration;

use crate::command::{
    command_encoder::create_encoder_command_schema,
    command_reflection::create_reflection_command_schema,
    command_vacuum::create_vacuum_command_schema,
};
use crate::config::SystemConfig;
use crate::constants::{ALL_HOST, DEVICE_LOOP_TIME_MS, LOCAL_HOST};
use crate::device::{
    encoder_device::{EncoderConfig, EncoderDevice},
    reflection::{
        camera::{Camera, DetachedCamera},
        reflection_config::ReflectionConfig,
        reflection_device::ReflectionDevice,
    },
    vacuum::{
        vacuum_config::VacuumConfig,
        vacuum_device::{create_simulated_plc, VacuumDevice},
    },
};
use crate::enums::DeviceKind;
use crate::interface::device_server::DeviceServer;
use crate::mock::{mock_camera::MockCamera, mock_proxy_factory::MockProxyFactory};
use crate::motion::{json_tcp_proxy::TcpProxyFactory, proxy::ProxyFactory};
use crate::plc::s7_transport::S7Transport;

// Rack and slot of the S7 CPU.
const PLC_RACK: u16 = 0;
const PLC_SLOT: u16 = 1;

/// Run the device server until SIGTERM or SIGINT.
///
/// # Arguments
/// * `kind` - Kind of the device.
/// * `instance` - Instance name of the device.
/// * `endpoint` - Address to bind. None means the default address of the
/// kind.
/// * `is_simulation_mode` - Is the simulation mode or not. The system
/// configuration can also turn it on.
/// * `config_dir` - Directory of the configuration files.
///
/// # Errors
/// If the server can not be started.
pub fn run(
    kind: DeviceKind,
    instance: &str,
    endpoint: Option<&str>,
    is_simulation_mode: bool,
    config_dir: &Path,
) -> io::Result<()> {
    let system_config = SystemConfig::load(config_dir);
    system_config.export_environment();

    let is_simulation_mode = is_simulation_mode || system_config.sim_mode;
    let mode = if is_simulation_mode {
        "simulation mode"
    } else {
        "hardware mode"
    };
    info!("Run the {} device server {instance} in {mode}.", kind.as_ref());

    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGTERM, SIGINT].iter() {
        let _ = register(*signal, stop.clone());
    }

    let address = endpoint
        .map(String::from)
        .unwrap_or_else(|| get_default_address(kind, &system_config));
    let mut server = start_server(
        kind,
        instance,
        &address,
        is_simulation_mode,
        config_dir,
        &system_config,
        &stop,
    )?;

    while !stop.load(Ordering::Relaxed) {
        sleep(Duration::from_millis(DEVICE_LOOP_TIME_MS));
    }

    info!("Stopping the device server {instance}...");
    server.stop();
    info!("Device server {instance} is stopped.");

    Ok(())
}

/// Get the default address to bind. Only the encoder device server has a
/// fixed port and listens on all interfaces since the reflection device
/// connects to it.
///
/// # Arguments
/// * `kind` - Kind of the device.
/// * `system_config` - System configuration.
///
/// # Returns
/// Address in "host:port".
fn get_default_address(kind: DeviceKind, system_config: &SystemConfig) -> String {
    match kind {
        DeviceKind::Encoder => format!("{ALL_HOST}:{}", system_config.encoder_port),
        _ => format!("{LOCAL_HOST}:0"),
    }
}

/// Create the device of the kind and serve it.
///
/// # Arguments
/// * `kind` - Kind of the device.
/// * `instance` - Instance name of the device.
/// * `address` - Address to bind.
/// * `is_simulation_mode` - Is the simulation mode or not.
/// * `config_dir` - Directory of the configuration files.
/// * `system_config` - System configuration.
/// * `stop` - Flag to stop the server.
///
/// # Returns
/// Running server.
///
/// # Errors
/// If the address can not be bound.
fn start_server(
    kind: DeviceKind,
    instance: &str,
    address: &str,
    is_simulation_mode: bool,
    config_dir: &Path,
    system_config: &SystemConfig,
    stop: &Arc<AtomicBool>,
) -> io::Result<DeviceServer> {
    let loop_time = Duration::from_millis(DEVICE_LOOP_TIME_MS);

    match kind {
        DeviceKind::Encoder => {
            let config = EncoderConfig::new(&config_dir.join("encoder_device.yaml"));
            let device = EncoderDevice::new(instance, &config, is_simulation_mode);

            DeviceServer::start(
                instance,
                address,
                device,
                create_encoder_command_schema(),
                stop,
                loop_time,
            )
        }

        DeviceKind::Vacuum => {
            let config = VacuumConfig::new(
                &config_dir.join("vacuum_device.yaml"),
                VacuumConfig {
                    plc_ip: system_config.plc_ip.clone(),
                    plc_port: system_config.plc_port,
                    ..VacuumConfig::default()
                },
            );
            let device = if is_simulation_mode {
                VacuumDevice::new(
                    instance,
                    &config,
                    Box::new(create_simulated_plc()),
                    is_simulation_mode,
                )
            } else {
                VacuumDevice::new(
                    instance,
                    &config,
                    Box::new(S7Transport::new(PLC_RACK, PLC_SLOT)),
                    is_simulation_mode,
                )
            };

            DeviceServer::start(
                instance,
                address,
                device,
                create_vacuum_command_schema(),
                stop,
                loop_time,
            )
        }

        DeviceKind::Reflection => {
            let config = ReflectionConfig::new(&config_dir.join("reflection_device.yaml"));

            let factory: Arc<dyn ProxyFactory>;
            let cameras: Vec<Box<dyn Camera>>;
            if is_simulation_mode {
                factory = Arc::new(MockProxyFactory::new());
                cameras = (0..config.number_of_cameras)
                    .map(|idx| Box::new(MockCamera::new(&format!("camera{idx}"))) as Box<dyn Camera>)
                    .collect();
            } else {
                factory = Arc::new(TcpProxyFactory::new(
                    &system_config.controller_address(),
                    &system_config.encoder_address(),
                ));
                cameras = (0..config.number_of_cameras)
                    .map(|idx| {
                        Box::new(DetachedCamera::new(&format!("camera{idx}"))) as Box<dyn Camera>
                    })
                    .collect();
            }

            let device = ReflectionDevice::new(
                instance,
                &config,
                factory,
                cameras,
                is_simulation_mode,
                system_config.proxy_reconnect_interval_sec,
            );

            DeviceServer::start(
                instance,
                address,
                device,
                create_reflection_command_schema(),
                stop,
                loop_time,
            )
        }
    }
}
