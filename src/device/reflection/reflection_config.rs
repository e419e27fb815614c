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

use config::Config;
use nalgebra::Vector3;
use std::path::{Path, PathBuf};

use crate::constants::{
    DEFAULT_MAX_VELOCITY, ENCODER_COMBINED_SCALE, ENCODER_POSITION_BITS, NUM_MOTION_AXES,
    NUM_PLATFORM_AXES,
};
use crate::enums::Platform;
use crate::utility::{get_config, get_parameter_array_or, get_parameter_or};

/// Properties of the reflection-imaging device.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionConfig {
    // Soft limits of the X, Y, Z axes in mm.
    pub upper_platform_range: Vector3<f64>,
    pub lower_platform_range: Vector3<f64>,
    // Minimum Z distance between the platforms. 0 disables the check.
    pub min_platform_z_distance: f64,
    // Maximum axis velocity in mm/sec.
    pub max_velocity: f64,
    // Output ports on the motion controller. Negative means not wired.
    pub driver_power_port: i16,
    pub brake_power_port: i16,
    // Release the brake before a Z motion if it is engaged.
    pub auto_release_brake: bool,
    pub motor_step_angle: f64,
    pub motor_gear_ratio: f64,
    pub motor_subdivision: f64,
    // Encoder channel of each physical axis.
    pub encoder_channels: Vec<i16>,
    // Resolution of each encoder channel in the reported unit per count.
    pub encoder_resolution: Vec<f64>,
    // Physical axis of the support axis. Negative means not configured.
    pub support_axis: i16,
    pub support_axis_range: f64,
    pub number_of_cameras: usize,
    // Open the cameras when the device starts.
    pub camera_auto_open: bool,
    pub image_save_path: PathBuf,
    pub image_format: String,
    pub log_export_path: PathBuf,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            upper_platform_range: Vector3::new(1000.0, 1000.0, 500.0),
            lower_platform_range: Vector3::new(1000.0, 1000.0, 500.0),
            min_platform_z_distance: 0.0,
            max_velocity: DEFAULT_MAX_VELOCITY,
            driver_power_port: 1,
            brake_power_port: 2,
            auto_release_brake: true,
            motor_step_angle: 1.8,
            motor_gear_ratio: 1.0,
            motor_subdivision: 12800.0,
            encoder_channels: (0..NUM_MOTION_AXES as i16).collect(),
            encoder_resolution: vec![
                ENCODER_COMBINED_SCALE / f64::from(1u32 << ENCODER_POSITION_BITS);
                NUM_MOTION_AXES
            ],
            support_axis: -1,
            support_axis_range: 100.0,
            number_of_cameras: 4,
            camera_auto_open: false,
            image_save_path: PathBuf::from("images"),
            image_format: String::from("png"),
            log_export_path: PathBuf::from("logs"),
        }
    }
}

impl ReflectionConfig {
    /// Read the properties. The missing or malformed ones keep the default
    /// values.
    ///
    /// # Arguments
    /// * `filepath` - Path of the property file.
    pub fn new(filepath: &Path) -> Self {
        let config = get_config(filepath);
        let default = Self::default();

        let mut encoder_channels =
            get_parameter_array_or(&config, "encoderChannels", default.encoder_channels.clone());
        if encoder_channels.len() != NUM_MOTION_AXES {
            encoder_channels = default.encoder_channels.clone();
        }

        let mut encoder_resolution = get_parameter_array_or(
            &config,
            "encoderResolution",
            default.encoder_resolution.clone(),
        );
        if encoder_resolution.len() != NUM_MOTION_AXES {
            encoder_resolution = default.encoder_resolution.clone();
        }

        Self {
            upper_platform_range: get_range(
                &config,
                "upperPlatformRange",
                &default.upper_platform_range,
            ),
            lower_platform_range: get_range(
                &config,
                "lowerPlatformRange",
                &default.lower_platform_range,
            ),
            min_platform_z_distance: get_parameter_or(
                &config,
                "minPlatformZDistance",
                default.min_platform_z_distance,
            ),
            max_velocity: get_parameter_or(&config, "maxVelocity", default.max_velocity),
            driver_power_port: get_parameter_or(&config, "driverPowerPort", default.driver_power_port),
            brake_power_port: get_parameter_or(&config, "brakePowerPort", default.brake_power_port),
            auto_release_brake: get_parameter_or(
                &config,
                "autoReleaseBrake",
                default.auto_release_brake,
            ),
            motor_step_angle: get_parameter_or(&config, "motorStepAngle", default.motor_step_angle),
            motor_gear_ratio: get_parameter_or(&config, "motorGearRatio", default.motor_gear_ratio),
            motor_subdivision: get_parameter_or(
                &config,
                "motorSubdivision",
                default.motor_subdivision,
            ),
            encoder_channels,
            encoder_resolution,
            support_axis: get_parameter_or(&config, "supportAxis", default.support_axis),
            support_axis_range: get_parameter_or(
                &config,
                "supportAxisRange",
                default.support_axis_range,
            ),
            number_of_cameras: get_parameter_or(&config, "numberOfCameras", default.number_of_cameras),
            camera_auto_open: get_parameter_or(&config, "cameraAutoOpen", default.camera_auto_open),
            image_save_path: PathBuf::from(get_parameter_or(
                &config,
                "imageSavePath",
                String::from("images"),
            )),
            image_format: get_parameter_or(&config, "imageFormat", default.image_format),
            log_export_path: PathBuf::from(get_parameter_or(
                &config,
                "logExportPath",
                String::from("logs"),
            )),
        }
    }

    /// Get the soft limits of the platform.
    pub fn range(&self, platform: Platform) -> &Vector3<f64> {
        match platform {
            Platform::Upper => &self.upper_platform_range,
            Platform::Lower => &self.lower_platform_range,
        }
    }

    /// Get the encoder channel of the physical axis.
    pub fn encoder_channel(&self, axis: i16) -> Option<i16> {
        usize::try_from(axis)
            .ok()
            .and_then(|idx| self.encoder_channels.get(idx))
            .copied()
    }

    /// The support axis is configured or not.
    pub fn has_support_axis(&self) -> bool {
        self.support_axis >= 0
    }
}

/// Read the range of the three axes.
fn get_range(config: &Config, key: &str, default: &Vector3<f64>) -> Vector3<f64> {
    let values = get_parameter_array_or(config, key, default.iter().copied().collect());
    if values.len() != NUM_PLATFORM_AXES || values.iter().any(|value| *value < 0.0) {
        return *default;
    }

    Vector3::new(values[0], values[1], values[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_new_default() {
        let config = ReflectionConfig::new(Path::new("not_exist.yaml"));

        assert_eq!(config, ReflectionConfig::default());
        assert_eq!(config.encoder_channel(5), Some(5));
        assert_eq!(config.encoder_channel(-1), None);
        assert!(!config.has_support_axis());
    }

    #[test]
    fn test_new() {
        let mut file = Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "upperPlatformRange: [100, 200, 50]").unwrap();
        writeln!(file, "lowerPlatformRange: [1, 2]").unwrap();
        writeln!(file, "minPlatformZDistance: 50").unwrap();
        writeln!(file, "brakePowerPort: -1").unwrap();
        writeln!(file, "encoderChannels: [10, 11, 12, 13, 14, 15]").unwrap();
        writeln!(file, "supportAxis: 6").unwrap();
        writeln!(file, "imageFormat: bmp").unwrap();

        let config = ReflectionConfig::new(file.path());

        assert_eq!(config.upper_platform_range, Vector3::new(100.0, 200.0, 50.0));
        assert_eq!(
            config.range(Platform::Lower),
            &ReflectionConfig::default().lower_platform_range
        );
        assert_eq!(config.min_platform_z_distance, 50.0);
        assert_eq!(config.brake_power_port, -1);
        assert_eq!(config.encoder_channel(2), Some(12));
        assert!(config.has_support_axis());
        assert_eq!(config.image_format, "bmp");
        assert_eq!(config.motor_subdivision, 12800.0);
    }
}
