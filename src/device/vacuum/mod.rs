pub mod vacuum_config;
pub mod vacuum_device;
pub mod vacuum_points;
