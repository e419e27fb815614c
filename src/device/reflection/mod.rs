pub mod camera;
pub mod platform;
pub mod reflection_config;
pub mod reflection_device;
pub mod sim_interpolator;
