pub mod device;
pub mod device_lock;
pub mod encoder_device;
pub mod reflection;
pub mod self_check;
pub mod state_matrix;
pub mod vacuum;
