pub mod mock_camera;
pub mod mock_constants;
pub mod mock_encoder;
pub mod mock_motion_controller;
pub mod mock_plc_transport;
pub mod mock_proxy_factory;
