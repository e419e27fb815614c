pub mod acquisition_client;
pub mod encoder_manager;
pub mod encoder_reading;
pub mod frame_parser;
