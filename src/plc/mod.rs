pub mod plc_address;
pub mod plc_client;
pub mod plc_transport;
pub mod s7_transport;
