pub mod command_server;
pub mod device_server;
pub mod tcp_server;
