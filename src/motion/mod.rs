pub mod json_tcp_proxy;
pub mod proxy;
pub mod trajectory;
