pub mod connection_supervisor;
pub mod plc_link;
pub mod proxy_links;
