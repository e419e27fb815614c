pub mod command_encoder;
pub mod command_reflection;
pub mod command_schema;
pub mod command_vacuum;
