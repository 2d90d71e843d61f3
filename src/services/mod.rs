pub mod config;
pub mod host_keys;
pub mod interpreter;
pub mod logger;
