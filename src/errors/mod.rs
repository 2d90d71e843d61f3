mod channel_error;
mod config_error;
mod serve_error;

pub use channel_error::ChannelError;
pub use config_error::ConfigError;
pub use serve_error::ServeError;
