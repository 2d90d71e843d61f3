pub mod constants;
pub mod envelope;
pub mod errors;
pub mod http;
pub mod managers;
pub mod services;
pub mod utils;
